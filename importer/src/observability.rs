use tracing_subscriber::EnvFilter;

const TARGETS: [&str; 4] = ["importer", "energy_client", "energy_importer", "import_prices"];

/// `RUST_LOG` is honoured; our own crates log at info, or debug when `verbose`.
pub fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    let mut filter = EnvFilter::from_default_env();
    for target in TARGETS {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
