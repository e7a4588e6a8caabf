use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use energy_client::smartmeter::Credentials;
use importer::{cli::PeriodArgs, config::AppConfig, import, observability};

/// Import smart meter consumption readings into InfluxDB.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Smart meter portal user name
    #[arg(short, long, env = "SMARTMETER_USER")]
    user: String,

    /// Smart meter portal password
    #[arg(short, long, env = "SMARTMETER_PASSWORD", hide_env_values = true)]
    password: String,

    #[command(flatten)]
    period: PeriodArgs,

    /// Use this metering point instead of the first one on the account
    #[arg(long)]
    metering_point_id: Option<String>,

    /// Config file (defaults to $IMPORTER_CONFIG, then importer-config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    observability::init_tracing(args.verbose);

    let cfg = AppConfig::load(args.config.as_deref())?;
    let period = args
        .period
        .period()
        .ok_or_else(|| anyhow::anyhow!("one of --day, --month or --year is required"))?;
    let credentials = Credentials::new(args.user, args.password);

    let summary = import::import_consumption(&cfg, &credentials, period, args.metering_point_id.as_deref()).await?;

    if summary.report.written == 0 {
        tracing::warn!(period = %period, "no consumption readings were written");
    }
    Ok(())
}
