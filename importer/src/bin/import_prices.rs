use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use importer::{cli::parse_day, config::AppConfig, import, observability};
use time::Date;

/// Import aWATTar day-ahead prices into InfluxDB.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// First day to import (YYYY-MM-DD)
    #[arg(short = 'f', long, value_parser = parse_day)]
    start_date: Date,

    /// Day after the last one to import (YYYY-MM-DD)
    #[arg(short = 't', long, value_parser = parse_day)]
    end_date: Date,

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

    if args.start_date >= args.end_date {
        bail!(
            "--start-date {} must be before --end-date {}",
            args.start_date,
            args.end_date
        );
    }

    let cfg = AppConfig::load(args.config.as_deref())?;
    import::import_prices(&cfg, args.start_date, args.end_date).await?;
    Ok(())
}
