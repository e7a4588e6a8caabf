//! The two import runs, wired from config into a pipeline.

use std::sync::Arc;

use anyhow::Context;
use energy_client::{
    awattar::AwattarClient,
    domain::{ConsumptionPeriod, ConsumptionRecord, PricePoint},
    smartmeter::{self, ConsumptionReader, Credentials, FileSessionStore, SmartMeterPortal},
};
use time::Date;

use crate::{
    config::AppConfig,
    pipeline::{Pipeline, SinkReport},
    sinks::InfluxLineSink,
    sources::{AwattarSource, SmartMeterSource},
    transform,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub report: SinkReport,
    /// Consumption fetches that failed and produced no readings.
    pub failed_fetches: usize,
}

/// Log in (or reuse the stored session), resolve the metering point and
/// write its readings for `period` to InfluxDB.
pub async fn import_consumption(
    cfg: &AppConfig,
    credentials: &Credentials,
    period: ConsumptionPeriod,
    metering_point: Option<&str>,
) -> anyhow::Result<ImportSummary> {
    let settings = cfg.http.settings();
    let portal = Arc::new(
        SmartMeterPortal::new(&cfg.smartmeter.base_url, &settings).context("failed to build portal HTTP client")?,
    );
    let store = FileSessionStore::new(&cfg.smartmeter.session_file);

    let account = smartmeter::authenticate(&portal, &store, credentials, metering_point)
        .await
        .context("smart meter authentication failed")?;
    account.ensure_readable()?;

    tracing::info!(
        account = account.account_id(),
        metering_point = account.metering_point_id(),
        period = %period,
        granularity = period.granularity(),
        "importing consumption"
    );

    let reader = ConsumptionReader::new(Arc::clone(&portal));
    let sink = InfluxLineSink::<ConsumptionRecord>::new(
        &cfg.influx,
        settings.build_client().context("failed to build InfluxDB HTTP client")?,
    );

    let pipeline: Pipeline<_, ConsumptionRecord, _> = Pipeline {
        source: SmartMeterSource::new(reader.clone(), account, period),
        transforms: vec![Arc::new(transform::ConsumptionValidation)],
        sink,
    };
    let report = pipeline.run().await?;

    let summary = ImportSummary {
        report,
        failed_fetches: reader.failed_fetches(),
    };
    if summary.failed_fetches > 0 {
        tracing::warn!(failed = summary.failed_fetches, "some consumption fetches failed");
    }
    tracing::info!(
        written = report.written,
        rejected = report.rejected,
        "consumption import finished"
    );

    Ok(summary)
}

/// Write aWATTar day-ahead prices for `[start, end)` to InfluxDB.
pub async fn import_prices(cfg: &AppConfig, start: Date, end: Date) -> anyhow::Result<SinkReport> {
    let settings = cfg.http.settings();
    let client = AwattarClient::new(&cfg.awattar.base_url, &settings).context("failed to build aWATTar HTTP client")?;
    let sink = InfluxLineSink::<PricePoint>::new(
        &cfg.influx,
        settings.build_client().context("failed to build InfluxDB HTTP client")?,
    );

    tracing::info!(%start, %end, "importing day-ahead prices");

    let pipeline: Pipeline<_, PricePoint, _> = Pipeline {
        source: AwattarSource::new(Arc::new(client), start, end),
        transforms: vec![Arc::new(transform::PriceValidation)],
        sink,
    };
    let report = pipeline.run().await?;

    tracing::info!(
        written = report.written,
        rejected = report.rejected,
        "price import finished"
    );
    Ok(report)
}
