use std::marker::PhantomData;

use energy_client::domain::{ConsumptionRecord, PricePoint};
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use time::OffsetDateTime;

use crate::{
    config::InfluxConfig,
    pipeline::{Envelope, PipelineError, Sink, SinkReport},
};

pub const CONSUMPTION_MEASUREMENT: &str = "measurements";
pub const PRICE_MEASUREMENT: &str = "electricity_prices_awattar";

/// Escape measurement names and field keys for line protocol.
///
/// Line protocol requires escaping commas, spaces and equals with a backslash.
fn escape_ident(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

fn push_field_f64(out: &mut String, key: &str, value: f64) {
    escape_ident(key, out);
    out.push('=');
    out.push_str(&value.to_string());
}

fn ts_to_unix_nanos(ts: OffsetDateTime) -> i128 {
    ts.unix_timestamp_nanos()
}

fn write_single_field_line(out: &mut String, measurement: &str, field: &str, value: f64, ts: OffsetDateTime) {
    escape_ident(measurement, out);
    out.push(' ');
    push_field_f64(out, field, value);
    out.push(' ');
    out.push_str(&ts_to_unix_nanos(ts).to_string());
}

/// A record that can be written as one line-protocol point.
pub trait LineProtocol {
    fn write_line(&self, out: &mut String);
}

impl LineProtocol for ConsumptionRecord {
    fn write_line(&self, out: &mut String) {
        write_single_field_line(out, CONSUMPTION_MEASUREMENT, "measure", self.value, self.ts);
    }
}

impl LineProtocol for PricePoint {
    fn write_line(&self, out: &mut String) {
        write_single_field_line(out, PRICE_MEASUREMENT, "price", self.cents_per_kwh, self.ts);
    }
}

/// Writes each record as its own point through the InfluxDB v2 HTTP write API.
pub struct InfluxLineSink<T> {
    http: reqwest::Client,
    write_url: String,
    token: String,
    org: String,
    bucket: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> InfluxLineSink<T> {
    pub fn new(cfg: &InfluxConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            write_url: format!("{}/api/v2/write", cfg.url.trim_end_matches('/')),
            token: cfg.token.clone(),
            org: cfg.org.clone(),
            bucket: cfg.bucket.clone(),
            _marker: PhantomData,
        }
    }

    async fn write_point(&self, line: String) -> Result<(), PipelineError> {
        let response = self
            .http
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await
            .map_err(|e| PipelineError::Sink(format!("influx write failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        metrics::counter!("influx_sink_errors_total").increment(1);
        Err(PipelineError::Sink(format!(
            "influx rejected point with HTTP {status}: {}",
            detail.trim()
        )))
    }
}

#[async_trait::async_trait]
impl<T> Sink<T> for InfluxLineSink<T>
where
    T: LineProtocol + Send + Sync + 'static,
{
    async fn run<S>(&self, mut input: S) -> Result<SinkReport, PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut report = SinkReport::default();

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(PipelineError::Transform(reason)) => {
                    tracing::warn!(%reason, "record rejected, not written");
                    report.rejected += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for InfluxLineSink");
                    return Err(e);
                }
            };

            let mut line = String::with_capacity(64);
            env.payload.write_line(&mut line);
            tracing::debug!(%line, "writing point");

            self.write_point(line).await?;
            metrics::counter!("influx_points_written_total").increment(1);
            report.written += 1;
        }

        Ok(report)
    }
}
