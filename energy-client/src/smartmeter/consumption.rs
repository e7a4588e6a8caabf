use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime, PrimitiveDateTime};

use super::{
    account::Account,
    error::{ConsumptionFetchError, SmartMeterError},
    SmartMeterPortal,
};
use crate::domain::{ConsumptionPeriod, ConsumptionRecord};

const DAY: &str = "/ConsumptionRecord/Day";
const MONTH: &str = "/ConsumptionRecord/Month";
const YEAR: &str = "/ConsumptionRecord/Year";

/// Two parallel arrays as returned by the consumption endpoints. The day
/// and month endpoints name the values `meteredValues`, the year endpoint
/// names them `values`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Series {
    #[serde(default)]
    peak_demand_times: Option<Vec<Option<String>>>,
    #[serde(default)]
    metered_values: Option<Vec<Option<f64>>>,
    #[serde(default)]
    values: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeriesPayload {
    Many(Vec<Series>),
    One(Series),
}

impl Series {
    fn into_records(self, period: ConsumptionPeriod) -> Result<Vec<ConsumptionRecord>, ConsumptionFetchError> {
        let times = self
            .peak_demand_times
            .ok_or(ConsumptionFetchError::MissingField("peakDemandTimes"))?;
        let (field, values) = match period {
            ConsumptionPeriod::Year(_) => ("values", self.values),
            ConsumptionPeriod::Day(_) | ConsumptionPeriod::Month { .. } => ("meteredValues", self.metered_values),
        };
        let values = values.ok_or(ConsumptionFetchError::MissingField(field))?;

        pair_readings(times, values)
    }
}

/// Pair timestamps with values by position.
///
/// The arrays must have equal length. Positions where either side is null
/// are skipped.
fn pair_readings(
    times: Vec<Option<String>>,
    values: Vec<Option<f64>>,
) -> Result<Vec<ConsumptionRecord>, ConsumptionFetchError> {
    if times.len() != values.len() {
        return Err(ConsumptionFetchError::LengthMismatch {
            times: times.len(),
            values: values.len(),
        });
    }

    let mut records = Vec::with_capacity(times.len());
    for (idx, (raw_ts, value)) in times.into_iter().zip(values).enumerate() {
        let (Some(raw_ts), Some(value)) = (raw_ts, value) else {
            tracing::debug!(position = idx, "skipping reading without timestamp or value");
            continue;
        };
        records.push(ConsumptionRecord {
            ts: parse_reading_timestamp(&raw_ts)?,
            value,
        });
    }

    Ok(records)
}

/// RFC 3339 timestamps are taken as-is; timestamps without an offset are UTC.
pub fn parse_reading_timestamp(raw: &str) -> Result<OffsetDateTime, ConsumptionFetchError> {
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }

    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|e| ConsumptionFetchError::InvalidTimestamp {
        raw: raw.to_string(),
        reason: e.to_string(),
    })
}

fn request_for(metering_point_id: &str, period: ConsumptionPeriod) -> (&'static str, Vec<(&'static str, String)>) {
    let meter = ("meterId", metering_point_id.to_string());
    match period {
        ConsumptionPeriod::Day(_) => (DAY, vec![meter, ("day", period.to_string())]),
        ConsumptionPeriod::Month { year, month } => (
            MONTH,
            vec![meter, ("year", year.to_string()), ("month", u8::from(month).to_string())],
        ),
        ConsumptionPeriod::Year(year) => (YEAR, vec![meter, ("year", year.to_string())]),
    }
}

/// Fetches readings for a resolved account.
///
/// Failed fetches degrade to an empty result and are counted, so a run can
/// report how many periods came back without data because of an error.
#[derive(Debug, Clone)]
pub struct ConsumptionReader {
    portal: Arc<SmartMeterPortal>,
    failed: Arc<AtomicUsize>,
}

impl ConsumptionReader {
    pub fn new(portal: Arc<SmartMeterPortal>) -> Self {
        Self {
            portal,
            failed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn fetch_consumption(
        &self,
        account: &Account,
        period: ConsumptionPeriod,
    ) -> Result<Vec<ConsumptionRecord>, ConsumptionFetchError> {
        if let Err(SmartMeterError::MissingCapability(missing)) = account.ensure_readable() {
            return Err(ConsumptionFetchError::NotReadable(missing));
        }

        let (endpoint, query) = request_for(account.metering_point_id(), period);
        let response = self
            .portal
            .send_get(account.session(), endpoint, &query)
            .await
            .map_err(ConsumptionFetchError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConsumptionFetchError::Status(status));
        }

        let body = response.bytes().await.map_err(ConsumptionFetchError::Http)?;
        let series = match serde_json::from_slice::<SeriesPayload>(&body)? {
            SeriesPayload::Many(list) => list.into_iter().next().ok_or(ConsumptionFetchError::MissingSeries)?,
            SeriesPayload::One(series) => series,
        };

        series.into_records(period)
    }

    /// Like [`Self::fetch_consumption`], but logs failures and returns an
    /// empty sequence instead. An empty result means "no data or error".
    pub async fn get_consumption(&self, account: &Account, period: ConsumptionPeriod) -> Vec<ConsumptionRecord> {
        match self.fetch_consumption(account, period).await {
            Ok(records) => {
                tracing::debug!(
                    granularity = period.granularity(),
                    period = %period,
                    readings = records.len(),
                    "fetched consumption"
                );
                records
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("smartmeter_consumption_fetch_errors_total").increment(1);
                tracing::error!(
                    error = %e,
                    granularity = period.granularity(),
                    period = %period,
                    metering_point = account.metering_point_id(),
                    "consumption fetch failed, continuing without readings"
                );
                Vec::new()
            }
        }
    }

    /// Number of `get_consumption` calls that degraded to an empty result.
    pub fn failed_fetches(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smartmeter::{account::resolve_account, test_support::portal, Session};
    use mockito::Matcher;
    use time::{macros::{date, datetime}, Month};

    async fn readable_account(server: &mut mockito::Server) -> Account {
        server
            .mock("GET", "/User/GetBasicInfo")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        server
            .mock("GET", "/User/GetAccountIdByBussinespartnerId")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"accountId": "A1", "hasSmartMeter": true, "hasCommunicative": true, "hasOptIn": true}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/User/GetMeteringPointByAccountId")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"meteringPointId": "M1"}]"#)
            .create_async()
            .await;

        resolve_account(&portal(server.url()), Session::new(), None)
            .await
            .unwrap()
    }

    fn reader(server: &mockito::Server) -> ConsumptionReader {
        ConsumptionReader::new(Arc::new(portal(server.url())))
    }

    const FOUR_TIMES: &str = r#"["2024-03-01T00:15:00", "2024-03-01T00:30:00", "2024-03-01T00:45:00", "2024-03-01T01:00:00"]"#;

    fn assert_four_in_order(records: &[ConsumptionRecord]) {
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].ts, datetime!(2024-03-01 00:15:00 UTC));
        assert_eq!(records[3].ts, datetime!(2024-03-01 01:00:00 UTC));
        let values: Vec<f64> = records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[tokio::test]
    async fn day_readings_are_paired_in_order() {
        let mut server = mockito::Server::new_async().await;
        let account = readable_account(&mut server).await;

        let day = server
            .mock("GET", "/ConsumptionRecord/Day")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("meterId".into(), "M1".into()),
                Matcher::UrlEncoded("day".into(), "2024-03-01".into()),
            ]))
            .with_status(200)
            .with_body(format!(
                r#"[{{"peakDemandTimes": {FOUR_TIMES}, "meteredValues": [0.1, 0.2, 0.3, 0.4]}}]"#
            ))
            .create_async()
            .await;

        let reader = reader(&server);
        let records = reader
            .get_consumption(&account, ConsumptionPeriod::Day(date!(2024-03-01)))
            .await;

        day.assert_async().await;
        assert_four_in_order(&records);
        assert_eq!(reader.failed_fetches(), 0);
    }

    #[tokio::test]
    async fn month_readings_are_paired_in_order() {
        let mut server = mockito::Server::new_async().await;
        let account = readable_account(&mut server).await;

        server
            .mock("GET", "/ConsumptionRecord/Month")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("meterId".into(), "M1".into()),
                Matcher::UrlEncoded("year".into(), "2024".into()),
                Matcher::UrlEncoded("month".into(), "3".into()),
            ]))
            .with_status(200)
            .with_body(format!(
                r#"{{"peakDemandTimes": {FOUR_TIMES}, "meteredValues": [0.1, 0.2, 0.3, 0.4]}}"#
            ))
            .create_async()
            .await;

        let records = reader(&server)
            .fetch_consumption(&account, ConsumptionPeriod::Month { year: 2024, month: Month::March })
            .await
            .unwrap();

        assert_four_in_order(&records);
    }

    #[tokio::test]
    async fn year_readings_use_values_field() {
        let mut server = mockito::Server::new_async().await;
        let account = readable_account(&mut server).await;

        server
            .mock("GET", "/ConsumptionRecord/Year")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("meterId".into(), "M1".into()),
                Matcher::UrlEncoded("year".into(), "2024".into()),
            ]))
            .with_status(200)
            .with_body(format!(
                r#"{{"peakDemandTimes": {FOUR_TIMES}, "values": [0.1, 0.2, 0.3, 0.4]}}"#
            ))
            .create_async()
            .await;

        let records = reader(&server)
            .fetch_consumption(&account, ConsumptionPeriod::Year(2024))
            .await
            .unwrap();

        assert_four_in_order(&records);
    }

    #[tokio::test]
    async fn server_error_degrades_to_empty() {
        let mut server = mockito::Server::new_async().await;
        let account = readable_account(&mut server).await;

        server
            .mock("GET", "/ConsumptionRecord/Day")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let reader = reader(&server);
        let records = reader
            .get_consumption(&account, ConsumptionPeriod::Day(date!(2024-03-01)))
            .await;

        assert!(records.is_empty());
        assert_eq!(reader.failed_fetches(), 1);
    }

    #[tokio::test]
    async fn malformed_body_degrades_to_empty() {
        let mut server = mockito::Server::new_async().await;
        let account = readable_account(&mut server).await;

        server
            .mock("GET", "/ConsumptionRecord/Year")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let reader = reader(&server);
        let records = reader.get_consumption(&account, ConsumptionPeriod::Year(2024)).await;

        assert!(records.is_empty());
        assert_eq!(reader.failed_fetches(), 1);
    }

    #[tokio::test]
    async fn length_mismatch_fails_fast() {
        let mut server = mockito::Server::new_async().await;
        let account = readable_account(&mut server).await;

        server
            .mock("GET", "/ConsumptionRecord/Day")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"peakDemandTimes": ["2024-03-01T00:15:00", "2024-03-01T00:30:00"], "meteredValues": [1.0]}]"#)
            .create_async()
            .await;

        let result = reader(&server)
            .fetch_consumption(&account, ConsumptionPeriod::Day(date!(2024-03-01)))
            .await;

        assert!(matches!(
            result,
            Err(ConsumptionFetchError::LengthMismatch { times: 2, values: 1 })
        ));
    }

    #[test]
    fn null_entries_are_skipped() {
        let records = pair_readings(
            vec![
                Some("2024-03-01T00:15:00".to_string()),
                None,
                Some("2024-03-01T00:45:00+01:00".to_string()),
            ],
            vec![None, Some(0.2), Some(0.3)],
        )
        .unwrap();

        assert_eq!(
            records,
            vec![ConsumptionRecord {
                ts: datetime!(2024-03-01 00:45:00 +1),
                value: 0.3,
            }]
        );
    }

    #[test]
    fn naive_timestamps_with_fraction_are_utc() {
        assert_eq!(
            parse_reading_timestamp("2024-03-01T12:00:00.000").unwrap(),
            datetime!(2024-03-01 12:00:00 UTC)
        );
        assert!(matches!(
            parse_reading_timestamp("yesterday"),
            Err(ConsumptionFetchError::InvalidTimestamp { .. })
        ));
    }
}
