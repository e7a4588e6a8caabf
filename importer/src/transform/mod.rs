use crate::pipeline::{Envelope, PipelineError, Transform};
use energy_client::domain::{ConsumptionRecord, PricePoint};
use time::{macros::datetime, OffsetDateTime};

fn check_ts(ts: OffsetDateTime) -> Result<(), PipelineError> {
    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if ts < min_ts || ts > max_ts {
        return Err(PipelineError::Transform(format!("timestamp {ts} out of allowed range")));
    }
    Ok(())
}

/// Pure validation of a `ConsumptionRecord`.
///
/// Rules:
/// - the value must be finite and non-negative.
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn validate_consumption(
    env: Envelope<ConsumptionRecord>,
) -> Result<Envelope<ConsumptionRecord>, PipelineError> {
    let r = &env.payload;

    if !r.value.is_finite() || r.value < 0.0 {
        return Err(PipelineError::Transform(format!(
            "consumption value {} at {} must be finite and non-negative",
            r.value, r.ts
        )));
    }
    check_ts(r.ts)?;

    Ok(env)
}

/// Pure validation of a `PricePoint`.
///
/// Negative prices are legal on the day-ahead market; only non-finite
/// values and implausible timestamps are rejected.
pub fn validate_price(env: Envelope<PricePoint>) -> Result<Envelope<PricePoint>, PipelineError> {
    let p = &env.payload;

    if !p.cents_per_kwh.is_finite() {
        return Err(PipelineError::Transform(format!("price at {} is not finite", p.ts)));
    }
    check_ts(p.ts)?;

    Ok(env)
}

#[derive(Clone, Default)]
pub struct ConsumptionValidation;

#[async_trait::async_trait]
impl Transform<ConsumptionRecord, ConsumptionRecord> for ConsumptionValidation {
    async fn apply(
        &self,
        input: Envelope<ConsumptionRecord>,
    ) -> Result<Envelope<ConsumptionRecord>, PipelineError> {
        validate_consumption(input).inspect_err(|_| {
            metrics::counter!("validation_consumption_rejected_total").increment(1);
        })
    }
}

#[derive(Clone, Default)]
pub struct PriceValidation;

#[async_trait::async_trait]
impl Transform<PricePoint, PricePoint> for PriceValidation {
    async fn apply(&self, input: Envelope<PricePoint>) -> Result<Envelope<PricePoint>, PipelineError> {
        validate_price(input).inspect_err(|_| {
            metrics::counter!("validation_price_rejected_total").increment(1);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumption(ts: OffsetDateTime, value: f64) -> Envelope<ConsumptionRecord> {
        Envelope::new(ConsumptionRecord { ts, value })
    }

    #[test]
    fn consumption_validation_accepts_valid_record() {
        let res = validate_consumption(consumption(datetime!(2024-01-01 00:15:00 UTC), 0.0));
        assert!(res.is_ok());
    }

    #[test]
    fn consumption_validation_rejects_negative_and_nan() {
        let negative = validate_consumption(consumption(datetime!(2024-01-01 00:15:00 UTC), -0.1));
        assert!(matches!(negative, Err(PipelineError::Transform(_))));

        let nan = validate_consumption(consumption(datetime!(2024-01-01 00:15:00 UTC), f64::NAN));
        assert!(matches!(nan, Err(PipelineError::Transform(_))));
    }

    #[test]
    fn consumption_validation_rejects_out_of_range_ts() {
        let res = validate_consumption(consumption(datetime!(1800-01-01 00:00:00 UTC), 1.0));
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }

    #[test]
    fn price_validation_allows_negative_prices() {
        let env = Envelope::new(PricePoint {
            ts: datetime!(2024-05-12 13:00:00 UTC),
            cents_per_kwh: -1.2,
        });
        assert!(validate_price(env).is_ok());

        let inf = Envelope::new(PricePoint {
            ts: datetime!(2024-05-12 13:00:00 UTC),
            cents_per_kwh: f64::INFINITY,
        });
        assert!(matches!(validate_price(inf), Err(PipelineError::Transform(_))));
    }
}
