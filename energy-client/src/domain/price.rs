use time::OffsetDateTime;

/// Day-ahead market price for the slot starting at `ts`.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub ts: OffsetDateTime,
    pub cents_per_kwh: f64,
}

impl PricePoint {
    /// Build a price point from a market price quoted in EUR/MWh.
    pub fn from_eur_per_mwh(ts: OffsetDateTime, eur_per_mwh: f64) -> Self {
        let eur_per_kwh = eur_per_mwh / 1000.0;
        Self {
            ts,
            cents_per_kwh: eur_per_kwh * 100.0,
        }
    }
}
