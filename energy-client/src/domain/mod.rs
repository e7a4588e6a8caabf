pub mod consumption;
pub mod price;

pub use consumption::{ConsumptionPeriod, ConsumptionRecord};
pub use price::PricePoint;
