pub mod awattar;
pub mod smartmeter;

pub use awattar::AwattarSource;
pub use smartmeter::SmartMeterSource;
