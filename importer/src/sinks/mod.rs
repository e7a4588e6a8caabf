pub mod influx_line;

pub use influx_line::{InfluxLineSink, LineProtocol};
