//! Clients for the Netz NÖ smart-meter portal and the aWATTar market-data API,
//! plus the domain records both of them produce.

pub mod awattar;
pub mod domain;
pub mod http;
pub mod smartmeter;
