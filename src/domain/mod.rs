// Domain layer: records, allow-lists, rate arithmetic and the ports the adapters implement.

pub mod filter;
pub mod model;
pub mod ports;
pub mod rate;
