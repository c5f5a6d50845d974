//! Shared utilities

pub mod net;
pub mod throttle;

pub use net::parse_bind_addr;
pub use throttle::LogThrottler;
