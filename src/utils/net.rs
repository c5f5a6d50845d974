//! Networking helpers

use std::net::{IpAddr, SocketAddr};

use crate::error::{AppError, Result};

/// Combine a configured bind address and port. Accepts bare IPv4/IPv6
/// literals, with or without IPv6 brackets.
pub fn parse_bind_addr(address: &str, port: u16) -> Result<SocketAddr> {
    let trimmed = address.trim().trim_start_matches('[').trim_end_matches(']');
    let ip: IpAddr = trimmed
        .parse()
        .map_err(|_| AppError::Config(format!("Invalid bind address: {}", address)))?;
    Ok(SocketAddr::new(ip, port))
}
