//! Helper utilities for Burrow
//!
//! Address parsing helpers and socket tuning shared by the dialer and the
//! forward servers.

use crate::error::{BurrowError, Result};
use std::time::Duration;
use tokio::net::TcpStream;

/// Default connection timeout in seconds for direct and proxy dials
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Split a `host:port` string into its parts
///
/// IPv6 literals must be bracketed, e.g. `[::1]:8022`.
pub fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| BurrowError::config(format!("missing port in address '{}'", addr)))?;

    let host = if host.starts_with('[') && host.ends_with(']') {
        &host[1..host.len() - 1]
    } else if host.contains(':') {
        return Err(BurrowError::config(format!(
            "IPv6 address must be bracketed in '{}'",
            addr
        )));
    } else {
        host
    };

    if host.is_empty() {
        return Err(BurrowError::config(format!("missing host in address '{}'", addr)));
    }

    let port: u16 = port
        .parse()
        .map_err(|_| BurrowError::config(format!("invalid port in address '{}'", addr)))?;

    Ok((host.to_string(), port))
}

/// Join a host and port, bracketing IPv6 literals
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Socket options applied to dialed and accepted TCP connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}
