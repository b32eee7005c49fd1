//! Proxy-aware dialing
//!
//! Produces a raw duplex connection to a target address, either directly or
//! tunneled through the configured upstream proxy.

use super::http;
use super::{ProxyConfig, ProxyScheme};
use crate::error::{BurrowError, Result};
use crate::helper::{split_host_port, SocketOpts, DEFAULT_CONNECT_TIMEOUT_SECS};
use crate::socks;
use crate::transport::BoxedStream;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Dial `target` (`host:port`) through the optional upstream proxy
///
/// Returns a stream that is already tunneled to the target. On any handshake
/// failure the underlying socket is dropped, closing it.
pub async fn dial(proxy: Option<&ProxyConfig>, target: &str) -> Result<BoxedStream> {
    match proxy {
        None => {
            let stream = dial_tcp(target).await?;
            debug!(target = %target, "direct connection established");
            Ok(Box::new(stream))
        }
        Some(proxy) => {
            let (host, port) = split_host_port(target)?;
            let mut stream = dial_tcp(&proxy.addr()).await?;
            match proxy.scheme {
                ProxyScheme::Socks5 | ProxyScheme::Socks5h => {
                    socks::client::connect(&mut stream, &host, port, proxy.auth()).await?;
                    debug!(proxy = %proxy, target = %target, "SOCKS5 tunnel established");
                    Ok(Box::new(stream))
                }
                ProxyScheme::Http | ProxyScheme::Https => {
                    let mut stream = BufReader::new(stream);
                    http::connect(&mut stream, target, proxy.auth()).await?;
                    debug!(proxy = %proxy, target = %target, "HTTP CONNECT tunnel established");
                    Ok(Box::new(stream))
                }
            }
        }
    }
}

/// Plain TCP dial with a bounded timeout
async fn dial_tcp(addr: &str) -> Result<TcpStream> {
    let timeout = Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS);
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| BurrowError::Connect(format!("connection timeout to {}", addr)))?
        .map_err(|e| BurrowError::Connect(format!("failed to connect to {}: {}", addr, e)))?;

    if let Err(e) = SocketOpts::default().apply(&stream) {
        warn!("Failed to apply socket options: {}", e);
    }

    Ok(stream)
}
