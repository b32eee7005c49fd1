//! Test utilities and mocks for Burrow
//!
//! This module provides common test utilities used across integration tests.

use async_trait::async_trait;
use burrow::error::{BurrowError, Result};
use burrow::helper::split_host_port;
use burrow::transport::{Transport, TransportListener, TransportStream};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Transport stand-in backed by plain TCP
///
/// Channel opens become direct TCP dials, and remote listeners are fed
/// in-process through [`LoopbackTransport::inject`]. This exercises the
/// forward servers without an SSH server in the picture.
pub struct LoopbackTransport {
    listeners: Mutex<HashMap<String, mpsc::UnboundedSender<TransportStream>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        LoopbackTransport {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Feed an inbound channel to the listener registered at `bind`
    pub fn inject(&self, bind: &str, stream: TcpStream) -> bool {
        let listeners = self.listeners.lock().unwrap();
        match listeners.get(bind) {
            Some(tx) => tx.send(TransportStream::new(stream, true)).is_ok(),
            None => false,
        }
    }

    /// Drop a listener feed, as if the remote side lost it
    pub fn drop_listener(&self, bind: &str) {
        self.listeners.lock().unwrap().remove(bind);
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open_channel(&self, target: &str) -> Result<TransportStream> {
        let stream = TcpStream::connect(target)
            .await
            .map_err(|e| BurrowError::Connect(format!("channel open to {} failed: {}", target, e)))?;
        Ok(TransportStream::new(stream, true))
    }

    async fn listen(&self, bind: &str) -> Result<TransportListener> {
        let (host, port) = split_host_port(bind)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().insert(bind.to_string(), tx);
        Ok(TransportListener::new(rx, host, port))
    }

    async fn unlisten(&self, host: &str, port: u16) -> Result<()> {
        self.drop_listener(&format!("{}:{}", host, port));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.listeners.lock().unwrap().clear();
        Ok(())
    }
}

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Create a connected TCP stream pair for testing
pub async fn create_tcp_stream_pair() -> (TcpStream, TcpStream) {
    let (listener, addr) = create_test_listener().await;

    let connect_fut = TcpStream::connect(addr);
    let accept_fut = listener.accept();

    let (client_stream, accept_result) = tokio::join!(connect_fut, accept_fut);

    (client_stream.unwrap(), accept_result.unwrap().0)
}

/// Spawn a TCP echo server and return its address
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        loop {
            let Ok((mut conn, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if conn.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                let _ = conn.shutdown().await;
            });
        }
    });
    addr
}
