//! Transport layer abstraction
//!
//! A [`Transport`] is the authenticated multiplexed connection produced by a
//! successful session establishment. All forward servers of one session share
//! the same transport: they only ever open client-initiated channels or
//! accept server-initiated ones, so no forward server owns it.

mod ssh;

pub use ssh::SshTransport;

use crate::error::Result;
use async_trait::async_trait;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;

/// Trait bound for the byte streams carried by a transport
pub trait StreamIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> StreamIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Boxed duplex byte stream
pub type BoxedStream = Box<dyn StreamIo>;

/// A duplex channel stream with an explicit half-close capability flag
///
/// `shutdown()` on a half-close capable stream closes only the write
/// direction; on anything else it tears the whole stream down. The relay
/// uses the flag to decide whether the opposite direction may keep draining.
pub struct TransportStream {
    io: BoxedStream,
    half_close: bool,
}

impl TransportStream {
    /// Wrap a stream, declaring whether its shutdown is a write-side close
    pub fn new<S: StreamIo + 'static>(io: S, half_close: bool) -> Self {
        TransportStream {
            io: Box::new(io),
            half_close,
        }
    }

    /// Whether `shutdown()` closes only the write direction
    pub fn supports_half_close(&self) -> bool {
        self.half_close
    }
}

impl AsyncRead for TransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

/// Acceptor for server-initiated channels of one remote listener
///
/// The feeding side lives inside the transport; when it goes away (listener
/// cancelled or transport torn down) `accept` returns `None`. The underlying
/// protocol does not distinguish "cancelled by us" from "lost on the remote
/// side", which is why remote forwarding treats an exhausted acceptor as
/// terminal.
pub struct TransportListener {
    rx: mpsc::UnboundedReceiver<TransportStream>,
    bind_host: String,
    bind_port: u16,
}

impl TransportListener {
    /// Build a listener from a channel of inbound streams
    ///
    /// Transport implementations hold the sender side and feed accepted
    /// channels into it; dropping every sender ends the listener.
    pub fn new(
        rx: mpsc::UnboundedReceiver<TransportStream>,
        bind_host: String,
        bind_port: u16,
    ) -> Self {
        TransportListener {
            rx,
            bind_host,
            bind_port,
        }
    }

    /// Wait for the next inbound channel
    pub async fn accept(&mut self) -> Option<TransportStream> {
        self.rx.recv().await
    }

    /// Host the remote side is listening on
    pub fn bind_host(&self) -> &str {
        &self.bind_host
    }

    /// Port the remote side is listening on (server-assigned when 0 was
    /// requested)
    pub fn bind_port(&self) -> u16 {
        self.bind_port
    }
}

/// Authenticated multiplexed connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a client-initiated channel to `target` (`host:port`)
    async fn open_channel(&self, target: &str) -> Result<TransportStream>;

    /// Ask the remote side to listen on `bind` (`host:port`) and return an
    /// acceptor for the resulting inbound channels
    async fn listen(&self, bind: &str) -> Result<TransportListener>;

    /// Cancel a remote listener previously created with [`Transport::listen`]
    async fn unlisten(&self, host: &str, port: u16) -> Result<()>;

    /// Tear down the transport
    async fn close(&self) -> Result<()>;
}
