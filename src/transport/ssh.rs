//! SSH transport implementation
//!
//! Realizes [`Transport`](super::Transport) over a `russh` client session.
//! Client-initiated channels map to `direct-tcpip`, remote listeners to
//! `tcpip-forward` requests whose inbound `forwarded-tcpip` channels are
//! routed to the matching [`TransportListener`](super::TransportListener).

use super::{Transport, TransportListener, TransportStream};
use crate::error::{BurrowError, Result};
use crate::helper::split_host_port;
use crate::session::Credentials;
use async_trait::async_trait;
use russh::client::{self, AuthResult, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey};
use russh::{Channel, Disconnect};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Routes inbound `forwarded-tcpip` channels to the listener registered for
/// the matching bind address and port
#[derive(Default)]
struct RemoteRouter {
    senders: StdMutex<HashMap<(String, u32), mpsc::UnboundedSender<TransportStream>>>,
}

impl RemoteRouter {
    fn register(&self, host: &str, port: u32, tx: mpsc::UnboundedSender<TransportStream>) {
        self.senders
            .lock()
            .unwrap()
            .insert((host.to_string(), port), tx);
    }

    fn deregister(&self, host: &str, port: u32) {
        self.senders.lock().unwrap().remove(&(host.to_string(), port));
    }

    /// Exact address match first; servers do not always echo the requested
    /// bind address back, so fall back to any listener on the same port.
    fn route(&self, host: &str, port: u32) -> Option<mpsc::UnboundedSender<TransportStream>> {
        let senders = self.senders.lock().unwrap();
        if let Some(tx) = senders.get(&(host.to_string(), port)) {
            return Some(tx.clone());
        }
        senders
            .iter()
            .find(|((_, p), _)| *p == port)
            .map(|(_, tx)| tx.clone())
    }
}

/// russh client event handler
///
/// Host keys are accepted without verification; the server is chosen by the
/// user and key pinning is not part of this client.
struct ClientHandler {
    router: Arc<RemoteRouter>,
}

impl client::Handler for ClientHandler {
    type Error = BurrowError;

    fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> impl std::future::Future<Output = std::result::Result<bool, Self::Error>> + Send {
        async { Ok(true) }
    }

    fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> impl std::future::Future<Output = std::result::Result<(), Self::Error>> + Send {
        let router = Arc::clone(&self.router);
        let address = connected_address.to_string();
        let origin = format!("{}:{}", originator_address, originator_port);
        async move {
            match router.route(&address, connected_port) {
                Some(tx) => {
                    debug!(
                        bind = %format!("{}:{}", address, connected_port),
                        origin = %origin,
                        "inbound forwarded channel"
                    );
                    // A send error means the listener is already gone; the
                    // dropped stream closes the channel.
                    let _ = tx.send(TransportStream::new(channel.into_stream(), true));
                }
                None => {
                    warn!(
                        bind = %format!("{}:{}", address, connected_port),
                        "forwarded channel with no matching listener"
                    );
                    let _ = channel.close().await;
                }
            }
            Ok(())
        }
    }
}

/// SSH-backed transport
pub struct SshTransport {
    handle: Mutex<client::Handle<ClientHandler>>,
    router: Arc<RemoteRouter>,
}

impl SshTransport {
    /// Perform the SSH handshake and authentication over an established
    /// stream (direct TCP or a proxy tunnel)
    pub(crate) async fn handshake<S>(stream: S, credentials: &Credentials) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let config = Arc::new(client::Config {
            nodelay: true,
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        });

        let router = Arc::new(RemoteRouter::default());
        let handler = ClientHandler {
            router: Arc::clone(&router),
        };

        let mut handle = client::connect_stream(config, stream, handler)
            .await
            .map_err(|e| BurrowError::Connect(format!("SSH handshake failed: {}", e)))?;

        let result = match credentials {
            Credentials::Password { username, password } => {
                handle
                    .authenticate_password(username.clone(), password.clone())
                    .await
            }
            Credentials::Key { username, key } => {
                let hash = handle
                    .best_supported_rsa_hash()
                    .await
                    .unwrap_or(None)
                    .flatten();
                handle
                    .authenticate_publickey(
                        username.clone(),
                        PrivateKeyWithHashAlg::new(Arc::clone(key), hash),
                    )
                    .await
            }
        }
        .map_err(|e| BurrowError::Connect(format!("SSH authentication failed: {}", e)))?;

        match result {
            AuthResult::Success => Ok(SshTransport {
                handle: Mutex::new(handle),
                router,
            }),
            AuthResult::Failure { .. } => Err(BurrowError::Connect(
                "SSH authentication rejected by server".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open_channel(&self, target: &str) -> Result<TransportStream> {
        let (host, port) = split_host_port(target)?;
        let channel = self
            .handle
            .lock()
            .await
            .channel_open_direct_tcpip(host, port.into(), "127.0.0.1", 0)
            .await
            .map_err(|e| {
                BurrowError::Connect(format!("channel open to {} failed: {}", target, e))
            })?;
        Ok(TransportStream::new(channel.into_stream(), true))
    }

    async fn listen(&self, bind: &str) -> Result<TransportListener> {
        let (host, port) = split_host_port(bind)?;
        let assigned = self
            .handle
            .lock()
            .await
            .tcpip_forward(host.clone(), port.into())
            .await
            .map_err(|e| {
                BurrowError::Connect(format!("remote listen on {} failed: {}", bind, e))
            })?;
        let actual = if assigned != 0 { assigned } else { port.into() };

        let (tx, rx) = mpsc::unbounded_channel();
        self.router.register(&host, actual, tx);
        Ok(TransportListener::new(rx, host, actual as u16))
    }

    async fn unlisten(&self, host: &str, port: u16) -> Result<()> {
        self.router.deregister(host, port.into());
        self.handle
            .lock()
            .await
            .cancel_tcpip_forward(host.to_string(), port.into())
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let handle = self.handle.lock().await;
        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "")
            .await;
        Ok(())
    }
}
