//! SSH session lifecycle
//!
//! A [`Session`] owns credentials, the optional proxy configuration, the
//! authenticated transport once connected, and the registry of forwards
//! started against it. The lifecycle is Unconnected → Connected → Closed;
//! establishing again requires an explicit close first.

use crate::error::{BurrowError, Result};
use crate::forward::{self, ForwardInfo, ForwardMode, ForwardRegistry};
use crate::proxy::{self, ProxyConfig};
use crate::transport::{SshTransport, Transport};
use russh::keys::{self, PrivateKey};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::info;

/// Authentication material for the SSH handshake
pub enum Credentials {
    /// Username/password authentication
    Password {
        /// Login name
        username: String,
        /// Password
        password: String,
    },
    /// Public key authentication
    Key {
        /// Login name
        username: String,
        /// Decoded private key
        key: Arc<PrivateKey>,
    },
}

enum SessionState {
    Unconnected,
    Connected(Arc<SshTransport>),
    Closed,
}

/// An SSH client session with its forwarding registry
pub struct Session {
    host: String,
    credentials: Credentials,
    proxy: StdMutex<Option<ProxyConfig>>,
    state: Mutex<SessionState>,
    registry: ForwardRegistry,
}

impl Session {
    /// Create a session using username/password authentication
    pub fn with_password(host: &str, username: &str, password: &str) -> Self {
        Session::new(
            host,
            Credentials::Password {
                username: username.to_string(),
                password: password.to_string(),
            },
        )
    }

    /// Create a session using an OpenSSH or PEM encoded private key
    pub fn with_key(host: &str, username: &str, pem: &str) -> Result<Self> {
        let key = match PrivateKey::from_openssh(pem) {
            Ok(key) => key,
            Err(_) => keys::decode_secret_key(pem, None)
                .map_err(|e| BurrowError::config(format!("private key parse failed: {}", e)))?,
        };
        Ok(Session::new(
            host,
            Credentials::Key {
                username: username.to_string(),
                key: Arc::new(key),
            },
        ))
    }

    fn new(host: &str, credentials: Credentials) -> Self {
        Session {
            host: host.to_string(),
            credentials,
            proxy: StdMutex::new(None),
            state: Mutex::new(SessionState::Unconnected),
            registry: ForwardRegistry::new(),
        }
    }

    /// Host this session connects to
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Configure an upstream proxy for the next establish
    pub fn set_proxy(&self, url: &str) -> Result<()> {
        let config = ProxyConfig::parse(url)?;
        *self.proxy.lock().unwrap() = Some(config);
        Ok(())
    }

    /// Remove any configured proxy; the next establish dials directly
    pub fn clear_proxy(&self) {
        *self.proxy.lock().unwrap() = None;
    }

    /// Currently configured proxy, if any
    pub fn proxy(&self) -> Option<ProxyConfig> {
        self.proxy.lock().unwrap().clone()
    }

    /// Dial (directly or through the proxy) and run the SSH handshake
    ///
    /// Fails with a state error while connected; any dial or handshake
    /// failure leaves the session unconnected.
    pub async fn establish(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let SessionState::Connected(_) = *state {
            return Err(BurrowError::State("already connected".to_string()));
        }

        let proxy = self.proxy();
        info!("SSH connecting to {}", self.host);

        let stream = proxy::dial(proxy.as_ref(), &self.host).await?;
        let transport = SshTransport::handshake(stream, &self.credentials).await?;

        match &proxy {
            Some(proxy) => info!("SSH connected to {} via proxy {}", self.host, proxy),
            None => info!("SSH connected to {} (direct)", self.host),
        }

        *state = SessionState::Connected(Arc::new(transport));
        Ok(())
    }

    /// Stop all forwards and tear down the transport
    ///
    /// Safe to call repeatedly and on a session that never connected.
    pub async fn close(&self) -> Result<()> {
        let stopped = self.registry.stop_all().await;

        let mut state = self.state.lock().await;
        if let SessionState::Connected(transport) = &*state {
            let _ = transport.close().await;
            info!("SSH connection to {} closed", self.host);
        }
        *state = SessionState::Closed;
        stopped
    }

    async fn transport(&self) -> Result<Arc<dyn Transport>> {
        match &*self.state.lock().await {
            SessionState::Connected(transport) => {
                let transport: Arc<dyn Transport> = transport.clone();
                Ok(transport)
            }
            SessionState::Unconnected => {
                Err(BurrowError::State("session not connected".to_string()))
            }
            SessionState::Closed => Err(BurrowError::State("session closed".to_string())),
        }
    }

    /// Start a local forward: `bind` => `target` through the transport
    pub async fn start_local(&self, bind: &str, target: &str) -> Result<String> {
        let transport = self.transport().await?;
        let handle = forward::local::start(bind, target, transport).await?;
        let from = handle.bound_addr().to_string();
        Ok(self
            .registry
            .insert(ForwardMode::Local, from, target.to_string(), handle))
    }

    /// Start a remote forward: remote `bind` => local `target`
    pub async fn start_remote(&self, bind: &str, target: &str) -> Result<String> {
        let transport = self.transport().await?;
        let handle = forward::remote::start(bind, target, transport).await?;
        let from = handle.bound_addr().to_string();
        Ok(self
            .registry
            .insert(ForwardMode::Remote, from, target.to_string(), handle))
    }

    /// Start a dynamic SOCKS5 forward on `bind`
    pub async fn start_dynamic(&self, bind: &str) -> Result<String> {
        let transport = self.transport().await?;
        let handle = forward::dynamic::start(bind, transport).await?;
        let from = handle.bound_addr().to_string();
        Ok(self
            .registry
            .insert(ForwardMode::Dynamic, from, String::new(), handle))
    }

    /// Active forwards in start order
    pub fn list_forwards(&self) -> Vec<ForwardInfo> {
        self.registry.list()
    }

    /// Stop one forward by id
    pub async fn stop_forward(&self, id: &str) -> Result<()> {
        self.registry.stop(id).await
    }

    /// Stop every active forward
    pub async fn stop_all_forwards(&self) -> Result<()> {
        self.registry.stop_all().await
    }
}
