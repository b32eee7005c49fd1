//! TCP forwarding over an established transport
//!
//! Three forward modes share one shape: a listener (local socket or remote
//! acceptor), a [`ForwardTracker`] that owns every live connection, and one
//! relay task per accepted connection.

pub mod dynamic;
pub mod local;
pub mod registry;
pub mod relay;
pub mod remote;
pub mod tracker;

pub use registry::{ForwardInfo, ForwardRegistry};
pub use tracker::{ConnGuard, ForwardTracker};

use crate::error::Result;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::sync::{Arc, Mutex};

/// The three forwarding modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    /// Listen locally, connect through the transport to a fixed target
    Local,
    /// Listen on the remote side, connect to a fixed local target
    Remote,
    /// Listen locally, SOCKS5-negotiate the target per connection
    Dynamic,
}

impl ForwardMode {
    /// Short id prefix for forwards of this mode
    pub(crate) fn id_prefix(&self) -> &'static str {
        match self {
            ForwardMode::Local => "lf",
            ForwardMode::Remote => "rf",
            ForwardMode::Dynamic => "df",
        }
    }

    /// Mode name as shown in listings
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardMode::Local => "local",
            ForwardMode::Remote => "remote",
            ForwardMode::Dynamic => "dynamic",
        }
    }
}

impl std::fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type UnbindFuture = BoxFuture<'static, Result<()>>;

/// Running forward returned by the start functions
///
/// Stopping is idempotent: the first call runs the optional transport-side
/// unbind and drains the tracker, later calls only wait for that drain.
pub struct ForwardHandle {
    tracker: Arc<ForwardTracker>,
    bound_addr: String,
    unbind: Mutex<Option<UnbindFuture>>,
}

impl ForwardHandle {
    pub(crate) fn new(
        tracker: Arc<ForwardTracker>,
        bound_addr: String,
        unbind: Option<UnbindFuture>,
    ) -> Self {
        ForwardHandle {
            tracker,
            bound_addr,
            unbind: Mutex::new(unbind),
        }
    }

    /// The address the forward actually listens on (resolves `:0` binds)
    pub fn bound_addr(&self) -> &str {
        &self.bound_addr
    }

    /// The tracker owning this forward's connections
    pub fn tracker(&self) -> &Arc<ForwardTracker> {
        &self.tracker
    }

    /// Stop the forward: unbind the listener, close every connection and
    /// wait until all relay tasks have exited
    pub async fn stop(&self) -> Result<()> {
        let unbind = self.unbind.lock().unwrap().take();
        let mut result = Ok(());
        if let Some(unbind) = unbind {
            result = unbind.await;
        }
        self.tracker.close().await;
        result
    }
}
