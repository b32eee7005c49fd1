//! Per-forward connection and task tracking
//!
//! One tracker exists per active forward. It owns the set of live
//! connections, the closed flag, and the relay tasks spawned for the
//! forward, giving `close()` a synchronous "fully stopped" guarantee:
//! it cancels the accept loop and every tracked connection, then waits
//! until all spawned tasks have exited.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;

/// Live-connection set and task lifetime for one forward
pub struct ForwardTracker {
    state: Arc<Mutex<TrackerState>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

struct TrackerState {
    closed: bool,
    next_id: u64,
    conns: HashMap<u64, CancellationToken>,
}

/// Registration of one live connection
///
/// Dropping the guard unregisters the connection; cancellation of its token
/// tells the owning task to tear the connection down. Guards are handed out
/// only while the tracker is open.
pub struct ConnGuard {
    id: u64,
    token: CancellationToken,
    state: Arc<Mutex<TrackerState>>,
}

impl ConnGuard {
    /// Resolves once the tracker is closing this connection
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.state.lock().unwrap().conns.remove(&self.id);
    }
}

impl Default for ForwardTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwardTracker {
    /// Create an open tracker with no connections
    pub fn new() -> Self {
        ForwardTracker {
            state: Arc::new(Mutex::new(TrackerState {
                closed: false,
                next_id: 0,
                conns: HashMap::new(),
            })),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a connection, unless the tracker is already closed
    ///
    /// On `None` the caller must drop the connection itself and treat it as
    /// rejected.
    pub fn track(&self) -> Option<ConnGuard> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return None;
        }
        let id = state.next_id;
        state.next_id += 1;
        let token = CancellationToken::new();
        state.conns.insert(id, token.clone());
        Some(ConnGuard {
            id,
            token,
            state: Arc::clone(&self.state),
        })
    }

    /// Whether `close()` has started
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Number of currently registered connections
    pub fn live_connections(&self) -> usize {
        self.state.lock().unwrap().conns.len()
    }

    /// Resolves once the tracker is closing; accept loops select on this
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    /// Spawn a task whose lifetime is tied to this forward
    pub fn spawn<F>(&self, task: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tasks.spawn(task)
    }

    /// Close the forward and wait for every spawned task to exit
    ///
    /// The closed flag flips exactly once. The first call cancels the accept
    /// loop and all tracked connections under a single snapshot; later calls
    /// only wait for that drain to complete.
    pub async fn close(&self) {
        let conns = {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                Vec::new()
            } else {
                state.closed = true;
                state.conns.values().cloned().collect()
            }
        };

        self.shutdown.cancel();
        for token in conns {
            token.cancel();
        }

        self.tasks.close();
        self.tasks.wait().await;
    }
}
