//! Local port forwarding
//!
//! Listens on a local address; every accepted connection is relayed through
//! a transport channel to a fixed remote target.

use super::{ForwardHandle, ForwardTracker};
use crate::error::{BurrowError, Result};
use crate::forward::relay;
use crate::helper::SocketOpts;
use crate::transport::{Transport, TransportStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Start a local forward: `bind` => `target` through the transport
pub async fn start(
    bind: &str,
    target: &str,
    transport: Arc<dyn Transport>,
) -> Result<ForwardHandle> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| BurrowError::Connect(format!("failed to listen on {}: {}", bind, e)))?;
    let bound = listener.local_addr()?;

    let tracker = Arc::new(ForwardTracker::new());
    info!("Local forward {} => {} started", bound, target);

    tracker.spawn(accept_loop(
        listener,
        Arc::clone(&tracker),
        Arc::clone(&transport),
        target.to_string(),
    ));

    Ok(ForwardHandle::new(tracker, bound.to_string(), None))
}

async fn accept_loop(
    listener: TcpListener,
    tracker: Arc<ForwardTracker>,
    transport: Arc<dyn Transport>,
    target: String,
) {
    loop {
        let conn = tokio::select! {
            _ = tracker.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((conn, _peer)) => conn,
                Err(e) => {
                    if tracker.is_closed() {
                        return;
                    }
                    // Transient accept errors (fd exhaustion and friends)
                    // must not kill the forward; back off briefly instead.
                    error!("Local forward accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        let _ = SocketOpts::default().apply(&conn);

        let Some(guard) = tracker.track() else {
            // Tracker closed while accepting; dropping the socket closes it
            continue;
        };

        let conn_tracker = Arc::clone(&tracker);
        let transport = Arc::clone(&transport);
        let target = target.clone();
        tracker.spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = relay_connection(conn, &conn_tracker, transport, &target) => {}
            }
        });
    }
}

async fn relay_connection(
    conn: TcpStream,
    tracker: &Arc<ForwardTracker>,
    transport: Arc<dyn Transport>,
    target: &str,
) {
    let channel = match transport.open_channel(target).await {
        Ok(channel) => channel,
        Err(e) => {
            error!("Local forward dial remote failed: {}", e);
            return;
        }
    };

    let Some(_channel_guard) = tracker.track() else {
        return;
    };

    let (up, down) = relay::pipe(TransportStream::new(conn, true), channel).await;
    debug!("Local forward connection finished ({} up / {} down bytes)", up, down);
}
