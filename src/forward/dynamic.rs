//! Dynamic SOCKS5 forwarding
//!
//! Listens locally and speaks the SOCKS5 server subset with each client to
//! learn its target, then opens a transport channel to that target and
//! relays.

use super::{ForwardHandle, ForwardTracker};
use crate::error::{BurrowError, Result};
use crate::forward::relay;
use crate::helper::SocketOpts;
use crate::socks::consts::{SOCKS5_REPLY_GENERAL_FAILURE, SOCKS5_REPLY_SUCCEEDED};
use crate::socks::server;
use crate::transport::{Transport, TransportStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Start a dynamic SOCKS5 forward on `bind`
pub async fn start(bind: &str, transport: Arc<dyn Transport>) -> Result<ForwardHandle> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| BurrowError::Connect(format!("failed to listen on {}: {}", bind, e)))?;
    let bound = listener.local_addr()?;

    let tracker = Arc::new(ForwardTracker::new());
    info!("Dynamic SOCKS5 {} started", bound);

    tracker.spawn(accept_loop(
        listener,
        Arc::clone(&tracker),
        Arc::clone(&transport),
    ));

    Ok(ForwardHandle::new(tracker, bound.to_string(), None))
}

async fn accept_loop(
    listener: TcpListener,
    tracker: Arc<ForwardTracker>,
    transport: Arc<dyn Transport>,
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
                    error!("Dynamic SOCKS accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        let _ = SocketOpts::default().apply(&conn);

        let Some(guard) = tracker.track() else {
            continue;
        };

        let conn_tracker = Arc::clone(&tracker);
        let transport = Arc::clone(&transport);
        tracker.spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = handle_socks(conn, &conn_tracker, transport) => {}
            }
        });
    }
}

/// Serve one SOCKS5 client: handshake, open the requested channel, relay
async fn handle_socks(
    mut conn: TcpStream,
    tracker: &Arc<ForwardTracker>,
    transport: Arc<dyn Transport>,
) {
    let target = match server::accept_connect(&mut conn).await {
        Ok(target) => target,
        Err(e) => {
            // The handshake already sent a reply where the protocol state
            // allowed one; just drop the connection.
            debug!("SOCKS5 handshake failed: {}", e);
            return;
        }
    };

    let channel = match transport.open_channel(&target).await {
        Ok(channel) => channel,
        Err(e) => {
            error!("SOCKS dial via tunnel to {} failed: {}", target, e);
            let _ = server::send_reply(&mut conn, SOCKS5_REPLY_GENERAL_FAILURE).await;
            return;
        }
    };

    let Some(_channel_guard) = tracker.track() else {
        return;
    };

    if server::send_reply(&mut conn, SOCKS5_REPLY_SUCCEEDED).await.is_err() {
        return;
    }

    debug!("SOCKS5 tunnel established to {}", target);
    let (up, down) = relay::pipe(TransportStream::new(conn, true), channel).await;
    debug!("SOCKS5 connection to {} finished ({} up / {} down bytes)", target, up, down);
}
