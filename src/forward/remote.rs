//! Remote port forwarding
//!
//! Asks the transport to listen on a remote address; every inbound channel
//! is relayed to a fixed local target, dialed directly.

use super::{ForwardHandle, ForwardTracker};
use crate::forward::relay;
use crate::error::Result;
use crate::helper::{join_host_port, SocketOpts};
use crate::transport::{Transport, TransportListener, TransportStream};
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, error, info};

/// Start a remote forward: remote `bind` => local `target`
pub async fn start(
    bind: &str,
    target: &str,
    transport: Arc<dyn Transport>,
) -> Result<ForwardHandle> {
    let listener = transport.listen(bind).await?;
    let bound_host = listener.bind_host().to_string();
    let bound_port = listener.bind_port();
    let bound = join_host_port(&bound_host, bound_port);

    let tracker = Arc::new(ForwardTracker::new());
    info!("Remote forward {} => {} started", bound, target);

    tracker.spawn(accept_loop(
        listener,
        Arc::clone(&tracker),
        target.to_string(),
    ));

    let unbind_transport = Arc::clone(&transport);
    let unbind = Box::pin(async move {
        unbind_transport.unlisten(&bound_host, bound_port).await
    });

    Ok(ForwardHandle::new(tracker, bound, Some(unbind)))
}

async fn accept_loop(mut listener: TransportListener, tracker: Arc<ForwardTracker>, target: String) {
    loop {
        let channel = tokio::select! {
            _ = tracker.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Some(channel) => channel,
                None => {
                    // The acceptor cannot tell an intentional cancel from a
                    // lost listener, so any exhaustion while we are not
                    // closing is terminal for this forward.
                    if !tracker.is_closed() {
                        error!("Remote forward accept stream ended");
                    }
                    return;
                }
            },
        };

        let Some(guard) = tracker.track() else {
            continue;
        };

        let conn_tracker = Arc::clone(&tracker);
        let target = target.clone();
        tracker.spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = relay_connection(channel, &conn_tracker, &target) => {}
            }
        });
    }
}

async fn relay_connection(
    channel: TransportStream,
    tracker: &Arc<ForwardTracker>,
    target: &str,
) {
    let conn = match TcpStream::connect(target).await {
        Ok(conn) => conn,
        Err(e) => {
            error!("Remote forward dial local failed: {}", e);
            return;
        }
    };
    let _ = SocketOpts::default().apply(&conn);

    let Some(_conn_guard) = tracker.track() else {
        return;
    };

    let (up, down) = relay::pipe(channel, TransportStream::new(conn, true)).await;
    debug!("Remote forward connection finished ({} up / {} down bytes)", up, down);
}
