//! Bidirectional relay between two duplex streams
//!
//! Two copy directions run concurrently; each one propagates end-of-stream
//! by half-closing its destination, so the opposite direction can keep
//! draining. The relay only returns once both directions have finished.

use crate::transport::TransportStream;
use tokio::io::{self, AsyncWriteExt};

/// Copy bytes between `a` and `b` until both directions have completed
///
/// A read or write error in one direction is treated as that direction's
/// completion signal, not surfaced. When either stream does not support
/// half-close, the first completed direction tears the whole pair down
/// instead (a full close is the only option there).
///
/// Returns the byte counts copied a→b and b→a.
pub async fn pipe(a: TransportStream, b: TransportStream) -> (u64, u64) {
    let both_half_close = a.supports_half_close() && b.supports_half_close();

    let (mut a_read, mut a_write) = io::split(a);
    let (mut b_read, mut b_write) = io::split(b);

    let a_to_b = async {
        let copied = io::copy(&mut a_read, &mut b_write).await.unwrap_or(0);
        let _ = b_write.shutdown().await;
        copied
    };
    let b_to_a = async {
        let copied = io::copy(&mut b_read, &mut a_write).await.unwrap_or(0);
        let _ = a_write.shutdown().await;
        copied
    };

    if both_half_close {
        tokio::join!(a_to_b, b_to_a)
    } else {
        tokio::select! {
            copied = a_to_b => (copied, 0),
            copied = b_to_a => (0, copied),
        }
    }
}
