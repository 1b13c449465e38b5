//! Provider stream cancellation
//!
//! A wrapped stream races every upstream poll against the cancel signal, so
//! cancelling ends it even while it is waiting on a slow provider.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;

use crate::types::ChatStream;

/// Cloneable trigger that ends the stream it was created with.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request cancellation. Dropping the ended stream closes the underlying
    /// HTTP connection, so the provider stops generating tokens.
    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }
}

/// Wrap `stream` so that it ends as soon as the returned handle is cancelled.
pub fn make_cancellable_stream(stream: ChatStream) -> (ChatStream, CancelHandle) {
    let (tx, mut rx) = watch::channel(false);
    let handle = CancelHandle {
        signal: Arc::new(tx),
    };
    let mut inner = stream;
    let wrapped = async_stream::stream! {
        loop {
            if *rx.borrow_and_update() {
                tracing::debug!("provider stream cancelled");
                break;
            }
            let item = tokio::select! {
                biased;
                changed = rx.changed() => match changed {
                    Ok(()) => continue,
                    // Every handle is gone; nothing can cancel any more
                    Err(_) => inner.next().await,
                },
                item = inner.next() => item,
            };
            match item {
                Some(item) => yield item,
                None => break,
            }
        }
    };
    (Box::pin(wrapped), handle)
}
