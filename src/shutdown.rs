use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A one-way cancellation flag shared by the server and all of its acceptor threads.
///
/// The server starts out running; once [`cancel`] is called the token stays cancelled for good.
/// Processor threads do not look at the token: they stop when the queue reports end-of-stream.
///
/// [`cancel`]: ShutdownToken::cancel
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    /// creates a token in the running state
    pub fn new() -> Self {
        ShutdownToken::default()
    }

    /// moves the token into the stopped state. Returns `true` if this call did the transition,
    /// `false` if the token was already cancelled
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    /// returns `true` once [`cancel`](ShutdownToken::cancel) has been called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
