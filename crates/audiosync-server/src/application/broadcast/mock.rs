//! Mock client channel for unit testing.
//!
//! Records every packet it is given and can be told to fail, without opening
//! a socket.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use async_trait::async_trait;
use bytes::Bytes;

use super::{ChannelError, ClientChannel};

/// A mock implementation of [`ClientChannel`].
pub struct MockChannel {
    received: Mutex<Vec<Bytes>>,
    fail_next: AtomicBool,
    fail_always: AtomicBool,
    cancelled: AtomicBool,
}

impl MockChannel {
    /// Creates a healthy channel.
    pub fn new() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
            fail_always: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Makes the next `send` fail with a broken-pipe error.
    pub fn fail_next_send(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent `send` fail.
    pub fn fail_all_sends(&self) {
        self.fail_always.store(true, Ordering::SeqCst);
    }

    /// Returns the packets delivered so far, in order.
    pub fn received(&self) -> Vec<Bytes> {
        self.received.lock().expect("lock poisoned").clone()
    }

    /// Returns `true` once [`ClientChannel::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientChannel for MockChannel {
    async fn send(&self, packet: Bytes) -> Result<(), ChannelError> {
        if self.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        if self.fail_next.swap(false, Ordering::SeqCst) || self.fail_always.load(Ordering::SeqCst) {
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock send failure",
            )));
        }
        self.received.lock().expect("lock poisoned").push(packet);
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
