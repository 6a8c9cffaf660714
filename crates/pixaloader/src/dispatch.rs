//! Result delivery to the application thread

use std::sync::mpsc;

use parking_lot::Mutex;

/// A boxed display/listener callback
pub type Callback = Box<dyn FnOnce() + Send>;

/// Posts load results to the thread that owns the UI.
///
/// On platforms with a main-thread event loop this is a thin wrapper around
/// "post to main thread"; headless hosts and tests can run callbacks inline
/// or drain a queue.
pub trait ResultDispatcher: Send + Sync {
    /// Schedule the callback
    fn post(&self, callback: Callback);
}

/// Runs callbacks immediately on whichever thread posts them
pub struct InlineDispatcher;

impl ResultDispatcher for InlineDispatcher {
    fn post(&self, callback: Callback) {
        callback();
    }
}

/// Queues callbacks for the application to drain from its own loop
pub struct QueueDispatcher {
    sender: mpsc::Sender<Callback>,
}

/// Receiving side of a [`QueueDispatcher`]
pub struct DispatchQueue {
    receiver: Mutex<mpsc::Receiver<Callback>>,
}

impl QueueDispatcher {
    /// Create the dispatcher and the queue the application drains
    pub fn new() -> (Self, DispatchQueue) {
        let (sender, receiver) = mpsc::channel();
        (
            Self { sender },
            DispatchQueue {
                receiver: Mutex::new(receiver),
            },
        )
    }
}

impl ResultDispatcher for QueueDispatcher {
    fn post(&self, callback: Callback) {
        let _ = self.sender.send(callback);
    }
}

impl DispatchQueue {
    /// Run every callback queued so far; returns how many ran
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let callback = self.receiver.lock().try_recv();
            match callback {
                Ok(callback) => {
                    callback();
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }

    /// Block up to `timeout` for one callback and run it
    pub fn run_next(&self, timeout: std::time::Duration) -> bool {
        let callback = self.receiver.lock().recv_timeout(timeout);
        match callback {
            Ok(callback) => {
                callback();
                true
            }
            Err(_) => false,
        }
    }
}
