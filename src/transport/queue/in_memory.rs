use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};

use super::{Envelope, Reply};

/// Errors from queue operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Every receiver is gone
    Closed,
    /// No listener is attached to the queue
    NoListener,
    /// The envelope was taken but never answered
    NoReply,
    /// No reply arrived within the request timeout
    TimedOut(Duration),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Closed => write!(f, "Queue closed"),
            QueueError::NoListener => write!(f, "No listener attached to queue"),
            QueueError::NoReply => write!(f, "Envelope dropped without a reply"),
            QueueError::TimedOut(timeout) => {
                write!(f, "No reply within {}ms", timeout.as_millis())
            }
        }
    }
}

impl Error for QueueError {}

type Pending = (Envelope, oneshot::Sender<Reply>);

/// Default time a request waits for its reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request/reply queue for tests and single-process deployments.
///
/// Cloning shares the same queue. Envelopes are delivered in FIFO order, each
/// to exactly one receiver (competing consumers). Requests fail immediately
/// while no listener is attached, and give up after the request timeout.
#[derive(Clone)]
pub struct InMemoryQueue {
    sender: mpsc::Sender<Pending>,
    receiver: Arc<Mutex<mpsc::Receiver<Pending>>>,
    listeners: Arc<AtomicUsize>,
    request_timeout: Duration,
}

/// Keeps a listener counted as attached until dropped.
pub(crate) struct ListenerGuard {
    listeners: Arc<AtomicUsize>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.listeners.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    /// Create a queue holding up to 1024 undelivered envelopes.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            listeners: Arc::new(AtomicUsize::new(0)),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Number of listeners currently attached.
    pub fn listener_count(&self) -> usize {
        self.listeners.load(Ordering::SeqCst)
    }

    pub(crate) fn attach_listener(&self) -> ListenerGuard {
        self.listeners.fetch_add(1, Ordering::SeqCst);
        ListenerGuard {
            listeners: self.listeners.clone(),
        }
    }

    /// Enqueue an envelope and wait for its reply.
    pub async fn request(&self, envelope: Envelope) -> Result<Reply, QueueError> {
        if self.listener_count() == 0 {
            return Err(QueueError::NoListener);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let exchange = async {
            self.sender
                .send((envelope, reply_tx))
                .await
                .map_err(|_| QueueError::Closed)?;
            reply_rx.await.map_err(|_| QueueError::NoReply)
        };

        tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| QueueError::TimedOut(self.request_timeout))?
    }

    /// Take the next envelope along with the channel for its reply.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn receive(&self) -> Option<(Envelope, oneshot::Sender<Reply>)> {
        self.receiver.lock().await.recv().await
    }
}
