use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::proto::Envelope;

/// The flow's outbound message queue.
///
/// The uploader does not own transmission; it enqueues framed packets here
/// and moves on. Implementations accept packets concurrently from multiple
/// uploads.
pub trait Responder: Send + Sync {
    /// Allocate the sequence number for a new upload within the flow.
    fn next_upload_id(&self) -> i64;

    /// Enqueue a message for transmission.
    fn add_response(&self, message: Envelope);
}

impl<T: Responder + ?Sized> Responder for Arc<T> {
    fn next_upload_id(&self) -> i64 {
        (**self).next_upload_id()
    }

    fn add_response(&self, message: Envelope) {
        (**self).add_response(message)
    }
}

/// Responder collecting messages in memory.
#[derive(Default)]
pub struct QueueResponder {
    next_id: AtomicI64,
    queue: Mutex<Vec<Envelope>>,
}

impl QueueResponder {
    /// All messages enqueued so far, in order.
    pub fn messages(&self) -> Vec<Envelope> {
        self.queue.lock().unwrap().clone()
    }

    /// Take everything enqueued so far, leaving the queue empty.
    pub fn drain(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.queue.lock().unwrap())
    }
}

impl Responder for QueueResponder {
    fn next_upload_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn add_response(&self, message: Envelope) {
        self.queue.lock().unwrap().push(message);
    }
}
