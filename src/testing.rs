//! In-memory stand-ins for the external services.
//!
//! The fakes record every call into a shared [`Journal`] so tests can check
//! both what each collaborator was asked to do and the order across them.
//! Queue depths are served from per-queue scripts: each `get_queue` pops the
//! next scripted value, and the last value keeps being returned once the
//! script runs out.

use crate::clients::{
    BodyEncoding, ComputeControl, MessageBatch, MessageSender, Messaging, QueueAdmin,
    QueueProperties, ServiceClients,
};
use crate::error::ServiceError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn injected(what: &str) -> ServiceError {
    ServiceError::Status {
        status: 500,
        body: format!("injected failure: {}", what),
    }
}

/// Ordered log of calls made against the fakes
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Index of the first entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }
}

#[derive(Default)]
pub struct FakeQueueAdmin {
    journal: Journal,
    depths: Mutex<HashMap<String, VecDeque<u64>>>,
    failing: Mutex<Vec<String>>,
}

impl FakeQueueAdmin {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    /// Queue up depths returned by successive `get_queue` calls
    pub fn script_depths(&self, queue: &str, depths: impl IntoIterator<Item = u64>) {
        self.depths
            .lock()
            .entry(queue.to_string())
            .or_default()
            .extend(depths);
    }

    /// Script paired (input, output) observations
    pub fn script_snapshots(&self, in_queue: &str, out_queue: &str, snapshots: &[(u64, u64)]) {
        self.script_depths(in_queue, snapshots.iter().map(|(i, _)| *i));
        self.script_depths(out_queue, snapshots.iter().map(|(_, o)| *o));
    }

    /// Make calls matching a journal entry such as `"create out"` fail
    pub fn fail_on(&self, entry: &str) {
        self.failing.lock().push(entry.to_string());
    }

    fn call(&self, entry: String) -> Result<(), ServiceError> {
        self.journal.record(entry.clone());
        if self.failing.lock().contains(&entry) {
            return Err(injected(&entry));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueAdmin for FakeQueueAdmin {
    async fn get_queue(&self, queue: &str) -> Result<QueueProperties, ServiceError> {
        self.call(format!("get {}", queue))?;
        let mut depths = self.depths.lock();
        let script = depths.entry(queue.to_string()).or_default();
        let message_count = if script.len() > 1 {
            script.pop_front().unwrap_or_default()
        } else {
            script.front().copied().unwrap_or_default()
        };
        Ok(QueueProperties { message_count })
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), ServiceError> {
        self.call(format!("delete {}", queue))
    }

    async fn create_queue(&self, queue: &str) -> Result<(), ServiceError> {
        self.call(format!("create {}", queue))
    }
}

#[derive(Default)]
pub struct FakeComputeControl {
    journal: Journal,
    failing: Mutex<Vec<String>>,
}

impl FakeComputeControl {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn fail_on(&self, entry: &str) {
        self.failing.lock().push(entry.to_string());
    }

    fn call(&self, entry: String) -> Result<(), ServiceError> {
        self.journal.record(entry.clone());
        if self.failing.lock().contains(&entry) {
            return Err(injected(&entry));
        }
        Ok(())
    }
}

#[async_trait]
impl ComputeControl for FakeComputeControl {
    async fn stop(&self, app: &str) -> Result<(), ServiceError> {
        self.call(format!("stop {}", app))
    }

    async fn start(&self, app: &str) -> Result<(), ServiceError> {
        self.call(format!("start {}", app))
    }
}

/// Messaging fake whose senders all publish into one shared record
pub struct FakeMessaging {
    sender: Arc<FakeSender>,
}

pub struct FakeSender {
    journal: Journal,
    capacity: usize,
    encoding: Mutex<BodyEncoding>,
    published: Mutex<Vec<Vec<Bytes>>>,
    attempts: AtomicUsize,
    fail_first: AtomicUsize,
}

impl FakeMessaging {
    pub fn new(journal: Journal, capacity: usize) -> Self {
        Self {
            sender: Arc::new(FakeSender {
                journal,
                capacity,
                encoding: Mutex::new(BodyEncoding::Raw),
                published: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(0),
            }),
        }
    }

    /// Open batches that only accept UTF-8 bodies, like the REST sender
    pub fn require_text_bodies(&self) {
        *self.sender.encoding.lock() = BodyEncoding::JsonText;
    }

    /// The first `n` publish calls fail
    pub fn fail_first_sends(&self, n: usize) {
        self.sender.fail_first.store(n, Ordering::SeqCst);
    }

    /// Message bodies of every successful publish, one entry per batch
    pub fn published(&self) -> Vec<Vec<Bytes>> {
        self.sender.published.lock().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.sender.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Messaging for FakeMessaging {
    async fn sender(&self, queue: &str) -> Result<Arc<dyn MessageSender>, ServiceError> {
        self.sender.journal.record(format!("sender {}", queue));
        Ok(self.sender.clone())
    }
}

#[async_trait]
impl MessageSender for FakeSender {
    async fn new_batch(&self) -> Result<MessageBatch, ServiceError> {
        Ok(MessageBatch::with_encoding(
            self.capacity,
            *self.encoding.lock(),
        ))
    }

    async fn send_batch(&self, batch: MessageBatch) -> Result<(), ServiceError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.journal.record(format!("send {}", batch.len()));
        if attempt < self.fail_first.load(Ordering::SeqCst) {
            return Err(injected("send batch"));
        }
        self.published.lock().push(batch.into_messages());
        Ok(())
    }
}

/// All three fakes sharing one journal
pub struct FakeServices {
    pub journal: Journal,
    pub queues: Arc<FakeQueueAdmin>,
    pub messaging: Arc<FakeMessaging>,
    pub compute: Arc<FakeComputeControl>,
}

impl FakeServices {
    pub fn new(batch_capacity: usize) -> Self {
        let journal = Journal::default();
        Self {
            queues: Arc::new(FakeQueueAdmin::new(journal.clone())),
            messaging: Arc::new(FakeMessaging::new(journal.clone(), batch_capacity)),
            compute: Arc::new(FakeComputeControl::new(journal.clone())),
            journal,
        }
    }

    pub fn clients(&self) -> ServiceClients {
        ServiceClients {
            queues: self.queues.clone(),
            messaging: self.messaging.clone(),
            compute: self.compute.clone(),
        }
    }
}

impl Default for FakeServices {
    fn default() -> Self {
        Self::new(crate::defaults::MAX_BATCH_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_depth_script_sticks_on_last_value() {
        let admin = FakeQueueAdmin::default();
        admin.script_depths("in", [3, 2]);
        assert_eq!(admin.get_queue("in").await.unwrap().message_count, 3);
        assert_eq!(admin.get_queue("in").await.unwrap().message_count, 2);
        assert_eq!(admin.get_queue("in").await.unwrap().message_count, 2);
        assert_eq!(admin.get_queue("other").await.unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn test_fail_on_is_recorded_and_fails() {
        let journal = Journal::default();
        let admin = FakeQueueAdmin::new(journal.clone());
        admin.fail_on("create out");
        assert!(admin.create_queue("in").await.is_ok());
        assert!(admin.create_queue("out").await.is_err());
        assert_eq!(journal.entries(), vec!["create in", "create out"]);
    }

    #[tokio::test]
    async fn test_messaging_failures_are_counted() {
        let services = FakeServices::new(1024);
        services.messaging.fail_first_sends(1);
        let sender = services.messaging.sender("in").await.unwrap();

        let mut batch = sender.new_batch().await.unwrap();
        batch.try_add(Bytes::from_static(b"x")).unwrap();
        assert!(sender.send_batch(batch.clone()).await.is_err());
        assert!(sender.send_batch(batch).await.is_ok());

        assert_eq!(services.messaging.send_attempts(), 2);
        assert_eq!(services.messaging.published().len(), 1);
        assert_eq!(services.journal.count("send 1"), 2);
    }
}
