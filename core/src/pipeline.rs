//! The cooperative task that owns detection, queueing and delivery.
//!
//! Everything downstream of the notification channel runs on this one task:
//! the detector, the pending queue and the broadcaster are plain fields
//! mutated without locks. Transport code reaches the task only through a
//! [`PipelineHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broadcaster::{Broadcaster, Message, MessageSender, SubscriberId, mailbox_capacity};
use crate::config::StreamConfig;
use crate::detector::{ChangeDetector, Detection};
use crate::error::{Result, StreamError};
use crate::event::RawEvent;
use crate::queue::{PendingQueue, PushOutcome};

/// Requests from the transport layer.
#[derive(Debug)]
pub enum Control {
    /// A connection opened.
    Subscribe {
        id: SubscriberId,
        sender: MessageSender,
    },
    /// A connection closed.
    Unsubscribe(SubscriberId),
}

/// Cloneable, thread-safe front of a running pipeline.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    control_tx: mpsc::UnboundedSender<Control>,
    next_id: Arc<AtomicU64>,
    mailbox_capacity: usize,
}

impl PipelineHandle {
    /// Register a connection. Its mailbox first receives the initial
    /// snapshot, then every record drained after it joined. The mailbox
    /// closes when the pipeline drops the subscriber.
    pub fn subscribe(&self) -> Result<(SubscriberId, mpsc::Receiver<Message>)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, mailbox) = mpsc::channel(self.mailbox_capacity);
        self.control_tx
            .send(Control::Subscribe { id, sender })
            .map_err(|_| StreamError::ChannelClosed)?;
        Ok((id, mailbox))
    }

    /// Tell the pipeline a connection closed.
    pub fn unsubscribe(&self, id: SubscriberId) -> Result<()> {
        self.control_tx
            .send(Control::Unsubscribe(id))
            .map_err(|_| StreamError::ChannelClosed)
    }
}

/// Detector, queue and broadcaster driven by one task.
pub struct Pipeline {
    detector: ChangeDetector,
    queue: PendingQueue,
    broadcaster: Broadcaster,
    drain_interval: Duration,
    events: mpsc::Receiver<RawEvent>,
    control_rx: mpsc::UnboundedReceiver<Control>,
}

impl Pipeline {
    /// Build a pipeline reading notifications from `events`.
    pub fn new(config: &StreamConfig, events: mpsc::Receiver<RawEvent>) -> (Self, PipelineHandle) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let pipeline = Self {
            detector: ChangeDetector::new(config),
            queue: PendingQueue::new(config.capacity),
            broadcaster: Broadcaster::new(config.root.clone(), config.capacity),
            drain_interval: config.drain_interval(),
            events,
            control_rx,
        };
        let handle = PipelineHandle {
            control_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            mailbox_capacity: mailbox_capacity(config.capacity),
        };

        (pipeline, handle)
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Run the pipeline on its own task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Process notifications, subscriber requests and drain ticks until
    /// `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut drain = tokio::time::interval(self.drain_interval);
        drain.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        info!(root = %self.detector.root().display(), "Pipeline started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(&event),
                    None => {
                        info!("Notification source closed");
                        events_open = false;
                    }
                },

                Some(control) = self.control_rx.recv() => self.handle_control(control),

                _ = drain.tick() => {
                    self.drain_once();
                }
            }
        }

        info!(
            pending = self.queue.len(),
            subscribers = self.broadcaster.len(),
            "Pipeline stopped"
        );
    }

    /// Run one notification through the detector and queue any record.
    pub fn handle_event(&mut self, event: &RawEvent) {
        match self.detector.handle(event) {
            Detection::Record(record) => {
                let path = record.path.clone();
                match self.queue.push(*record) {
                    PushOutcome::Appended => {
                        debug!(path = %path.display(), pending = self.queue.len(), "Queued change");
                    }
                    PushOutcome::Replaced => {
                        debug!(path = %path.display(), "Replaced pending change");
                    }
                    PushOutcome::Evicted(old) => {
                        debug!(
                            path = %path.display(),
                            evicted = %old.path.display(),
                            "Queue full, dropped oldest change"
                        );
                    }
                }
            }
            other => {
                debug!(path = %event.path.display(), outcome = ?other, "No record");
            }
        }
    }

    /// Apply a subscriber request.
    pub fn handle_control(&mut self, control: Control) {
        match control {
            Control::Subscribe { id, sender } => {
                let subscription =
                    self.broadcaster
                        .subscribe(id, sender, self.detector.filter());
                self.detector.prune(&subscription.tracked);
            }
            Control::Unsubscribe(id) => {
                self.broadcaster.unsubscribe(id);
            }
        }
    }

    /// Deliver at most one pending record. Returns whether one was sent.
    pub fn drain_once(&mut self) -> bool {
        self.broadcaster.drain_one(&mut self.queue).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    fn pipeline(
        root: &Path,
        capacity: usize,
    ) -> (Pipeline, PipelineHandle, mpsc::Sender<RawEvent>) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let config = StreamConfig::new(root)
            .with_capacity(capacity)
            .with_drain_interval_ms(10);
        let (pipeline, handle) = Pipeline::new(&config, event_rx);
        (pipeline, handle, event_tx)
    }

    fn drain_messages(rx: &mut mpsc::Receiver<Message>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(serde_json::from_str(&message).unwrap());
        }
        out
    }

    #[test]
    fn test_two_files_with_capacity_one() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("a.py"), "a").unwrap();
        std::fs::write(root.join("b.py"), "b").unwrap();

        let (mut pipeline, _handle, _tx) = pipeline(root, 1);
        pipeline.handle_event(&RawEvent::modified(root.join("a.py")));
        pipeline.handle_event(&RawEvent::modified(root.join("b.py")));

        let queued: Vec<&str> = pipeline.queue().iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(queued, vec!["b.py"]);
    }

    #[test]
    fn test_subscribe_prunes_vanished_snapshots() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let path = root.join("a.py");
        std::fs::write(&path, "a").unwrap();

        let (mut pipeline, _handle, _tx) = pipeline(root, 5);
        pipeline.handle_event(&RawEvent::modified(&path));
        assert_eq!(pipeline.detector().snapshots().len(), 1);

        // Removed without a delete notification reaching us.
        std::fs::remove_file(&path).unwrap();
        let (tx, _rx) = mpsc::channel(16);
        pipeline.handle_control(Control::Subscribe { id: 1, sender: tx });

        assert!(pipeline.detector().snapshots().is_empty());
    }

    #[test]
    fn test_records_drained_before_subscribe_are_not_replayed() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("a.py"), "a").unwrap();

        let (mut pipeline, _handle, _tx) = pipeline(root, 5);
        pipeline.handle_event(&RawEvent::modified(root.join("a.py")));
        assert!(pipeline.drain_once());

        let (tx, mut rx) = mpsc::channel(16);
        pipeline.handle_control(Control::Subscribe { id: 1, sender: tx });
        let messages = drain_messages(&mut rx);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["action"], "initial");
        assert!(!pipeline.drain_once());
    }

    #[tokio::test]
    async fn test_run_delivers_updates_to_subscribers() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("a.py"), "x=1").unwrap();

        let (pipeline, handle, event_tx) = pipeline(root, 5);
        let cancel = CancellationToken::new();
        let task = pipeline.spawn(cancel.clone());

        let (_id, mut rx) = handle.subscribe().unwrap();

        let initial = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let initial: serde_json::Value = serde_json::from_str(&initial).unwrap();
        assert_eq!(initial["action"], "initial");
        assert_eq!(initial["content"], "x=1");

        std::fs::write(root.join("a.py"), "x=2").unwrap();
        event_tx
            .send(RawEvent::modified(root.join("a.py")))
            .await
            .unwrap();

        let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let update: serde_json::Value = serde_json::from_str(&update).unwrap();
        assert_eq!(update["action"], "update");
        assert_eq!(update["content"], "x=2");
        assert_eq!(update["filename"], "a.py");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_fails_after_pipeline_stops() {
        let temp_dir = TempDir::new().unwrap();
        let (pipeline, handle, _tx) = pipeline(temp_dir.path(), 5);
        let cancel = CancellationToken::new();
        let task = pipeline.spawn(cancel.clone());
        cancel.cancel();
        task.await.unwrap();

        assert!(matches!(handle.subscribe(), Err(StreamError::ChannelClosed)));
    }
}
