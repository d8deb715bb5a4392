//! Fan-out of change records to live subscribers.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::filter::IgnoreFilter;
use crate::queue::PendingQueue;
use crate::record::ChangeRecord;
use crate::scanner::initial_snapshot;

/// Identifier of a subscriber connection.
pub type SubscriberId = u64;

/// Serialized message delivered to a subscriber.
pub type Message = Arc<str>;

/// Sending half of a subscriber connection. Sending fails once the
/// transport has closed the receiving half or stopped keeping up.
pub type MessageSender = mpsc::Sender<Message>;

/// Records a subscriber may fall behind by, on top of its initial snapshot,
/// before it is dropped.
pub const SUBSCRIBER_BACKLOG: usize = 64;

/// Mailbox size for a subscriber whose initial snapshot holds up to
/// `snapshot_limit` records.
pub fn mailbox_capacity(snapshot_limit: usize) -> usize {
    snapshot_limit.max(1) + SUBSCRIBER_BACKLOG
}

/// Queue `message` without waiting. A full mailbox counts as a failed send.
fn deliver(id: SubscriberId, sender: &MessageSender, message: Message) -> bool {
    match sender.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(subscriber = id, "Subscriber is not keeping up, dropping it");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(subscriber = id, "Subscriber connection closed");
            false
        }
    }
}

/// Result of subscribing a connection.
#[derive(Debug, Default)]
pub struct Subscription {
    /// Whether the connection joined the live set.
    pub live: bool,

    /// Number of initial records delivered.
    pub sent: usize,

    /// Every tracked path found while building the snapshot.
    pub tracked: HashSet<PathBuf>,
}

/// Tracks live subscribers and delivers records to them.
pub struct Broadcaster {
    root: PathBuf,
    snapshot_limit: usize,
    subscribers: BTreeMap<SubscriberId, MessageSender>,
}

impl Broadcaster {
    /// Create a broadcaster sending at most `snapshot_limit` initial records.
    pub fn new(root: impl Into<PathBuf>, snapshot_limit: usize) -> Self {
        Self {
            root: root.into(),
            snapshot_limit,
            subscribers: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Send the initial snapshot to a new connection, then add it to the live
    /// set. The snapshot goes to this connection only.
    pub fn subscribe(
        &mut self,
        id: SubscriberId,
        sender: MessageSender,
        filter: &IgnoreFilter,
    ) -> Subscription {
        let snapshot = initial_snapshot(&self.root, filter, self.snapshot_limit);
        let mut subscription = Subscription {
            live: false,
            sent: 0,
            tracked: snapshot.tracked,
        };

        for record in &snapshot.records {
            let Some(message) = encode(record) else {
                continue;
            };
            if !deliver(id, &sender, message) {
                return subscription;
            }
            subscription.sent += 1;
        }

        self.subscribers.insert(id, sender);
        subscription.live = true;
        info!(
            subscriber = id,
            sent = subscription.sent,
            live = self.subscribers.len(),
            "Subscriber connected"
        );
        subscription
    }

    /// Remove a subscriber from the live set.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            info!(
                subscriber = id,
                live = self.subscribers.len(),
                "Subscriber disconnected"
            );
        }
        removed
    }

    /// Send `record` to every live subscriber, dropping those whose
    /// connection has closed or whose mailbox is full. Returns how many
    /// received it.
    pub fn broadcast(&mut self, record: &ChangeRecord) -> usize {
        let Some(message) = encode(record) else {
            return 0;
        };

        let before = self.subscribers.len();
        self.subscribers
            .retain(|id, sender| deliver(*id, sender, Arc::clone(&message)));

        let delivered = self.subscribers.len();
        if delivered < before {
            info!(
                dropped = before - delivered,
                live = delivered,
                "Removed failed subscribers"
            );
        }
        debug!(filename = %record.filename, delivered, "Broadcast record");
        delivered
    }

    /// Pop one record from `queue` and broadcast it. Returns `None` when the
    /// queue was empty.
    pub fn drain_one(&mut self, queue: &mut PendingQueue) -> Option<usize> {
        let record = queue.pop()?;
        Some(self.broadcast(&record))
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

fn encode(record: &ChangeRecord) -> Option<Message> {
    match record.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!(filename = %record.filename, "Failed to encode record: {e}");
            None
        }
    }
}
