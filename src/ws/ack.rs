/// Acknowledgment tracking
///
/// An `AckEntry` is a payload sent with `Client::send_with_ack`, waiting for
/// the peer to acknowledge its id. Entries live in the client's send window
/// until acknowledged, until their deadline passes, or until the waiter drops
/// its receiver.
use tokio::sync::oneshot;
use tokio::time::Instant;

use std::time::Duration;

pub type MessageId = u64;

pub struct AckEntry {
    id: MessageId,
    payload: Vec<u8>,
    deadline: Instant,
    result: oneshot::Sender<bool>,
}

impl AckEntry {
    /// New entry valid for `ttl`; the receiver resolves to `true` on ack
    pub fn new(id: MessageId, payload: Vec<u8>, ttl: Duration) -> (Self, oneshot::Receiver<bool>) {
        Self::with_deadline(id, payload, Instant::now() + ttl)
    }

    pub fn with_deadline(
        id: MessageId,
        payload: Vec<u8>,
        deadline: Instant,
    ) -> (Self, oneshot::Receiver<bool>) {
        let (result, receiver) = oneshot::channel();
        (
            Self {
                id,
                payload,
                deadline,
                result,
            },
            receiver,
        )
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn is_stale(&self, now: Instant) -> bool {
        now >= self.deadline || self.result.is_closed()
    }

    pub(crate) fn resolve(self, acked: bool) {
        // Waiter may already be gone
        let _ = self.result.send(acked);
    }
}

impl std::fmt::Debug for AckEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckEntry")
            .field("id", &self.id)
            .field("len", &self.payload.len())
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// Ordered in-flight entries of one client
#[derive(Debug, Default)]
pub(crate) struct SendWindow {
    entries: Vec<AckEntry>,
}

impl SendWindow {
    pub fn push(&mut self, entry: AckEntry) {
        self.entries.push(entry);
    }

    /// Resolve the first entry with this id; false when none matches
    pub fn ack(&mut self, id: MessageId) -> bool {
        match self.take(id) {
            Some(entry) => {
                entry.resolve(true);
                true
            }
            None => false,
        }
    }

    /// Remove the first entry with this id, keeping the order of the rest
    pub fn take(&mut self, id: MessageId) -> Option<AckEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Drop expired and abandoned entries, returning how many went
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.is_stale(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.entries.iter().map(|e| e.id).collect()
    }
}
