/// Hub and connection metrics
///
/// Lock-free counters with serializable snapshots for monitoring.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// CLIENT METRICS
// ============================================================================

/// Per-client counters
#[derive(Debug, Default)]
pub struct ClientMetrics {
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    rate_limited: AtomicU64,
    acks_resolved: AtomicU64,
    acks_failed: AtomicU64,
}

impl ClientMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ack_resolved(&self) {
        self.acks_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ack_failed(&self) {
        self.acks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ClientMetricsSnapshot {
        ClientMetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            acks_resolved: self.acks_resolved.load(Ordering::Relaxed),
            acks_failed: self.acks_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientMetricsSnapshot {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub rate_limited: u64,
    pub acks_resolved: u64,
    pub acks_failed: u64,
}

// ============================================================================
// HUB METRICS
// ============================================================================

/// Hub-level counters (aggregate across all connections)
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Connections that passed authentication (lifetime)
    total_connections: AtomicU64,

    /// Connections refused by the auth predicate or the register hook
    rejected_connections: AtomicU64,

    /// Current registry size
    registered: AtomicUsize,

    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    evictions: AtomicU64,
    commands: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection_accepted(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_registered(&self, count: usize) {
        self.registered.store(count, Ordering::Relaxed);
    }

    /// Record one broadcast and how many queues accepted it
    pub fn broadcast(&self, delivered: u64, evicted: u64) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered, Ordering::Relaxed);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    pub fn command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            registered: self.registered.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HubMetricsSnapshot {
    pub total_connections: u64,
    pub rejected_connections: u64,
    pub registered: usize,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub evictions: u64,
    pub commands: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_metrics() {
        let metrics = ClientMetrics::new();

        metrics.frame_received();
        metrics.frame_received();
        metrics.frame_sent();
        metrics.rate_limited();
        metrics.ack_resolved();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.frames_sent, 1);
        assert_eq!(snapshot.rate_limited, 1);
        assert_eq!(snapshot.acks_resolved, 1);
        assert_eq!(snapshot.acks_failed, 0);
    }

    #[test]
    fn test_hub_metrics() {
        let metrics = HubMetrics::new();

        metrics.connection_accepted();
        metrics.connection_accepted();
        metrics.connection_rejected();
        metrics.set_registered(2);
        metrics.broadcast(3, 1);
        metrics.command();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.rejected_connections, 1);
        assert_eq!(snapshot.registered, 2);
        assert_eq!(snapshot.broadcasts, 1);
        assert_eq!(snapshot.deliveries, 3);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.commands, 1);
    }
}
