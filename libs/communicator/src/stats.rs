//! Traffic counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated lock-free from any thread
#[derive(Debug, Default)]
pub struct CommStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    loopback: AtomicU64,
    rerouted: AtomicU64,
    send_errors: AtomicU64,
    delivery_errors: AtomicU64,
}

impl CommStats {
    /// Record an envelope handed to a transport
    pub fn record_sent(&self, byte_size: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_size as u64, Ordering::Relaxed);
    }

    /// Record an envelope unsealed and decoded here
    pub fn record_received(&self, byte_size: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_size as u64, Ordering::Relaxed);
    }

    pub fn record_loopback(&self) {
        self.loopback.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rerouted(&self) {
        self.rerouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_error(&self) {
        self.delivery_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            loopback: self.loopback.load(Ordering::Relaxed),
            rerouted: self.rerouted.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            delivery_errors: self.delivery_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CommStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub loopback: u64,
    pub rerouted: u64,
    pub send_errors: u64,
    pub delivery_errors: u64,
}

impl StatsSnapshot {
    /// Get average envelope size across both directions
    pub fn average_message_size(&self) -> Option<f64> {
        let total_messages = self.messages_sent + self.messages_received;
        if total_messages > 0 {
            let total_bytes = self.bytes_sent + self.bytes_received;
            Some(total_bytes as f64 / total_messages as f64)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = CommStats::default();
        stats.record_sent(100);
        stats.record_sent(50);
        stats.record_received(30);
        stats.record_loopback();
        stats.record_rerouted();
        stats.record_send_error();
        stats.record_delivery_error();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_sent, 2);
        assert_eq!(snapshot.bytes_sent, 150);
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.loopback, 1);
        assert_eq!(snapshot.rerouted, 1);
        assert_eq!(snapshot.send_errors, 1);
        assert_eq!(snapshot.delivery_errors, 1);
        assert_eq!(snapshot.average_message_size(), Some(60.0));
    }

    #[test]
    fn test_empty_average() {
        assert_eq!(StatsSnapshot::default().average_message_size(), None);
    }
}
