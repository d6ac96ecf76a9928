// Per-entity stream state

use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::RwLock;

use crate::interp::StateBuffer;
use crate::telegram::EntityState;

/// One tracked remote entity: the clock offset estimated from its first
/// telegram plus the buffered state window.
#[derive(Debug)]
pub struct EntityStream {
    pub entity_id: String,
    /// Local clock minus sender clock, in milliseconds. Estimated once
    /// from the first telegram and never revised; network delay biases
    /// the estimate but a stable offset keeps render time continuous.
    pub clock_offset_ms: i64,
    buffer: RwLock<StateBuffer>,
    /// Local wall time of the most recent telegram, for idle eviction.
    last_rx_ms: AtomicI64,
}

impl EntityStream {
    pub fn new(entity_id: String, clock_offset_ms: i64, now_ms: i64) -> Self {
        EntityStream {
            entity_id,
            clock_offset_ms,
            buffer: RwLock::new(StateBuffer::new()),
            last_rx_ms: AtomicI64::new(now_ms),
        }
    }

    /// Buffer a telegram and refresh the activity clock. Returns true if
    /// the sample was kept.
    pub async fn append(&self, state: EntityState, now_ms: i64) -> bool {
        self.last_rx_ms.store(now_ms, Ordering::Relaxed);
        self.buffer.write().await.append(state)
    }

    /// Interpolated state at `render_time` on the sender's clock.
    pub async fn sample_at(&self, render_time: i64) -> EntityState {
        self.buffer.read().await.sample_at(render_time)
    }

    /// Local wall time of the last received telegram.
    pub fn last_rx_ms(&self) -> i64 {
        self.last_rx_ms.load(Ordering::Relaxed)
    }

    /// Buffered sample count and newest sender timestamp, for status
    /// reporting.
    pub async fn buffer_stats(&self) -> (usize, Option<i64>) {
        let buffer = self.buffer.read().await;
        (buffer.len(), buffer.newest_timestamp())
    }
}
