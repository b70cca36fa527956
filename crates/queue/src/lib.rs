//! The durable sequencing queue: sharded, domain-aware, lease-based, with a
//! built-in sequencing-result cache.
//!
//! Signed statements are admitted per log, pulled in per-log FIFO batches by
//! competing sequencer workers under visibility leases, and acknowledged
//! with their final log coordinates. Acked rows are retained for a cleanup
//! horizon so content hashes remain resolvable to `(leafIndex, massifIndex)`
//! without a separate key-value cache.

mod actor;
mod router;
mod shard;

pub use actor::Shard;
pub use router::{djb2, QueueStats, Router};
pub use shard::{
    now_ms, Pull, PulledEntry, PulledGroup, Sequenced, ShardState, ShardStats,
};

/// Per-shard tunables. The defaults are the service's production values.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Admission cap on pending entries; overflow surfaces as `QueueFull`.
    pub max_pending: u64,
    /// Cap on tracked pollers; new pollers beyond it get empty pulls.
    pub max_pollers: usize,
    /// Deliveries before an entry is dead-lettered.
    pub max_attempts: u32,
    /// A poller unseen for this long stops participating in dispatch.
    pub poller_timeout_ms: i64,
    /// Size cap on each opaque extra slot.
    pub max_extra_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending: 100_000,
            max_pollers: 50,
            max_attempts: 5,
            poller_timeout_ms: 4_000,
            max_extra_size: 32,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("queue is full")]
    QueueFull,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    #[error("corrupt queue row: {0}")]
    Corrupt(&'static str),
    #[error("queue shard is shut down")]
    ShardClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
