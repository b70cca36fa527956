use wire::LogId;

use crate::actor::Shard;
use crate::shard::ShardStats;
use crate::{QueueConfig, Result};

/// The djb2 string hash, exactly: `h = 5381; h = h*33 + b (mod 2^32)`.
///
/// Not cryptographic. Its only contract is uniform distribution over
/// well-distributed inputs; it is used for shard selection and poller
/// assignment, never for integrity.
pub fn djb2(bytes: &[u8]) -> u32 {
    let mut h: u32 = 5381;
    for &b in bytes {
        h = h.wrapping_shl(5).wrapping_add(h).wrapping_add(b as u32);
    }
    h
}

/// Aggregated statistics across every shard.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct QueueStats {
    pub pending: u64,
    #[serde(rename = "deadLetters")]
    pub dead_letters: u64,
    #[serde(rename = "oldestEntryAgeMs")]
    pub oldest_entry_age_ms: Option<i64>,
    #[serde(rename = "activePollers")]
    pub active_pollers: usize,
    #[serde(rename = "pollerLimitReached")]
    pub poller_limit_reached: bool,
}

/// Partitions the log-id namespace across a fixed set of shards.
pub struct Router {
    shards: Vec<Shard>,
}

impl Router {
    /// Open `count` shards whose store paths are produced by `path_of`.
    pub fn open(
        count: usize,
        cfg: QueueConfig,
        path_of: impl Fn(usize) -> String,
    ) -> Result<Self> {
        assert!(count > 0, "at least one shard is required");
        let shards = (0..count)
            .map(|index| Shard::open(&path_of(index), cfg.clone()))
            .collect::<Result<_>>()?;
        Ok(Self { shards })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// The shard owning `log_id`.
    pub fn shard_for(&self, log_id: &LogId) -> &Shard {
        &self.shards[djb2(log_id.as_bytes()) as usize % self.shards.len()]
    }

    /// A shard by explicit index, for the ranger surface's `?shard=i`.
    pub fn shard_at(&self, index: usize) -> Option<&Shard> {
        self.shards.get(index)
    }

    /// Walk all shards and fold their stats: counts sum, ages max, and the
    /// poller limit is reached if any shard reached it.
    pub async fn stats(&self) -> Result<QueueStats> {
        let mut folded = QueueStats {
            pending: 0,
            dead_letters: 0,
            oldest_entry_age_ms: None,
            active_pollers: 0,
            poller_limit_reached: false,
        };
        for shard in &self.shards {
            let ShardStats {
                pending,
                dead_letters,
                oldest_entry_age_ms,
                active_pollers,
                poller_limit_reached,
            } = shard.stats().await?;
            folded.pending += pending;
            folded.dead_letters += dead_letters;
            folded.oldest_entry_age_ms = match (folded.oldest_entry_age_ms, oldest_entry_age_ms) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            folded.active_pollers += active_pollers;
            folded.poller_limit_reached |= poller_limit_reached;
        }
        Ok(folded)
    }
}
