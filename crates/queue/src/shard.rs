use std::collections::{HashMap, HashSet};

use rusqlite::{params, Connection, OptionalExtension};
use wire::{ContentHash, LogId};

use crate::router::djb2;
use crate::{Error, QueueConfig, Result};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is before the epoch")
        .as_millis() as i64
}

/// One leased entry as returned by `pull`.
#[derive(Debug, Clone, PartialEq)]
pub struct PulledEntry {
    pub content_hash: ContentHash,
    pub extras: [Option<Vec<u8>>; 4],
}

/// A per-log run of leased entries, ascending by `seq`.
#[derive(Debug, Clone, PartialEq)]
pub struct PulledGroup {
    pub log_id: LogId,
    pub seq_lo: i64,
    pub seq_hi: i64,
    pub entries: Vec<PulledEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pull {
    pub lease_expiry_ms: i64,
    pub groups: Vec<PulledGroup>,
}

/// The final log coordinates of a sequenced entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequenced {
    pub leaf_index: u64,
    pub massif_index: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ShardStats {
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

/// The state machine of one queue shard: an embedded SQLite store plus
/// in-memory counters and poller liveness. All methods take an explicit
/// `now` in epoch milliseconds; the owning actor supplies the wall clock
/// and tests supply their own.
pub struct ShardState {
    conn: Connection,
    cfg: QueueConfig,
    next_seq: i64,
    pending: u64,
    pollers: HashMap<String, i64>,
}

impl ShardState {
    /// Open or create a shard store. `":memory:"` selects a transient
    /// in-memory database.
    pub fn open(path: &str, cfg: QueueConfig) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            let conn = Connection::open(path)?;
            conn.pragma_update_and_check(None, "journal_mode", "wal", |_row| Ok(()))?;
            conn.pragma_update(None, "synchronous", "normal")?;
            conn
        };
        ensure_schema(&conn)?;

        let next_seq =
            conn.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM entries", [], |row| {
                row.get(0)
            })?;
        let pending = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE leaf_index IS NULL",
            [],
            |row| row.get::<_, i64>(0),
        )? as u64;

        Ok(Self {
            conn,
            cfg,
            next_seq,
            pending,
            pollers: HashMap::new(),
        })
    }

    /// Admit one statement. Returns the shard-local `seq`, the internal
    /// lease key which ack ranges over; it is never exposed to clients.
    pub fn enqueue(
        &mut self,
        log_id: &LogId,
        content_hash: &ContentHash,
        extras: &[Option<Vec<u8>>; 4],
        now: i64,
    ) -> Result<i64> {
        for extra in extras.iter().flatten() {
            if extra.len() > self.cfg.max_extra_size {
                return Err(Error::InvalidRequest(format!(
                    "extra exceeds {} bytes",
                    self.cfg.max_extra_size,
                )));
            }
        }
        if self.pending >= self.cfg.max_pending {
            return Err(Error::QueueFull);
        }

        let seq = self.next_seq;
        self.conn.execute(
            "INSERT INTO entries
                (seq, log_id, content_hash, extra0, extra1, extra2, extra3,
                 visible_after, attempts, enqueued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 0, ?8)",
            params![
                seq,
                log_id.as_bytes().as_slice(),
                content_hash.as_bytes().as_slice(),
                extras[0],
                extras[1],
                extras[2],
                extras[3],
                now,
            ],
        )?;
        self.next_seq += 1;
        self.pending += 1;
        Ok(seq)
    }

    /// Lease a batch of visible entries to `poller_id`, grouped by log.
    ///
    /// Candidate logs are dispatched across the active pollers by hashing
    /// the log id over the sorted poller set, so a stable poller population
    /// partitions the logs and a membership change reshuffles only about
    /// `1/|pollers|` of the assignments. A new poller beyond the cap gets
    /// an empty response, indistinguishable from "no work assigned".
    pub fn pull(
        &mut self,
        poller_id: &str,
        batch_size: u64,
        visibility_ms: u64,
        now: i64,
    ) -> Result<Pull> {
        let lease_expiry_ms = now + visibility_ms as i64;

        let timeout = self.cfg.poller_timeout_ms;
        self.pollers.retain(|_, last_seen| *last_seen >= now - timeout);
        if !self.pollers.contains_key(poller_id) && self.pollers.len() >= self.cfg.max_pollers {
            tracing::warn!(poller_id, "rejecting poller beyond the shard cap");
            return Ok(Pull {
                lease_expiry_ms,
                groups: Vec::new(),
            });
        }
        self.pollers.insert(poller_id.to_string(), now);

        let mut active: Vec<String> = self.pollers.keys().cloned().collect();
        active.sort();

        let max_attempts = self.cfg.max_attempts;
        let tx = self.conn.transaction()?;

        // Poison sweep: anything still pending at the attempt cap moves to
        // dead letters before it can be leased again.
        tx.execute(
            "INSERT INTO dead_letters
                (seq, log_id, content_hash, extra0, extra1, extra2, extra3,
                 attempts, enqueued_at, dead_at, reason)
             SELECT seq, log_id, content_hash, extra0, extra1, extra2, extra3,
                    attempts, enqueued_at, ?1, 'exceeded max attempts'
             FROM entries WHERE leaf_index IS NULL AND attempts >= ?2",
            params![now, max_attempts],
        )?;
        let dead = tx.execute(
            "DELETE FROM entries WHERE leaf_index IS NULL AND attempts >= ?1",
            params![max_attempts],
        )?;

        let candidates: Vec<Vec<u8>> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT log_id FROM entries
                 WHERE leaf_index IS NULL
                   AND (visible_after IS NULL OR visible_after <= ?1)",
            )?;
            let rows = stmt.query_map(params![now], |row| row.get(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        let mut groups = Vec::new();
        let mut total = 0u64;
        for log_id in candidates {
            if total >= batch_size {
                break;
            }
            if active[djb2(&log_id) as usize % active.len()] != poller_id {
                continue;
            }

            let limit = batch_size - total;
            let selected: Vec<(i64, PulledEntry)> = {
                let mut stmt = tx.prepare(
                    "SELECT seq, content_hash, extra0, extra1, extra2, extra3
                     FROM entries
                     WHERE log_id = ?1 AND leaf_index IS NULL
                       AND (visible_after IS NULL OR visible_after <= ?2)
                     ORDER BY seq LIMIT ?3",
                )?;
                let rows = stmt.query_map(params![log_id, now, limit], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Option<Vec<u8>>>(2)?,
                        row.get::<_, Option<Vec<u8>>>(3)?,
                        row.get::<_, Option<Vec<u8>>>(4)?,
                        row.get::<_, Option<Vec<u8>>>(5)?,
                    ))
                })?;
                rows.map(|row| {
                    let (seq, hash, e0, e1, e2, e3) = row?;
                    let content_hash = ContentHash::from_slice(&hash)
                        .map_err(|_| Error::Corrupt("stored content hash is not 32 bytes"))?;
                    Ok((
                        seq,
                        PulledEntry {
                            content_hash,
                            extras: [e0, e1, e2, e3],
                        },
                    ))
                })
                .collect::<Result<_>>()?
            };
            if selected.is_empty() {
                continue;
            }

            for (seq, _) in &selected {
                tx.execute(
                    "UPDATE entries SET visible_after = ?1, attempts = attempts + 1
                     WHERE seq = ?2",
                    params![lease_expiry_ms, seq],
                )?;
            }

            total += selected.len() as u64;
            groups.push(PulledGroup {
                log_id: LogId::from_slice(&log_id)
                    .map_err(|_| Error::Corrupt("stored log id is not 16 bytes"))?,
                seq_lo: selected.first().map(|(seq, _)| *seq).unwrap_or_default(),
                seq_hi: selected.last().map(|(seq, _)| *seq).unwrap_or_default(),
                entries: selected.into_iter().map(|(_, entry)| entry).collect(),
            });
        }
        tx.commit()?;

        self.pending -= dead as u64;
        if dead > 0 {
            tracing::info!(dead, "moved poisoned entries to dead letters");
        }
        Ok(Pull {
            lease_expiry_ms,
            groups,
        })
    }

    /// Record sequencing results for up to `limit` pending entries of
    /// `log_id` starting at `seq_lo`: the i-th selected row becomes leaf
    /// `first_leaf_index + i`. Acked rows stop being pending but are
    /// retained within a horizon of two massifs of the newest leaf, so
    /// `resolve_content` keeps answering for recently sequenced entries.
    ///
    /// Repeating an ack with identical arguments selects no pending rows
    /// and returns zero.
    pub fn ack_first(
        &mut self,
        log_id: &LogId,
        seq_lo: i64,
        limit: u64,
        first_leaf_index: u64,
        massif_height: u8,
        now: i64,
    ) -> Result<u64> {
        if massif_height == 0 || massif_height > 64 {
            return Err(Error::InvalidRequest(format!(
                "massif height {massif_height} is out of range",
            )));
        }
        if limit == 0 {
            return Ok(0);
        }
        let leaves_per_massif = 1u64 << (massif_height - 1);

        let tx = self.conn.transaction()?;
        let seqs: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT seq FROM entries
                 WHERE log_id = ?1 AND seq >= ?2 AND leaf_index IS NULL
                 ORDER BY seq LIMIT ?3",
            )?;
            let rows = stmt.query_map(
                params![log_id.as_bytes().as_slice(), seq_lo, limit],
                |row| row.get(0),
            )?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        for (i, seq) in seqs.iter().enumerate() {
            let leaf_index = first_leaf_index + i as u64;
            let massif_index = leaf_index / leaves_per_massif;
            tx.execute(
                "UPDATE entries
                 SET leaf_index = ?1, massif_index = ?2, visible_after = NULL, acked_at = ?3
                 WHERE seq = ?4",
                params![leaf_index as i64, massif_index as i64, now, seq],
            )?;
        }

        if !seqs.is_empty() {
            let max_leaf: Option<i64> = tx.query_row(
                "SELECT MAX(leaf_index) FROM entries WHERE log_id = ?1",
                params![log_id.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            if let Some(max_leaf) = max_leaf {
                let horizon = max_leaf as i128 - 2 * leaves_per_massif as i128;
                if horizon > 0 {
                    tx.execute(
                        "DELETE FROM entries
                         WHERE log_id = ?1 AND leaf_index IS NOT NULL AND leaf_index < ?2",
                        params![log_id.as_bytes().as_slice(), horizon as i64],
                    )?;
                }
            }
        }
        tx.commit()?;

        self.pending -= seqs.len() as u64;
        Ok(seqs.len() as u64)
    }

    /// Where did this content end up? `None` means still pending, or
    /// unknown within the retention horizon.
    pub fn resolve_content(&self, content_hash: &ContentHash) -> Result<Option<Sequenced>> {
        let found = self
            .conn
            .query_row(
                "SELECT leaf_index, massif_index FROM entries
                 WHERE content_hash = ?1 AND leaf_index IS NOT NULL LIMIT 1",
                params![content_hash.as_bytes().as_slice()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        Ok(found.map(|(leaf_index, massif_index)| Sequenced {
            leaf_index: leaf_index as u64,
            massif_index: massif_index as u64,
        }))
    }

    pub fn stats(&mut self, now: i64) -> Result<ShardStats> {
        let timeout = self.cfg.poller_timeout_ms;
        self.pollers.retain(|_, last_seen| *last_seen >= now - timeout);

        let dead_letters: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM dead_letters", [], |row| row.get(0))?;
        let oldest: Option<i64> = self.conn.query_row(
            "SELECT MIN(enqueued_at) FROM entries WHERE leaf_index IS NULL",
            [],
            |row| row.get(0),
        )?;

        Ok(ShardStats {
            pending: self.pending,
            dead_letters: dead_letters as u64,
            oldest_entry_age_ms: oldest.map(|enqueued_at| now - enqueued_at),
            active_pollers: self.pollers.len(),
            poller_limit_reached: self.pollers.len() >= self.cfg.max_pollers,
        })
    }
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    // The base tables, as the oldest deployed schema created them. Columns
    // added since then are applied below so that a store created by any
    // prior version upgrades in place.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS entries (
            seq INTEGER PRIMARY KEY,
            log_id BLOB NOT NULL,
            content_hash BLOB NOT NULL,
            extra0 BLOB,
            extra1 BLOB,
            extra2 BLOB,
            extra3 BLOB,
            visible_after INTEGER,
            attempts INTEGER NOT NULL DEFAULT 0,
            enqueued_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS dead_letters (
            seq INTEGER PRIMARY KEY,
            log_id BLOB NOT NULL,
            content_hash BLOB NOT NULL,
            extra0 BLOB,
            extra1 BLOB,
            extra2 BLOB,
            extra3 BLOB,
            attempts INTEGER NOT NULL,
            enqueued_at INTEGER NOT NULL,
            dead_at INTEGER NOT NULL,
            reason TEXT NOT NULL
        );",
    )?;

    let mut existing = HashSet::new();
    {
        let mut stmt = conn.prepare("PRAGMA table_info(entries)")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for name in names {
            existing.insert(name?);
        }
    }
    for column in ["leaf_index", "massif_index", "acked_at"] {
        if !existing.contains(column) {
            conn.execute(
                &format!("ALTER TABLE entries ADD COLUMN {column} INTEGER DEFAULT NULL"),
                [],
            )?;
            tracing::debug!(column, "added missing entries column");
        }
    }

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_entries_log_visible ON entries (log_id, visible_after);
         CREATE INDEX IF NOT EXISTS idx_entries_visible ON entries (visible_after);
         CREATE INDEX IF NOT EXISTS idx_entries_attempts ON entries (attempts);
         CREATE INDEX IF NOT EXISTS idx_entries_content_hash ON entries (content_hash);
         CREATE INDEX IF NOT EXISTS idx_entries_log_leaf ON entries (log_id, leaf_index);",
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn log_id(fill: u8) -> LogId {
        LogId::new([fill; 16])
    }

    fn hash(fill: u8) -> ContentHash {
        ContentHash::new([fill; 32])
    }

    const NO_EXTRAS: [Option<Vec<u8>>; 4] = [None, None, None, None];

    fn shard() -> ShardState {
        ShardState::open(":memory:", QueueConfig::default()).unwrap()
    }

    #[test]
    fn enqueue_pull_ack_round_trip() {
        let mut shard = shard();
        let log = log_id(0xAA);

        assert_eq!(shard.enqueue(&log, &hash(0xBB), &NO_EXTRAS, 1_000).unwrap(), 1);
        assert_eq!(shard.enqueue(&log, &hash(0xCC), &NO_EXTRAS, 1_001).unwrap(), 2);

        let pull = shard.pull("P1", 10, 30_000, 2_000).unwrap();
        assert_eq!(pull.lease_expiry_ms, 32_000);
        assert_eq!(pull.groups.len(), 1);
        let group = &pull.groups[0];
        assert_eq!(group.log_id, log);
        assert_eq!((group.seq_lo, group.seq_hi), (1, 2));
        assert_eq!(group.entries.len(), 2);
        assert_eq!(group.entries[0].content_hash, hash(0xBB));
        assert_eq!(group.entries[1].content_hash, hash(0xCC));

        let acked = shard.ack_first(&log, 1, 2, 0, 14, 3_000).unwrap();
        assert_eq!(acked, 2);
        assert_eq!(shard.stats(3_000).unwrap().pending, 0);

        // Acked entries stay resolvable within the retention horizon.
        assert_eq!(
            shard.resolve_content(&hash(0xBB)).unwrap(),
            Some(Sequenced { leaf_index: 0, massif_index: 0 }),
        );
        assert_eq!(
            shard.resolve_content(&hash(0xCC)).unwrap(),
            Some(Sequenced { leaf_index: 1, massif_index: 0 }),
        );
        assert_eq!(shard.resolve_content(&hash(0xDD)).unwrap(), None);
    }

    #[test]
    fn seq_increases_by_one_from_shard_start() {
        let mut shard = shard();
        for expect in 1..=100 {
            let seq = shard
                .enqueue(&log_id((expect % 7) as u8), &hash(expect as u8), &NO_EXTRAS, 0)
                .unwrap();
            assert_eq!(seq, expect);
        }
    }

    #[test]
    fn first_delivery_order_matches_enqueue_order() {
        let mut shard = shard();
        let log = log_id(1);
        for fill in 0..10u8 {
            shard.enqueue(&log, &hash(fill), &NO_EXTRAS, 0).unwrap();
        }
        let pull = shard.pull("P1", 100, 1_000, 1).unwrap();
        let hashes: Vec<_> = pull.groups[0].entries.iter().map(|e| e.content_hash).collect();
        assert_eq!(hashes, (0..10u8).map(hash).collect::<Vec<_>>());
    }

    #[test]
    fn expired_leases_are_redelivered_with_attempts_counted() {
        let mut shard = shard();
        let log = log_id(1);
        shard.enqueue(&log, &hash(9), &NO_EXTRAS, 0).unwrap();

        let first = shard.pull("P1", 10, 100, 1_000).unwrap();
        assert_eq!(first.groups.len(), 1);

        // Still leased: nothing visible.
        let leased = shard.pull("P1", 10, 100, 1_050).unwrap();
        assert!(leased.groups.is_empty());

        // Past the lease expiry the same entry comes back.
        let again = shard.pull("P1", 10, 100, 1_200).unwrap();
        assert_eq!(again.groups.len(), 1);
        assert_eq!(again.groups[0].entries[0].content_hash, hash(9));
    }

    #[test]
    fn poisoned_entries_dead_letter_after_max_attempts() {
        let mut shard = shard();
        let log = log_id(1);
        shard.enqueue(&log, &hash(9), &NO_EXTRAS, 0).unwrap();

        let mut now = 0;
        for _ in 0..5 {
            now += 10;
            let pull = shard.pull("P1", 10, 1, now).unwrap();
            assert_eq!(pull.groups.len(), 1, "delivered while under the cap");
        }

        // The sixth pull sweeps it into dead letters and returns nothing.
        now += 10;
        let pull = shard.pull("P1", 10, 1, now).unwrap();
        assert!(pull.groups.is_empty());

        let stats = shard.stats(now).unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.dead_letters, 1);

        let reason: String = shard
            .conn
            .query_row("SELECT reason FROM dead_letters", [], |row| row.get(0))
            .unwrap();
        assert_eq!(reason, "exceeded max attempts");
    }

    #[test]
    fn dispatch_partitions_logs_across_pollers() {
        let mut shard = shard();
        for i in 0..20u8 {
            let mut id = [0xAA; 16];
            id[1] = i;
            shard.enqueue(&LogId::new(id), &hash(i), &NO_EXTRAS, 0).unwrap();
        }

        // Register both pollers before comparing assignments.
        let _ = shard.pull("P-A", 0, 1_000, 1).unwrap();
        let _ = shard.pull("P-B", 0, 1_000, 1).unwrap();

        let a = shard.pull("P-A", 100, 1_000, 2).unwrap();
        let b = shard.pull("P-B", 100, 1_000, 2).unwrap();

        let logs_a: HashSet<LogId> = a.groups.iter().map(|g| g.log_id).collect();
        let logs_b: HashSet<LogId> = b.groups.iter().map(|g| g.log_id).collect();
        assert!(logs_a.is_disjoint(&logs_b));
        assert_eq!(logs_a.len() + logs_b.len(), 20);
        // djb2 over these ids happens to split them exactly evenly.
        assert_eq!(logs_a.len(), 10);
        assert_eq!(logs_b.len(), 10);
    }

    #[test]
    fn ack_is_idempotent_and_scoped_to_its_log() {
        let mut shard = shard();
        let log_a = log_id(0xA1);
        let log_b = log_id(0xB1);
        shard.enqueue(&log_a, &hash(1), &NO_EXTRAS, 0).unwrap();
        shard.enqueue(&log_b, &hash(2), &NO_EXTRAS, 0).unwrap();
        shard.enqueue(&log_a, &hash(3), &NO_EXTRAS, 0).unwrap();

        let acked = shard.ack_first(&log_a, 1, 10, 5, 14, 100).unwrap();
        assert_eq!(acked, 2);
        // Same arguments again: every selected row is already sequenced.
        assert_eq!(shard.ack_first(&log_a, 1, 10, 5, 14, 100).unwrap(), 0);

        // Only log A's rows changed; log B is still pending.
        assert_eq!(shard.resolve_content(&hash(2)).unwrap(), None);
        assert_eq!(shard.stats(100).unwrap().pending, 1);
        assert_eq!(
            shard.resolve_content(&hash(3)).unwrap(),
            Some(Sequenced { leaf_index: 6, massif_index: 0 }),
        );
    }

    #[test]
    fn ack_seq_filter_skips_earlier_and_sequenced_rows() {
        let mut shard = shard();
        let log = log_id(1);
        for fill in 0..4u8 {
            shard.enqueue(&log, &hash(fill), &NO_EXTRAS, 0).unwrap();
        }
        // Ack the first two, then the next two starting past them.
        assert_eq!(shard.ack_first(&log, 1, 2, 0, 3, 10).unwrap(), 2);
        assert_eq!(shard.ack_first(&log, 1, 2, 2, 3, 20).unwrap(), 2);
        assert_eq!(
            shard.resolve_content(&hash(3)).unwrap(),
            Some(Sequenced { leaf_index: 3, massif_index: 0 }),
        );
    }

    #[test]
    fn retention_keeps_roughly_two_massifs_of_acked_rows() {
        let mut shard = shard();
        let log = log_id(1);
        // Massif height 2 => 2 leaves per massif, horizon = 4 leaves.
        for fill in 0..8u8 {
            shard.enqueue(&log, &hash(fill), &NO_EXTRAS, 0).unwrap();
        }
        assert_eq!(shard.ack_first(&log, 1, 8, 0, 2, 10).unwrap(), 8);

        // Leaves below max(7) - 4 = 3 are gone from the resolver cache.
        assert_eq!(shard.resolve_content(&hash(0)).unwrap(), None);
        assert_eq!(shard.resolve_content(&hash(2)).unwrap(), None);
        assert_eq!(
            shard.resolve_content(&hash(3)).unwrap(),
            Some(Sequenced { leaf_index: 3, massif_index: 1 }),
        );
        assert_eq!(
            shard.resolve_content(&hash(7)).unwrap(),
            Some(Sequenced { leaf_index: 7, massif_index: 3 }),
        );
    }

    #[test]
    fn backpressure_and_extra_size_limits() {
        let cfg = QueueConfig {
            max_pending: 2,
            ..QueueConfig::default()
        };
        let mut shard = ShardState::open(":memory:", cfg).unwrap();
        let log = log_id(1);

        shard.enqueue(&log, &hash(1), &NO_EXTRAS, 0).unwrap();
        shard.enqueue(&log, &hash(2), &NO_EXTRAS, 0).unwrap();
        assert!(matches!(
            shard.enqueue(&log, &hash(3), &NO_EXTRAS, 0),
            Err(Error::QueueFull),
        ));

        let oversized = [Some(vec![0u8; 33]), None, None, None];
        assert!(matches!(
            shard.enqueue(&log, &hash(4), &oversized, 0),
            Err(Error::InvalidRequest(_)),
        ));
        // At exactly the cap the extra is accepted once there is room.
        shard.ack_first(&log, 1, 2, 0, 14, 1).unwrap();
        let max_sized = [Some(vec![0u8; 32]), None, None, None];
        shard.enqueue(&log, &hash(5), &max_sized, 0).unwrap();
    }

    #[test]
    fn new_pollers_beyond_the_cap_get_empty_pulls() {
        let cfg = QueueConfig {
            max_pollers: 2,
            ..QueueConfig::default()
        };
        let mut shard = ShardState::open(":memory:", cfg).unwrap();
        let log = log_id(1);
        shard.enqueue(&log, &hash(1), &NO_EXTRAS, 0).unwrap();

        let _ = shard.pull("P1", 0, 1_000, 0).unwrap();
        let _ = shard.pull("P2", 0, 1_000, 0).unwrap();

        // A third poller is turned away empty; existing ones still work.
        let rejected = shard.pull("P3", 10, 1_000, 1).unwrap();
        assert!(rejected.groups.is_empty());
        assert!(shard.stats(1).unwrap().poller_limit_reached);

        // Once P1 and P2 go stale, P3 is admitted.
        let now = 10_000;
        let admitted = shard.pull("P3", 10, 1_000, now).unwrap();
        assert_eq!(admitted.groups.len(), 1);
        assert_eq!(shard.stats(now).unwrap().active_pollers, 1);
    }

    #[test]
    fn batch_size_caps_the_total_across_logs() {
        let mut shard = shard();
        for i in 0..6u8 {
            shard.enqueue(&log_id(i), &hash(i), &NO_EXTRAS, 0).unwrap();
        }
        let pull = shard.pull("P1", 4, 1_000, 1).unwrap();
        let total: usize = pull.groups.iter().map(|g| g.entries.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn stats_reports_oldest_pending_age() {
        let mut shard = shard();
        shard.enqueue(&log_id(1), &hash(1), &NO_EXTRAS, 1_000).unwrap();
        shard.enqueue(&log_id(2), &hash(2), &NO_EXTRAS, 5_000).unwrap();

        let stats = shard.stats(11_000).unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.oldest_entry_age_ms, Some(10_000));

        shard.ack_first(&log_id(1), 1, 1, 0, 14, 12_000).unwrap();
        let stats = shard.stats(12_000).unwrap();
        assert_eq!(stats.oldest_entry_age_ms, Some(7_000));
    }

    #[test]
    fn reopening_a_store_resumes_seq_and_migrates_legacy_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sqlite");
        let path = path.to_str().unwrap();

        // A legacy store created before the sequencing-result columns.
        {
            let conn = Connection::open(path).unwrap();
            conn.execute_batch(
                "CREATE TABLE entries (
                    seq INTEGER PRIMARY KEY,
                    log_id BLOB NOT NULL,
                    content_hash BLOB NOT NULL,
                    extra0 BLOB, extra1 BLOB, extra2 BLOB, extra3 BLOB,
                    visible_after INTEGER,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    enqueued_at INTEGER NOT NULL
                );",
            )
            .unwrap();
            conn.execute(
                "INSERT INTO entries (seq, log_id, content_hash, enqueued_at)
                 VALUES (7, ?1, ?2, 123)",
                params![[0x01u8; 16].as_slice(), [0x02u8; 32].as_slice()],
            )
            .unwrap();
        }

        let mut shard = ShardState::open(path, QueueConfig::default()).unwrap();
        // The pre-existing row is pending and seq allocation resumes after it.
        assert_eq!(shard.stats(200).unwrap().pending, 1);
        assert_eq!(shard.enqueue(&log_id(3), &hash(3), &NO_EXTRAS, 200).unwrap(), 8);

        // The migrated columns are usable.
        assert_eq!(shard.ack_first(&LogId::new([0x01; 16]), 1, 1, 0, 14, 300).unwrap(), 1);
        assert_eq!(
            shard.resolve_content(&ContentHash::new([0x02; 32])).unwrap(),
            Some(Sequenced { leaf_index: 0, massif_index: 0 }),
        );

        // Running the migration again is a no-op.
        drop(shard);
        let mut shard = ShardState::open(path, QueueConfig::default()).unwrap();
        assert_eq!(shard.stats(400).unwrap().pending, 1);
    }
}
