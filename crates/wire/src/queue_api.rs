use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Request body of `POST /queue/pull`, a CBOR map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(rename = "pollerId")]
    pub poller_id: String,
    #[serde(rename = "batchSize")]
    pub batch_size: u64,
    #[serde(rename = "visibilityMs")]
    pub visibility_ms: u64,
}

/// One leased entry: its content hash and four opaque extra slots.
///
/// On the wire this is the positional array
/// `[contentHash, extra0, extra1, extra2, extra3]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "EntryRecordRepr", from = "EntryRecordRepr")]
pub struct EntryRecord {
    pub content_hash: Vec<u8>,
    pub extras: [Option<Vec<u8>>; 4],
}

type EntryRecordRepr = (
    ByteBuf,
    Option<ByteBuf>,
    Option<ByteBuf>,
    Option<ByteBuf>,
    Option<ByteBuf>,
);

impl From<EntryRecord> for EntryRecordRepr {
    fn from(rec: EntryRecord) -> Self {
        let [e0, e1, e2, e3] = rec.extras;
        (
            ByteBuf::from(rec.content_hash),
            e0.map(ByteBuf::from),
            e1.map(ByteBuf::from),
            e2.map(ByteBuf::from),
            e3.map(ByteBuf::from),
        )
    }
}

impl From<EntryRecordRepr> for EntryRecord {
    fn from((content_hash, e0, e1, e2, e3): EntryRecordRepr) -> Self {
        Self {
            content_hash: content_hash.into_vec(),
            extras: [
                e0.map(ByteBuf::into_vec),
                e1.map(ByteBuf::into_vec),
                e2.map(ByteBuf::into_vec),
                e3.map(ByteBuf::into_vec),
            ],
        }
    }
}

/// A run of leased entries for one log, on the wire as
/// `[logId, seqLo, seqHi, entries]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "LogGroupRepr", from = "LogGroupRepr")]
pub struct LogGroup {
    pub log_id: Vec<u8>,
    pub seq_lo: u64,
    pub seq_hi: u64,
    pub entries: Vec<EntryRecord>,
}

type LogGroupRepr = (ByteBuf, u64, u64, Vec<EntryRecord>);

impl From<LogGroup> for LogGroupRepr {
    fn from(group: LogGroup) -> Self {
        (
            ByteBuf::from(group.log_id),
            group.seq_lo,
            group.seq_hi,
            group.entries,
        )
    }
}

impl From<LogGroupRepr> for LogGroup {
    fn from((log_id, seq_lo, seq_hi, entries): LogGroupRepr) -> Self {
        Self {
            log_id: log_id.into_vec(),
            seq_lo,
            seq_hi,
            entries,
        }
    }
}

/// Response body of `POST /queue/pull`.
///
/// Positional rather than keyed: rangers pull thousands of entries per
/// second and the array form keeps repeated keys off the hot path. On the
/// wire: `[version, leaseExpiry, logGroups]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PullResponseRepr", from = "PullResponseRepr")]
pub struct PullResponse {
    pub version: u64,
    pub lease_expiry_ms: u64,
    pub groups: Vec<LogGroup>,
}

type PullResponseRepr = (u64, u64, Vec<LogGroup>);

impl From<PullResponse> for PullResponseRepr {
    fn from(resp: PullResponse) -> Self {
        (resp.version, resp.lease_expiry_ms, resp.groups)
    }
}

impl From<PullResponseRepr> for PullResponse {
    fn from((version, lease_expiry_ms, groups): PullResponseRepr) -> Self {
        Self {
            version,
            lease_expiry_ms,
            groups,
        }
    }
}

/// Request body of `POST /queue/ack`, a CBOR map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckRequest {
    #[serde(rename = "logId", with = "serde_bytes")]
    pub log_id: Vec<u8>,
    #[serde(rename = "seqLo")]
    pub seq_lo: u64,
    pub limit: u64,
    #[serde(rename = "firstLeafIndex")]
    pub first_leaf_index: u64,
    #[serde(rename = "massifHeight")]
    pub massif_height: u64,
}

/// Response body of `POST /queue/ack`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    pub acked: u64,
}
