//! Identifiers and wire formats shared across the service: log ids, content
//! hashes, entry ids, the CBOR pull/ack formats of the ranger surface, and
//! COSE_Sign1 helpers for checkpoints and receipts.

mod cose;
mod entry_id;
mod ids;
mod queue_api;

pub use cose::{
    checkpoint_mmr_size, graft_inclusion_proof, parse_sign1, peak_receipts, sanity_check_sign1,
    MMR_SIZE_KEY, PEAK_RECEIPTS_LABEL, RECEIPT_PROOF_LABEL,
};
pub use entry_id::EntryId;
pub use ids::{ContentHash, LogId};
pub use queue_api::{AckRequest, AckResponse, EntryRecord, LogGroup, PullRequest, PullResponse};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid log id: must be a UUID")]
    InvalidLogId,
    #[error("invalid content hash: must be 64 hex characters")]
    InvalidContentHash,
    #[error("invalid entry id: {0}")]
    InvalidEntryId(&'static str),
    #[error("invalid COSE Sign1 structure")]
    InvalidCoseSign1,
    #[error("COSE decode failed: {0}")]
    Cose(String),
    #[error("CBOR coding failed: {0}")]
    Cbor(String),
    #[error("malformed checkpoint: {0}")]
    CheckpointShape(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Encode `value` as CBOR bytes.
pub fn to_cbor<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|err| Error::Cbor(err.to_string()))?;
    Ok(buf)
}

/// Decode a `T` from CBOR bytes.
pub fn from_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|err| Error::Cbor(err.to_string()))
}
