//! Reading immutable MMR artifacts: massif blobs and their signed
//! checkpoints.
//!
//! A massif is one fixed-layout slab of the log's MMR; its byte layout is
//! fully determined by the massif height, so every read is a closed-form
//! offset computation followed by a byte-range request. Massif and
//! checkpoint objects are never mutated after they are written; the object
//! key identifies a specific version.

mod checkpoint;
mod layout;
mod reader;

pub use checkpoint::Checkpoint;
pub use layout::{
    bloom_len, leaf_table_start, log_data_start, node_store_start, peak_stack_start,
    MassifHeader, FIXED_HEADER_SIZE, LEAF_RECORD_SIZE, NODE_SIZE, PEAK_STACK_SLOTS,
};
pub use reader::{Massif, MassifNodeStore, MassifReader};

use wire::LogId;

/// Object key of a massif blob.
pub fn massif_key(massif_height: u8, log_id: &LogId, massif_index: u64) -> String {
    format!("v2/merklelog/massifs/{massif_height}/{log_id}/{massif_index:016}.log")
}

/// Object key of a checkpoint blob.
pub fn checkpoint_key(massif_height: u8, log_id: &LogId, massif_index: u64) -> String {
    format!("v2/merklelog/checkpoints/{massif_height}/{log_id}/{massif_index:016}.sth")
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed massif: {0}")]
    Format(&'static str),
    #[error("massif does not hold mmr index {0}")]
    IndexOutOfRange(u64),
    #[error(transparent)]
    Blob(#[from] blob::Error),
    #[error(transparent)]
    Mmr(#[from] mmr::Error),
    #[error(transparent)]
    Wire(#[from] wire::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn object_keys_are_zero_padded_decimal() {
        let log_id: LogId = "01234567-89ab-cdef-0123-456789abcdef".parse().unwrap();
        assert_eq!(
            massif_key(14, &log_id, 3),
            "v2/merklelog/massifs/14/01234567-89ab-cdef-0123-456789abcdef/0000000000000003.log",
        );
        assert_eq!(
            checkpoint_key(14, &log_id, 3),
            "v2/merklelog/checkpoints/14/01234567-89ab-cdef-0123-456789abcdef/0000000000000003.sth",
        );
    }
}
