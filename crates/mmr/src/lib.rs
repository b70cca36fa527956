//! Closed-form arithmetic over Merkle Mountain Range indexes.
//!
//! Nodes of an MMR are addressed by a single monotone `u64` index. Leaves
//! and interior nodes interleave: the index of a node determines its height
//! and its relationship to every other node, so all of the functions here
//! are pure integer math with no tree materialized anywhere.

mod index;
mod peaks;
mod proof;

pub use index::{
    all_ones, bit_length, first_mmr_size, index_height, jump_left_perfect, leaf_count,
    leaf_index_from_mmr_index, leaf_minus_spur_sum, leaves_per_massif, massif_first_index,
    massif_index_from_mmr_index, mmr_index, peaks_bitmap, pos_height,
};
pub use peaks::{peak_index, peak_stack_map, peaks};
pub use proof::{inclusion_proof, NodeStore};

/// A 32-byte MMR node value.
pub type Node = [u8; 32];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("mmr index {0} is not available from this node store")]
    IndexUnavailable(u64),
    #[error("massif height {0} is out of range")]
    InvalidMassifHeight(u8),
}

pub type Result<T> = std::result::Result<T, Error>;
