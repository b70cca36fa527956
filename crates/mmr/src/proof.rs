use crate::index::index_height;
use crate::{Node, Result};

/// Read access to 32-byte MMR nodes by index.
///
/// Implementations may be backed by a massif blob, an ancestor peak stack,
/// or an in-memory table in tests. `get` fails for indexes the store does
/// not hold.
pub trait NodeStore {
    fn get(&self, mmr_index: u64) -> Result<Node>;
}

fn sibling_offset(height: u32) -> u64 {
    (2u64 << height) - 1
}

/// The inclusion proof for the node at index `i`, in an MMR whose last
/// committed index is `mmr_last_index` (inclusive).
///
/// Climbs from `i` towards its covering peak. At each level the sibling is
/// on the left when the successor index gains height (meaning `i` is a right
/// child), and on the right otherwise; the climb ends when the sibling would
/// fall beyond the committed range, which is exactly when `i` has reached a
/// peak.
pub fn inclusion_proof<S: NodeStore + ?Sized>(
    store: &S,
    mmr_last_index: u64,
    i: u64,
) -> Result<Vec<Node>> {
    let mut proof = Vec::new();
    let mut i = i;
    let mut height = index_height(i);

    loop {
        let sibling = if index_height(i + 1) > height {
            let sibling = i - sibling_offset(height);
            i += 1;
            sibling
        } else {
            let sibling = i + sibling_offset(height);
            i += 2 << height;
            sibling
        };

        if sibling > mmr_last_index {
            return Ok(proof);
        }
        proof.push(store.get(sibling)?);
        height += 1;
    }
}
