use crate::Result;

/// A decoded checkpoint: a COSE_Sign1 over the log's MMR state, carrying
/// pre-signed peak receipts in its unprotected header.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// Number of MMR nodes the checkpoint commits to.
    pub mmr_size: u64,
    /// Pre-signed peak receipts, ordered to match the peaks of
    /// `mmr_size` highest first. Each element is an encoded COSE_Sign1.
    pub peak_receipts: Vec<Vec<u8>>,
}

impl Checkpoint {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let sign1 = wire::parse_sign1(bytes)?;
        Ok(Self {
            mmr_size: wire::checkpoint_mmr_size(&sign1)?,
            peak_receipts: wire::peak_receipts(&sign1)?,
        })
    }

    /// True when the checkpoint covers `mmr_index`.
    pub fn covers(&self, mmr_index: u64) -> bool {
        mmr_index < self.mmr_size
    }
}
