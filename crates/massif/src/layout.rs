use crate::{Error, Result};

/// 32 reserved bytes followed by seven 32-byte slots.
pub const FIXED_HEADER_SIZE: u64 = 256;
/// One 32-byte index header follows the fixed header.
pub const INDEX_HEADER_SIZE: u64 = 32;
/// Bytes in the Urkle frontier-state region.
pub const FRONTIER_SIZE: u64 = 544;
/// Bytes per leaf-table record.
pub const LEAF_RECORD_SIZE: u64 = 128;
/// Bytes per MMR node, in the node store, peak stack and log data.
pub const NODE_SIZE: u64 = 32;
/// Fixed number of peak-stack slots.
pub const PEAK_STACK_SLOTS: u64 = 64;

fn leaves(massif_height: u8) -> Result<u64> {
    Ok(mmr::leaves_per_massif(massif_height)?)
}

/// Bytes in the bloom-filter region: four bitsets of `ceil(10*N/8)` bytes.
pub fn bloom_len(massif_height: u8) -> Result<u64> {
    let n = leaves(massif_height)?;
    Ok(4 * ((10 * n + 7) / 8))
}

pub fn frontier_start(massif_height: u8) -> Result<u64> {
    Ok(FIXED_HEADER_SIZE + INDEX_HEADER_SIZE + bloom_len(massif_height)?)
}

pub fn leaf_table_start(massif_height: u8) -> Result<u64> {
    Ok(frontier_start(massif_height)? + FRONTIER_SIZE)
}

pub fn node_store_start(massif_height: u8) -> Result<u64> {
    Ok(leaf_table_start(massif_height)? + LEAF_RECORD_SIZE * leaves(massif_height)?)
}

pub fn peak_stack_start(massif_height: u8) -> Result<u64> {
    let n = leaves(massif_height)?;
    Ok(node_store_start(massif_height)? + 64 * (2 * n - 1))
}

/// Offset of the log-data region: 32 bytes per MMR node, starting at the
/// massif's first MMR index.
pub fn log_data_start(massif_height: u8) -> Result<u64> {
    Ok(peak_stack_start(massif_height)? + PEAK_STACK_SLOTS * NODE_SIZE)
}

/// The decoded fixed header of a massif blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MassifHeader {
    pub last_id: u64,
    pub version: u16,
    pub commitment_epoch: u32,
    pub massif_height: u8,
    pub massif_index: u32,
}

impl MassifHeader {
    /// Decode from the head of a massif blob.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 32 {
            return Err(Error::Format("shorter than the fixed header"));
        }
        Ok(Self {
            last_id: u64::from_be_bytes(data[8..16].try_into().unwrap()),
            version: u16::from_be_bytes(data[21..23].try_into().unwrap()),
            commitment_epoch: u32::from_be_bytes(data[23..27].try_into().unwrap()),
            massif_height: data[27],
            massif_index: u32::from_be_bytes(data[28..32].try_into().unwrap()),
        })
    }

    /// Encode into the first 32 bytes of a fixed header.
    pub fn encode(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[8..16].copy_from_slice(&self.last_id.to_be_bytes());
        out[21..23].copy_from_slice(&self.version.to_be_bytes());
        out[23..27].copy_from_slice(&self.commitment_epoch.to_be_bytes());
        out[27] = self.massif_height;
        out[28..32].copy_from_slice(&self.massif_index.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn offsets_for_height_three() {
        // N = 4 leaves: bloom is 4 * ceil(40/8) = 20 bytes.
        assert_eq!(bloom_len(3).unwrap(), 20);
        assert_eq!(frontier_start(3).unwrap(), 256 + 32 + 20);
        assert_eq!(leaf_table_start(3).unwrap(), 308 + 544);
        assert_eq!(node_store_start(3).unwrap(), 852 + 128 * 4);
        assert_eq!(peak_stack_start(3).unwrap(), 1364 + 64 * 7);
        assert_eq!(log_data_start(3).unwrap(), 1812 + 2048);
    }

    #[test]
    fn offsets_for_height_fourteen() {
        // N = 8192: the production massif shape.
        assert_eq!(bloom_len(14).unwrap(), 4 * 10240);
        assert_eq!(leaf_table_start(14).unwrap(), 256 + 32 + 40960 + 544);
        assert_eq!(
            log_data_start(14).unwrap(),
            41792 + 128 * 8192 + 64 * (2 * 8192 - 1) + 2048,
        );
    }

    #[test]
    fn header_round_trips() {
        let header = MassifHeader {
            last_id: 0x0102030405060708,
            version: 2,
            commitment_epoch: 1,
            massif_height: 14,
            massif_index: 9,
        };
        assert_eq!(MassifHeader::parse(&header.encode()).unwrap(), header);
        assert!(MassifHeader::parse(&[0u8; 16]).is_err());
    }
}
