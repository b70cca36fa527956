use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use blob::BlobStore;

use crate::layout::{
    leaf_table_start, log_data_start, peak_stack_start, MassifHeader, FIXED_HEADER_SIZE,
    LEAF_RECORD_SIZE, NODE_SIZE, PEAK_STACK_SLOTS,
};
use crate::{Error, Result};

/// Ranged reads over massif objects in a blob store.
pub struct MassifReader {
    store: Arc<dyn BlobStore>,
}

impl MassifReader {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Read and decode just the fixed header of a massif.
    pub async fn read_header(&self, key: &str) -> Result<MassifHeader> {
        let head = self.store.get_range(key, 0, FIXED_HEADER_SIZE).await?;
        MassifHeader::parse(&head)
    }

    /// Read the idtimestamp of one leaf: the first eight bytes of its
    /// 128-byte leaf-table record, big-endian.
    pub async fn read_leaf_idtimestamp(
        &self,
        key: &str,
        massif_height: u8,
        leaf_index: u64,
    ) -> Result<u64> {
        let slot = leaf_index % mmr::leaves_per_massif(massif_height)?;
        let offset = leaf_table_start(massif_height)? + slot * LEAF_RECORD_SIZE;
        let bytes = self.store.get_range(key, offset, 8).await?;
        let exact: [u8; 8] = bytes
            .as_ref()
            .try_into()
            .map_err(|_| Error::Format("leaf table record is truncated"))?;
        Ok(u64::from_be_bytes(exact))
    }

    /// Fetch a whole massif object for proof assembly.
    pub async fn fetch(&self, key: &str) -> Result<Massif> {
        let data = self.store.get(key).await?;
        Massif::parse(data)
    }
}

/// A fetched massif: decoded header plus the raw bytes, with offset-checked
/// accessors into its regions.
pub struct Massif {
    header: MassifHeader,
    first_index: u64,
    data: Bytes,
}

impl Massif {
    pub fn parse(data: Bytes) -> Result<Self> {
        let header = MassifHeader::parse(&data)?;
        let first_index =
            mmr::massif_first_index(header.massif_height, header.massif_index as u64)?;
        if (data.len() as u64) < log_data_start(header.massif_height)? {
            return Err(Error::Format("truncated before the log data region"));
        }
        Ok(Self {
            header,
            first_index,
            data,
        })
    }

    pub fn header(&self) -> &MassifHeader {
        &self.header
    }

    /// First MMR index held in this massif's log-data region.
    pub fn first_index(&self) -> u64 {
        self.first_index
    }

    fn node_at(&self, offset: u64) -> Result<mmr::Node> {
        let start = offset as usize;
        let end = start + NODE_SIZE as usize;
        if end > self.data.len() {
            return Err(Error::Format("node read past the end of the massif"));
        }
        Ok(self.data[start..end].try_into().unwrap())
    }

    /// The 32-byte node at `mmr_index`, which must be held by this massif.
    pub fn node(&self, mmr_index: u64) -> Result<mmr::Node> {
        if mmr_index < self.first_index {
            return Err(Error::IndexOutOfRange(mmr_index));
        }
        let offset = log_data_start(self.header.massif_height)?
            + (mmr_index - self.first_index) * NODE_SIZE;
        self.node_at(offset)
    }

    /// The ancestor peak stored at `position` in the peak stack.
    pub fn peak_stack_node(&self, position: u64) -> Result<mmr::Node> {
        if position >= PEAK_STACK_SLOTS {
            return Err(Error::Format("peak stack position out of range"));
        }
        let offset = peak_stack_start(self.header.massif_height)? + position * NODE_SIZE;
        self.node_at(offset)
    }

    /// A node store spanning this massif's log data and, for ancestor peaks
    /// of earlier massifs, its peak stack.
    pub fn node_store(&self) -> Result<MassifNodeStore<'_>> {
        let ancestors = mmr::peak_stack_map(self.header.massif_height, self.first_index)?;
        Ok(MassifNodeStore {
            massif: self,
            ancestors,
        })
    }
}

pub struct MassifNodeStore<'a> {
    massif: &'a Massif,
    ancestors: HashMap<u64, usize>,
}

impl mmr::NodeStore for MassifNodeStore<'_> {
    fn get(&self, mmr_index: u64) -> mmr::Result<mmr::Node> {
        if mmr_index >= self.massif.first_index {
            return self
                .massif
                .node(mmr_index)
                .map_err(|_| mmr::Error::IndexUnavailable(mmr_index));
        }
        let position = *self
            .ancestors
            .get(&mmr_index)
            .ok_or(mmr::Error::IndexUnavailable(mmr_index))?;
        self.massif
            .peak_stack_node(position as u64)
            .map_err(|_| mmr::Error::IndexUnavailable(mmr_index))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use blob::{BlobMeta, MemStore};

    /// Assemble the bytes of a height-3 massif whose log-data nodes are
    /// marker values and whose leaf table carries fixed idtimestamps.
    fn build_massif(massif_index: u32, node_count: u64) -> Bytes {
        let height = 3u8;
        let header = MassifHeader {
            last_id: 0x1000 + massif_index as u64,
            version: 2,
            commitment_epoch: 1,
            massif_height: height,
            massif_index,
        };
        let mut data = vec![0u8; log_data_start(height).unwrap() as usize];
        data[..32].copy_from_slice(&header.encode());

        // Leaf table: idtimestamp 0xA0 + slot in the record's first bytes.
        let leaf_table = leaf_table_start(height).unwrap() as usize;
        for slot in 0..4u64 {
            let offset = leaf_table + (slot * LEAF_RECORD_SIZE) as usize;
            data[offset..offset + 8].copy_from_slice(&(0xA0 + slot).to_be_bytes());
        }

        // Peak stack slot 0: a recognizable ancestor node.
        let peaks = peak_stack_start(height).unwrap() as usize;
        data[peaks..peaks + 32].copy_from_slice(&[0xEE; 32]);

        // Log data: node value = its local position, repeated.
        for local in 0..node_count {
            data.extend_from_slice(&[local as u8; 32]);
        }
        data.into()
    }

    #[tokio::test]
    async fn ranged_reads_decode_header_and_leaf_records() {
        let store = Arc::new(MemStore::new());
        store
            .put("m/0.log", build_massif(0, 7), BlobMeta::default())
            .await
            .unwrap();
        let reader = MassifReader::new(store);

        let header = reader.read_header("m/0.log").await.unwrap();
        assert_eq!(header.massif_height, 3);
        assert_eq!(header.massif_index, 0);
        assert_eq!(header.version, 2);

        assert_eq!(reader.read_leaf_idtimestamp("m/0.log", 3, 0).await.unwrap(), 0xA0);
        assert_eq!(reader.read_leaf_idtimestamp("m/0.log", 3, 2).await.unwrap(), 0xA2);
        // Leaf 6 of the log is slot 2 of its massif.
        assert_eq!(reader.read_leaf_idtimestamp("m/0.log", 3, 6).await.unwrap(), 0xA2);
    }

    #[tokio::test]
    async fn node_store_spans_log_data_and_peak_stack() {
        let store = Arc::new(MemStore::new());
        // Massif 1 at height 3 holds indexes 7..: its peak stack carries
        // the ancestor peak at index 6.
        store
            .put("m/1.log", build_massif(1, 4), BlobMeta::default())
            .await
            .unwrap();
        let reader = MassifReader::new(store);

        let massif = reader.fetch("m/1.log").await.unwrap();
        assert_eq!(massif.first_index(), 7);

        let nodes = massif.node_store().unwrap();
        use mmr::NodeStore as _;
        assert_eq!(nodes.get(7).unwrap(), [0u8; 32]);
        assert_eq!(nodes.get(9).unwrap(), [2u8; 32]);
        assert_eq!(nodes.get(6).unwrap(), [0xEE; 32]);
        assert!(nodes.get(5).is_err());
        assert!(nodes.get(11).is_err());
    }

    #[tokio::test]
    async fn truncated_massifs_are_rejected() {
        assert!(Massif::parse(Bytes::from(vec![0u8; 64])).is_err());
    }
}
