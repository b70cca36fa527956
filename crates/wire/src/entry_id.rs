use crate::Error;

/// The permanent identifier of a sequenced statement:
/// `idtimestamp_be8 ‖ mmrIndex_be8`, rendered as 32 lowercase hex characters
/// in URLs.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntryId {
    pub idtimestamp: u64,
    pub mmr_index: u64,
}

impl EntryId {
    pub fn new(idtimestamp: u64, mmr_index: u64) -> Self {
        Self {
            idtimestamp,
            mmr_index,
        }
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.idtimestamp.to_be_bytes());
        out[8..].copy_from_slice(&self.mmr_index.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self {
            idtimestamp: u64::from_be_bytes(bytes[..8].try_into().unwrap()),
            mmr_index: u64::from_be_bytes(bytes[8..].try_into().unwrap()),
        }
    }
}

impl std::str::FromStr for EntryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(Error::InvalidEntryId("must be 32 hex characters"));
        }
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(Error::InvalidEntryId("hex must be lowercase"));
        }
        let bytes =
            hex::decode(s).map_err(|_| Error::InvalidEntryId("must be 32 hex characters"))?;
        Ok(Self::from_bytes(bytes.as_slice().try_into().unwrap()))
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl std::fmt::Debug for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn known_entry_id_round_trips_through_hex() {
        let id = EntryId::new(0x0102030405060708, 0x1112131415161718);
        assert_eq!(id.to_string(), "01020304050607081112131415161718");
        assert_eq!(
            "01020304050607081112131415161718".parse::<EntryId>().unwrap(),
            id,
        );
    }

    #[test]
    fn malformed_entry_ids_are_rejected() {
        assert!("0102".parse::<EntryId>().is_err());
        assert!("0102030405060708111213141516171Z".parse::<EntryId>().is_err());
        assert!("01020304050607081112131415161718ab".parse::<EntryId>().is_err());
        // Uppercase hex is not a valid rendering.
        assert!("0A020304050607081112131415161718".parse::<EntryId>().is_err());
    }

    #[quickcheck]
    fn every_pair_round_trips(idtimestamp: u64, mmr_index: u64) -> bool {
        let id = EntryId::new(idtimestamp, mmr_index);
        let parsed: EntryId = id.to_string().parse().unwrap();
        parsed == id && EntryId::from_bytes(id.to_bytes()) == id
    }
}
