use ciborium::value::Value;
use coset::{CborSerializable, CoseSign1, Label};

use crate::{Error, Result};

/// Unprotected-header label carrying an array of pre-signed peak receipts in
/// a checkpoint COSE_Sign1.
pub const PEAK_RECEIPTS_LABEL: i64 = -65931;

/// Unprotected-header label carrying inclusion proofs in a receipt
/// COSE_Sign1.
pub const RECEIPT_PROOF_LABEL: i64 = 396;

/// Key of `mmrSize` in a checkpoint's MMRState payload map.
pub const MMR_SIZE_KEY: u64 = 1;

/// Cheap structural check on registration input: a COSE_Sign1 is encoded as
/// a CBOR array of four elements, so its first byte is `0x84`.
///
/// Deliberately not a full parse, let alone signature verification; it only
/// keeps non-array payloads away from downstream consumers.
pub fn sanity_check_sign1(bytes: &[u8]) -> Result<()> {
    if bytes.first() != Some(&0x84) {
        return Err(Error::InvalidCoseSign1);
    }
    Ok(())
}

/// Decode a COSE_Sign1 from its untagged encoding.
pub fn parse_sign1(bytes: &[u8]) -> Result<CoseSign1> {
    sanity_check_sign1(bytes)?;
    CoseSign1::from_slice(bytes).map_err(|err| Error::Cose(err.to_string()))
}

/// Read `mmrSize` from a checkpoint's payload, a CBOR map with key 1.
pub fn checkpoint_mmr_size(checkpoint: &CoseSign1) -> Result<u64> {
    let payload = checkpoint
        .payload
        .as_deref()
        .ok_or(Error::CheckpointShape("checkpoint has no payload"))?;
    let state: Value = ciborium::de::from_reader(payload).map_err(|err| Error::Cbor(err.to_string()))?;
    let Value::Map(entries) = state else {
        return Err(Error::CheckpointShape("payload is not a map"));
    };
    for (key, value) in entries {
        if key.as_integer() != Some(MMR_SIZE_KEY.into()) {
            continue;
        }
        let size = value
            .as_integer()
            .and_then(|i| u64::try_from(i).ok())
            .ok_or(Error::CheckpointShape("mmrSize is not a uint"))?;
        return Ok(size);
    }
    Err(Error::CheckpointShape("payload has no mmrSize"))
}

/// Extract the pre-signed peak receipts from a checkpoint's unprotected
/// header: an array of byte strings at [`PEAK_RECEIPTS_LABEL`], each holding
/// an encoded COSE_Sign1.
pub fn peak_receipts(checkpoint: &CoseSign1) -> Result<Vec<Vec<u8>>> {
    let value = checkpoint
        .unprotected
        .rest
        .iter()
        .find(|(label, _)| *label == Label::Int(PEAK_RECEIPTS_LABEL))
        .map(|(_, value)| value)
        .ok_or(Error::CheckpointShape("no peak receipts header"))?;
    let Value::Array(items) = value else {
        return Err(Error::CheckpointShape("peak receipts are not an array"));
    };
    items
        .iter()
        .map(|item| {
            item.as_bytes()
                .cloned()
                .ok_or(Error::CheckpointShape("peak receipt is not a byte string"))
        })
        .collect()
}

/// Set the inclusion proof of a pre-signed peak receipt: the unprotected
/// header at [`RECEIPT_PROOF_LABEL`] becomes
/// `{-1: [{1: mmrIndex, 2: [node, ...]}]}`.
pub fn graft_inclusion_proof(
    receipt_bytes: &[u8],
    mmr_index: u64,
    proof: &[[u8; 32]],
) -> Result<Vec<u8>> {
    let mut receipt = parse_sign1(receipt_bytes)?;

    let nodes: Vec<Value> = proof.iter().map(|node| Value::Bytes(node.to_vec())).collect();
    let entry = Value::Map(vec![
        (Value::from(1u64), Value::from(mmr_index)),
        (Value::from(2u64), Value::Array(nodes)),
    ]);
    let proofs = Value::Map(vec![(Value::from(-1i64), Value::Array(vec![entry]))]);

    receipt
        .unprotected
        .rest
        .retain(|(label, _)| *label != Label::Int(RECEIPT_PROOF_LABEL));
    receipt
        .unprotected
        .rest
        .push((Label::Int(RECEIPT_PROOF_LABEL), proofs));

    receipt.to_vec().map_err(|err| Error::Cose(err.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use coset::{CoseSign1Builder, HeaderBuilder};

    fn encoded_sign1(payload: Vec<u8>) -> Vec<u8> {
        CoseSign1Builder::new()
            .payload(payload)
            .signature(vec![0x5a; 4])
            .build()
            .to_vec()
            .unwrap()
    }

    #[test]
    fn sanity_check_wants_an_array_of_four() {
        assert!(sanity_check_sign1(&encoded_sign1(vec![1, 2, 3])).is_ok());
        assert!(sanity_check_sign1(&[0xa1, 0x01, 0x02]).is_err());
        assert!(sanity_check_sign1(&[]).is_err());
    }

    #[test]
    fn checkpoint_fields_are_extracted() {
        let peak = encoded_sign1(vec![0x01]);
        let payload = crate::to_cbor(&ciborium::value::Value::Map(vec![(
            Value::from(1u64),
            Value::from(11u64),
        )]))
        .unwrap();
        let checkpoint = CoseSign1Builder::new()
            .unprotected(
                HeaderBuilder::new()
                    .value(PEAK_RECEIPTS_LABEL, Value::Array(vec![Value::Bytes(peak.clone())]))
                    .build(),
            )
            .payload(payload)
            .signature(vec![0x5a; 4])
            .build();

        assert_eq!(checkpoint_mmr_size(&checkpoint).unwrap(), 11);
        assert_eq!(peak_receipts(&checkpoint).unwrap(), vec![peak]);
    }

    #[test]
    fn checkpoint_without_mmr_size_is_rejected() {
        let checkpoint = CoseSign1Builder::new()
            .payload(crate::to_cbor(&Value::Map(vec![])).unwrap())
            .signature(vec![0x5a; 4])
            .build();
        assert!(matches!(
            checkpoint_mmr_size(&checkpoint),
            Err(Error::CheckpointShape(_)),
        ));
    }

    #[test]
    fn grafted_proof_lands_at_label_396() {
        let node = [0x77u8; 32];
        let receipt = encoded_sign1(vec![0x01]);
        let amended = graft_inclusion_proof(&receipt, 9, &[node]).unwrap();

        let parsed = parse_sign1(&amended).unwrap();
        let (_, proofs) = parsed
            .unprotected
            .rest
            .iter()
            .find(|(label, _)| *label == Label::Int(RECEIPT_PROOF_LABEL))
            .unwrap();

        let Value::Map(outer) = proofs else { panic!("not a map") };
        let (key, Value::Array(entries)) = &outer[0] else { panic!("no proof array") };
        assert_eq!(key.as_integer(), Some((-1i64).into()));
        let Value::Map(entry) = &entries[0] else { panic!("no proof entry") };
        assert_eq!(entry[0].1.as_integer(), Some(9u64.into()));
        let Value::Array(nodes) = &entry[1].1 else { panic!("no nodes") };
        assert_eq!(nodes[0].as_bytes().unwrap(), &node.to_vec());
    }
}
