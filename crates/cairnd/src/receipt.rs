//! `GET /logs/{logId}/{massifHeight}/entries/{entryIdHex}/receipt`:
//! assemble a COSE receipt with an inclusion proof.
//!
//! The checkpoint carries pre-signed peak receipts; assembly picks the one
//! covering the entry and grafts the inclusion proof into its unprotected
//! header. Missing checkpoint, stale checkpoint, missing massif and massif
//! metadata mismatch all fold into a single 404, distinguished only by the
//! problem detail.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use wire::{EntryId, LogId};

use crate::problem::Problem;
use crate::App;

const RECEIPT_CONTENT_TYPE: &str = "application/scitt-receipt+cbor";

pub async fn handle_receipt(
    State(app): State<Arc<App>>,
    Path((log_id, massif_height, entry_id)): Path<(String, String, String)>,
) -> Result<Response, Problem> {
    let log_id: LogId = log_id
        .parse()
        .map_err(|_| Problem::bad_request("log id must be a UUID"))?;
    let massif_height: u8 = massif_height
        .parse()
        .ok()
        .filter(|h| (1..=64).contains(h))
        .ok_or_else(|| Problem::bad_request("massif height must be in 1..=64"))?;
    let entry_id: EntryId = entry_id
        .parse()
        .map_err(|_| Problem::bad_request("entry id must be 32 lowercase hex characters"))?;
    let mmr_index = entry_id.mmr_index;

    let massif_index = mmr::massif_index_from_mmr_index(massif_height, mmr_index)
        .map_err(|_| Problem::bad_request("entry id is out of range"))?;

    // The checkpoint gates everything: no checkpoint, no receipt.
    let checkpoint_key = massif::checkpoint_key(massif_height, &log_id, massif_index);
    let checkpoint = match app.store.get(&checkpoint_key).await {
        Ok(bytes) => massif::Checkpoint::parse(&bytes).map_err(|err| {
            tracing::error!(%log_id, massif_index, error = %err, "corrupt checkpoint");
            Problem::internal("checkpoint decode failed")
        })?,
        Err(blob::Error::NotFound(_)) => {
            return Err(Problem::not_found("no checkpoint for this massif"));
        }
        Err(err) => {
            tracing::error!(%log_id, error = %err, "checkpoint read failed");
            return Err(Problem::internal("checkpoint read failed"));
        }
    };
    if !checkpoint.covers(mmr_index) {
        return Err(Problem::not_found("checkpoint does not yet cover the entry"));
    }

    let massif_key = massif::massif_key(massif_height, &log_id, massif_index);
    let massif = match app.reader.fetch(&massif_key).await {
        Ok(massif) => massif,
        Err(massif::Error::Blob(blob::Error::NotFound(_))) => {
            return Err(Problem::not_found("no massif for this entry"));
        }
        Err(err) => {
            tracing::error!(%log_id, error = %err, "massif read failed");
            return Err(Problem::internal("massif read failed"));
        }
    };
    let massif_header = massif.header();
    if massif_header.massif_height != massif_height || massif_header.massif_index as u64 != massif_index
    {
        return Err(Problem::not_found("massif metadata does not match the request"));
    }

    let nodes = massif
        .node_store()
        .map_err(|err| Problem::internal(format!("massif peak stack: {err}")))?;
    let proof = mmr::inclusion_proof(&nodes, checkpoint.mmr_size - 1, mmr_index)
        .map_err(|err| Problem::internal(format!("inclusion proof: {err}")))?;

    let leaf_count = mmr::peaks_bitmap(checkpoint.mmr_size);
    let peak_index = mmr::peak_index(leaf_count, proof.len() as u32) as usize;
    let peak_receipt = checkpoint
        .peak_receipts
        .get(peak_index)
        .ok_or_else(|| Problem::internal("checkpoint lacks the covering peak receipt"))?;

    let receipt = wire::graft_inclusion_proof(peak_receipt, mmr_index, &proof)
        .map_err(|err| Problem::internal(format!("receipt assembly: {err}")))?;

    Ok((
        [(header::CONTENT_TYPE, RECEIPT_CONTENT_TYPE)],
        receipt,
    )
        .into_response())
}
