//! `GET /logs/{logId}/entries/{contentHashHex}`: resolve a statement's
//! sequencing status.
//!
//! The sequencing queue retains acked rows for a cleanup horizon, so it
//! doubles as the resolver cache: a hit yields the entry's log coordinates
//! and the response redirects to the receipt URL; a miss means "still
//! pending" and redirects back here for the client to poll.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use wire::{ContentHash, EntryId, LogId};

use crate::problem::Problem;
use crate::App;

pub async fn handle_status(
    State(app): State<Arc<App>>,
    Path((log_id, content_hash)): Path<(String, String)>,
) -> Result<Response, Problem> {
    let log_id: LogId = log_id
        .parse()
        .map_err(|_| Problem::bad_request("log id must be a UUID"))?;
    let content_hash: ContentHash = content_hash
        .parse()
        .map_err(|_| Problem::bad_request("content hash must be 64 hex characters"))?;

    let found = app
        .queue
        .shard_for(&log_id)
        .resolve_content(content_hash)
        .await?;

    let poll_again = format!(
        "{}/logs/{log_id}/entries/{content_hash}",
        app.cfg.origin,
    );
    let Some(sequenced) = found else {
        return Ok(see_other(poll_again));
    };

    let height = app.cfg.massif_height;
    let key = massif::massif_key(height, &log_id, sequenced.massif_index);
    let idtimestamp = match app
        .reader
        .read_leaf_idtimestamp(&key, height, sequenced.leaf_index)
        .await
    {
        Ok(idtimestamp) => idtimestamp,
        // Sequenced, but the massif object is not visible yet: report the
        // entry as still in flight rather than failing the poll loop.
        Err(massif::Error::Blob(blob::Error::NotFound(_))) => {
            return Ok(see_other(poll_again));
        }
        Err(err) => {
            tracing::error!(%log_id, error = %err, "leaf table read failed");
            return Err(Problem::internal("massif read failed"));
        }
    };

    let entry_id = EntryId::new(idtimestamp, mmr::mmr_index(sequenced.leaf_index));
    let receipt = format!(
        "{}/logs/{log_id}/{height}/entries/{entry_id}/receipt",
        app.cfg.origin,
    );
    Ok(see_other(receipt))
}

fn see_other(location: String) -> Response {
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, location),
            (header::RETRY_AFTER, "5".to_string()),
        ],
    )
        .into_response()
}
