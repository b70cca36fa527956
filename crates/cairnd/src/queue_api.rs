//! The ranger surface: `/queue/pull`, `/queue/ack` over CBOR and
//! `/queue/stats` over JSON.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use wire::{AckRequest, AckResponse, EntryRecord, LogGroup, LogId, PullRequest, PullResponse};

use crate::body::RawBody;
use crate::problem::Problem;
use crate::App;

const CBOR_CONTENT_TYPE: &str = "application/cbor";

/// The pull wire format is versioned; see [`wire::PullResponse`].
const PULL_VERSION: u64 = 1;

#[derive(serde::Deserialize)]
pub struct ShardSelector {
    #[serde(default)]
    shard: usize,
}

fn decode_cbor_body<T: serde::de::DeserializeOwned>(
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<T, Problem> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with(CBOR_CONTENT_TYPE) {
        return Err(Problem::unsupported_media_type(format!(
            "request body must be {CBOR_CONTENT_TYPE}",
        )));
    }
    wire::from_cbor(body).map_err(|err| Problem::bad_request(err.to_string()))
}

fn cbor_response<T: serde::Serialize>(value: &T) -> Result<Response, Problem> {
    let bytes =
        wire::to_cbor(value).map_err(|err| Problem::internal(format!("response encoding: {err}")))?;
    Ok(([(header::CONTENT_TYPE, CBOR_CONTENT_TYPE)], bytes).into_response())
}

pub async fn handle_pull(
    State(app): State<Arc<App>>,
    Query(selector): Query<ShardSelector>,
    headers: HeaderMap,
    RawBody(body): RawBody,
) -> Result<Response, Problem> {
    let request: PullRequest = decode_cbor_body(&headers, &body)?;
    if request.poller_id.is_empty() {
        return Err(Problem::bad_request("pollerId must not be empty"));
    }

    let shard = app
        .queue
        .shard_at(selector.shard)
        .ok_or_else(|| Problem::bad_request(format!("no shard {}", selector.shard)))?;
    let pull = shard
        .pull(request.poller_id, request.batch_size, request.visibility_ms)
        .await?;

    let groups = pull
        .groups
        .into_iter()
        .map(|group| LogGroup {
            log_id: group.log_id.as_bytes().to_vec(),
            seq_lo: group.seq_lo as u64,
            seq_hi: group.seq_hi as u64,
            entries: group
                .entries
                .into_iter()
                .map(|entry| EntryRecord {
                    content_hash: entry.content_hash.as_bytes().to_vec(),
                    extras: entry.extras,
                })
                .collect(),
        })
        .collect();

    cbor_response(&PullResponse {
        version: PULL_VERSION,
        lease_expiry_ms: pull.lease_expiry_ms as u64,
        groups,
    })
}

pub async fn handle_ack(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    RawBody(body): RawBody,
) -> Result<Response, Problem> {
    let request: AckRequest = decode_cbor_body(&headers, &body)?;

    let log_id = LogId::from_slice(&request.log_id)
        .map_err(|_| Problem::bad_request("logId must be 16 bytes"))?;
    let seq_lo = i64::try_from(request.seq_lo)
        .map_err(|_| Problem::bad_request("seqLo is out of range"))?;
    let massif_height = u8::try_from(request.massif_height)
        .ok()
        .filter(|h| (1..=64).contains(h))
        .ok_or_else(|| Problem::bad_request("massifHeight must be in 1..=64"))?;

    // The target shard is derived from the request body.
    let acked = app
        .queue
        .shard_for(&log_id)
        .ack_first(
            log_id,
            seq_lo,
            request.limit,
            request.first_leaf_index,
            massif_height,
        )
        .await?;

    cbor_response(&AckResponse { acked })
}

pub async fn handle_stats(State(app): State<Arc<App>>) -> Result<Response, Problem> {
    let stats = app.queue.stats().await?;
    Ok(axum::Json(stats).into_response())
}
