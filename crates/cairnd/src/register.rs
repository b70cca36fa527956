//! `POST /logs/{logId}/entries`: validate and admit a signed statement.
//!
//! The queue row is the canonical ingress record; the content-addressed
//! leaf cache is written best-effort as overflow. Success is a 303 whose
//! `Location` is the statement's transient status URL: per SCRAPI
//! convention the content hash is the operation id.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use wire::{ContentHash, LogId};

use crate::body::RawBody;
use crate::problem::Problem;
use crate::App;

const COSE_CONTENT_TYPE: &str = "application/cose";
const CBOR_CONTENT_TYPE: &str = "application/cbor";

#[derive(serde::Deserialize)]
struct RegisterBody {
    #[serde(rename = "signedStatement", with = "serde_bytes")]
    signed_statement: Vec<u8>,
}

pub async fn handle_register(
    State(app): State<Arc<App>>,
    Path(log_id): Path<String>,
    headers: HeaderMap,
    RawBody(body): RawBody,
) -> Result<Response, Problem> {
    let log_id: LogId = log_id
        .parse()
        .map_err(|_| Problem::bad_request("log id must be a UUID"))?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let statement: Bytes = if content_type.starts_with(COSE_CONTENT_TYPE) {
        body
    } else if content_type.starts_with(CBOR_CONTENT_TYPE) {
        let wrapper: RegisterBody = wire::from_cbor(&body)
            .map_err(|_| Problem::bad_request("body must be a CBOR map with signedStatement"))?;
        wrapper.signed_statement.into()
    } else {
        return Err(Problem::unsupported_media_type(format!(
            "content type must be {COSE_CONTENT_TYPE} or {CBOR_CONTENT_TYPE}",
        )));
    };

    wire::sanity_check_sign1(&statement)
        .map_err(|_| Problem::bad_request("Invalid COSE Sign1 structure"))?;

    let content_hash = ContentHash::of(&statement);
    app.queue
        .shard_for(&log_id)
        .enqueue(log_id, content_hash, [None, None, None, None])
        .await?;

    // Overflow copy into the content-addressed leaf cache. The queue is
    // authoritative; a cache failure must not fail the registration.
    if let Err(err) = app
        .leaves
        .put(
            &log_id.to_string(),
            0,
            &content_hash.to_string(),
            statement,
            COSE_CONTENT_TYPE,
            queue::now_ms(),
        )
        .await
    {
        tracing::warn!(%log_id, error = %err, "leaf cache write failed");
    }

    let location = format!(
        "{}/logs/{log_id}/entries/{content_hash}",
        app.cfg.origin,
    );
    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, location),
            (header::RETRY_AFTER, "5".to_string()),
        ],
    )
        .into_response())
}
