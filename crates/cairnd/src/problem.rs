//! RFC 7807 problem-details responses. Failures surface at the HTTP
//! boundary only; handlers return `Result<Response, Problem>` and convert
//! domain errors with `From`/`?`.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

const TYPE_PREFIX: &str = "tag:cairn,2024:problems/";

#[derive(Debug)]
pub struct Problem {
    pub status: StatusCode,
    pub slug: &'static str,
    pub title: &'static str,
    pub detail: String,
}

impl Problem {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            slug: "invalid-request",
            title: "Invalid request",
            detail: detail.into(),
        }
    }

    pub fn unsupported_media_type(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
            slug: "unsupported-media-type",
            title: "Unsupported media type",
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            slug: "not-found",
            title: "Not found",
            detail: detail.into(),
        }
    }

    pub fn payload_too_large() -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            slug: "payload-too-large",
            title: "Payload too large",
            detail: "request body exceeds the service's size cap".to_string(),
        }
    }

    pub fn queue_full() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            slug: "queue-full",
            title: "Sequencing queue is full",
            detail: "the log's sequencing queue is at capacity; retry later".to_string(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            slug: "internal",
            title: "Internal error",
            detail: detail.into(),
        }
    }
}

impl From<queue::Error> for Problem {
    fn from(err: queue::Error) -> Self {
        match err {
            queue::Error::QueueFull => Problem::queue_full(),
            queue::Error::InvalidRequest(detail) => Problem::bad_request(detail),
            err @ (queue::Error::Sql(_) | queue::Error::Corrupt(_) | queue::Error::ShardClosed) => {
                tracing::error!(error = %err, "queue operation failed");
                Problem::internal("queue operation failed")
            }
        }
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = %self.detail, "request failed");
        }
        let body = serde_json::json!({
            "type": format!("{TYPE_PREFIX}{}", self.slug),
            "title": self.title,
            "status": self.status.as_u16(),
            "detail": self.detail,
        });
        (
            self.status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            body.to_string(),
        )
            .into_response()
    }
}
