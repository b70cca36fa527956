//! Request-body extraction for the CBOR/COSE surfaces.
//!
//! Exceeding the service's body cap must surface as the `payload-too-large`
//! problem-details body, not axum's bare 413, so handlers take [`RawBody`]
//! instead of `Bytes` and the rejection is translated here.

use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use bytes::Bytes;

use crate::problem::Problem;

/// The raw request body, capped by the router's `DefaultBodyLimit` layer.
pub struct RawBody(pub Bytes);

#[axum::async_trait]
impl<S> FromRequest<S> for RawBody
where
    S: Send + Sync,
{
    type Rejection = Problem;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Bytes::from_request(req, state).await {
            Ok(bytes) => Ok(Self(bytes)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(Problem::payload_too_large())
            }
            Err(rejection) => Err(Problem::bad_request(rejection.body_text())),
        }
    }
}
