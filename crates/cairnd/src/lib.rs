//! The cairn service: HTTP ingress and sequencing surface of the
//! transparency log.
//!
//! Clients register signed statements and poll for receipts; sequencer
//! workers (rangers) pull leased batches from the sequencing queue and ack
//! them with their final log coordinates. Massifs and checkpoints are read
//! from object storage; the queue is the only mutable state the service
//! owns.

use std::sync::Arc;

use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod body;
pub mod problem;
mod queue_api;
mod receipt;
mod register;
mod status;
mod wellknown;

/// Service-level configuration shared by the handlers.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Externally visible origin prefixed to `Location` URLs, e.g.
    /// `https://logs.example.com`. Empty means relative URLs.
    pub origin: String,
    /// Massif height of the logs this deployment serves.
    pub massif_height: u8,
    /// Cap on registration bodies.
    pub max_body_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            origin: String::new(),
            massif_height: 14,
            max_body_bytes: 4 << 20,
        }
    }
}

/// Shared application state.
pub struct App {
    pub queue: queue::Router,
    pub store: Arc<dyn blob::BlobStore>,
    pub reader: massif::MassifReader,
    pub leaves: blob::leaves::LeafCache,
    pub cfg: ServiceConfig,
}

impl App {
    pub fn new(
        queue: queue::Router,
        store: Arc<dyn blob::BlobStore>,
        leaf_ttl: std::time::Duration,
        cfg: ServiceConfig,
    ) -> Self {
        Self {
            queue,
            reader: massif::MassifReader::new(store.clone()),
            leaves: blob::leaves::LeafCache::new(store.clone(), leaf_ttl),
            store,
            cfg,
        }
    }
}

/// Build the service router.
pub fn build_router(app: Arc<App>) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let max_body = app.cfg.max_body_bytes;
    axum::Router::new()
        .route("/logs/:log_id/entries", post(register::handle_register))
        .route(
            "/logs/:log_id/entries/:content_hash",
            get(status::handle_status),
        )
        .route(
            "/logs/:log_id/:massif_height/entries/:entry_id/receipt",
            get(receipt::handle_receipt),
        )
        .route(
            "/.well-known/scitt-configuration",
            get(wellknown::handle_configuration),
        )
        .route("/queue/pull", post(queue_api::handle_pull))
        .route("/queue/ack", post(queue_api::handle_ack))
        .route("/queue/stats", get(queue_api::handle_stats))
        .layer(axum::extract::DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app)
}
