//! `GET /.well-known/scitt-configuration`: the service descriptor.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::App;

pub async fn handle_configuration(State(app): State<Arc<App>>) -> Json<serde_json::Value> {
    let origin = &app.cfg.origin;
    Json(serde_json::json!({
        "issuer": origin,
        "registration_endpoint": format!("{origin}/logs/{{logId}}/entries"),
        "nonce_endpoint": null,
        "registration_policy": "unauthenticated",
        "supported_signature_algorithms": ["ES256"],
        "service_documentation":
            "https://datatracker.ietf.org/doc/draft-ietf-scitt-scrapi/",
    }))
}
