//! Central route assembly.
//!
//! Module routers are merged into one tree here. The portal webhook and the
//! auth endpoints stay outside the session guard: the webhook authenticates
//! with its own bearer token, and login obviously cannot require a session.

use axum::{middleware, routing::get, Json, Router};
use std::sync::Arc;

use crate::auth::require_authentication_middleware;
use crate::shared::state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    let protected = Router::new()
        .merge(crate::leads::configure())
        .merge(crate::properties::configure())
        .merge(crate::campaigns::configure())
        .merge(crate::documents::configure())
        .merge(crate::people::configure())
        .merge(crate::portal::configure())
        .merge(crate::admin::configure())
        .layer(middleware::from_fn(require_authentication_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(crate::auth::configure())
        .merge(crate::portal::configure_webhook())
        .merge(protected)
}
