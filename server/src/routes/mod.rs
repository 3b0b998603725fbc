//! HTTP route table: probes at the root, the sync API under `/sync`.

mod health;
mod sync;

use crate::AppState;
use axum::Router;

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .nest("/sync", sync::routes())
}
