//! Route definitions for `/research` aggregates.

use axum::routing::get;
use axum::Router;

use crate::handlers::research;
use crate::state::AppState;

/// Routes mounted at `/research`.
///
/// ```text
/// GET    /metrics                    -> metrics
/// GET    /adherence/{protocol_id}    -> protocol_adherence
/// GET    /patients                   -> patients
/// GET    /export                     -> export_get
/// POST   /export                     -> export_post
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/metrics", get(research::metrics))
        .route("/adherence/{protocol_id}", get(research::protocol_adherence))
        .route("/patients", get(research::patients))
        .route(
            "/export",
            get(research::export_get).post(research::export_post),
        )
}
