//! Route definitions for the `/patients` directory.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::patient;
use crate::state::AppState;

/// Routes mounted at `/patients`.
///
/// ```text
/// GET    /                      -> list
/// POST   /                      -> create
/// GET    /{id}                  -> get_by_id
/// PUT    /{id}/status           -> update_status
/// GET    /{id}/assignments      -> list_assignments
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(patient::list).post(patient::create))
        .route("/{id}", get(patient::get_by_id))
        .route("/{id}/status", put(patient::update_status))
        .route("/{id}/assignments", get(patient::list_assignments))
}
