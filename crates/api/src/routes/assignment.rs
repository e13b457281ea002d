//! Route definitions for the `/assignments` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::assignment;
use crate::state::AppState;

/// Routes mounted at `/assignments`.
///
/// ```text
/// POST   /                  -> create
/// GET    /due               -> list_due
/// GET    /{id}              -> get_by_id
/// DELETE /{id}              -> delete
/// POST   /{id}/start        -> start
/// POST   /{id}/pause        -> pause
/// POST   /{id}/resume       -> resume
/// POST   /{id}/complete     -> complete
/// GET    /{id}/events       -> list_events
/// POST   /{id}/events       -> record_event
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(assignment::create))
        .route("/due", get(assignment::list_due))
        .route(
            "/{id}",
            get(assignment::get_by_id).delete(assignment::delete),
        )
        .route("/{id}/start", post(assignment::start))
        .route("/{id}/pause", post(assignment::pause))
        .route("/{id}/resume", post(assignment::resume))
        .route("/{id}/complete", post(assignment::complete))
        .route(
            "/{id}/events",
            get(assignment::list_events).post(assignment::record_event),
        )
}
