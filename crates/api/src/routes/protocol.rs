//! Route definitions for the `/protocols` resource.
//!
//! Step editing is nested under `/protocols/{id}/steps`.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{protocol, protocol_step};
use crate::state::AppState;

/// Routes mounted at `/protocols`.
///
/// ```text
/// GET    /                              -> list
/// POST   /                              -> create
/// GET    /{id}                          -> get_by_id
/// PUT    /{id}                          -> update
/// DELETE /{id}                          -> delete
/// GET    /{id}/with-steps               -> get_with_steps
/// GET    /{id}/validate                 -> validate
/// POST   /{id}/activate                 -> activate
/// POST   /{id}/pause                    -> pause
/// POST   /{id}/resume                   -> resume
/// POST   /{id}/revert-to-draft          -> revert_to_draft
/// POST   /{id}/complete                 -> complete
/// GET    /{id}/assignments              -> list_assignments
/// GET    /{id}/adherence                -> adherence
///
/// GET    /{id}/steps                    -> list
/// POST   /{id}/steps                    -> append
/// PUT    /{id}/steps                    -> replace
/// PUT    /{id}/steps/{order}            -> update
/// DELETE /{id}/steps/{order}            -> remove
/// POST   /{id}/steps/{order}/move       -> move_step
/// ```
pub fn router() -> Router<AppState> {
    let step_routes = Router::new()
        .route(
            "/",
            get(protocol_step::list)
                .post(protocol_step::append)
                .put(protocol_step::replace),
        )
        .route(
            "/{order}",
            put(protocol_step::update).delete(protocol_step::remove),
        )
        .route("/{order}/move", post(protocol_step::move_step));

    Router::new()
        .route("/", get(protocol::list).post(protocol::create))
        .route(
            "/{id}",
            get(protocol::get_by_id)
                .put(protocol::update)
                .delete(protocol::delete),
        )
        .route("/{id}/with-steps", get(protocol::get_with_steps))
        .route("/{id}/validate", get(protocol::validate))
        .route("/{id}/activate", post(protocol::activate))
        .route("/{id}/pause", post(protocol::pause))
        .route("/{id}/resume", post(protocol::resume))
        .route("/{id}/revert-to-draft", post(protocol::revert_to_draft))
        .route("/{id}/complete", post(protocol::complete))
        .route("/{id}/assignments", get(protocol::list_assignments))
        .route("/{id}/adherence", get(protocol::adherence))
        .nest("/{id}/steps", step_routes)
}
