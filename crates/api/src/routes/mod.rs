pub mod assignment;
pub mod health;
pub mod patient;
pub mod protocol;
pub mod research;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /protocols                                   list, create
/// /protocols/{id}                              get, update, delete
/// /protocols/{id}/with-steps                   definition with ordered steps
/// /protocols/{id}/validate                     violation report
/// /protocols/{id}/{activate,pause,resume,revert-to-draft,complete}
/// /protocols/{id}/steps                        list, append, replace
/// /protocols/{id}/steps/{order}                update, remove
/// /protocols/{id}/steps/{order}/move           move up/down
/// /protocols/{id}/assignments                  assignments of a protocol
/// /protocols/{id}/adherence                    per-protocol metrics
///
/// /assignments                                 create
/// /assignments/due                             due steps for delivery
/// /assignments/{id}                            get, delete
/// /assignments/{id}/{start,pause,resume,complete}
/// /assignments/{id}/events                     list, record
///
/// /patients                                    list, create
/// /patients/{id}                               get
/// /patients/{id}/status                        activate/deactivate
/// /patients/{id}/assignments                   assignments of a patient
///
/// /research/metrics                            dashboard summary
/// /research/adherence/{protocol_id}            per-protocol metrics
/// /research/patients                           per-patient adherence
/// /research/export                             event log export (GET, POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/protocols", protocol::router())
        .nest("/assignments", assignment::router())
        .nest("/patients", patient::router())
        .nest("/research", research::router())
}
