//! Per-request caller identity.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

/// Header carrying the operator acting on the request.
pub const OPERATOR_HEADER: &str = "x-operator-id";

const MAX_OPERATOR_ID_LEN: usize = 128;

/// Identity of the caller, taken from the `x-operator-id` header.
///
/// Authentication happens upstream; this only carries the identity through
/// to writes (`created_by`) and logs. A missing header means an anonymous
/// caller.
///
/// ```ignore
/// async fn my_handler(ctx: RequestContext) -> AppResult<Json<()>> {
///     tracing::info!(operator = ?ctx.operator_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub operator_id: Option<String>,
}

impl RequestContext {
    pub fn operator(&self) -> Option<&str> {
        self.operator_id.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(OPERATOR_HEADER) else {
            return Ok(Self::default());
        };

        let value = raw
            .to_str()
            .map_err(|_| AppError::BadRequest(format!("{OPERATOR_HEADER} must be visible ASCII")))?
            .trim();
        if value.len() > MAX_OPERATOR_ID_LEN {
            return Err(AppError::BadRequest(format!(
                "{OPERATOR_HEADER} must be at most {MAX_OPERATOR_ID_LEN} characters"
            )));
        }

        Ok(Self {
            operator_id: (!value.is_empty()).then(|| value.to_string()),
        })
    }
}
