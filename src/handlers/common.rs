use axum::{extract::FromRequestParts, http::request::Parts};
use validator::Validate;

use crate::errors::ServiceError;

/// Header carrying the branch (tenant) scope for every request.
pub const BRANCH_ID_HEADER: &str = "x-branch-id";

/// Optional header identifying the cashier behind the till.
pub const CASHIER_ID_HEADER: &str = "x-cashier-id";

/// Branch scope extracted from the request headers. Every data access
/// is filtered by this id; cross-branch rows read as not-found.
#[derive(Debug, Clone, Copy)]
pub struct BranchContext {
    pub branch_id: i64,
    pub cashier_id: Option<i64>,
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for BranchContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let branch_id = parts
            .headers
            .get(BRANCH_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| ServiceError::ValidationError("Branch context is required.".into()))?;

        let cashier_id = parts
            .headers
            .get(CASHIER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());

        Ok(Self {
            branch_id,
            cashier_id,
        })
    }
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))
}
