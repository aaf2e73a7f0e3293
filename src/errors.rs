use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::middleware_helpers::request_id::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Structured error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Domain error kinds for the POS service.
///
/// Each variant carries its own HTTP status mapping through `status_code`,
/// replacing the legacy practice of sniffing substrings out of exception
/// messages to decide the response code.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Product variant {0} not found")]
    VariantNotFound(String),

    #[error("Customer not found")]
    CustomerNotFound,

    #[error("Insufficient points. Available: {available}")]
    InsufficientPoints { available: i64 },

    #[error("Insufficient stock for {0}")]
    InsufficientStock(String),

    #[error("Invalid discounts: total amount cannot be negative")]
    InvalidDiscount,

    #[error("Invalid voucher code")]
    VoucherNotFound,

    #[error("Voucher is not yet valid")]
    VoucherNotYetValid,

    #[error("Voucher has expired")]
    VoucherExpired,

    #[error("Voucher usage limit reached")]
    VoucherLimitReached,

    #[error("Minimum order of Rp {0} required")]
    MinimumOrderNotMet(String),

    #[error("Voucher code already exists")]
    DuplicateVoucherCode,

    #[error("Sale already voided")]
    AlreadyVoided,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Internal server error")]
    InternalServerError,
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::InternalServerError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) | Self::VariantNotFound(_) | Self::CustomerNotFound => {
                StatusCode::NOT_FOUND
            }
            // Missing or malformed input, per the original API contract
            Self::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InsufficientPoints { .. }
            | Self::InsufficientStock(_)
            | Self::InvalidDiscount
            | Self::VoucherNotYetValid
            | Self::VoucherExpired
            | Self::VoucherLimitReached
            | Self::MinimumOrderNotMet(_) => StatusCode::BAD_REQUEST,
            Self::VoucherNotFound => StatusCode::NOT_FOUND,
            Self::DuplicateVoucherCode | Self::AlreadyVoided | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::InternalServerError => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.response_message();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware_helpers::request_id::{scope_request_id, RequestId};
    use axum::{body::to_bytes, http::StatusCode};

    #[tokio::test]
    async fn error_response_includes_request_id() {
        let response = scope_request_id(RequestId::new("req-123"), async {
            ServiceError::NotFound("missing".into()).into_response()
        })
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
    }

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::VariantNotFound("42".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::CustomerNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("Items are required".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InsufficientPoints { available: 10 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidDiscount.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::VoucherNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::VoucherExpired.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::DuplicateVoucherCode.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::AlreadyVoided.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InternalServerError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("stack trace".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::db_error("connection refused").response_message(),
            "Database error"
        );

        // User-facing errors keep the actual message
        assert_eq!(
            ServiceError::MinimumOrderNotMet("50.000".into()).response_message(),
            "Minimum order of Rp 50.000 required"
        );
        assert_eq!(
            ServiceError::InsufficientPoints { available: 250 }.response_message(),
            "Insufficient points. Available: 250"
        );
    }
}
