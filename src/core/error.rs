use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Main application error type
///
/// Variants mirror the failure categories surfaced to API clients:
/// configuration, initialization, verification, callback, refund, signature,
/// currency, amount, availability and network errors all map onto fixed HTTP
/// status codes with a JSON envelope.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Validation errors for business rules
    #[error("Validation error: {0}")]
    Validation(String),

    /// Amount outside configured transaction limits
    #[error("Amount error: {0}")]
    Amount(String),

    /// Unsupported or mismatched currency
    #[error("Currency error: {0}")]
    Currency(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Payment gateway errors (initialization, verification, refund calls)
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Gateway disabled or not registered
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Webhook signature rejected
    #[error("Signature verification failed: {0}")]
    Signature(String),

    /// Malformed or unprocessable webhook callback payload
    #[error("Callback error: {0}")]
    Callback(String),

    /// Refund rejected by business rules
    #[error("Refund error: {0}")]
    Refund(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unauthorized access
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// State conflict (duplicate webhook claim, payment in progress)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP client errors reaching a gateway
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        HttpResponse::build(status_code).json(serde_json::json!({
            "error": {
                "message": error_message,
                "code": status_code.as_u16(),
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Amount(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Currency(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayUnavailable(_) => StatusCode::BAD_REQUEST,
            AppError::Signature(_) => StatusCode::UNAUTHORIZED,
            AppError::Callback(_) => StatusCode::BAD_REQUEST,
            AppError::Refund(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Network(_) => StatusCode::BAD_GATEWAY,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn amount(msg: impl Into<String>) -> Self {
        AppError::Amount(msg.into())
    }

    pub fn currency(msg: impl Into<String>) -> Self {
        AppError::Currency(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        AppError::Gateway(msg.into())
    }

    pub fn unavailable(gateway: impl Into<String>) -> Self {
        AppError::GatewayUnavailable(gateway.into())
    }

    pub fn signature(msg: impl Into<String>) -> Self {
        AppError::Signature(msg.into())
    }

    pub fn callback(msg: impl Into<String>) -> Self {
        AppError::Callback(msg.into())
    }

    pub fn refund(msg: impl Into<String>) -> Self {
        AppError::Refund(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
