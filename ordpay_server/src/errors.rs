use actix_web::{
    error::ResponseError,
    http::{
        header::{ContentType, RETRY_AFTER},
        StatusCode,
    },
    HttpResponse,
};
use log::error;
use ordpay_engine::{provider::ProviderError, OrderFlowError, ReconciliationError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("The Idempotency-Key header is required")]
    MissingIdempotencyKey,
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error(transparent)]
    OrderFlow(#[from] OrderFlowError),
    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),
}

impl ServerError {
    /// The stable machine-readable code returned in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequestBody(_) => "INVALID_REQUEST",
            Self::MissingIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
            Self::NoRecordFound(_) => "NOT_FOUND",
            Self::OrderFlow(e) => e.code(),
            Self::Reconciliation(e) => e.code(),
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OrderFlow(e) => e.is_retryable(),
            Self::Reconciliation(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// What the client is told. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::OrderFlow(OrderFlowError::Pricing(e)) => e.user_message(),
            Self::OrderFlow(OrderFlowError::Storage(_) | OrderFlowError::RateLimiter(_)) => {
                "Your order could not be placed right now. Please try again.".into()
            },
            Self::Reconciliation(e) => match e {
                ReconciliationError::RateLimited { .. } | ReconciliationError::OrderNotFound(_) => e.to_string(),
                ReconciliationError::Provider(ProviderError::UnknownTransaction(_)) => {
                    "The payment provider has no record of this payment".into()
                },
                _ if e.is_retryable() => "Payment could not be verified. Please retry.".into(),
                _ => "Payment could not be verified.".into(),
            },
            Self::InitializeError(_) |
            Self::BackendError(_) |
            Self::IOError(_) |
            Self::ConfigurationError(_) |
            Self::Unspecified(_) => "Something went wrong. Please retry.".into(),
            _ => self.to_string(),
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::OrderFlow(OrderFlowError::RateLimited { retry_after }) |
            Self::Reconciliation(ReconciliationError::RateLimited { retry_after }) => {
                Some(retry_after.as_secs().max(1))
            },
            _ => None,
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::MissingIdempotencyKey => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InitializeError(_) |
            Self::BackendError(_) |
            Self::IOError(_) |
            Self::ConfigurationError(_) |
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::OrderFlow(e) => match e {
                OrderFlowError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                OrderFlowError::Pricing(_) | OrderFlowError::InvalidIdempotencyKey(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                },
                OrderFlowError::IdempotencyConflict(_) | OrderFlowError::InvalidTransition { .. } => {
                    StatusCode::CONFLICT
                },
                OrderFlowError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Reconciliation(e) => match e {
                ReconciliationError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                ReconciliationError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
                ReconciliationError::Provider(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ Request failed with {status}. {self}");
        }
        let mut response = HttpResponse::build(status);
        response.insert_header(ContentType::json());
        if let Some(secs) = self.retry_after_secs() {
            response.insert_header((RETRY_AFTER, secs.to_string()));
        }
        let body = json!({ "code": self.code(), "message": self.public_message(), "retryable": self.is_retryable() });
        response.body(body.to_string())
    }
}
