use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Could not reach the payment provider: {0}")]
    Unreachable(String),
    #[error("The payment provider did not respond in time")]
    Timeout,
    #[error("The payment provider returned an error ({status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("The payment provider does not know transaction {0}")]
    UnknownTransaction(String),
    #[error("Could not interpret the payment provider's payload: {0}")]
    MalformedPayload(String),
    #[error("The payment provider is not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether retrying the same call later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout => true,
            Self::Upstream { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
