//! The HTTP side of the Paystack integration. Wire decoding and signature checks live in the engine's
//! [`PaystackCodec`]; this client only adds the verification call.
use std::sync::Arc;

use log::*;
use ordpay_engine::{
    db_types::PaymentReference,
    provider::{ChargeStatus, ParsedEvent, PaymentProvider, PaystackCodec, ProviderError, PAYSTACK_PROVIDER_NAME},
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Client,
    StatusCode,
};

use crate::{config::ProviderConfig, errors::ServerError};

#[derive(Clone)]
pub struct PaystackClient {
    codec: PaystackCodec,
    base_url: String,
    client: Arc<Client>,
}

impl std::fmt::Debug for PaystackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaystackClient ({})", self.base_url)
    }
}

impl PaystackClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ServerError> {
        let mut headers = HeaderMap::with_capacity(2);
        if !config.secret_key.is_unset() {
            let mut val = HeaderValue::from_str(&format!("Bearer {}", config.secret_key.reveal()))
                .map_err(|e| ServerError::ConfigurationError(format!("Invalid provider secret key. {e}")))?;
            val.set_sensitive(true);
            headers.insert(AUTHORIZATION, val);
        }
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        let codec = PaystackCodec::new(config.secret_key.clone());
        Ok(Self { codec, base_url: config.base_url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }

    fn verify_url(&self, reference: &PaymentReference) -> Result<String, ProviderError> {
        let valid = !reference.as_str().is_empty() &&
            reference.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !valid {
            return Err(ProviderError::UnknownTransaction(reference.to_string()));
        }
        Ok(format!("{}/transaction/verify/{}", self.base_url, reference.as_str()))
    }
}

impl PaymentProvider for PaystackClient {
    fn name(&self) -> &'static str {
        PAYSTACK_PROVIDER_NAME
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        self.codec.verify_signature(payload, signature)
    }

    fn parse_event(&self, payload: &[u8]) -> Result<ParsedEvent, ProviderError> {
        self.codec.parse_event(payload)
    }

    async fn verify_transaction(&self, reference: &PaymentReference) -> Result<ChargeStatus, ProviderError> {
        let url = self.verify_url(reference)?;
        trace!("💰️ Verifying {reference} with Paystack");
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Unreachable(e.without_url().to_string())
            }
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Unreachable(e.to_string())
            }
        })?;
        match status {
            s if s.is_success() => self.codec.parse_verification(&body),
            // Paystack answers unknown references with a `"status": false` envelope
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => self.codec.parse_verification(&body),
            s => {
                warn!("💰️ Paystack answered the verification of {reference} with {s}");
                Err(ProviderError::Upstream { status: s.as_u16(), message: truncate(&body, 200) })
            },
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}
