//! Paystack wire format.
//!
//! Webhooks are signed with HMAC-SHA512 over the raw request body, keyed with the account's secret key, and the hex
//! digest is sent in the `x-paystack-signature` header. Amounts are in the currency's minor unit.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use log::*;
use ordpay_common::Secret;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha512;

use crate::{
    db_types::Money,
    provider::{ChargeDetails, ChargeStatus, ParsedEvent, ProviderError, ProviderEvent, RefundDetails},
};

type HmacSha512 = Hmac<Sha512>;

pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";
pub const PAYSTACK_PROVIDER_NAME: &str = "paystack";

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    data: Value,
}

/// Paystack sends some ids as numbers and others as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PaystackId {
    Number(i64),
    Text(String),
}

impl Display for PaystackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaystackTransaction {
    id: PaystackId,
    status: String,
    reference: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    paid_at: Option<DateTime<Utc>>,
}

impl PaystackTransaction {
    fn into_details(self, raw: &str) -> ChargeDetails {
        ChargeDetails {
            reference: self.reference.into(),
            provider_reference: self.id.to_string(),
            amount: Money::from(self.amount),
            currency: self.currency.to_ascii_uppercase(),
            channel: self.channel,
            paid_at: self.paid_at,
            raw: raw.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaystackRefund {
    id: PaystackId,
    transaction_reference: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<PaystackTransaction>,
}

/// Signature checks and payload decoding for Paystack. Holds no connection; the HTTP client is the caller's concern.
#[derive(Clone, Default)]
pub struct PaystackCodec {
    secret_key: Secret<String>,
}

impl PaystackCodec {
    pub fn new(secret_key: Secret<String>) -> Self {
        Self { secret_key }
    }

    /// The hex-encoded HMAC-SHA512 of `payload`, as Paystack would compute it.
    pub fn sign(&self, payload: &[u8]) -> Result<String, ProviderError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Checks a webhook signature in constant time.
    pub fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        if self.secret_key.is_unset() {
            warn!("💰️ No provider secret key is configured. All webhook signatures will be rejected.");
            return false;
        }
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }

    fn mac(&self) -> Result<HmacSha512, ProviderError> {
        HmacSha512::new_from_slice(self.secret_key.reveal().as_bytes())
            .map_err(|e| ProviderError::NotConfigured(format!("Invalid secret key. {e}")))
    }

    pub fn parse_event(&self, payload: &[u8]) -> Result<ParsedEvent, ProviderError> {
        let raw = std::str::from_utf8(payload).map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
        let id = envelope
            .data
            .get("id")
            .and_then(|v| serde_json::from_value::<PaystackId>(v.clone()).ok())
            .ok_or_else(|| ProviderError::MalformedPayload("the event data has no id".into()))?;
        let event_id = format!("{}:{id}", envelope.event);
        let malformed = |e: serde_json::Error| ProviderError::MalformedPayload(format!("{}: {e}", envelope.event));
        let event = match envelope.event.as_str() {
            "charge.success" => {
                let tx: PaystackTransaction = serde_json::from_value(envelope.data.clone()).map_err(malformed)?;
                ProviderEvent::ChargeSucceeded(tx.into_details(raw))
            },
            "charge.failed" => {
                let tx: PaystackTransaction = serde_json::from_value(envelope.data.clone()).map_err(malformed)?;
                ProviderEvent::ChargeFailed(tx.into_details(raw))
            },
            "refund.processed" => {
                let refund: PaystackRefund = serde_json::from_value(envelope.data.clone()).map_err(malformed)?;
                ProviderEvent::RefundProcessed(RefundDetails {
                    reference: refund.transaction_reference.into(),
                    provider_reference: format!("refund-{}", refund.id),
                    amount: Money::from(refund.amount),
                    currency: refund.currency.to_ascii_uppercase(),
                    raw: raw.to_string(),
                })
            },
            other => {
                debug!("💰️ Ignoring unsupported Paystack event type {other}");
                ProviderEvent::Unsupported
            },
        };
        Ok(ParsedEvent { event_id, event_type: envelope.event, event })
    }

    /// Decodes the body of a `GET /transaction/verify/{reference}` response.
    pub fn parse_verification(&self, body: &str) -> Result<ChargeStatus, ProviderError> {
        let response: VerifyResponse =
            serde_json::from_str(body).map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
        let tx = match (response.status, response.data) {
            (true, Some(tx)) => tx,
            (_, _) => return Err(ProviderError::UnknownTransaction(response.message)),
        };
        match tx.status.as_str() {
            "success" => Ok(ChargeStatus::Succeeded(tx.into_details(body))),
            "failed" | "reversed" => Ok(ChargeStatus::Failed(tx.into_details(body))),
            // ongoing, pending, processing, queued, abandoned
            _ => Ok(ChargeStatus::Pending),
        }
    }
}
