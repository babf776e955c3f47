//! A [`PaymentProvider`] that speaks the Paystack wire format but answers verification calls from a script.
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use ordpay_common::Secret;
use serde_json::json;

use crate::{
    db_types::{Money, PaymentReference},
    provider::{ChargeDetails, ChargeStatus, ParsedEvent, PaymentProvider, PaystackCodec, ProviderError},
};

pub const TEST_SECRET_KEY: &str = "sk_test_ordpay_secret";

#[derive(Clone)]
pub struct ScriptedProvider {
    codec: PaystackCodec,
    responses: Arc<Mutex<VecDeque<Result<ChargeStatus, ProviderError>>>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self {
            codec: PaystackCodec::new(Secret::from(TEST_SECRET_KEY)),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ScriptedProvider {
    /// Queues the answer to the next verification call. Once the script runs out, charges are reported as pending.
    pub fn push_response(&self, response: Result<ChargeStatus, ProviderError>) -> &Self {
        self.responses.lock().expect("poisoned").push_back(response);
        self
    }

    /// Every verification call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn verify_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Signs `payload` the way the provider would.
    pub fn sign(&self, payload: &str) -> String {
        self.codec.sign(payload.as_bytes()).expect("test key is valid")
    }
}

impl PaymentProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "paystack"
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        self.codec.verify_signature(payload, signature)
    }

    fn parse_event(&self, payload: &[u8]) -> Result<ParsedEvent, ProviderError> {
        self.codec.parse_event(payload)
    }

    async fn verify_transaction(&self, _reference: &PaymentReference) -> Result<ChargeStatus, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().expect("poisoned").pop_front();
        next.unwrap_or(Ok(ChargeStatus::Pending))
    }
}

pub fn charge(reference: &PaymentReference, provider_reference: &str, amount: Money) -> ChargeDetails {
    ChargeDetails {
        reference: reference.clone(),
        provider_reference: provider_reference.to_string(),
        amount,
        currency: "NGN".to_string(),
        channel: Some("card".to_string()),
        paid_at: None,
        raw: "{}".to_string(),
    }
}

/// A `charge.success` or `charge.failed` webhook body.
pub fn charge_payload(
    event: &str,
    provider_id: i64,
    reference: &PaymentReference,
    amount: Money,
    currency: &str,
) -> String {
    let status = if event == "charge.success" { "success" } else { "failed" };
    json!({
        "event": event,
        "data": {
            "id": provider_id,
            "domain": "test",
            "status": status,
            "reference": reference.as_str(),
            "amount": amount.value(),
            "currency": currency,
            "channel": "card",
            "paid_at": "2024-06-11T10:15:00.000Z",
        }
    })
    .to_string()
}

pub fn refund_payload(refund_id: i64, reference: &PaymentReference, amount: Money) -> String {
    json!({
        "event": "refund.processed",
        "data": {
            "id": refund_id,
            "status": "processed",
            "transaction_reference": reference.as_str(),
            "amount": amount.value(),
            "currency": "NGN",
        }
    })
    .to_string()
}
