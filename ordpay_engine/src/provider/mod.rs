//! The payment provider boundary.
//!
//! Provider payloads are decoded into [`ProviderEvent`]s as soon as they arrive; the engine never inspects raw
//! provider JSON. The raw payload travels along only so that it can be stored for audit.
mod errors;
mod objects;
mod paystack;

pub use errors::ProviderError;
pub use objects::{ChargeDetails, ChargeStatus, ParsedEvent, ProviderEvent, RefundDetails};
pub use paystack::{PaystackCodec, PAYSTACK_PROVIDER_NAME, PAYSTACK_SIGNATURE_HEADER};

use crate::db_types::PaymentReference;

#[allow(async_fn_in_trait)]
pub trait PaymentProvider {
    /// Stored with each webhook event in the ledger
    fn name(&self) -> &'static str;

    /// Checks the webhook signature against the raw request body. Must run in constant time.
    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool;

    /// Decodes an authenticated webhook payload.
    fn parse_event(&self, payload: &[u8]) -> Result<ParsedEvent, ProviderError>;

    /// Asks the provider for the current state of the charge made against `reference`.
    async fn verify_transaction(&self, reference: &PaymentReference) -> Result<ChargeStatus, ProviderError>;
}
