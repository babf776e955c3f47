use mockall::mock;
use ordpay_engine::{
    db_types::PaymentReference,
    provider::{ChargeStatus, ParsedEvent, PaymentProvider, ProviderError},
};

mock! {
    pub Provider {}
    impl PaymentProvider for Provider {
        fn name(&self) -> &'static str;
        fn verify_signature(&self, payload: &[u8], signature: &str) -> bool;
        fn parse_event(&self, payload: &[u8]) -> Result<ParsedEvent, ProviderError>;
        async fn verify_transaction(&self, reference: &PaymentReference) -> Result<ChargeStatus, ProviderError>;
    }
}
