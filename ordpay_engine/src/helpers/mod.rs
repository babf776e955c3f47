mod hashing;
mod order_number;
mod retry;

pub use hashing::request_fingerprint;
pub use order_number::{generate_order_number, generate_payment_reference, ORDER_NUMBER_ATTEMPTS};
pub use retry::{retry_with_backoff, RetryPolicy};
