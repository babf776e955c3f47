//! # Ordering server
//! This crate hosts the HTTP surface of the ordering engine. It is responsible for:
//! * Accepting checkout submissions and turning them into priced orders.
//! * Receiving payment provider webhooks and handing them to the reconciliation engine.
//! * Letting the storefront ask for a payment to be verified when the customer returns from the payment page.
//! * Running the maintenance worker that cancels abandoned orders and clears out stale rate limit and idempotency data.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/orders`: Creates an order. An `Idempotency-Key` header is required.
//! * `/api/orders/{order_number}`: Fetches an order and its items.
//! * `/api/payments/verify/{reference}`: Asks the payment provider about a payment and applies the answer.
//! * `/webhooks/payments`: The payment provider webhook.
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod maintenance_worker;
pub mod paystack_client;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
