//! # Order and payment engine public API
//!
//! The `engine_api` module exposes the programmatic API of the engine. It is modular, so that clients can pick the
//! functionality they need:
//!
//! * [`order_flow_api`] prices and stores new orders, cancels them, and expires orders that were never paid.
//! * [`pricing_api`] quotes a cart without creating anything.
//! * [`reconciliation_api`] applies payment provider webhooks and verification results to orders.
//! * [`rate_limiter`] gates the public operations with fixed windows and identifier reputation.
//!
//! # API usage
//!
//! Every API is created from a database backend implementing the storage traits it needs:
//!
//! ```rust,ignore
//! use ordpay_engine::{events::EventProducers, OrderFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/ordpay.db", 5).await?;
//! let api = OrderFlowApi::new(db, EventProducers::default(), Default::default());
//! let created = api.create_order(request, "checkout-7f3a").await?;
//! ```
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
pub mod pricing_api;
pub mod rate_limiter;
pub mod reconciliation_api;
pub mod reconciliation_objects;
