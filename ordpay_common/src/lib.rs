//! Shared primitives for the ordering and payment engine: integer money amounts, masked secrets and small parsing
//! helpers used by configuration code.
mod helpers;
mod money;
mod secret;

pub mod op;

pub use helpers::{parse_boolean_flag, parse_rate_limit};
pub use money::{div_round_half_away, Money, MoneyConversionError, BPS_DENOMINATOR};
pub use secret::Secret;
