use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use ordpay_common::{parse_boolean_flag, Secret};
use ordpay_engine::{
    helpers::RetryPolicy,
    order_objects::OrderFlowConfig,
    reconciliation_objects::ReconciliationConfig,
    RateLimit,
};

const DEFAULT_ORDPAY_HOST: &str = "127.0.0.1";
const DEFAULT_ORDPAY_PORT: u16 = 8460;
const DEFAULT_CURRENCY: &str = "NGN";
const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.paystack.co";
const DEFAULT_PROVIDER_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const DEFAULT_VERIFY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_IDEMPOTENCY_WINDOW: Duration = Duration::minutes(10);
const DEFAULT_UNPAID_ORDER_TIMEOUT: Duration = Duration::hours(24);
const DEFAULT_CREATE_ORDER_LIMIT: &str = "30/hour";
const DEFAULT_VERIFY_PAYMENT_LIMIT: &str = "60/hour";
const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Every order is priced and charged in this currency
    pub currency: String,
    pub provider: ProviderConfig,
    /// Provider calls per verification request, including the first
    pub verify_max_attempts: u32,
    pub idempotency_window: Duration,
    /// The time before an unpaid order is considered abandoned and cancelled.
    pub unpaid_order_timeout: Duration,
    pub create_order_limit: RateLimit,
    pub verify_payment_limit: RateLimit,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    pub event_buffer_size: usize,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub base_url: String,
    /// The provider API key. Webhook signatures are keyed with it too.
    pub secret_key: Secret<String>,
    pub timeout: StdDuration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_BASE_URL.to_string(),
            secret_key: Secret::default(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ORDPAY_HOST.to_string(),
            port: DEFAULT_ORDPAY_PORT,
            database_url: String::default(),
            currency: DEFAULT_CURRENCY.to_string(),
            provider: ProviderConfig::default(),
            verify_max_attempts: DEFAULT_VERIFY_MAX_ATTEMPTS,
            idempotency_window: DEFAULT_IDEMPOTENCY_WINDOW,
            unpaid_order_timeout: DEFAULT_UNPAID_ORDER_TIMEOUT,
            create_order_limit: RateLimit::per_hour(30),
            verify_payment_limit: RateLimit::per_hour(60),
            use_x_forwarded_for: false,
            use_forwarded: false,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

/// The subset of the configuration that request handlers need.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("ORDPAY_HOST").ok().unwrap_or_else(|| DEFAULT_ORDPAY_HOST.into());
        let port = parse_env("ORDPAY_PORT", DEFAULT_ORDPAY_PORT);
        let database_url = env::var("ORDPAY_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ ORDPAY_DATABASE_URL is not set. Please set it to the URL for the order database.");
            String::default()
        });
        let currency = env::var("ORDPAY_CURRENCY")
            .ok()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.into());
        let provider = ProviderConfig::from_env_or_defaults();
        let verify_max_attempts = match parse_env("ORDPAY_VERIFY_MAX_ATTEMPTS", DEFAULT_VERIFY_MAX_ATTEMPTS) {
            0 => {
                warn!("🪛️ ORDPAY_VERIFY_MAX_ATTEMPTS must be at least 1. Using 1.");
                1
            },
            n => n,
        };
        let idempotency_window =
            Duration::minutes(parse_env("ORDPAY_IDEMPOTENCY_WINDOW_MINS", DEFAULT_IDEMPOTENCY_WINDOW.num_minutes()));
        let unpaid_order_timeout =
            Duration::hours(parse_env("ORDPAY_UNPAID_ORDER_TIMEOUT", DEFAULT_UNPAID_ORDER_TIMEOUT.num_hours()));
        let create_order_limit = parse_limit("ORDPAY_RATE_LIMIT_CREATE_ORDER", DEFAULT_CREATE_ORDER_LIMIT);
        let verify_payment_limit = parse_limit("ORDPAY_RATE_LIMIT_VERIFY_PAYMENT", DEFAULT_VERIFY_PAYMENT_LIMIT);
        let use_x_forwarded_for = parse_boolean_flag(env::var("ORDPAY_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("ORDPAY_USE_FORWARDED").ok(), false);
        let event_buffer_size = parse_env("ORDPAY_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE);
        Self {
            host,
            port,
            database_url,
            currency,
            provider,
            verify_max_attempts,
            idempotency_window,
            unpaid_order_timeout,
            create_order_limit,
            verify_payment_limit,
            use_x_forwarded_for,
            use_forwarded,
            event_buffer_size,
        }
    }

    pub fn order_flow_config(&self) -> OrderFlowConfig {
        OrderFlowConfig {
            currency: self.currency.clone(),
            idempotency_window: self.idempotency_window,
            create_order_limit: self.create_order_limit,
        }
    }

    pub fn reconciliation_config(&self) -> ReconciliationConfig {
        let defaults = ReconciliationConfig::default();
        ReconciliationConfig {
            provider_timeout: self.provider.timeout,
            retry: RetryPolicy { max_attempts: self.verify_max_attempts, ..defaults.retry },
            verify_limit: self.verify_payment_limit,
        }
    }
}

impl ProviderConfig {
    pub fn from_env_or_defaults() -> Self {
        let base_url = env::var("ORDPAY_PROVIDER_BASE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_PROVIDER_BASE_URL.into());
        let secret_key = env::var("ORDPAY_PROVIDER_SECRET_KEY").ok().map(Secret::new).unwrap_or_else(|| {
            error!(
                "🪛️ ORDPAY_PROVIDER_SECRET_KEY is not set. Payments cannot be verified and every webhook will be \
                 ignored."
            );
            Secret::default()
        });
        let timeout =
            StdDuration::from_secs(parse_env("ORDPAY_PROVIDER_TIMEOUT_SECS", DEFAULT_PROVIDER_TIMEOUT.as_secs()));
        Self { base_url, secret_key, timeout }
    }
}

fn parse_env<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

fn parse_limit(name: &str, default: &str) -> RateLimit {
    let fallback = || RateLimit::parse(default).unwrap_or_else(|_| RateLimit::per_hour(30));
    match env::var(name) {
        Ok(s) => RateLimit::parse(&s).unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid rate limit for {name}. {e} Using the default, {default}, instead.");
            fallback()
        }),
        Err(_) => fallback(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn engine_configs_follow_the_server_config() {
        let config = ServerConfig {
            currency: "GHS".into(),
            verify_max_attempts: 5,
            verify_payment_limit: RateLimit::per_minute(2),
            ..ServerConfig::new("0.0.0.0", 9000)
        };
        let flow = config.order_flow_config();
        assert_eq!(flow.currency, "GHS");
        assert_eq!(flow.idempotency_window, Duration::minutes(10));
        let reconciliation = config.reconciliation_config();
        assert_eq!(reconciliation.retry.max_attempts, 5);
        assert_eq!(reconciliation.provider_timeout, StdDuration::from_secs(10));
        assert_eq!(reconciliation.verify_limit, RateLimit::per_minute(2));
    }

    #[test]
    fn bad_limits_fall_back_to_the_default() {
        env::set_var("ORDPAY_TEST_LIMIT", "many/fortnight");
        assert_eq!(parse_limit("ORDPAY_TEST_LIMIT", "30/hour"), RateLimit::per_hour(30));
        env::set_var("ORDPAY_TEST_LIMIT", "5/minute");
        assert_eq!(parse_limit("ORDPAY_TEST_LIMIT", "30/hour"), RateLimit::per_minute(5));
        env::remove_var("ORDPAY_TEST_LIMIT");
    }
}
