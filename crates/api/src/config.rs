//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use domain::{Money, PriceTolerance};
use inventory::ReservationPolicy;
use payment::RAZORPAY_API_BASE;
use reconciliation::CoordinatorConfig;
use secrecy::SecretString;

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for human-readable
/// - `DATABASE_URL`: Postgres URL; unset runs on in-memory stores
/// - `RAZORPAY_KEY_ID`, `RAZORPAY_KEY_SECRET`, `RAZORPAY_BASE_URL`: gateway
///   credentials; without a key id the in-process gateway is used
/// - `CURRENCY` (default `INR`)
/// - `RESERVATION_TTL_SECS` (default `900`)
/// - `SWEEP_INTERVAL_SECS` (default `60`)
/// - `PRICE_TOLERANCE_PAISE` (default `0`)
/// - `CATALOG_FILE`: JSON catalog seed
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: SecretString,
    pub razorpay_base_url: String,
    pub currency: String,
    pub reservation_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub price_tolerance_paise: i64,
    pub catalog_file: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: parse(non_empty("PORT")).unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: non_empty("DATABASE_URL"),
            razorpay_key_id: non_empty("RAZORPAY_KEY_ID").unwrap_or_default(),
            razorpay_key_secret: non_empty("RAZORPAY_KEY_SECRET")
                .map(SecretString::from)
                .unwrap_or(defaults.razorpay_key_secret),
            razorpay_base_url: non_empty("RAZORPAY_BASE_URL").unwrap_or(defaults.razorpay_base_url),
            currency: non_empty("CURRENCY").unwrap_or(defaults.currency),
            reservation_ttl_secs: parse(non_empty("RESERVATION_TTL_SECS"))
                .unwrap_or(defaults.reservation_ttl_secs),
            sweep_interval_secs: parse(non_empty("SWEEP_INTERVAL_SECS"))
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(defaults.sweep_interval_secs),
            price_tolerance_paise: parse(non_empty("PRICE_TOLERANCE_PAISE"))
                .filter(|paise: &i64| *paise >= 0)
                .unwrap_or(defaults.price_tolerance_paise),
            catalog_file: non_empty("CATALOG_FILE").map(PathBuf::from),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when real gateway credentials were supplied.
    pub fn uses_razorpay(&self) -> bool {
        !self.razorpay_key_id.is_empty()
    }

    pub fn reservation_policy(&self) -> ReservationPolicy {
        let secs = i64::try_from(self.reservation_ttl_secs).unwrap_or(i64::MAX);
        ReservationPolicy::new(ChronoDuration::seconds(secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            currency: self.currency.clone(),
            price_tolerance: PriceTolerance::new(Money::from_paise(self.price_tolerance_paise)),
        }
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            razorpay_key_id: String::new(),
            razorpay_key_secret: SecretString::from(String::new()),
            razorpay_base_url: RAZORPAY_API_BASE.to_string(),
            currency: "INR".to_string(),
            reservation_ttl_secs: 900,
            sweep_interval_secs: 60,
            price_tolerance_paise: 0,
            catalog_file: None,
        }
    }
}
