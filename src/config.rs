//! Configuration module for the book ingestion engine

use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;

use crate::auth::Credentials;
use crate::book::{LevelPricing, OrphanPolicy};
use crate::conversion::CurrencyConverter;
use crate::decimal::{self, DEFAULT_FRACTIONAL_DIGITS};
use crate::error::{IngestError, Result};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Feed endpoint (used to build the subscription, not dialed here)
    pub feed_endpoint: String,

    /// Recorded feed to replay; standard input when unset
    pub feed_file: Option<PathBuf>,

    /// Instruments to subscribe to (e.g., ["BTC-USD", "ETH-USD"])
    pub product_ids: Vec<String>,

    /// Channels to subscribe to
    pub channels: Vec<String>,

    /// Request path signed for the channel subscription
    pub signature_path: String,

    pub api_key: Option<String>,
    pub api_passphrase: Option<String>,
    pub api_secret: Option<String>,

    /// State store endpoint
    pub store_endpoint: String,

    /// Primary to secondary currency rate
    pub conversion_rate: Decimal,

    /// Display precision written with every record
    pub smallest_unit: String,

    /// Fractional digits kept when formatting decimals
    pub max_fractional_digits: u32,

    pub orphan_policy: OrphanPolicy,

    /// Drop incremental events for instruments without a snapshot
    pub require_snapshot: bool,

    /// Unix socket receiving snapshot audits
    pub audit_socket_path: Option<String>,

    /// Port for health, metrics and book queries
    pub http_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());
        let list = |name: &str, default: &str| -> Vec<String> {
            or(name, default)
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let conversion_rate = decimal::parse(&or("CONVERSION_RATE", "58.001"))
            .map_err(|e| IngestError::Config(format!("CONVERSION_RATE: {}", e)))?;
        if conversion_rate <= Decimal::ZERO {
            return Err(IngestError::Config(format!(
                "CONVERSION_RATE must be positive, got {}",
                conversion_rate
            )));
        }

        let smallest_unit = or("SMALLEST_UNIT", "0.0000001");
        decimal::parse(&smallest_unit).map_err(|e| IngestError::Config(format!("SMALLEST_UNIT: {}", e)))?;

        let max_fractional_digits = parse_var(&var, "MAX_FRACTIONAL_DIGITS", DEFAULT_FRACTIONAL_DIGITS)?;
        if max_fractional_digits > 28 {
            return Err(IngestError::Config(format!(
                "MAX_FRACTIONAL_DIGITS must be at most 28, got {}",
                max_fractional_digits
            )));
        }

        let product_ids = list("PRODUCT_IDS", "BTC-USD");
        if product_ids.is_empty() {
            return Err(IngestError::Config("PRODUCT_IDS is empty".to_string()));
        }

        Ok(Self {
            feed_endpoint: or("FEED_ENDPOINT", "wss://ws-direct.sandbox.exchange.coinbase.com"),
            feed_file: var("FEED_FILE").map(PathBuf::from),
            product_ids,
            channels: list("CHANNELS", "level2"),
            signature_path: or("SIGNATURE_PATH", "/users/self/verify"),
            api_key: var("API_KEY"),
            api_passphrase: var("API_PASSPHRASE"),
            api_secret: var("API_SECRET"),
            store_endpoint: or("STORE_ENDPOINT", "redis://127.0.0.1:6379"),
            conversion_rate,
            smallest_unit,
            max_fractional_digits,
            orphan_policy: or("ORPHAN_RECORDS", "delete").parse()?,
            require_snapshot: parse_var(&var, "REQUIRE_SNAPSHOT", false)?,
            audit_socket_path: var("AUDIT_SOCKET_PATH"),
            http_port: parse_var(&var, "HTTP_PORT", 9090)?,
        })
    }

    /// Venue credentials; all three values are required
    pub fn credentials(&self) -> Result<Credentials> {
        let require = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| IngestError::Config(format!("{} is not set", name)))
        };

        Ok(Credentials::new(
            require(&self.api_key, "API_KEY")?,
            require(&self.api_passphrase, "API_PASSPHRASE")?,
            require(&self.api_secret, "API_SECRET")?,
        ))
    }

    /// Level valuation settings
    pub fn pricing(&self) -> Result<LevelPricing> {
        Ok(LevelPricing::new(
            CurrencyConverter::new(self.conversion_rate)?,
            self.smallest_unit.clone(),
            self.max_fractional_digits,
        ))
    }
}

fn parse_var<T, F>(var: &F, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| IngestError::Config(format!("{}={:?}: {}", name, raw, e))),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_endpoint: "wss://ws-direct.sandbox.exchange.coinbase.com".to_string(),
            feed_file: None,
            product_ids: vec!["BTC-USD".to_string()],
            channels: vec!["level2".to_string()],
            signature_path: "/users/self/verify".to_string(),
            api_key: None,
            api_passphrase: None,
            api_secret: None,
            store_endpoint: "redis://127.0.0.1:6379".to_string(),
            conversion_rate: Decimal::new(58001, 3),
            smallest_unit: "0.0000001".to_string(),
            max_fractional_digits: DEFAULT_FRACTIONAL_DIGITS,
            orphan_policy: OrphanPolicy::Delete,
            require_snapshot: false,
            audit_socket_path: None,
            http_port: 9090,
        }
    }
}
