//! Service configuration.
//!
//! Everything is read from the environment once at startup. Stripe secrets
//! may also come from a `.secrets/stripe.json` file; the environment wins when
//! both are present. Missing required values fail startup instead of falling
//! back to a default.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tokenpay_core::PriceTable;

/// Configuration errors raised while loading [`ServiceConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("missing required configuration: {0}")]
    MissingRequired(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Which persistence backend the service runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// Embedded `RocksDB` database under `data_dir`.
    RocksDb {
        /// Database directory.
        data_dir: String,
    },
    /// `PostgreSQL` reachable at `database_url`.
    Postgres {
        /// Connection string.
        database_url: String,
    },
    /// Process memory; balances are lost on restart.
    Memory,
}

impl StoreConfig {
    /// Backend name as accepted by `STORE_BACKEND`.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::RocksDb { .. } => "rocksdb",
            Self::Postgres { .. } => "postgres",
            Self::Memory => "memory",
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Public site URL; checkout redirects return here.
    pub base_url: String,

    /// Stripe secret API key.
    pub stripe_api_key: String,

    /// Stripe webhook signing secret (`whsec_...`).
    pub stripe_webhook_secret: String,

    /// Stripe API base URL (default: `https://api.stripe.com/v1`).
    pub stripe_api_base: String,

    /// Product name shown on the checkout page.
    pub product_name: String,

    /// Maximum accepted age (and future skew) of a webhook timestamp.
    pub webhook_tolerance_seconds: u32,

    /// Persistence backend.
    pub store: StoreConfig,

    /// Upper bound on a single settlement call.
    pub store_timeout_seconds: u64,

    /// Retries for a settlement that hit a lock conflict.
    pub store_max_retries: u32,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Purchasable packages.
    pub prices: PriceTable,
}

// Hand-written so secrets never reach a log line.
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("listen_addr", &self.listen_addr)
            .field("base_url", &self.base_url)
            .field("stripe_api_key", &"<redacted>")
            .field("stripe_webhook_secret", &"<redacted>")
            .field("stripe_api_base", &self.stripe_api_base)
            .field("product_name", &self.product_name)
            .field("webhook_tolerance_seconds", &self.webhook_tolerance_seconds)
            .field("store", &self.store.backend_name())
            .field("store_timeout_seconds", &self.store_timeout_seconds)
            .field("store_max_retries", &self.store_max_retries)
            .field("cors_origins", &self.cors_origins)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("prices", &self.prices)
            .finish()
    }
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

const STRIPE_SECRET_PATHS: [&str; 2] = [".secrets/stripe.json", "../.secrets/stripe.json"];

impl ServiceConfig {
    /// Load configuration from environment variables and the optional
    /// Stripe secrets file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secrets = load_stripe_secrets();

        Self::from_lookup(|key| {
            std::env::var(key).ok().or_else(|| {
                let secrets = secrets.as_ref()?;
                match key {
                    "STRIPE_API_KEY" => Some(secrets.api_key.clone()),
                    "STRIPE_WEBHOOK_SECRET" => secrets.webhook_secret.clone(),
                    _ => None,
                }
            })
        })
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let store = match env.optional("STORE_BACKEND").as_deref() {
            None | Some("rocksdb") => StoreConfig::RocksDb {
                data_dir: env.required("DATA_DIR")?,
            },
            Some("postgres") => StoreConfig::Postgres {
                database_url: env.required("DATABASE_URL")?,
            },
            Some("memory") => StoreConfig::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            listen_addr: env.or("LISTEN_ADDR", "0.0.0.0:8080"),
            base_url: env.required("BASE_URL")?,
            stripe_api_key: env.required("STRIPE_API_KEY")?,
            stripe_webhook_secret: env.required("STRIPE_WEBHOOK_SECRET")?,
            stripe_api_base: env.or("STRIPE_API_BASE", "https://api.stripe.com/v1"),
            product_name: env.or("PRODUCT_NAME", "Credits"),
            webhook_tolerance_seconds: env.positive("WEBHOOK_TOLERANCE_SECONDS", 300)?,
            store,
            store_timeout_seconds: env.positive("STORE_TIMEOUT_SECONDS", 10)?,
            store_max_retries: env.parsed("STORE_MAX_RETRIES", 3)?,
            cors_origins: env
                .or("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_body_bytes: env.parsed("MAX_BODY_BYTES", 1024 * 1024)?, // 1MB
            request_timeout_seconds: env.positive("REQUEST_TIMEOUT_SECONDS", 30)?,
            prices: PriceTable::reference(),
        })
    }

    /// Where the provider sends the buyer after a successful payment.
    #[must_use]
    pub fn success_url(&self) -> String {
        self.base_url.clone()
    }

    /// Where the provider sends the buyer after abandoning checkout.
    #[must_use]
    pub fn cancel_url(&self) -> String {
        format!("{}/upgrade", self.base_url.trim_end_matches('/'))
    }
}

/// Typed accessors over a string lookup. Blank values count as unset.
struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::MissingRequired(key))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
        }
    }

    /// Like [`Lookup::parsed`], but zero is rejected.
    fn positive<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Default + PartialEq + ToString,
    {
        let value = self.parsed(key, default)?;
        if value == T::default() {
            return Err(ConfigError::Invalid {
                key,
                value: value.to_string(),
            });
        }
        Ok(value)
    }
}

/// Load Stripe secrets from the first secrets file found.
fn load_stripe_secrets() -> Option<StripeSecrets> {
    for path in &STRIPE_SECRET_PATHS {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return Some(secrets);
        }
    }

    tracing::debug!("Stripe secrets file not found, using environment variables");
    None
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let contents = std::fs::read_to_string(Path::new(path))?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
