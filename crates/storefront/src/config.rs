//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FIREBASE_API_KEY` - Web API key of the Firebase project
//! - `FIREBASE_PROJECT_ID` - Firebase project id (Firestore database owner)
//! - `FIREBASE_STORAGE_BUCKET` - Cloud Storage bucket for product images
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_DATA_DIR` - Device-local state directory (default: .valfinds)
//! - `STOREFRONT_ADMIN_EMAIL` - Account treated as administrator (default: admin@valfinds.com)
//! - `CART_RECONCILE_INTERVAL_SECS` - Seconds between cart reconciliation passes (default: 300)
//! - `STORE_NAME` - Store name used in checkout messages (default: Val's Finds and Thrifts)
//! - `STORE_CURRENCY` - Currency code shown with prices (default: KES)
//! - `WHATSAPP_NUMBER` - Order recipient, international format (default: +254717514698)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use valfinds_core::Email;

use crate::services::checkout::CheckoutConfig;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

const DEFAULT_ADMIN_EMAIL: &str = "admin@valfinds.com";
const DEFAULT_STORE_NAME: &str = "Val's Finds and Thrifts";
const DEFAULT_CURRENCY: &str = "KES";
const DEFAULT_WHATSAPP_NUMBER: &str = "+254717514698";
const DEFAULT_RECONCILE_SECS: u64 = 300;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Directory holding the persisted session and per-user carts
    pub data_dir: PathBuf,
    /// Email of the administrator account
    pub admin_email: Email,
    /// Period of the cart's background reconciliation
    pub reconcile_interval: Duration,
    /// Firebase project configuration
    pub firebase: FirebaseConfig,
    /// Store identity used by checkout
    pub checkout: CheckoutConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Firebase project configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct FirebaseConfig {
    /// Web API key
    pub api_key: SecretString,
    /// Project id
    pub project_id: String,
    /// Storage bucket (e.g. `my-project.appspot.com`)
    pub storage_bucket: String,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("api_key", &"[REDACTED]")
            .field("project_id", &self.project_id)
            .field("storage_bucket", &self.storage_bucket)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through a variable lookup function.
    ///
    /// # Errors
    ///
    /// See [`StorefrontConfig::from_env`].
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Vars(lookup);

        let host = env
            .or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| invalid("STOREFRONT_HOST", &e))?;
        let port = env
            .or_default("STOREFRONT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| invalid("STOREFRONT_PORT", &e))?;
        let data_dir = PathBuf::from(env.or_default("STOREFRONT_DATA_DIR", ".valfinds"));
        let admin_email = env.or_default("STOREFRONT_ADMIN_EMAIL", DEFAULT_ADMIN_EMAIL);
        let admin_email =
            Email::parse(&admin_email).map_err(|e| invalid("STOREFRONT_ADMIN_EMAIL", &e))?;

        let reconcile_secs = env
            .or_default(
                "CART_RECONCILE_INTERVAL_SECS",
                &DEFAULT_RECONCILE_SECS.to_string(),
            )
            .parse::<u64>()
            .map_err(|e| invalid("CART_RECONCILE_INTERVAL_SECS", &e))?;
        if reconcile_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CART_RECONCILE_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let firebase = FirebaseConfig {
            api_key: env.validated_secret("FIREBASE_API_KEY")?,
            project_id: env.required("FIREBASE_PROJECT_ID")?,
            storage_bucket: env.required("FIREBASE_STORAGE_BUCKET")?,
        };

        let whatsapp_number = env.or_default("WHATSAPP_NUMBER", DEFAULT_WHATSAPP_NUMBER);
        if whatsapp_digits(&whatsapp_number).is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "WHATSAPP_NUMBER".to_string(),
                "must contain digits".to_string(),
            ));
        }

        let checkout = CheckoutConfig {
            store_name: env.or_default("STORE_NAME", DEFAULT_STORE_NAME),
            currency: env.or_default("STORE_CURRENCY", DEFAULT_CURRENCY),
            whatsapp_number,
        };

        Ok(Self {
            host,
            port,
            data_dir,
            admin_email,
            reconcile_interval: Duration::from_secs(reconcile_secs),
            firebase,
            checkout,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Digits of a phone number, as used in `wa.me` links.
pub(crate) fn whatsapp_digits(number: &str) -> String {
    number.chars().filter(char::is_ascii_digit).collect()
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable; blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Load and validate a secret.
    fn validated_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = self.required(key)?;
        validate_secret_strength(&value, key)?;
        Ok(SecretString::from(value))
    }
}

fn invalid(key: &str, error: &dyn std::fmt::Display) -> ConfigError {
    ConfigError::InvalidEnvVar(key.to_string(), error.to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Copy the key from the Firebase console."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const API_KEY: &str = "AIzaSyB7kQ2mX9vL4pN8rT1wZ5cF3hJ6dG0sE";

    fn load(vars: &[(&str, &str)]) -> Result<StorefrontConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        StorefrontConfig::from_vars(|key| vars.get(key).cloned())
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("FIREBASE_API_KEY", API_KEY),
            ("FIREBASE_PROJECT_ID", "valfinds"),
            ("FIREBASE_STORAGE_BUCKET", "valfinds.appspot.com"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = load(&required()).unwrap();

        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.data_dir, PathBuf::from(".valfinds"));
        assert_eq!(config.admin_email.as_str(), "admin@valfinds.com");
        assert_eq!(config.reconcile_interval, Duration::from_secs(300));
        assert_eq!(config.checkout.store_name, "Val's Finds and Thrifts");
        assert_eq!(config.checkout.currency, "KES");
        assert_eq!(config.checkout.whatsapp_number, "+254717514698");
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_missing_firebase_project() {
        let vars: Vec<_> = required()
            .into_iter()
            .filter(|(k, _)| *k != "FIREBASE_PROJECT_ID")
            .collect();
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "FIREBASE_PROJECT_ID"));
    }

    #[test]
    fn test_overrides() {
        let mut vars = required();
        vars.extend([
            ("STOREFRONT_PORT", "8080"),
            ("STOREFRONT_ADMIN_EMAIL", "owner@shop.test"),
            ("CART_RECONCILE_INTERVAL_SECS", "30"),
            ("STORE_CURRENCY", "USD"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.admin_email.as_str(), "owner@shop.test");
        assert_eq!(config.reconcile_interval, Duration::from_secs(30));
        assert_eq!(config.checkout.currency, "USD");
    }

    #[test]
    fn test_invalid_values() {
        let mut vars = required();
        vars.push(("STOREFRONT_PORT", "not-a-port"));
        assert!(matches!(load(&vars), Err(ConfigError::InvalidEnvVar(_, _))));

        let mut vars = required();
        vars.push(("CART_RECONCILE_INTERVAL_SECS", "0"));
        assert!(matches!(load(&vars), Err(ConfigError::InvalidEnvVar(_, _))));

        let mut vars = required();
        vars.push(("WHATSAPP_NUMBER", "+"));
        assert!(matches!(load(&vars), Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_placeholder_api_key_rejected() {
        let mut vars = required();
        vars[0] = ("FIREBASE_API_KEY", "your-firebase-api-key");
        assert!(matches!(load(&vars), Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_shannon_entropy() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy(API_KEY) > MIN_ENTROPY_BITS_PER_CHAR);
    }

    #[test]
    fn test_whatsapp_digits() {
        assert_eq!(whatsapp_digits("+254 717-514698"), "254717514698");
    }

    #[test]
    fn test_firebase_config_debug_redacts_key() {
        let config = load(&required()).unwrap();
        let debug_output = format!("{:?}", config.firebase);

        assert!(debug_output.contains("valfinds.appspot.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains(API_KEY));
    }
}
