//! Centralized configuration for the session engine.
//!
//! All configuration is loaded from environment variables and validated
//! at startup. Recognized options only; nothing is reconfigured
//! mid-process.

use crate::error::AuthError;
use std::collections::HashSet;
use std::env;
use std::time::Duration;

/// Session engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Token settings
    /// Maximum session token lifetime (the `exp - iat` ceiling)
    pub token_lifetime: Duration,
    /// HS256 signing secret (32 bytes minimum)
    pub signing_key: Vec<u8>,

    // Rate limiting
    /// Request limit for general endpoints per window
    pub general_limit: u32,
    /// Window for general endpoints
    pub general_window: Duration,
    /// Request limit for authentication-class endpoints per window
    pub auth_limit: u32,
    /// Window for authentication-class endpoints
    pub auth_window: Duration,

    // Request filtering
    /// Client addresses that are rejected outright
    pub blocked_ips: HashSet<String>,
    /// Origins accepted for state-changing requests
    pub allowed_origins: HashSet<String>,

    // Maintenance
    /// Interval between revocation sweeps
    pub sweep_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();

        let token_lifetime = Duration::from_secs(parse_env("TOKEN_LIFETIME_SECS", 14_400)?);
        let signing_key = parse_signing_key()?;

        let general_limit = parse_env("RATE_LIMIT_GENERAL", 100)?;
        let general_window = Duration::from_secs(parse_env("RATE_WINDOW_GENERAL_SECS", 60)?);
        let auth_limit = parse_env("RATE_LIMIT_AUTH", 10)?;
        let auth_window = Duration::from_secs(parse_env("RATE_WINDOW_AUTH_SECS", 60)?);

        let blocked_ips = parse_list("BLOCKED_IPS");
        let allowed_origins = parse_list("ALLOWED_ORIGINS");

        let sweep_interval = Duration::from_secs(parse_env("REVOCATION_SWEEP_SECS", 300)?);

        Ok(Self {
            token_lifetime,
            signing_key,
            general_limit,
            general_window,
            auth_limit,
            auth_window,
            blocked_ips,
            allowed_origins,
            sweep_interval,
        })
    }
}

/// Parse environment variable with default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AuthError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated environment variable into a set.
fn parse_list(name: &str) -> HashSet<String> {
    env::var(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse the signing secret from the environment.
///
/// The secret is base64 and at least 32 bytes. A random key is generated
/// when unset so development instances start without configuration;
/// tokens then do not survive a restart.
fn parse_signing_key() -> Result<Vec<u8>, AuthError> {
    match env::var("SESSION_SIGNING_KEY") {
        Ok(key) => {
            let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &key)
                .map_err(|e| {
                    AuthError::Internal(anyhow::anyhow!("Invalid SESSION_SIGNING_KEY: {}", e))
                })?;

            if bytes.len() < 32 {
                return Err(AuthError::Internal(anyhow::anyhow!(
                    "SESSION_SIGNING_KEY must be at least 32 bytes, got {}",
                    bytes.len()
                )));
            }

            Ok(bytes)
        }
        Err(_) => {
            use rand::RngCore;
            let mut key = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut key);
            Ok(key)
        }
    }
}
