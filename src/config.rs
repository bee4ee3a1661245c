use crate::auth::keys::MIN_SECRET_LEN;
use crate::auth::verify::HashCost;
use base64::{engine::general_purpose, Engine as _};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use zeroize::Zeroizing;

/// Where accounts and revocations are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis { url: String },
}

#[derive(Clone)]
pub struct Config {
    // Signing key
    pub jwt_secret: Zeroizing<Vec<u8>>,
    pub jwt_key_id: String,

    // Token lifetimes (in seconds)
    pub jwt_expiration_secs: u64,
    pub jwt_key_grace_secs: u64,

    // Password hashing
    pub hash_cost: HashCost,

    // Storage
    pub store_backend: StoreBackend,
    pub store_timeout: Duration,
    pub revocation_prune_interval_secs: u64,

    // Server
    pub bind_addr: SocketAddr,

    // Bootstrap admin account
    pub admin_username: Option<String>,
    pub admin_password: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.store_backend {
            StoreBackend::Memory => "memory",
            StoreBackend::Redis { .. } => "redis",
        };
        f.debug_struct("Config")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_key_id", &self.jwt_key_id)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_key_grace_secs", &self.jwt_key_grace_secs)
            .field("hash_cost", &self.hash_cost)
            .field("store_backend", &backend)
            .field("store_timeout", &self.store_timeout)
            .field(
                "revocation_prune_interval_secs",
                &self.revocation_prune_interval_secs,
            )
            .field("bind_addr", &self.bind_addr)
            .field("admin_username", &self.admin_username)
            .field(
                "admin_password",
                &self.admin_password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        // Signing secret - JWT_SECRET is required
        let secret_b64 = Zeroizing::new(
            env::var("JWT_SECRET")
                .map_err(|_| ConfigError::MissingVar("JWT_SECRET".to_string()))?,
        );
        if secret_b64.is_empty() {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET".to_string(),
                "cannot be empty".to_string(),
            ));
        }
        let jwt_secret = Zeroizing::new(
            general_purpose::STANDARD
                .decode(secret_b64.trim())
                .map_err(|e| {
                    ConfigError::InvalidValue(
                        "JWT_SECRET".to_string(),
                        format!("invalid base64: {}", e),
                    )
                })?,
        );
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET".to_string(),
                format!(
                    "expected at least {} bytes, got {}",
                    MIN_SECRET_LEN,
                    jwt_secret.len()
                ),
            ));
        }

        let jwt_key_id = env::var("JWT_KEY_ID").unwrap_or_else(|_| "primary".to_string());
        if jwt_key_id.is_empty() {
            return Err(ConfigError::InvalidValue(
                "JWT_KEY_ID".to_string(),
                "cannot be empty".to_string(),
            ));
        }

        // Lifetimes
        let jwt_expiration_secs: u64 = parse_env_or_default("JWT_EXPIRATION_SECS", 3_600)?;
        if jwt_expiration_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "JWT_EXPIRATION_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let jwt_key_grace_secs = parse_env_or_default("JWT_KEY_GRACE_SECS", jwt_expiration_secs)?;

        // Argon2id cost
        let defaults = HashCost::default();
        let hash_cost = HashCost {
            memory_kib: parse_env_or_default("ARGON2_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_env_or_default("ARGON2_ITERATIONS", defaults.iterations)?,
            parallelism: parse_env_or_default("ARGON2_PARALLELISM", defaults.parallelism)?,
        };

        // Storage
        let backend_name = env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".to_string());
        let store_backend = match backend_name.to_ascii_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "redis" => {
                // Required to prevent silently falling back to a different store
                let url = env::var("REDIS_URL")
                    .map_err(|_| ConfigError::MissingVar("REDIS_URL".to_string()))?;
                StoreBackend::Redis { url }
            }
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORE_BACKEND".to_string(),
                    format!("expected memory or redis, got {}", other),
                ))
            }
        };
        let store_timeout =
            Duration::from_millis(parse_env_or_default("STORE_TIMEOUT_MS", 500)?);
        let revocation_prune_interval_secs =
            parse_env_or_default("REVOCATION_PRUNE_INTERVAL_SECS", 60)?;

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;

        // Bootstrap admin: both or neither
        let admin_username = env::var("ADMIN_USERNAME").ok().filter(|s| !s.is_empty());
        let admin_password = env::var("ADMIN_PASSWORD")
            .ok()
            .filter(|s| !s.is_empty())
            .map(Zeroizing::new);
        if admin_username.is_some() != admin_password.is_some() {
            return Err(ConfigError::InvalidValue(
                "ADMIN_USERNAME".to_string(),
                "ADMIN_USERNAME and ADMIN_PASSWORD must be set together".to_string(),
            ));
        }

        Ok(Config {
            jwt_secret,
            jwt_key_id,
            jwt_expiration_secs,
            jwt_key_grace_secs,
            hash_cost,
            store_backend,
            store_timeout,
            revocation_prune_interval_secs,
            bind_addr,
            admin_username,
            admin_password,
        })
    }
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
