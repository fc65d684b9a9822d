use crate::error::{Error, Result};
use crate::utils::crypto::is_password_hash;
use crate::utils::validation::FileLimits;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" => Ok(StoreBackend::Postgres),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    Memory,
    Local,
    Http,
}

impl FromStr for BlobBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BlobBackend::Memory),
            "local" => Ok(BlobBackend::Local),
            "http" => Ok(BlobBackend::Http),
            other => Err(format!("unknown blob backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub blob_backend: BlobBackend,
    pub uploads_dir: String,
    pub public_base_url: String,
    pub blob_http_url: Option<String>,
    pub blob_http_token: Option<String>,
    pub jwt_secret: String,
    pub admin_password_hash: String,
    pub session_ttl_minutes: u64,
    pub public_rps: u32,
    pub max_upload_bytes: usize,
    pub allowed_mime_types: Vec<String>,
    pub notification_ttl_secs: u64,
    pub sync_revert_secs: u64,
    pub connectivity_probe_secs: u64,
    pub feed_retry_secs: u64,
    pub log_format: LogFormat,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let defaults = FileLimits::default();
        let allowed_mime_types = match env::var("ALLOWED_MIME_TYPES") {
            Ok(raw) => raw
                .split(',')
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            Err(_) => defaults.allowed_types,
        };

        Ok(Self {
            server_address: get_env_or("SERVER_ADDRESS", "0.0.0.0:8000"),
            store_backend: get_env_parse_or("STORE_BACKEND", StoreBackend::Postgres)?,
            database_url: env::var("DATABASE_URL").ok(),
            blob_backend: get_env_parse_or("BLOB_BACKEND", BlobBackend::Local)?,
            uploads_dir: get_env_or("UPLOADS_DIR", "./uploads"),
            public_base_url: get_env_or("PUBLIC_BASE_URL", "http://localhost:8000"),
            blob_http_url: env::var("BLOB_HTTP_URL").ok(),
            blob_http_token: env::var("BLOB_HTTP_TOKEN").ok(),
            jwt_secret: get_env("JWT_SECRET")?,
            admin_password_hash: get_env("ADMIN_PASSWORD_HASH")?,
            session_ttl_minutes: get_env_parse_or("SESSION_TTL_MINUTES", 480)?,
            public_rps: get_env_parse_or("PUBLIC_RPS", 20)?,
            max_upload_bytes: get_env_parse_or("MAX_UPLOAD_BYTES", defaults.max_bytes)?,
            allowed_mime_types,
            notification_ttl_secs: get_env_parse_or("NOTIFICATION_TTL_SECS", 5)?,
            sync_revert_secs: get_env_parse_or("SYNC_REVERT_SECS", 3)?,
            connectivity_probe_secs: get_env_parse_or("CONNECTIVITY_PROBE_SECS", 15)?,
            feed_retry_secs: get_env_parse_or("FEED_RETRY_SECS", 5)?,
            log_format: get_env_parse_or("LOG_FORMAT", LogFormat::Text)?,
        })
    }

    /// Rejects combinations that would only fail later at first use.
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.trim().len() < 8 {
            return Err(Error::Config("JWT_SECRET must be at least 8 characters".into()));
        }
        if !is_password_hash(&self.admin_password_hash) {
            return Err(Error::Config(
                "ADMIN_PASSWORD_HASH must be an argon2 PHC string".into(),
            ));
        }
        if self.store_backend == StoreBackend::Postgres && self.database_url.is_none() {
            return Err(Error::Config(
                "DATABASE_URL is required when STORE_BACKEND=postgres".into(),
            ));
        }
        if self.blob_backend == BlobBackend::Http && self.blob_http_url.is_none() {
            return Err(Error::Config(
                "BLOB_HTTP_URL is required when BLOB_BACKEND=http".into(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("MAX_UPLOAD_BYTES must be positive".into()));
        }
        if self.allowed_mime_types.is_empty() {
            return Err(Error::Config("ALLOWED_MIME_TYPES must not be empty".into()));
        }
        if self.session_ttl_minutes == 0 {
            return Err(Error::Config("SESSION_TTL_MINUTES must be positive".into()));
        }
        Ok(())
    }

    pub fn file_limits(&self) -> FileLimits {
        FileLimits {
            max_bytes: self.max_upload_bytes,
            allowed_types: self.allowed_mime_types.clone(),
        }
    }

    /// Body limit for the multipart submission: five documents plus form fields.
    pub fn request_body_limit(&self) -> usize {
        self.max_upload_bytes.saturating_mul(5).saturating_add(64 * 1024)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_minutes.saturating_mul(60))
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_secs(self.notification_ttl_secs)
    }

    pub fn sync_revert(&self) -> Duration {
        Duration::from_secs(self.sync_revert_secs)
    }

    pub fn connectivity_probe_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity_probe_secs.max(1))
    }

    pub fn feed_retry(&self) -> Duration {
        Duration::from_secs(self.feed_retry_secs.max(1))
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    config.validate()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
