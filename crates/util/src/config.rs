use std::{env, fmt, net::SocketAddr, time::Duration};

use url::Url;

use super::DEFAULT_BIND_ADDR;

const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_MINIO_REGION: &str = "us-east-1";
const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_NOTIFY_QUEUE_CAPACITY: usize = 64;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone)]
pub struct ObjectStoreSettings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    pub secure: bool,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub timeout: Duration,
}

/// Runtime configuration resolved from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub object_store: ObjectStoreSettings,
    pub smtp: SmtpConfig,
    /// Primary recipient entries in resolution order.
    pub recipients: Vec<(String, String)>,
    pub default_receiver: Option<String>,
    pub max_upload_bytes: usize,
    pub notify_queue_capacity: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("environment", &self.environment)
            .field("database_max_connections", &self.database.max_connections)
            .field("object_store_endpoint", &self.object_store.endpoint)
            .field("object_store_bucket", &self.object_store.bucket)
            .field("smtp_host", &self.smtp.host)
            .field("smtp_port", &self.smtp.port)
            .field("recipients", &self.recipients.len())
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("notify_queue_capacity", &self.notify_queue_capacity)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Constructs the configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let environment =
            Environment::from_str(&get("APP_ENV").unwrap_or_else(|| "development".to_string()))?;
        let bind_addr = get("APP_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(ConfigError::BindAddress)?;

        let database = DatabaseConfig {
            url: database_url(&get)?,
            max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
        };

        let object_store = ObjectStoreSettings {
            endpoint: required(&get, "MINIO_ENDPOINT")?,
            access_key: required(&get, "MINIO_ACCESS_KEY")?,
            secret_key: required(&get, "MINIO_SECRET_KEY")?,
            bucket: required(&get, "MINIO_BUCKET")?,
            region: get("MINIO_REGION").unwrap_or_else(|| DEFAULT_MINIO_REGION.to_string()),
            secure: get("MINIO_SECURE")
                .map(|value| parse_flag(&value))
                .unwrap_or(false),
            connect_timeout: Duration::from_secs(parse_or(
                &get,
                "STORAGE_CONNECT_TIMEOUT_SECS",
                10,
            )?),
            timeout: Duration::from_secs(parse_or(&get, "STORAGE_TIMEOUT_SECS", 30)?),
        };

        let username = get("SMTP_USER");
        let smtp = SmtpConfig {
            host: get("SMTP_SERVER").unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string()),
            port: parse_or(&get, "SMTP_PORT", DEFAULT_SMTP_PORT)?,
            password: get("SMTP_PASSWORD"),
            from: get("SMTP_FROM").or_else(|| username.clone()),
            timeout: Duration::from_secs(parse_or(&get, "SMTP_TIMEOUT_SECS", 10)?),
            username: username.clone(),
        };

        let mut recipients = match get("RECIPIENT_MAP") {
            Some(raw) => parse_recipient_map(&raw)?,
            None => Vec::new(),
        };
        for (key, domain) in [
            ("GK_EMAIL", "gktechnologies.com"),
            ("DBTECH_EMAIL", "dglobaltech.com"),
        ] {
            if let Some(address) = get(key) {
                recipients.push((domain.to_string(), address));
            }
        }
        if let Some(address) = username {
            recipients.push(("localhost".to_string(), address));
        }

        let max_upload_bytes = parse_or(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        if max_upload_bytes == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "MAX_UPLOAD_BYTES",
                value: "0".to_string(),
            });
        }
        let notify_queue_capacity =
            parse_or(&get, "NOTIFY_QUEUE_CAPACITY", DEFAULT_NOTIFY_QUEUE_CAPACITY)?.max(1);

        Ok(Self {
            bind_addr,
            environment,
            database,
            object_store,
            smtp,
            recipients,
            default_receiver: get("CONTACT_DEFAULT_RECEIVER"),
            max_upload_bytes,
            notify_queue_capacity,
        })
    }
}

fn required<G>(get: &G, key: &'static str) -> Result<String, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(key).ok_or(ConfigError::Missing(key))
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        None => Ok(default),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Uses `DATABASE_URL` verbatim, otherwise assembles a postgres URL from parts.
fn database_url<G>(get: &G) -> Result<String, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(url) = get("DATABASE_URL") {
        return Ok(url);
    }

    let host = get("DB_HOST").ok_or(ConfigError::Missing("DATABASE_URL or DB_HOST"))?;
    let name = required(get, "DB_NAME")?;
    let port: u16 = parse_or(get, "DB_PORT", DEFAULT_DB_PORT)?;

    let mut url = Url::parse(&format!("postgres://{host}:{port}"))
        .map_err(|err| ConfigError::DatabaseUrl(err.to_string()))?;
    url.set_path(&name);
    if let Some(user) = get("DB_USER") {
        url.set_username(&user)
            .map_err(|_| ConfigError::DatabaseUrl("DB_USER cannot be used".to_string()))?;
    }
    if let Some(password) = get("DB_PASSWORD") {
        url.set_password(Some(&password))
            .map_err(|_| ConfigError::DatabaseUrl("DB_PASSWORD cannot be used".to_string()))?;
    }
    Ok(url.to_string())
}

/// Parses `domain=address` pairs separated by `;` or `,`.
fn parse_recipient_map(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut entries = Vec::new();
    for pair in raw.split([';', ',']) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (domain, address) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::RecipientMap(pair.to_string()))?;
        let (domain, address) = (domain.trim(), address.trim());
        if domain.is_empty() {
            return Err(ConfigError::RecipientMap(pair.to_string()));
        }
        if address.is_empty() {
            continue;
        }
        entries.push((domain.to_ascii_lowercase(), address.to_string()));
    }
    Ok(entries)
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    Missing(&'static str),
    InvalidNumber { key: &'static str, value: String },
    DatabaseUrl(String),
    RecipientMap(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::Missing(key) => write!(f, "{key} must be set"),
            Self::InvalidNumber { key, value } => {
                write!(f, "{key} must be a positive number (got {value})")
            }
            Self::DatabaseUrl(reason) => write!(f, "invalid database settings: {reason}"),
            Self::RecipientMap(entry) => {
                write!(f, "RECIPIENT_MAP entries must look like domain=address (got {entry})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
