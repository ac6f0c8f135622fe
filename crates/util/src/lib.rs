pub mod config;

pub use config::{
    AppConfig, ConfigError, DatabaseConfig, Environment, ObjectStoreSettings, SmtpConfig,
};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Loads environment variables from `.env` when available.
///
/// Missing files are ignored so the function is safe in production builds
/// where dotenv files are not deployed.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}
