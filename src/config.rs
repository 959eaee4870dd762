use std::path::PathBuf;
use std::str::FromStr;
use anyhow::{Context, Result};
use dotenvy::dotenv;

// 10 MB in bytes
const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
// 30 days
const DEFAULT_SESSION_TTL_HOURS: i64 = 30 * 24;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub upload_dir: PathBuf,
    pub max_file_size: usize,
    pub session_ttl_hours: i64,
    pub client_url: String,
    /// Accounts registered with this address get the admin role.
    pub admin_email: Option<String>,
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        Ok(Config {
            host: env_or("HOST", "127.0.0.1".to_string())?,
            port: env_or("PORT", 5000)?,
            database_path: env_or("DATABASE_PATH", "sheet_analytics.db".to_string())?,
            upload_dir: env_or("UPLOAD_DIR", PathBuf::from("uploads"))?,
            max_file_size: env_or("MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
            session_ttl_hours: env_or("SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS)?,
            client_url: env_or("CLIENT_URL", "http://localhost:3000".to_string())?,
            admin_email: std::env::var("ADMIN_EMAIL")
                .ok()
                .map(|email| email.trim().to_lowercase())
                .filter(|email| !email.is_empty()),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn load_config() -> Result<Config> {
    Config::new()
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {}={:?}", key, raw)),
        Err(_) => Ok(default),
    }
}
