use anyhow::{anyhow, Result};
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub app_mode: String,
    pub database_url: String,
    pub redis_url: String,
    pub s3_endpoint: String,
    pub s3_public_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_bucket: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub feed_limit: usize,
    pub image_max_width: u32,
    pub image_quality: u8,
    pub upload_max_bytes: usize,
    pub audit_interval_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let feed_limit: usize = env_or_parse("FEED_LIMIT", "50")?;
        if feed_limit == 0 {
            return Err(anyhow!("invalid FEED_LIMIT: must be positive"));
        }
        let image_max_width: u32 = env_or_parse("IMAGE_MAX_WIDTH", "1200")?;
        if image_max_width == 0 {
            return Err(anyhow!("invalid IMAGE_MAX_WIDTH: must be positive"));
        }
        let image_quality: u8 = env_or_parse("IMAGE_QUALITY", "80")?;
        if !(1..=100).contains(&image_quality) {
            return Err(anyhow!("invalid IMAGE_QUALITY: expected 1-100"));
        }

        Ok(Self {
            app_mode: env_or("APP_MODE", "feed"),
            database_url: env_or_err("DATABASE_URL")?,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1/"),
            s3_endpoint: env_or_err("S3_ENDPOINT")?,
            s3_public_endpoint: std::env::var("S3_PUBLIC_ENDPOINT").ok(),
            s3_region: env_or("S3_REGION", "fr-par"),
            s3_bucket: env_or_err("S3_BUCKET")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "10")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            feed_limit,
            image_max_width,
            image_quality,
            upload_max_bytes: env_or_parse("UPLOAD_MAX_BYTES", "5242880")?,
            audit_interval_seconds: env_or_parse("AUDIT_INTERVAL_SECONDS", "300")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}
