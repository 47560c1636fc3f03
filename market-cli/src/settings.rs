use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use market_client::{ClientConfig, MediaBackend};

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub anon_key: String,
    pub media_cloud_name: String,
    pub upload_preset: String,
    pub media_backend: MediaBackend,
    pub http_timeout_secs: u64,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let api_url = get_required("MARKET_API_URL").context("MARKET_API_URL is required")?;
        let anon_key = get_required("MARKET_ANON_KEY").context("MARKET_ANON_KEY is required")?;

        let media_cloud_name =
            std::env::var("MARKET_MEDIA_CLOUD").unwrap_or_else(|_| "demo".to_string());
        let upload_preset = std::env::var("MARKET_UPLOAD_PRESET")
            .unwrap_or_else(|_| "market_unsigned".to_string());
        let media_backend = MediaBackend::parse(
            &std::env::var("MARKET_MEDIA_BACKEND").unwrap_or_else(|_| "cloud".to_string()),
        )
        .context("Failed to parse MARKET_MEDIA_BACKEND")?;
        let http_timeout_secs = parse_positive(
            "MARKET_HTTP_TIMEOUT_SECS",
            &std::env::var("MARKET_HTTP_TIMEOUT_SECS").unwrap_or_else(|_| "15".to_string()),
        )?;
        let log_level = std::env::var("LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            api_url,
            anon_key,
            media_cloud_name,
            upload_preset,
            media_backend,
            http_timeout_secs,
            log_level,
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.api_url.clone(), self.anon_key.clone());
        config.media_cloud_name = self.media_cloud_name.clone();
        config.upload_preset = self.upload_preset.clone();
        config.media_backend = self.media_backend;
        config.request_timeout = Duration::from_secs(self.http_timeout_secs);
        config
    }
}

fn get_required(key: &str) -> Result<String> {
    let value = std::env::var(key)?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(anyhow!("{key} must not be empty"));
    }
    Ok(value)
}

fn parse_positive(key: &str, raw: &str) -> Result<u64> {
    let value = raw
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?;

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}
