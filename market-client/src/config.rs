use std::time::Duration;

use crate::error::{MarketClientError, MarketClientResult};
use crate::media::RetryPolicy;

/// Публичный endpoint медиахоста по умолчанию.
pub const DEFAULT_MEDIA_HOST_URL: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Куда загружаются вложения постов и услуг.
pub enum MediaBackend {
    /// Внешний медиахост с upload preset.
    #[default]
    Cloud,
    /// Бакеты объектного хранилища backend-а.
    Bucket,
}

impl MediaBackend {
    /// Разбирает значение из конфигурации (`cloud` / `bucket`).
    pub fn parse(raw: &str) -> MarketClientResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "bucket" => Ok(Self::Bucket),
            other => Err(MarketClientError::Config(format!(
                "unknown media backend '{other}', expected 'cloud' or 'bucket'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
/// Параметры подключения клиента.
pub struct ClientConfig {
    /// Базовый URL backend-а, например `https://xyz.supabase.co`.
    pub api_url: String,
    /// Публичный (anon) ключ проекта.
    pub anon_key: String,
    /// Базовый URL медиахоста.
    pub media_host_url: String,
    /// Имя облака на медиахосте.
    pub media_cloud_name: String,
    /// Имя upload preset на медиахосте.
    pub upload_preset: String,
    /// Выбранный способ загрузки медиа.
    pub media_backend: MediaBackend,
    /// Таймаут установки соединения.
    pub connect_timeout: Duration,
    /// Таймаут запроса целиком.
    pub request_timeout: Duration,
    /// Политика повторов для загрузки вложений постов.
    pub post_upload_retry: RetryPolicy,
}

impl ClientConfig {
    /// Конфигурация с настройками по умолчанию для указанного backend-а.
    pub fn new(api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            anon_key: anon_key.into(),
            media_host_url: DEFAULT_MEDIA_HOST_URL.to_string(),
            media_cloud_name: "demo".to_string(),
            upload_preset: "market_unsigned".to_string(),
            media_backend: MediaBackend::Cloud,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
            post_upload_retry: RetryPolicy::resilient(),
        }
    }

    /// Проверяет обязательные поля.
    pub fn validate(&self) -> MarketClientResult<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(MarketClientError::Config(format!(
                "api url must start with http:// or https://, got '{}'",
                self.api_url
            )));
        }
        if self.anon_key.trim().is_empty() {
            return Err(MarketClientError::Config("anon key must not be empty".to_string()));
        }
        if self.upload_preset.trim().is_empty() {
            return Err(MarketClientError::Config(
                "upload preset must not be empty".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(MarketClientError::Config(
                "request timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn build_http_client(&self) -> MarketClientResult<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(MarketClientError::Http)
    }
}
