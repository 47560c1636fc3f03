use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::decode_error;
use crate::error::{MarketClientError, MarketClientResult};
use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Публичные бакеты объектного хранилища.
pub enum Bucket {
    /// Вложения постов, не более 5 MB на объект.
    PostMedia,
    /// Вложения услуг, не более 10 MB на объект.
    ServiceMedia,
}

impl Bucket {
    /// Имя бакета.
    pub fn name(self) -> &'static str {
        match self {
            Self::PostMedia => "post_media",
            Self::ServiceMedia => "service_media",
        }
    }

    /// Максимальный размер объекта в байтах.
    pub fn max_bytes(self) -> u64 {
        match self {
            Self::PostMedia => 5 * 1024 * 1024,
            Self::ServiceMedia => 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Serialize)]
struct RemoveObjectsDto<'a> {
    prefixes: &'a [String],
}

#[derive(Debug, Clone)]
/// Клиент объектного хранилища (`/storage/v1`).
pub struct StorageClient {
    base_url: String,
    anon_key: String,
    client: Client,
    session: SessionStore,
}

impl StorageClient {
    /// Создаёт клиент хранилища.
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        client: Client,
        session: SessionStore,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            anon_key: anon_key.into(),
            client,
            session,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Публичный URL объекта.
    pub fn public_url(&self, bucket: Bucket, path: &str) -> String {
        self.endpoint(&format!(
            "object/public/{}/{}",
            bucket.name(),
            path.trim_start_matches('/')
        ))
    }

    /// Загружает объект в бакет от имени текущего пользователя и возвращает
    /// его публичный URL.
    pub async fn upload(
        &self,
        bucket: Bucket,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> MarketClientResult<String> {
        let token = self.session.access_token().ok_or(MarketClientError::NoSession)?;
        let size = bytes.len() as u64;
        if size > bucket.max_bytes() {
            return Err(MarketClientError::Validation(format!(
                "object of {size} bytes exceeds {} limit of {} bytes",
                bucket.name(),
                bucket.max_bytes()
            )));
        }

        let path = path.trim_start_matches('/');
        debug!(bucket = bucket.name(), path, size, "storage upload");
        let url = self.endpoint(&format!("object/{}/{}", bucket.name(), path));
        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(MarketClientError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(decode_error(response).await);
        }

        Ok(self.public_url(bucket, path))
    }

    /// Удаляет объекты из бакета.
    pub async fn remove(&self, bucket: Bucket, paths: &[String]) -> MarketClientResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let token = self.session.access_token().ok_or(MarketClientError::NoSession)?;
        let url = self.endpoint(&format!("object/{}", bucket.name()));
        let response = self
            .client
            .delete(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .json(&RemoveObjectsDto { prefixes: paths })
            .send()
            .await
            .map_err(MarketClientError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(decode_error(response).await);
        }
        Ok(())
    }
}
