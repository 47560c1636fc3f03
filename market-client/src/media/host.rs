use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::{MediaFile, MediaKind};
use crate::error::{MarketClientError, MarketClientResult};
use crate::gateway::{Bucket, StorageClient};

/// Удалённое хранилище медиа: принимает один файл и возвращает его публичный URL.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Загружает файл в папку `folder`.
    async fn upload(
        &self,
        file: &MediaFile,
        kind: MediaKind,
        folder: &str,
    ) -> MarketClientResult<String>;
}

#[derive(Debug, Deserialize)]
struct UploadResponseDto {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadErrorDto {
    error: UploadErrorMessageDto,
}

#[derive(Debug, Deserialize)]
struct UploadErrorMessageDto {
    message: String,
}

#[derive(Debug, Clone)]
/// Внешний медиахост с неподписанной загрузкой через upload preset.
pub struct CloudMediaHost {
    base_url: String,
    cloud_name: String,
    upload_preset: String,
    client: Client,
}

impl CloudMediaHost {
    /// Создаёт клиент медиахоста.
    pub fn new(
        base_url: impl Into<String>,
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
            client,
        }
    }

    fn endpoint(&self, kind: MediaKind) -> String {
        format!(
            "{}/{}/{}/upload",
            self.base_url.trim_end_matches('/'),
            self.cloud_name,
            kind.as_str()
        )
    }
}

#[async_trait]
impl MediaHost for CloudMediaHost {
    async fn upload(
        &self,
        file: &MediaFile,
        kind: MediaKind,
        folder: &str,
    ) -> MarketClientResult<String> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(MarketClientError::from_reqwest)?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", folder.to_string());

        debug!(name = %file.name, %kind, folder, "uploading to media host");
        let response = self
            .client
            .post(self.endpoint(kind))
            .multipart(form)
            .send()
            .await
            .map_err(MarketClientError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<UploadErrorDto>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("http status {status}"),
            };
            return Err(MarketClientError::Upload(message));
        }

        let body = response
            .json::<UploadResponseDto>()
            .await
            .map_err(|err| MarketClientError::Upload(format!("unexpected response: {err}")))?;
        Ok(body.secure_url)
    }
}

#[derive(Debug, Clone)]
/// Загрузка вложений в публичные бакеты backend-а.
///
/// Бакет выбирается по корневой папке: `services/...` попадает в
/// `service_media`, всё остальное в `post_media`.
pub struct BucketMediaHost {
    storage: StorageClient,
}

impl BucketMediaHost {
    /// Создаёт хост поверх клиента хранилища.
    pub fn new(storage: StorageClient) -> Self {
        Self { storage }
    }

    fn bucket_for(folder: &str) -> Bucket {
        match folder.trim_start_matches('/').split('/').next() {
            Some("services") => Bucket::ServiceMedia,
            _ => Bucket::PostMedia,
        }
    }

    fn object_path(folder: &str, file: &MediaFile) -> String {
        let extension = file
            .name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string());
        format!(
            "{}/{}.{extension}",
            folder.trim_matches('/'),
            Uuid::new_v4()
        )
    }
}

#[async_trait]
impl MediaHost for BucketMediaHost {
    async fn upload(
        &self,
        file: &MediaFile,
        kind: MediaKind,
        folder: &str,
    ) -> MarketClientResult<String> {
        let bucket = Self::bucket_for(folder);
        let path = Self::object_path(folder, file);
        debug!(name = %file.name, %kind, bucket = bucket.name(), "uploading to storage bucket");
        self.storage
            .upload(bucket, &path, file.bytes.clone(), &file.mime_type)
            .await
    }
}
