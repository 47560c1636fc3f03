use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{MediaFile, MediaHost, MediaKind, MediaRejection};
use crate::error::{MarketClientError, MarketClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Поведение при неудачной загрузке отдельного файла пакета.
pub enum RetryPolicy {
    /// Одна попытка; неудачный файл пропускается.
    None,
    /// До `attempts` попыток с фиксированной паузой между ними.
    Fixed {
        /// Общее число попыток, включая первую.
        attempts: u32,
        /// Пауза между попытками.
        backoff: Duration,
    },
}

impl RetryPolicy {
    /// Политика для вложений постов: три попытки с паузой 500 мс.
    pub fn resilient() -> Self {
        Self::Fixed {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }

    fn attempts(self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { attempts, .. } => attempts.max(1),
        }
    }

    fn backoff(self) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed { backoff, .. } => backoff,
        }
    }
}

#[derive(Clone)]
/// Последовательная загрузка вложений с отчётом о прогрессе.
pub struct MediaUploader {
    host: Arc<dyn MediaHost>,
}

impl std::fmt::Debug for MediaUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaUploader").finish_non_exhaustive()
    }
}

impl MediaUploader {
    /// Создаёт загрузчик поверх медиахоста.
    pub fn new(host: Arc<dyn MediaHost>) -> Self {
        Self { host }
    }

    /// Загружает один файл и возвращает его URL.
    pub async fn upload_one(&self, file: &MediaFile, folder: &str) -> MarketClientResult<String> {
        let kind = file.kind().ok_or_else(|| {
            MarketClientError::Media(MediaRejection::UnsupportedType {
                mime: file.mime_type.clone(),
                kind: MediaKind::Image,
            })
        })?;
        self.host.upload(file, kind, folder).await
    }

    async fn upload_with_retry(
        &self,
        file: &MediaFile,
        folder: &str,
        policy: RetryPolicy,
    ) -> MarketClientResult<String> {
        let attempts = policy.attempts();
        let mut attempt = 1;
        loop {
            match self.upload_one(file, folder).await {
                Ok(url) => return Ok(url),
                Err(err @ MarketClientError::Media(_)) => return Err(err),
                Err(err) if attempt >= attempts => return Err(err),
                Err(err) => {
                    warn!(
                        name = %file.name,
                        error = %err,
                        "upload attempt {attempt}/{attempts} failed, retrying"
                    );
                    tokio::time::sleep(policy.backoff()).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Загружает файлы строго по очереди и возвращает URL успешно загруженных
    /// в исходном порядке.
    ///
    /// После каждого файла (успешного или нет) вызывает `on_progress` с долей
    /// выполненной работы, масштабированной к `weight` (0–100). Последний
    /// вызов всегда равен `weight`; остаток шкалы вызывающий использует для
    /// своих шагов после загрузки.
    pub async fn upload_many<F>(
        &self,
        files: &[MediaFile],
        folder: &str,
        policy: RetryPolicy,
        weight: u8,
        mut on_progress: F,
    ) -> Vec<String>
    where
        F: FnMut(u8),
    {
        let weight = weight.min(100);
        if files.is_empty() {
            on_progress(weight);
            return Vec::new();
        }

        let total = files.len();
        let mut urls = Vec::with_capacity(total);
        for (index, file) in files.iter().enumerate() {
            match self.upload_with_retry(file, folder, policy).await {
                Ok(url) => urls.push(url),
                Err(err) => warn!(name = %file.name, error = %err, "dropping file from batch"),
            }
            on_progress(scaled_progress(index + 1, total, weight));
        }

        info!(
            uploaded = urls.len(),
            failed = total - urls.len(),
            folder,
            "media batch finished"
        );
        urls
    }
}

fn scaled_progress(done: usize, total: usize, weight: u8) -> u8 {
    let weight = weight as usize;
    ((done * weight + total / 2) / total).min(weight) as u8
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Хост, который падает заданное число раз для выбранных файлов.
    #[derive(Default)]
    struct FlakyHost {
        failures_left: Mutex<HashMap<String, u32>>,
        calls: Mutex<Vec<String>>,
    }

    impl FlakyHost {
        fn failing(name: &str, times: u32) -> Self {
            let host = Self::default();
            host.failures_left
                .lock()
                .expect("failures mutex poisoned")
                .insert(name.to_string(), times);
            host
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls mutex poisoned").clone()
        }
    }

    #[async_trait]
    impl MediaHost for FlakyHost {
        async fn upload(
            &self,
            file: &MediaFile,
            _kind: MediaKind,
            folder: &str,
        ) -> MarketClientResult<String> {
            self.calls
                .lock()
                .expect("calls mutex poisoned")
                .push(file.name.clone());
            let mut failures = self.failures_left.lock().expect("failures mutex poisoned");
            if let Some(left) = failures.get_mut(&file.name) {
                if *left > 0 {
                    *left -= 1;
                    return Err(MarketClientError::Upload("network unreachable".to_string()));
                }
            }
            Ok(format!("https://cdn.example/{folder}/{}", file.name))
        }
    }

    fn files(names: &[&str]) -> Vec<MediaFile> {
        names
            .iter()
            .map(|name| MediaFile::new(*name, "image/jpeg", vec![0; 16]))
            .collect()
    }

    #[tokio::test]
    async fn failed_file_is_dropped_and_order_kept() {
        let host = Arc::new(FlakyHost::failing("f2", u32::MAX));
        let uploader = MediaUploader::new(host.clone());
        let mut progress = Vec::new();

        let urls = uploader
            .upload_many(&files(&["f1", "f2", "f3"]), "posts", RetryPolicy::None, 100, |p| {
                progress.push(p)
            })
            .await;

        assert_eq!(
            urls,
            vec!["https://cdn.example/posts/f1", "https://cdn.example/posts/f3"]
        );
        assert_eq!(progress, vec![33, 67, 100]);
        assert_eq!(host.calls(), vec!["f1", "f2", "f3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn resilient_path_gives_up_after_three_attempts() {
        let host = Arc::new(FlakyHost::failing("f2", u32::MAX));
        let uploader = MediaUploader::new(host.clone());
        let mut progress = Vec::new();

        let urls = uploader
            .upload_many(
                &files(&["f1", "f2", "f3"]),
                "posts",
                RetryPolicy::resilient(),
                100,
                |p| progress.push(p),
            )
            .await;

        assert_eq!(urls.len(), 2);
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(progress.last(), Some(&100));
        assert_eq!(host.calls(), vec!["f1", "f2", "f2", "f2", "f3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn resilient_path_recovers_from_transient_failure() {
        let host = Arc::new(FlakyHost::failing("f1", 2));
        let uploader = MediaUploader::new(host.clone());

        let urls = uploader
            .upload_many(&files(&["f1"]), "posts", RetryPolicy::resilient(), 90, |_| {})
            .await;

        assert_eq!(urls, vec!["https://cdn.example/posts/f1"]);
        assert_eq!(host.calls().len(), 3);
    }

    #[tokio::test]
    async fn progress_is_scaled_to_weight() {
        let uploader = MediaUploader::new(Arc::new(FlakyHost::default()));
        let mut progress = Vec::new();

        uploader
            .upload_many(&files(&["a", "b", "c", "d"]), "posts", RetryPolicy::None, 90, |p| {
                progress.push(p)
            })
            .await;

        assert_eq!(progress, vec![23, 45, 68, 90]);
    }

    #[tokio::test]
    async fn empty_batch_reports_weight_immediately() {
        let uploader = MediaUploader::new(Arc::new(FlakyHost::default()));
        let mut progress = Vec::new();

        let urls = uploader
            .upload_many(&[], "posts", RetryPolicy::None, 80, |p| progress.push(p))
            .await;

        assert!(urls.is_empty());
        assert_eq!(progress, vec![80]);
    }

    #[tokio::test]
    async fn unsupported_type_is_not_retried() {
        let host = Arc::new(FlakyHost::default());
        let uploader = MediaUploader::new(host.clone());
        let bmp = vec![MediaFile::new("x.bmp", "image/bmp", vec![1])];

        let urls = uploader
            .upload_many(&bmp, "posts", RetryPolicy::resilient(), 100, |_| {})
            .await;

        assert!(urls.is_empty());
        assert!(host.calls().is_empty());
    }
}
