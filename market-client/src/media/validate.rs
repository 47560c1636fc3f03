use std::fmt;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::error::MarketClientResult;

const MB: u64 = 1024 * 1024;

/// Допустимые MIME-типы изображений.
pub const IMAGE_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Допустимые MIME-типы видео (MP4, QuickTime, AVI).
pub const VIDEO_MIME_TYPES: [&str; 3] = ["video/mp4", "video/quicktime", "video/x-msvideo"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Тип вложения.
pub enum MediaKind {
    /// Изображение.
    Image,
    /// Видео.
    Video,
}

impl MediaKind {
    /// Тип вложения по MIME-типу из списка допустимых.
    pub fn from_mime(mime: &str) -> Option<Self> {
        if IMAGE_MIME_TYPES.contains(&mime) {
            Some(Self::Image)
        } else if VIDEO_MIME_TYPES.contains(&mime) {
            Some(Self::Video)
        } else {
            None
        }
    }

    fn allowed_mime_types(self) -> &'static [&'static str] {
        match self {
            Self::Image => &IMAGE_MIME_TYPES,
            Self::Video => &VIDEO_MIME_TYPES,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Где прикрепляется вложение; у каждого контекста свои лимиты.
pub enum UploadContext {
    /// Комментарий.
    Comment,
    /// Пост.
    Post,
    /// Услуга.
    Service,
}

impl UploadContext {
    /// Лимиты контекста.
    pub fn limits(self) -> MediaLimits {
        match self {
            Self::Comment => MediaLimits {
                max_images: 1,
                max_image_bytes: MB,
                max_videos: 1,
                max_video_bytes: 10 * MB,
                max_video_duration: Duration::from_secs(30),
            },
            Self::Post => MediaLimits {
                max_images: 5,
                max_image_bytes: MB,
                max_videos: 1,
                max_video_bytes: 20 * MB,
                max_video_duration: Duration::from_secs(60),
            },
            Self::Service => MediaLimits {
                max_images: 10,
                max_image_bytes: 5 * MB,
                max_videos: 2,
                max_video_bytes: 50 * MB,
                max_video_duration: Duration::from_secs(120),
            },
        }
    }

    /// Папка на медиахосте по умолчанию.
    pub fn folder(self) -> &'static str {
        match self {
            Self::Comment => "comments",
            Self::Post => "posts",
            Self::Service => "services",
        }
    }
}

impl fmt::Display for UploadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Comment => "comment",
            Self::Post => "post",
            Self::Service => "service",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Лимиты вложений одного контекста.
pub struct MediaLimits {
    /// Максимум изображений.
    pub max_images: usize,
    /// Максимальный размер изображения в байтах.
    pub max_image_bytes: u64,
    /// Максимум видео.
    pub max_videos: usize,
    /// Максимальный размер видео в байтах.
    pub max_video_bytes: u64,
    /// Максимальная длительность видео.
    pub max_video_duration: Duration,
}

impl MediaLimits {
    fn max_bytes(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Image => self.max_image_bytes,
            MediaKind::Video => self.max_video_bytes,
        }
    }

    fn max_count(&self, kind: MediaKind) -> usize {
        match kind {
            MediaKind::Image => self.max_images,
            MediaKind::Video => self.max_videos,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Причина отказа в загрузке файла.
pub enum MediaRejection {
    /// MIME-тип не входит в список допустимых.
    #[error("{mime} is not an allowed {kind} type")]
    UnsupportedType {
        /// MIME-тип файла.
        mime: String,
        /// Ожидаемый тип вложения.
        kind: MediaKind,
    },

    /// Файл больше лимита контекста.
    #[error("{kind} of {size} bytes exceeds the {context} limit of {limit} bytes")]
    TooLarge {
        /// Тип вложения.
        kind: MediaKind,
        /// Контекст.
        context: UploadContext,
        /// Размер файла.
        size: u64,
        /// Лимит.
        limit: u64,
    },

    /// Видео длиннее лимита контекста.
    #[error("video of {}s exceeds the {context} limit of {}s", .duration.as_secs(), .limit.as_secs())]
    TooLong {
        /// Контекст.
        context: UploadContext,
        /// Длительность видео.
        duration: Duration,
        /// Лимит.
        limit: Duration,
    },

    /// Слишком много вложений одного типа.
    #[error("{count} {kind} files exceed the {context} limit of {limit}")]
    TooMany {
        /// Тип вложения.
        kind: MediaKind,
        /// Контекст.
        context: UploadContext,
        /// Количество файлов.
        count: usize,
        /// Лимит.
        limit: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Локальный файл, выбранный для загрузки.
pub struct MediaFile {
    /// Имя файла.
    pub name: String,
    /// MIME-тип.
    pub mime_type: String,
    /// Содержимое.
    pub bytes: Vec<u8>,
    /// Длительность (для видео, если известна).
    pub duration: Option<Duration>,
}

impl MediaFile {
    /// Создаёт файл из содержимого в памяти.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
            duration: None,
        }
    }

    /// Указывает длительность видео.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Читает файл с диска; MIME-тип определяется по расширению.
    pub async fn from_path(path: impl AsRef<Path>) -> MarketClientResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = mime_guess::from_path(path).first_or_octet_stream();
        Ok(Self::new(name, mime_type.essence_str(), bytes))
    }

    /// Размер в байтах.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Тип вложения, если MIME-тип допустим.
    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_mime(&self.mime_type)
    }
}

/// Проверяет один файл против лимитов контекста: сначала тип, потом размер
/// и длительность. Сетевых вызовов не делает.
pub fn validate(
    file: &MediaFile,
    kind: MediaKind,
    context: UploadContext,
) -> Result<(), MediaRejection> {
    if !kind.allowed_mime_types().contains(&file.mime_type.as_str()) {
        return Err(MediaRejection::UnsupportedType {
            mime: file.mime_type.clone(),
            kind,
        });
    }

    let limits = context.limits();
    let limit = limits.max_bytes(kind);
    if file.size() > limit {
        return Err(MediaRejection::TooLarge {
            kind,
            context,
            size: file.size(),
            limit,
        });
    }

    if kind == MediaKind::Video {
        if let Some(duration) = file.duration.filter(|d| *d > limits.max_video_duration) {
            return Err(MediaRejection::TooLong {
                context,
                duration,
                limit: limits.max_video_duration,
            });
        }
    }

    Ok(())
}

/// Проверяет набор файлов: каждый файл по отдельности и количество файлов
/// каждого типа.
pub fn validate_batch(files: &[MediaFile], context: UploadContext) -> Result<(), MediaRejection> {
    let limits = context.limits();
    let mut images = 0;
    let mut videos = 0;

    for file in files {
        let kind = file.kind().ok_or_else(|| MediaRejection::UnsupportedType {
            mime: file.mime_type.clone(),
            kind: if file.mime_type.starts_with("video/") {
                MediaKind::Video
            } else {
                MediaKind::Image
            },
        })?;
        validate(file, kind, context)?;
        match kind {
            MediaKind::Image => images += 1,
            MediaKind::Video => videos += 1,
        }
    }

    for (kind, count) in [(MediaKind::Image, images), (MediaKind::Video, videos)] {
        let limit = limits.max_count(kind);
        if count > limit {
            return Err(MediaRejection::TooMany {
                kind,
                context,
                count,
                limit,
            });
        }
    }
    Ok(())
}
