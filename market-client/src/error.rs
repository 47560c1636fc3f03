use thiserror::Error;
use uuid::Uuid;

use crate::media::MediaRejection;

/// Код PostgREST/Postgres для нарушения уникального ограничения.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
/// Ошибки клиентской библиотеки `market-client`.
pub enum MarketClientError {
    /// Ошибка HTTP-транспорта (`reqwest`): сеть, таймаут, разрыв соединения.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Требуется авторизация или политика доступа отклонила запрос.
    #[error("unauthorized")]
    Unauthorized,

    /// Запрошенная запись не найдена.
    #[error("not found")]
    NotFound,

    /// Нарушено ограничение уникальности (например, повторный лайк).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Сервер отклонил запрос по иной причине.
    #[error("rejected ({status}): {message}")]
    Rejected {
        /// HTTP-статус ответа.
        status: u16,
        /// Сообщение сервера.
        message: String,
    },

    /// Ответ сервера не удалось привести к типизированной модели.
    #[error("decode error: {0}")]
    Decode(String),

    /// Ошибка валидации формы до сетевого вызова.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Медиафайл отклонён локальной проверкой.
    #[error("media rejected: {0}")]
    Media(#[from] MediaRejection),

    /// Медиахост вернул неуспешный ответ.
    #[error("upload failed: {0}")]
    Upload(String),

    /// Операция требует активной сессии.
    #[error("no active session")]
    NoSession,

    /// Для поста уже выполняется оптимистичная операция.
    #[error("mutation already in flight for post {0}")]
    MutationInFlight(Uuid),

    /// Представление, запросившее данные, уже закрыто.
    #[error("cancelled")]
    Cancelled,

    /// Реклама не успела загрузиться за отведённое время.
    #[error("ad load timed out")]
    AdTimeout,

    /// Ошибка рекламного SDK.
    #[error("ad error: {0}")]
    Ad(String),

    /// Ошибка чтения локального файла.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Некорректная конфигурация клиента.
    #[error("invalid config: {0}")]
    Config(String),
}

/// Результат операций `market-client`.
pub type MarketClientResult<T> = Result<T, MarketClientError>;

impl MarketClientError {
    pub(crate) fn from_http_status(
        status: reqwest::StatusCode,
        code: Option<&str>,
        message: Option<String>,
    ) -> Self {
        let message = message.unwrap_or_else(|| format!("http status {status}"));
        if code == Some(UNIQUE_VIOLATION) {
            return Self::Conflict(message);
        }
        match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Self::Unauthorized
            }
            reqwest::StatusCode::NOT_FOUND => Self::NotFound,
            reqwest::StatusCode::CONFLICT => Self::Conflict(message),
            _ => Self::Rejected {
                status: status.as_u16(),
                message,
            },
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_http_status(status, None, None);
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Http(err)
    }

    /// Ошибка, которую следует показать пользователю как блокирующее
    /// сообщение, а не только записать в лог.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl From<validator::ValidationErrors> for MarketClientError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|key| key.to_string())
            .collect();
        fields.sort_unstable();
        Self::Validation(format!("invalid fields: {}", fields.join(", ")))
    }
}

impl From<serde_json::Error> for MarketClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
