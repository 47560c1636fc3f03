use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{MarketClientError, MarketClientResult};

mod query;
mod rest;
mod storage;
mod store;

#[cfg(test)]
pub(crate) mod memory;

pub use query::{Direction, Filter, Query};
pub use rest::RestGateway;
pub use storage::{Bucket, StorageClient};
pub use store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Таблицы backend-а, с которыми работает клиент.
pub enum Table {
    /// `profiles`.
    Profiles,
    /// `posts`.
    Posts,
    /// `comments`.
    Comments,
    /// `likes`.
    Likes,
    /// `services`.
    Services,
    /// `service_providers`.
    ServiceProviders,
}

impl Table {
    /// Имя таблицы в REST API.
    pub fn name(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Posts => "posts",
            Self::Comments => "comments",
            Self::Likes => "likes",
            Self::Services => "services",
            Self::ServiceProviders => "service_providers",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Доступ к таблицам backend-а на уровне JSON-строк. Приведение к моделям
/// делает `Store`.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Выборка строк по фильтрам.
    async fn select(&self, table: Table, query: &Query) -> MarketClientResult<Vec<Value>>;

    /// Вставка одной строки; возвращает строку в том виде, в котором её сохранил сервер.
    async fn insert(&self, table: Table, row: Value) -> MarketClientResult<Value>;

    /// Обновление строк, подходящих под фильтры; возвращает обновлённые строки.
    async fn update(&self, table: Table, query: &Query, patch: Value)
    -> MarketClientResult<Vec<Value>>;

    /// Удаление строк, подходящих под фильтры; возвращает удалённые строки.
    async fn delete(&self, table: Table, query: &Query) -> MarketClientResult<Vec<Value>>;
}

#[derive(Debug, Deserialize)]
struct ErrorResponseDto {
    code: Option<String>,
    message: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

pub(crate) async fn decode_error(response: reqwest::Response) -> MarketClientError {
    let status = response.status();

    match response.json::<ErrorResponseDto>().await {
        Ok(body) => {
            let message = body
                .message
                .or(body.error)
                .map(|message| match body.details {
                    Some(details) if !details.is_empty() => format!("{message} ({details})"),
                    _ => message,
                });
            MarketClientError::from_http_status(status, body.code.as_deref(), message)
        }
        Err(_) => MarketClientError::from_http_status(status, None, None),
    }
}
