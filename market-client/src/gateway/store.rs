use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use super::{Direction, Gateway, Query, Table};
use crate::error::{MarketClientError, MarketClientResult};
use crate::models::{
    Comment, Like, NewComment, NewLike, NewPost, NewService, NewServiceProvider, Post,
    PostCounters, Profile, ProfilePatch, Service, ServicePatch, ServiceProvider,
};

#[derive(Debug, Clone)]
/// Типизированный доступ к таблицам: одна функция на пару (сущность, операция).
///
/// Строки, которые не удаётся привести к модели, в выборках пропускаются с
/// предупреждением; в операциях над одной строкой это ошибка `Decode`.
pub struct Store<G> {
    gateway: G,
}

impl<G: Gateway> Store<G> {
    /// Оборачивает gateway.
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    /// Нижележащий gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        table: Table,
        query: &Query,
    ) -> MarketClientResult<Vec<T>> {
        let rows = self.gateway.select(table, query).await?;
        Ok(narrow_rows(table, rows))
    }

    async fn fetch_one<T: DeserializeOwned>(&self, table: Table, id: Uuid) -> MarketClientResult<T> {
        let row = self
            .gateway
            .select(table, &Query::by_id(id).limit(1))
            .await?
            .into_iter()
            .next()
            .ok_or(MarketClientError::NotFound)?;
        narrow_row(table, row)
    }

    async fn create<T: DeserializeOwned, N: Serialize>(
        &self,
        table: Table,
        input: &N,
    ) -> MarketClientResult<T> {
        let row = self.gateway.insert(table, serde_json::to_value(input)?).await?;
        narrow_row(table, row)
    }

    async fn patch<T: DeserializeOwned, P: Serialize>(
        &self,
        table: Table,
        id: Uuid,
        patch: &P,
    ) -> MarketClientResult<T> {
        // Строку, скрытую политикой доступа, сервер не обновляет и не возвращает.
        let row = self
            .gateway
            .update(table, &Query::by_id(id), serde_json::to_value(patch)?)
            .await?
            .into_iter()
            .next()
            .ok_or(MarketClientError::NotFound)?;
        narrow_row(table, row)
    }

    async fn remove(&self, table: Table, query: &Query) -> MarketClientResult<()> {
        let removed = self.gateway.delete(table, query).await?;
        if removed.is_empty() {
            return Err(MarketClientError::NotFound);
        }
        Ok(())
    }

    /// Список постов по произвольной выборке.
    pub async fn list_posts(&self, query: &Query) -> MarketClientResult<Vec<Post>> {
        self.fetch(Table::Posts, query).await
    }

    /// Последние посты, новые первыми.
    pub async fn recent_posts(&self, limit: u32) -> MarketClientResult<Vec<Post>> {
        let query = Query::new()
            .order("created_at", Direction::Desc)
            .limit(limit);
        self.list_posts(&query).await
    }

    /// Пост по идентификатору.
    pub async fn get_post(&self, id: Uuid) -> MarketClientResult<Post> {
        self.fetch_one(Table::Posts, id).await
    }

    /// Создаёт пост.
    pub async fn insert_post(&self, input: &NewPost) -> MarketClientResult<Post> {
        self.create(Table::Posts, input).await
    }

    /// Обновляет счётчики поста.
    pub async fn update_post_counters(
        &self,
        id: Uuid,
        counters: PostCounters,
    ) -> MarketClientResult<Post> {
        self.patch(Table::Posts, id, &counters).await
    }

    /// Удаляет пост (комментарии и лайки удаляет сервер каскадно).
    pub async fn delete_post(&self, id: Uuid) -> MarketClientResult<()> {
        self.remove(Table::Posts, &Query::by_id(id)).await
    }

    /// Комментарии к посту в хронологическом порядке.
    pub async fn list_comments(&self, post_id: Uuid) -> MarketClientResult<Vec<Comment>> {
        let query = Query::new()
            .eq("post_id", post_id)
            .order("created_at", Direction::Asc);
        self.fetch(Table::Comments, &query).await
    }

    /// Создаёт комментарий.
    pub async fn insert_comment(&self, input: &NewComment) -> MarketClientResult<Comment> {
        self.create(Table::Comments, input).await
    }

    /// Удаляет комментарий.
    pub async fn delete_comment(&self, id: Uuid) -> MarketClientResult<()> {
        self.remove(Table::Comments, &Query::by_id(id)).await
    }

    /// Список лайков по выборке.
    pub async fn list_likes(&self, query: &Query) -> MarketClientResult<Vec<Like>> {
        self.fetch(Table::Likes, query).await
    }

    /// Все лайки пользователя.
    pub async fn likes_of_user(&self, user_id: Uuid) -> MarketClientResult<Vec<Like>> {
        self.list_likes(&Query::new().eq("user_id", user_id)).await
    }

    /// Создаёт лайк. Повторный лайк той же пары отклоняется сервером (`Conflict`).
    pub async fn insert_like(&self, input: NewLike) -> MarketClientResult<Like> {
        self.create(Table::Likes, &input).await
    }

    /// Удаляет лайк пары (пост, пользователь).
    pub async fn delete_like(&self, post_id: Uuid, user_id: Uuid) -> MarketClientResult<()> {
        let query = Query::new().eq("post_id", post_id).eq("user_id", user_id);
        self.remove(Table::Likes, &query).await
    }

    /// Профили с указанными идентификаторами одним запросом.
    ///
    /// Пустой список идентификаторов не порождает запроса.
    pub async fn list_profiles(&self, ids: &[Uuid]) -> MarketClientResult<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch(Table::Profiles, &Query::new().in_("id", ids))
            .await
    }

    /// Профиль по идентификатору пользователя.
    pub async fn get_profile(&self, id: Uuid) -> MarketClientResult<Profile> {
        self.fetch_one(Table::Profiles, id).await
    }

    /// Обновляет профиль (разрешено только владельцу).
    pub async fn update_profile(
        &self,
        id: Uuid,
        patch: &ProfilePatch,
    ) -> MarketClientResult<Profile> {
        self.patch(Table::Profiles, id, patch).await
    }

    /// Список услуг по выборке.
    pub async fn list_services(&self, query: &Query) -> MarketClientResult<Vec<Service>> {
        self.fetch(Table::Services, query).await
    }

    /// Услуга по идентификатору.
    pub async fn get_service(&self, id: Uuid) -> MarketClientResult<Service> {
        self.fetch_one(Table::Services, id).await
    }

    /// Создаёт услугу.
    pub async fn insert_service(&self, input: &NewService) -> MarketClientResult<Service> {
        self.create(Table::Services, input).await
    }

    /// Обновляет услугу.
    pub async fn update_service(
        &self,
        id: Uuid,
        patch: &ServicePatch,
    ) -> MarketClientResult<Service> {
        self.patch(Table::Services, id, patch).await
    }

    /// Удаляет услугу.
    pub async fn delete_service(&self, id: Uuid) -> MarketClientResult<()> {
        self.remove(Table::Services, &Query::by_id(id)).await
    }

    /// Запись исполнителя пользователя, если она есть.
    pub async fn get_provider_for_user(
        &self,
        user_id: Uuid,
    ) -> MarketClientResult<Option<ServiceProvider>> {
        let query = Query::new().eq("user_id", user_id).limit(1);
        Ok(self
            .fetch::<ServiceProvider>(Table::ServiceProviders, &query)
            .await?
            .into_iter()
            .next())
    }

    /// Создаёт запись исполнителя.
    pub async fn insert_provider(
        &self,
        input: &NewServiceProvider,
    ) -> MarketClientResult<ServiceProvider> {
        self.create(Table::ServiceProviders, input).await
    }
}

fn narrow_row<T: DeserializeOwned>(table: Table, row: Value) -> MarketClientResult<T> {
    serde_json::from_value(row)
        .map_err(|err| MarketClientError::Decode(format!("{table} row: {err}")))
}

fn narrow_rows<T: DeserializeOwned>(table: Table, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(%table, error = %err, "skipping row with unexpected shape");
                None
            }
        })
        .collect()
}
