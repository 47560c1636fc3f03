//! Клиентская библиотека маркетплейса (посты, услуги, профили) поверх
//! backend-as-a-service: авторизация, таблицы с политиками доступа на уровне
//! строк и объектное хранилище, плюс внешний медиахост.
//!
//! Слои, снизу вверх:
//! - `gateway`: типизированный доступ к таблицам и бакетам;
//! - `media`: проверка и последовательная загрузка вложений;
//! - `join`: склейка строк с профилями и статусом лайка на клиенте;
//! - `optimistic`: оптимистичные лайки и комментарии с откатом.
//!
//! `MarketClient` собирает всё вместе и хранит сессию в `SessionStore`.
#![warn(missing_docs)]

mod ads;
mod auth;
mod config;
mod error;
/// Типизированный доступ к таблицам и бакетам backend-а.
pub mod gateway;
mod join;
/// Проверка и загрузка вложений (изображения и видео).
pub mod media;
mod models;
mod optimistic;
mod scope;
mod session;

pub use ads::{AD_LOAD_TIMEOUT, AdEvent, AdNetwork, AdPresenter};
pub use auth::AuthClient;
pub use config::{ClientConfig, DEFAULT_MEDIA_HOST_URL, MediaBackend};
pub use error::{MarketClientError, MarketClientResult};
pub use join::{attach_like_status, attach_profiles, load_comments, load_feed, load_services};
pub use models::{
    Comment, CommentDraft, CommentView, Credentials, HasAuthor, Like, NewComment, NewLike,
    NewPost, NewService, NewServiceProvider, Post, PostCounters, PostDraft, PostView, Profile,
    ProfilePatch, ProviderDraft, Role, Service, ServiceCategory, ServiceDraft, ServicePatch,
    ServiceProvider, ServiceView, WithProfile,
};
pub use optimistic::{AppendComment, FeedState, LikeState, OptimisticMutation, ToggleLike};
pub use scope::{ViewScope, run_until_cancelled};
pub use session::{Session, SessionStore, SessionSubscription};

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use gateway::{Gateway, RestGateway, StorageClient, Store};
use media::{
    BucketMediaHost, CloudMediaHost, MediaFile, MediaHost, MediaUploader, RetryPolicy,
    UploadContext, validate_batch,
};
use models::trimmed;

/// Доля шкалы прогресса, отведённая под загрузку вложений; остаток занимает
/// запись в таблицу.
const UPLOAD_PROGRESS_WEIGHT: u8 = 90;

#[derive(Debug, Clone)]
/// Клиент маркетплейса: авторизация, лента, услуги, профили.
pub struct MarketClient {
    config: ClientConfig,
    session: SessionStore,
    auth: AuthClient,
    store: Store<RestGateway>,
    storage: StorageClient,
    uploader: MediaUploader,
}

impl MarketClient {
    /// Создаёт клиент с пустой сессией.
    pub fn new(config: ClientConfig) -> MarketClientResult<Self> {
        Self::with_session_store(config, SessionStore::new())
    }

    /// Создаёт клиент поверх существующего хранилища сессии.
    pub fn with_session_store(
        config: ClientConfig,
        session: SessionStore,
    ) -> MarketClientResult<Self> {
        config.validate()?;
        let http = config.build_http_client()?;

        let auth = AuthClient::new(
            config.api_url.clone(),
            config.anon_key.clone(),
            http.clone(),
            session.clone(),
        );
        let store = Store::new(RestGateway::new(
            config.api_url.clone(),
            config.anon_key.clone(),
            http.clone(),
            session.clone(),
        ));
        let storage = StorageClient::new(
            config.api_url.clone(),
            config.anon_key.clone(),
            http.clone(),
            session.clone(),
        );
        let host: Arc<dyn MediaHost> = match config.media_backend {
            MediaBackend::Cloud => Arc::new(CloudMediaHost::new(
                config.media_host_url.clone(),
                config.media_cloud_name.clone(),
                config.upload_preset.clone(),
                http,
            )),
            MediaBackend::Bucket => Arc::new(BucketMediaHost::new(storage.clone())),
        };

        Ok(Self {
            config,
            session,
            auth,
            store,
            storage,
            uploader: MediaUploader::new(host),
        })
    }

    /// Хранилище сессии (для подписки на изменения).
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Типизированный доступ к таблицам.
    pub fn store(&self) -> &Store<RestGateway> {
        &self.store
    }

    /// Клиент объектного хранилища.
    pub fn storage(&self) -> &StorageClient {
        &self.storage
    }

    /// Загрузчик вложений.
    pub fn uploader(&self) -> &MediaUploader {
        &self.uploader
    }

    /// Регистрирует пользователя.
    pub async fn sign_up(
        &self,
        credentials: &Credentials,
        full_name: &str,
    ) -> MarketClientResult<Option<Session>> {
        self.auth.sign_up(credentials, full_name).await
    }

    /// Выполняет вход.
    pub async fn sign_in(&self, credentials: &Credentials) -> MarketClientResult<Session> {
        self.auth.sign_in(credentials).await
    }

    /// Выполняет выход.
    pub async fn sign_out(&self) -> MarketClientResult<()> {
        self.auth.sign_out().await
    }

    /// Восстанавливает ранее сохранённую сессию, если она не истекла.
    pub fn restore_session(&self, session: Session) -> MarketClientResult<()> {
        if session.is_expired_at(chrono::Utc::now()) {
            return Err(MarketClientError::NoSession);
        }
        self.session.set(session);
        Ok(())
    }

    /// Лента с профилями авторов и статусом лайка.
    pub async fn feed(&self, limit: u32) -> MarketClientResult<Vec<PostView>> {
        load_feed(&self.store, self.session.user_id(), limit).await
    }

    /// Перезагружает состояние экрана ленты.
    pub async fn refresh_feed(&self, feed: &mut FeedState, limit: u32) {
        feed.refresh(&self.store, self.session.user_id(), limit).await;
    }

    /// Комментарии поста с профилями авторов.
    pub async fn comments(&self, post_id: Uuid) -> MarketClientResult<Vec<CommentView>> {
        load_comments(&self.store, post_id).await
    }

    /// Оптимистично переключает лайк поста текущим пользователем.
    pub async fn toggle_like(
        &self,
        feed: &mut FeedState,
        post_id: Uuid,
    ) -> MarketClientResult<LikeState> {
        let user_id = self.session.require_user()?;
        feed.toggle_like(&self.store, user_id, post_id).await
    }

    /// Добавляет комментарий от имени текущего пользователя.
    pub async fn add_comment(
        &self,
        feed: &mut FeedState,
        post_id: Uuid,
        draft: CommentDraft,
    ) -> MarketClientResult<CommentView> {
        let user_id = self.session.require_user()?;
        let author = match self.store.get_profile(user_id).await {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!(error = %err, "own profile unavailable, comment shown without author");
                None
            }
        };
        feed.add_comment(&self.store, user_id, author.as_ref(), post_id, draft)
            .await
    }

    /// Публикует пост с вложениями.
    ///
    /// Вложения проверяются до любых сетевых вызовов, загружаются по одному с
    /// повторами; файлы, которые так и не загрузились, в пост не попадают.
    /// Прогресс доходит до 90 после загрузки и до 100 после записи поста.
    pub async fn create_post<F>(
        &self,
        draft: PostDraft,
        files: &[MediaFile],
        mut on_progress: F,
    ) -> MarketClientResult<Post>
    where
        F: FnMut(u8),
    {
        let user_id = self.session.require_user()?;
        let draft = PostDraft {
            content: trimmed(&draft.content),
        };
        draft.validate()?;
        validate_batch(files, UploadContext::Post)?;

        let folder = format!("{}/{user_id}", UploadContext::Post.folder());
        let media_urls = self
            .uploader
            .upload_many(
                files,
                &folder,
                self.config.post_upload_retry,
                UPLOAD_PROGRESS_WEIGHT,
                &mut on_progress,
            )
            .await;

        let post = self
            .store
            .insert_post(&NewPost {
                user_id,
                content: draft.content,
                media_urls,
            })
            .await?;
        on_progress(100);
        info!(post_id = %post.id, media = post.media_urls.len(), "post created");
        Ok(post)
    }

    /// Удаляет собственный пост.
    pub async fn delete_post(&self, post_id: Uuid) -> MarketClientResult<()> {
        let user_id = self.session.require_user()?;
        let post = self.store.get_post(post_id).await?;
        if post.user_id != user_id {
            return Err(MarketClientError::Unauthorized);
        }
        self.store.delete_post(post_id).await
    }

    /// Каталог услуг с профилями владельцев.
    pub async fn services(
        &self,
        category: Option<ServiceCategory>,
        limit: u32,
    ) -> MarketClientResult<Vec<ServiceView>> {
        load_services(&self.store, category, limit).await
    }

    /// Публикует услугу с вложениями (одна попытка на файл).
    pub async fn create_service<F>(
        &self,
        draft: ServiceDraft,
        files: &[MediaFile],
        mut on_progress: F,
    ) -> MarketClientResult<Service>
    where
        F: FnMut(u8),
    {
        let user_id = self.session.require_user()?;
        let draft = ServiceDraft {
            title: trimmed(&draft.title),
            description: trimmed(&draft.description),
            price: trimmed(&draft.price),
            category: draft.category,
            location: trimmed(&draft.location),
        };
        draft.validate()?;
        validate_batch(files, UploadContext::Service)?;

        let folder = format!("{}/{user_id}", UploadContext::Service.folder());
        let media_urls = self
            .uploader
            .upload_many(
                files,
                &folder,
                RetryPolicy::None,
                UPLOAD_PROGRESS_WEIGHT,
                &mut on_progress,
            )
            .await;

        let service = self
            .store
            .insert_service(&NewService {
                user_id,
                title: draft.title,
                description: draft.description,
                price: draft.price,
                category: draft.category,
                location: draft.location,
                media_urls,
            })
            .await?;
        on_progress(100);
        info!(service_id = %service.id, "service created");
        Ok(service)
    }

    /// Обновляет собственную услугу.
    pub async fn update_service(
        &self,
        service_id: Uuid,
        patch: &ServicePatch,
    ) -> MarketClientResult<Service> {
        self.session.require_user()?;
        self.store.update_service(service_id, patch).await
    }

    /// Удаляет собственную услугу.
    pub async fn delete_service(&self, service_id: Uuid) -> MarketClientResult<()> {
        let user_id = self.session.require_user()?;
        let service = self.store.get_service(service_id).await?;
        if service.user_id != user_id {
            return Err(MarketClientError::Unauthorized);
        }
        self.store.delete_service(service_id).await
    }

    /// Подаёт заявку на статус исполнителя и переводит профиль в роль
    /// исполнителя. Повторная заявка отклоняется. Если прошлая заявка
    /// сохранилась, а смена роли не прошла, повторный вызов только меняет роль.
    pub async fn apply_as_provider(
        &self,
        draft: ProviderDraft,
    ) -> MarketClientResult<ServiceProvider> {
        let user_id = self.session.require_user()?;
        let draft = ProviderDraft {
            business_name: trimmed(&draft.business_name),
            description: trimmed(&draft.description),
            phone: trimmed(&draft.phone),
            email: trimmed(&draft.email),
            address: draft
                .address
                .as_deref()
                .map(trimmed)
                .filter(|address| !address.is_empty()),
        };
        draft.validate()?;

        let provider = register_provider(
            &self.store,
            NewServiceProvider {
                user_id,
                business_name: draft.business_name,
                description: draft.description,
                phone: draft.phone,
                email: draft.email,
                address: draft.address,
            },
        )
        .await?;
        info!(provider_id = %provider.id, "provider application accepted");
        Ok(provider)
    }

    /// Профиль пользователя.
    pub async fn profile(&self, user_id: Uuid) -> MarketClientResult<Profile> {
        self.store.get_profile(user_id).await
    }

    /// Профиль текущего пользователя.
    pub async fn my_profile(&self) -> MarketClientResult<Profile> {
        let user_id = self.session.require_user()?;
        self.store.get_profile(user_id).await
    }

    /// Обновляет профиль текущего пользователя.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> MarketClientResult<Profile> {
        let user_id = self.session.require_user()?;
        self.store.update_profile(user_id, patch).await
    }
}

/// Создаёт запись исполнителя и меняет роль профиля. Запись без смены роли
/// остаётся после сбоя на втором шаге; такую заявку дозавершает повторный
/// вызов.
async fn register_provider<G: Gateway>(
    store: &Store<G>,
    input: NewServiceProvider,
) -> MarketClientResult<ServiceProvider> {
    let user_id = input.user_id;
    let provider = match store.get_provider_for_user(user_id).await? {
        Some(existing) => {
            if store.get_profile(user_id).await?.role == Role::ServiceProvider {
                return Err(MarketClientError::Conflict(
                    "user is already a service provider".to_string(),
                ));
            }
            warn!(provider_id = %existing.id, "completing interrupted provider application");
            existing
        }
        None => store.insert_provider(&input).await?,
    };

    store
        .update_profile(
            user_id,
            &ProfilePatch {
                role: Some(Role::ServiceProvider),
                ..ProfilePatch::default()
            },
        )
        .await?;
    Ok(provider)
}
