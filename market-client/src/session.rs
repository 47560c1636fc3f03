use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{MarketClientError, MarketClientResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Авторизованная сессия пользователя.
pub struct Session {
    /// Access token для REST API.
    pub access_token: String,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Идентификатор пользователя (совпадает с `profiles.id`).
    pub user_id: Uuid,
    /// Email пользователя.
    #[serde(default)]
    pub email: Option<String>,
    /// Момент истечения access token.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Истёк ли access token на момент `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Clone)]
/// Хранилище текущей сессии с уведомлением об изменениях.
///
/// Один писатель (`AuthClient` или код восстановления сессии), много
/// читателей. Подписка снимается при удалении `SessionSubscription`.
/// Клонирование даёт ещё один дескриптор того же хранилища.
pub struct SessionStore {
    sender: Arc<watch::Sender<Option<Session>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Создаёт пустое хранилище (пользователь не авторизован).
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Создаёт хранилище с уже восстановленной сессией.
    pub fn with_session(session: Session) -> Self {
        let store = Self::new();
        store.set(session);
        store
    }

    /// Текущая сессия.
    pub fn current(&self) -> Option<Session> {
        self.sender.borrow().clone()
    }

    /// Идентификатор текущего пользователя.
    pub fn user_id(&self) -> Option<Uuid> {
        self.sender.borrow().as_ref().map(|session| session.user_id)
    }

    /// Идентификатор текущего пользователя или `NoSession`.
    pub fn require_user(&self) -> MarketClientResult<Uuid> {
        self.user_id().ok_or(MarketClientError::NoSession)
    }

    /// Access token текущей сессии.
    pub fn access_token(&self) -> Option<String> {
        self.sender
            .borrow()
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    /// Устанавливает новую сессию и уведомляет подписчиков.
    pub fn set(&self, session: Session) {
        self.sender.send_replace(Some(session));
    }

    /// Сбрасывает сессию (выход) и уведомляет подписчиков.
    pub fn clear(&self) {
        self.sender.send_replace(None);
    }

    /// Подписка на изменения сессии.
    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Количество активных подписок.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug)]
/// Подписка на изменения сессии. Удаление подписки отписывает её.
pub struct SessionSubscription {
    receiver: watch::Receiver<Option<Session>>,
}

impl SessionSubscription {
    /// Ждёт следующего изменения и возвращает новое значение.
    ///
    /// Возвращает `None` во внешнем `Option`, если хранилище удалено.
    pub async fn changed(&mut self) -> Option<Option<Session>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Последнее известное подписке значение без ожидания.
    pub fn latest(&self) -> Option<Session> {
        self.receiver.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: Uuid) -> Session {
        Session {
            access_token: "token".to_string(),
            refresh_token: None,
            user_id,
            email: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn subscribers_see_every_write() {
        let store = SessionStore::new();
        let mut subscription = store.subscribe();
        let user_id = Uuid::new_v4();

        store.set(session(user_id));
        let seen = subscription.changed().await.expect("store alive");
        assert_eq!(seen.map(|s| s.user_id), Some(user_id));

        store.clear();
        let seen = subscription.changed().await.expect("store alive");
        assert!(seen.is_none());
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let store = SessionStore::new();
        let first = store.subscribe();
        let second = store.subscribe();
        assert_eq!(store.subscriber_count(), 2);

        drop(first);
        assert_eq!(store.subscriber_count(), 1);
        drop(second);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn clones_share_state() {
        let store = SessionStore::new();
        let reader = store.clone();
        assert!(matches!(reader.require_user(), Err(MarketClientError::NoSession)));

        let user_id = Uuid::new_v4();
        store.set(session(user_id));
        assert_eq!(reader.user_id(), Some(user_id));
        assert_eq!(reader.access_token().as_deref(), Some("token"));
    }

    #[test]
    fn expiry_is_checked_against_given_instant() {
        let mut s = session(Uuid::new_v4());
        let now = Utc::now();
        assert!(!s.is_expired_at(now));
        s.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(s.is_expired_at(now));
    }
}
