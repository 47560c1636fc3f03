use std::collections::{HashMap, HashSet};

use tracing::{error, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{MarketClientError, MarketClientResult};
use crate::gateway::{Gateway, Store};
use crate::join;
use crate::models::{
    CommentDraft, CommentView, NewComment, NewLike, Post, PostCounters, PostView, Profile,
    WithProfile, trimmed,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Отображаемое состояние лайка поста: флаг и счётчик меняются только вместе.
pub struct LikeState {
    /// Лайкнул ли пост текущий пользователь.
    pub liked: bool,
    /// Счётчик лайков.
    pub count: i64,
}

impl LikeState {
    /// Состояние после переключения лайка.
    pub fn toggled(self) -> Self {
        if self.liked {
            Self {
                liked: false,
                count: (self.count - 1).max(0),
            }
        } else {
            Self {
                liked: true,
                count: self.count + 1,
            }
        }
    }
}

/// Локальное изменение со снимком состояния до него.
pub trait OptimisticMutation {
    /// Применяет изменение к локальному состоянию.
    fn apply(&self, state: &mut FeedState);
    /// Возвращает локальное состояние к снимку.
    fn undo(&self, state: &mut FeedState);
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Переключение лайка одного поста.
pub struct ToggleLike {
    post_id: Uuid,
    before: LikeState,
}

impl ToggleLike {
    /// Пост, к которому относится переключение.
    pub fn post_id(&self) -> Uuid {
        self.post_id
    }

    /// Состояние до переключения.
    pub fn before(&self) -> LikeState {
        self.before
    }

    /// Состояние после переключения.
    pub fn after(&self) -> LikeState {
        self.before.toggled()
    }

    /// Отправляет изменение на сервер: вставка или удаление строки `likes`
    /// и обновление счётчика поста.
    ///
    /// Если счётчик обновить не удалось, изменение в `likes` откатывается,
    /// чтобы серверное состояние осталось согласованным.
    pub async fn send<G: Gateway>(
        &self,
        store: &Store<G>,
        user_id: Uuid,
    ) -> MarketClientResult<()> {
        let like = NewLike {
            post_id: self.post_id,
            user_id,
        };
        let liking = self.after().liked;
        if liking {
            store.insert_like(like).await?;
        } else {
            store.delete_like(self.post_id, user_id).await?;
        }

        let delta = if liking { 1 } else { -1 };
        if let Err(err) = bump_likes(store, self.post_id, delta).await {
            let reverted = if liking {
                store.delete_like(self.post_id, user_id).await
            } else {
                store.insert_like(like).await.map(|_| ())
            };
            if let Err(revert_err) = reverted {
                warn!(post_id = %self.post_id, error = %revert_err, "failed to revert like row");
            }
            return Err(err);
        }
        Ok(())
    }
}

impl OptimisticMutation for ToggleLike {
    fn apply(&self, state: &mut FeedState) {
        state.set_like_state(self.post_id, self.after());
    }

    fn undo(&self, state: &mut FeedState) {
        state.set_like_state(self.post_id, self.before);
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Добавление комментария, уже сохранённого сервером, в локальный список.
pub struct AppendComment {
    comment: CommentView,
    before_count: i64,
}

impl OptimisticMutation for AppendComment {
    fn apply(&self, state: &mut FeedState) {
        let post_id = self.comment.row.post_id;
        state
            .comments
            .entry(post_id)
            .or_default()
            .push(self.comment.clone());
        state.set_comments_count(post_id, self.before_count + 1);
    }

    fn undo(&self, state: &mut FeedState) {
        let post_id = self.comment.row.post_id;
        if let Some(comments) = state.comments.get_mut(&post_id) {
            comments.retain(|comment| comment.row.id != self.comment.row.id);
        }
        state.set_comments_count(post_id, self.before_count);
    }
}

#[derive(Debug, Clone, Default)]
/// Состояние экрана ленты: посты, загруженные комментарии, последняя ошибка
/// и посты с незавершёнными оптимистичными изменениями.
///
/// Изменения применяются локально до ответа сервера и откатываются к снимку,
/// если запрос не удался.
pub struct FeedState {
    posts: Vec<PostView>,
    comments: HashMap<Uuid, Vec<CommentView>>,
    in_flight: HashSet<Uuid>,
    error: Option<String>,
    loading: bool,
}

impl FeedState {
    /// Пустое состояние.
    pub fn new() -> Self {
        Self::default()
    }

    /// Состояние с уже загруженными постами.
    pub fn with_posts(posts: Vec<PostView>) -> Self {
        Self {
            posts,
            ..Self::default()
        }
    }

    /// Посты в порядке отображения.
    pub fn posts(&self) -> &[PostView] {
        &self.posts
    }

    /// Пост по идентификатору.
    pub fn post(&self, post_id: Uuid) -> Option<&PostView> {
        self.posts.iter().find(|view| view.post.id == post_id)
    }

    /// Отображаемое состояние лайка поста.
    pub fn like_state(&self, post_id: Uuid) -> Option<LikeState> {
        self.post(post_id).map(|view| LikeState {
            liked: view.is_liked,
            count: view.post.likes_count,
        })
    }

    /// Загруженные комментарии поста.
    pub fn comments(&self, post_id: Uuid) -> &[CommentView] {
        self.comments
            .get(&post_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Последнее сообщение об ошибке для пользователя.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Забирает сообщение об ошибке (после показа пользователю).
    pub fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }

    /// Идёт ли загрузка ленты.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Есть ли незавершённое изменение для поста.
    pub fn is_in_flight(&self, post_id: Uuid) -> bool {
        self.in_flight.contains(&post_id)
    }

    fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    fn post_mut(&mut self, post_id: Uuid) -> Option<&mut PostView> {
        self.posts.iter_mut().find(|view| view.post.id == post_id)
    }

    fn set_like_state(&mut self, post_id: Uuid, like: LikeState) {
        if let Some(view) = self.post_mut(post_id) {
            view.is_liked = like.liked;
            view.post.likes_count = like.count;
        }
    }

    fn set_comments_count(&mut self, post_id: Uuid, count: i64) {
        if let Some(view) = self.post_mut(post_id) {
            view.post.comments_count = count.max(0);
        }
    }

    /// Перезагружает ленту. Ошибка чтения не прерывает экран: лента
    /// становится пустой, а сообщение сохраняется в `error`.
    pub async fn refresh<G: Gateway>(
        &mut self,
        store: &Store<G>,
        current_user: Option<Uuid>,
        limit: u32,
    ) -> &[PostView] {
        self.loading = true;
        match join::load_feed(store, current_user, limit).await {
            Ok(posts) => {
                self.posts = posts;
                self.error = None;
            }
            Err(err) => {
                error!(error = %err, "feed fetch failed");
                self.posts.clear();
                self.set_error(format!("Не удалось загрузить ленту: {err}"));
            }
        }
        self.comments.clear();
        self.loading = false;
        &self.posts
    }

    /// Загружает комментарии поста; при ошибке список пуст, а сообщение
    /// сохраняется в `error`.
    pub async fn load_comments<G: Gateway>(
        &mut self,
        store: &Store<G>,
        post_id: Uuid,
    ) -> &[CommentView] {
        let comments = match join::load_comments(store, post_id).await {
            Ok(comments) => comments,
            Err(err) => {
                error!(error = %err, %post_id, "comments fetch failed");
                self.set_error(format!("Не удалось загрузить комментарии: {err}"));
                Vec::new()
            }
        };
        self.comments.insert(post_id, comments);
        self.comments(post_id)
    }

    /// Синхронно переключает лайк локально, до любого сетевого вызова.
    ///
    /// Пока предыдущее переключение того же поста не завершено, новое
    /// отклоняется с `MutationInFlight`.
    pub fn begin_like_toggle(&mut self, post_id: Uuid) -> MarketClientResult<ToggleLike> {
        if self.in_flight.contains(&post_id) {
            return Err(MarketClientError::MutationInFlight(post_id));
        }
        let before = self.like_state(post_id).ok_or(MarketClientError::NotFound)?;

        let toggle = ToggleLike { post_id, before };
        toggle.apply(self);
        self.in_flight.insert(post_id);
        Ok(toggle)
    }

    /// Завершает переключение: при ошибке сервера возвращает пост точно
    /// к состоянию до переключения и сохраняет сообщение для пользователя.
    pub fn settle(
        &mut self,
        toggle: ToggleLike,
        result: MarketClientResult<()>,
    ) -> MarketClientResult<LikeState> {
        self.in_flight.remove(&toggle.post_id);
        match result {
            Ok(()) => Ok(toggle.after()),
            Err(err) => {
                toggle.undo(self);
                error!(post_id = %toggle.post_id, error = %err, "like toggle rolled back");
                self.set_error(format!("Не удалось обновить лайк: {err}"));
                Err(err)
            }
        }
    }

    /// Переключает лайк целиком: локально, на сервере и откат при ошибке.
    pub async fn toggle_like<G: Gateway>(
        &mut self,
        store: &Store<G>,
        user_id: Uuid,
        post_id: Uuid,
    ) -> MarketClientResult<LikeState> {
        let toggle = self.begin_like_toggle(post_id)?;
        let result = toggle.send(store, user_id).await;
        self.settle(toggle, result)
    }

    /// Добавляет комментарий: сохраняет его на сервере, добавляет
    /// возвращённую строку в локальный список и увеличивает счётчик
    /// локально и на сервере.
    ///
    /// Если счётчик на сервере обновить не удалось, локальные изменения
    /// откатываются, а сохранённый комментарий удаляется.
    pub async fn add_comment<G: Gateway>(
        &mut self,
        store: &Store<G>,
        user_id: Uuid,
        author: Option<&Profile>,
        post_id: Uuid,
        draft: CommentDraft,
    ) -> MarketClientResult<CommentView> {
        let draft = CommentDraft {
            content: trimmed(&draft.content),
        };
        draft.validate()?;
        let before_count = self
            .post(post_id)
            .map(|view| view.post.comments_count)
            .ok_or(MarketClientError::NotFound)?;

        let input = NewComment {
            post_id,
            user_id,
            content: draft.content,
        };
        let comment = match store.insert_comment(&input).await {
            Ok(comment) => comment,
            Err(err) => {
                self.set_error(format!("Не удалось отправить комментарий: {err}"));
                return Err(err);
            }
        };

        let mutation = AppendComment {
            comment: WithProfile {
                row: comment,
                profile: author.cloned(),
            },
            before_count,
        };
        mutation.apply(self);

        if let Err(err) = bump_comments(store, post_id).await {
            mutation.undo(self);
            if let Err(delete_err) = store.delete_comment(mutation.comment.row.id).await {
                warn!(error = %delete_err, "failed to remove comment after counter failure");
            }
            error!(%post_id, error = %err, "comment rolled back");
            self.set_error(format!("Не удалось отправить комментарий: {err}"));
            return Err(err);
        }

        Ok(mutation.comment)
    }
}

// Счётчики обновляются от серверного значения, а не от локального снимка.
async fn bump_likes<G: Gateway>(
    store: &Store<G>,
    post_id: Uuid,
    delta: i64,
) -> MarketClientResult<Post> {
    let post = store.get_post(post_id).await?;
    store
        .update_post_counters(post_id, PostCounters::likes(post.likes_count + delta))
        .await
}

async fn bump_comments<G: Gateway>(store: &Store<G>, post_id: Uuid) -> MarketClientResult<Post> {
    let post = store.get_post(post_id).await?;
    store
        .update_post_counters(post_id, PostCounters::comments(post.comments_count + 1))
        .await
}
