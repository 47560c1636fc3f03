use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::warn;
use uuid::Uuid;

use crate::error::MarketClientResult;
use crate::gateway::{Direction, Gateway, Query, Store};
use crate::models::{CommentView, HasAuthor, Post, PostView, Profile, ServiceCategory, ServiceView, WithProfile};

/// Дополняет каждую строку профилем её автора (левое соединение).
///
/// Профили запрашиваются одним запросом по всем различным авторам. Пустой
/// вход не порождает запроса. Если запрос профилей не удался, строки
/// возвращаются без профилей.
pub async fn attach_profiles<G, R>(store: &Store<G>, rows: Vec<R>) -> Vec<WithProfile<R>>
where
    G: Gateway,
    R: HasAuthor,
{
    if rows.is_empty() {
        return Vec::new();
    }

    let author_ids: Vec<Uuid> = rows
        .iter()
        .map(HasAuthor::author_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let profiles = match store.list_profiles(&author_ids).await {
        Ok(profiles) => profiles,
        Err(err) => {
            warn!(error = %err, authors = author_ids.len(), "profile fetch failed, rows shown without profiles");
            Vec::new()
        }
    };

    left_join(rows, profiles)
}

fn left_join<R: HasAuthor>(rows: Vec<R>, profiles: Vec<Profile>) -> Vec<WithProfile<R>> {
    let by_id: HashMap<Uuid, Profile> = profiles
        .into_iter()
        .map(|profile| (profile.id, profile))
        .collect();

    rows.into_iter()
        .map(|row| {
            let profile = by_id.get(&row.author_id()).cloned();
            WithProfile { row, profile }
        })
        .collect()
}

/// Отмечает посты, которые лайкнул текущий пользователь.
///
/// Без сессии запрос не выполняется и все флаги равны `false`; при ошибке
/// запроса лайков флаги также остаются `false`.
pub async fn attach_like_status<G: Gateway>(
    store: &Store<G>,
    posts: Vec<WithProfile<Post>>,
    current_user: Option<Uuid>,
) -> Vec<PostView> {
    let liked: HashSet<Uuid> = match current_user {
        Some(user_id) if !posts.is_empty() => match store.likes_of_user(user_id).await {
            Ok(likes) => likes.into_iter().map(|like| like.post_id).collect(),
            Err(err) => {
                warn!(error = %err, %user_id, "like status fetch failed, showing posts as not liked");
                HashSet::new()
            }
        },
        _ => HashSet::new(),
    };

    posts
        .into_iter()
        .map(|joined| PostView {
            is_liked: liked.contains(&joined.row.id),
            post: joined.row,
            profile: joined.profile,
        })
        .collect()
}

/// Лента: последние посты с профилями авторов и статусом лайка.
///
/// Не больше трёх запросов: посты, один пакетный запрос профилей и один
/// запрос лайков текущего пользователя.
pub async fn load_feed<G: Gateway>(
    store: &Store<G>,
    current_user: Option<Uuid>,
    limit: u32,
) -> MarketClientResult<Vec<PostView>> {
    let posts = store.recent_posts(limit).await?;
    let posts = attach_profiles(store, posts).await;
    Ok(attach_like_status(store, posts, current_user).await)
}

/// Комментарии поста с профилями авторов.
pub async fn load_comments<G: Gateway>(
    store: &Store<G>,
    post_id: Uuid,
) -> MarketClientResult<Vec<CommentView>> {
    let comments = store.list_comments(post_id).await?;
    Ok(attach_profiles(store, comments).await)
}

/// Каталог услуг (опционально одной категории) с профилями владельцев.
pub async fn load_services<G: Gateway>(
    store: &Store<G>,
    category: Option<ServiceCategory>,
    limit: u32,
) -> MarketClientResult<Vec<ServiceView>> {
    let mut query = Query::new();
    if let Some(category) = category {
        query = query.eq("category", category.as_str());
    }
    let query = query.order("created_at", Direction::Desc).limit(limit);

    let services = store.list_services(&query).await?;
    Ok(attach_profiles(store, services).await)
}
