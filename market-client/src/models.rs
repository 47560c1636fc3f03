use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Роль владельца профиля.
pub enum Role {
    /// Пользователь, оформивший статус исполнителя услуг.
    ServiceProvider,
    /// Обычный пользователь. Неизвестные значения роли сводятся сюда.
    #[default]
    #[serde(other)]
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Профиль пользователя (идентификатор совпадает с идентификатором auth).
pub struct Profile {
    /// Идентификатор пользователя.
    pub id: Uuid,
    /// Отображаемое имя.
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
    /// URL аватара.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Роль пользователя.
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: Role,
    /// Контактный телефон.
    #[serde(default)]
    pub phone: Option<String>,
    /// Контактный email.
    #[serde(default)]
    pub email: Option<String>,
    /// Короткое описание.
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
/// Частичное обновление профиля владельцем.
pub struct ProfilePatch {
    /// Новое отображаемое имя.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Новый URL аватара.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Новая роль.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Новый телефон.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Новое описание.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Публикация в ленте.
pub struct Post {
    /// Идентификатор поста.
    pub id: Uuid,
    /// Автор поста.
    pub user_id: Uuid,
    /// Текст поста.
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    /// Упорядоченный список URL вложений.
    #[serde(default, deserialize_with = "null_as_default")]
    pub media_urls: Vec<String>,
    /// Счётчик лайков.
    #[serde(default, deserialize_with = "null_as_default")]
    pub likes_count: i64,
    /// Счётчик комментариев.
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments_count: i64,
    /// Дата и время создания (UTC).
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
/// Данные для создания поста.
pub struct NewPost {
    /// Автор (должен совпадать с пользователем сессии).
    pub user_id: Uuid,
    /// Текст поста.
    pub content: String,
    /// URL загруженных вложений.
    pub media_urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
/// Частичное обновление счётчиков поста.
pub struct PostCounters {
    /// Новое значение счётчика лайков.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes_count: Option<i64>,
    /// Новое значение счётчика комментариев.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments_count: Option<i64>,
}

impl PostCounters {
    /// Обновление только счётчика лайков.
    pub fn likes(count: i64) -> Self {
        Self {
            likes_count: Some(count.max(0)),
            comments_count: None,
        }
    }

    /// Обновление только счётчика комментариев.
    pub fn comments(count: i64) -> Self {
        Self {
            likes_count: None,
            comments_count: Some(count.max(0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Комментарий к посту. Неизменяем после создания.
pub struct Comment {
    /// Идентификатор комментария.
    pub id: Uuid,
    /// Пост, к которому относится комментарий.
    pub post_id: Uuid,
    /// Автор комментария.
    pub user_id: Uuid,
    /// Текст комментария.
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    /// Дата и время создания (UTC).
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
/// Данные для создания комментария.
pub struct NewComment {
    /// Пост.
    pub post_id: Uuid,
    /// Автор.
    pub user_id: Uuid,
    /// Текст.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Лайк: уникальная пара (пост, пользователь).
pub struct Like {
    /// Идентификатор лайка.
    pub id: Uuid,
    /// Пост.
    pub post_id: Uuid,
    /// Пользователь.
    pub user_id: Uuid,
    /// Дата и время создания (UTC).
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
/// Данные для создания лайка.
pub struct NewLike {
    /// Пост.
    pub post_id: Uuid,
    /// Пользователь.
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Категория услуги. Неизвестные значения сводятся к `Other`.
pub enum ServiceCategory {
    /// Уборка.
    Cleaning,
    /// Ремонт.
    Repair,
    /// Красота и уход.
    Beauty,
    /// Обучение.
    Education,
    /// Перевозки.
    Transport,
    /// Прочее.
    #[default]
    #[serde(other)]
    Other,
}

impl ServiceCategory {
    /// Все категории в порядке отображения.
    pub const ALL: [ServiceCategory; 6] = [
        ServiceCategory::Cleaning,
        ServiceCategory::Repair,
        ServiceCategory::Beauty,
        ServiceCategory::Education,
        ServiceCategory::Transport,
        ServiceCategory::Other,
    ];

    /// Строковое значение категории в таблице `services`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cleaning => "cleaning",
            Self::Repair => "repair",
            Self::Beauty => "beauty",
            Self::Education => "education",
            Self::Transport => "transport",
            Self::Other => "other",
        }
    }

    /// Разбирает категорию из строки; неизвестное значение даёт `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Услуга в каталоге.
pub struct Service {
    /// Идентификатор услуги.
    pub id: Uuid,
    /// Владелец услуги.
    pub user_id: Uuid,
    /// Заголовок.
    pub title: String,
    /// Описание.
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Цена в свободной форме («от 500 ₽», «договорная»).
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: String,
    /// Категория.
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: ServiceCategory,
    /// Место оказания услуги.
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    /// Упорядоченный список URL вложений.
    #[serde(default, deserialize_with = "null_as_default")]
    pub media_urls: Vec<String>,
    /// Средний рейтинг (поддерживается сервером).
    #[serde(default, deserialize_with = "null_as_default")]
    pub rating: f64,
    /// Количество отзывов (поддерживается сервером).
    #[serde(default, deserialize_with = "null_as_default")]
    pub reviews_count: i64,
    /// Дата и время создания (UTC).
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
/// Данные для создания услуги.
pub struct NewService {
    /// Владелец.
    pub user_id: Uuid,
    /// Заголовок.
    pub title: String,
    /// Описание.
    pub description: String,
    /// Цена.
    pub price: String,
    /// Категория.
    pub category: ServiceCategory,
    /// Место.
    pub location: String,
    /// URL вложений.
    pub media_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
/// Частичное обновление услуги владельцем.
pub struct ServicePatch {
    /// Новый заголовок.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Новое описание.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Новая цена.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// Новая категория.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ServiceCategory>,
    /// Новое место.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Исполнитель услуг (не более одного на пользователя).
pub struct ServiceProvider {
    /// Идентификатор записи.
    pub id: Uuid,
    /// Пользователь-владелец.
    pub user_id: Uuid,
    /// Название компании или имя исполнителя.
    pub business_name: String,
    /// Описание деятельности.
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Телефон.
    #[serde(default, deserialize_with = "null_as_default")]
    pub phone: String,
    /// Email.
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    /// Адрес.
    #[serde(default)]
    pub address: Option<String>,
    /// Дата и время создания (UTC).
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
/// Данные заявки на статус исполнителя.
pub struct NewServiceProvider {
    /// Пользователь-владелец.
    pub user_id: Uuid,
    /// Название.
    pub business_name: String,
    /// Описание.
    pub description: String,
    /// Телефон.
    pub phone: String,
    /// Email.
    pub email: String,
    /// Адрес.
    pub address: Option<String>,
}

/// Запись, у которой есть автор (внешний ключ на `profiles.id`).
pub trait HasAuthor {
    /// Идентификатор автора записи.
    fn author_id(&self) -> Uuid;
}

impl HasAuthor for Post {
    fn author_id(&self) -> Uuid {
        self.user_id
    }
}

impl HasAuthor for Comment {
    fn author_id(&self) -> Uuid {
        self.user_id
    }
}

impl HasAuthor for Service {
    fn author_id(&self) -> Uuid {
        self.user_id
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Строка, дополненная профилем автора (левое соединение на клиенте).
///
/// `profile` равен `None`, если профиль не пришёл (удалённый пользователь или
/// неудачный запрос профилей).
pub struct WithProfile<R> {
    /// Исходная строка.
    pub row: R,
    /// Профиль автора.
    pub profile: Option<Profile>,
}

/// Комментарий с профилем автора.
pub type CommentView = WithProfile<Comment>;

/// Услуга с профилем владельца.
pub type ServiceView = WithProfile<Service>;

#[derive(Debug, Clone, PartialEq)]
/// Пост в том виде, в котором его показывает лента.
pub struct PostView {
    /// Пост.
    pub post: Post,
    /// Профиль автора.
    pub profile: Option<Profile>,
    /// Лайкнул ли пост текущий пользователь.
    pub is_liked: bool,
}

impl PostView {
    /// Отображаемое имя автора.
    pub fn author_name(&self) -> &str {
        self.profile
            .as_ref()
            .map(|profile| profile.full_name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or("Unknown user")
    }
}

#[derive(Debug, Clone, Validate)]
/// Форма нового поста.
pub struct PostDraft {
    /// Текст поста.
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
}

#[derive(Debug, Clone, Validate)]
/// Форма нового комментария.
pub struct CommentDraft {
    /// Текст комментария.
    #[validate(length(min = 1, max = 500))]
    pub content: String,
}

#[derive(Debug, Clone, Validate)]
/// Форма новой услуги.
pub struct ServiceDraft {
    /// Заголовок.
    #[validate(length(min = 3, max = 120))]
    pub title: String,
    /// Описание.
    #[validate(length(min = 1))]
    pub description: String,
    /// Цена.
    #[validate(length(min = 1, max = 64))]
    pub price: String,
    /// Категория.
    pub category: ServiceCategory,
    /// Место.
    #[validate(length(min = 1, max = 255))]
    pub location: String,
}

#[derive(Debug, Clone, Validate)]
/// Заявка на статус исполнителя.
pub struct ProviderDraft {
    /// Название.
    #[validate(length(min = 2, max = 120))]
    pub business_name: String,
    /// Описание.
    pub description: String,
    /// Телефон.
    #[validate(length(min = 5, max = 32))]
    pub phone: String,
    /// Email.
    #[validate(email)]
    pub email: String,
    /// Адрес.
    pub address: Option<String>,
}

#[derive(Debug, Clone, Validate)]
/// Учётные данные для входа и регистрации.
pub struct Credentials {
    /// Email.
    #[validate(email)]
    pub email: String,
    /// Пароль.
    #[validate(length(min = 6, max = 128))]
    pub password: String,
}

/// Обрезает пробелы по краям всех текстовых полей формы.
pub(crate) fn trimmed(value: &str) -> String {
    value.trim().to_string()
}

/// Колонка, пришедшая как `null`, получает значение по умолчанию, как и
/// отсутствующая.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
