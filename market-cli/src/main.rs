use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use uuid::Uuid;

use market_client::media::MediaFile;
use market_client::{
    CommentDraft, CommentView, Credentials, FeedState, MarketClient, MarketClientError, PostDraft,
    PostView, Profile, ProfilePatch, ProviderDraft, ServiceCategory, ServiceDraft, ServiceView,
    Session, attach_like_status, attach_profiles,
};

mod logging;
mod settings;

use logging::{filter_directive, init_logging};
use settings::Settings;

const SESSION_FILE: &str = ".market_session";

#[derive(Debug, Parser)]
#[command(name = "market-cli", version, about = "CLI клиент маркетплейса")]
struct Cli {
    /// Подробные логи клиента (-v: debug, -vv: trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Регистрация пользователя.
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: String,
    },
    /// Вход пользователя.
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Выход и удаление сохранённой сессии.
    SignOut,
    /// Лента постов.
    Feed {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Поставить или снять лайк (требует сессию).
    Like {
        #[arg(long)]
        post: Uuid,
    },
    /// Комментарии поста.
    Comments {
        #[arg(long)]
        post: Uuid,
    },
    /// Добавить комментарий (требует сессию).
    Comment {
        #[arg(long)]
        post: Uuid,
        #[arg(long)]
        text: String,
    },
    /// Опубликовать пост с вложениями (требует сессию).
    Post {
        #[arg(long)]
        content: String,
        /// Путь к изображению или видео; можно указать несколько раз.
        #[arg(long = "media")]
        media: Vec<PathBuf>,
    },
    /// Удалить свой пост (требует сессию).
    DeletePost {
        #[arg(long)]
        id: Uuid,
    },
    /// Каталог услуг.
    Services {
        #[arg(long, value_parser = parse_category)]
        category: Option<ServiceCategory>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Опубликовать услугу (требует сессию).
    AddService {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        price: String,
        #[arg(long, value_parser = parse_category)]
        category: ServiceCategory,
        #[arg(long)]
        location: String,
        #[arg(long = "media")]
        media: Vec<PathBuf>,
    },
    /// Подать заявку на статус исполнителя (требует сессию).
    ApplyProvider {
        #[arg(long)]
        business_name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        address: Option<String>,
    },
    /// Профиль пользователя; без `--id` показывает свой.
    Profile {
        #[arg(long)]
        id: Option<Uuid>,
    },
    /// Обновить свой профиль (требует сессию).
    ///
    /// Не указанные поля остаются без изменений.
    UpdateProfile {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Ошибка: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;
    init_logging(&filter_directive(&settings.log_level, cli.verbose))?;

    let client = MarketClient::new(settings.client_config()).map_err(map_client_error)?;
    if let Some(session) = load_session().context("не удалось прочитать .market_session")? {
        if let Err(err) = client.restore_session(session) {
            warn!(error = %err, "saved session is expired, ignoring it");
            forget_session().context("не удалось удалить .market_session")?;
        }
    }

    match cli.command {
        Command::SignUp {
            email,
            password,
            full_name,
        } => {
            let credentials = Credentials { email, password };
            let session = client
                .sign_up(&credentials, &full_name)
                .await
                .map_err(map_client_error)?;
            match session {
                Some(session) => {
                    persist_session(&session).context("не удалось сохранить сессию")?;
                    println!("Регистрация успешна: user_id={}", session.user_id);
                }
                None => println!("Регистрация успешна, подтвердите email и выполните вход"),
            }
        }
        Command::SignIn { email, password } => {
            let session = client
                .sign_in(&Credentials { email, password })
                .await
                .map_err(map_client_error)?;
            persist_session(&session).context("не удалось сохранить сессию")?;
            println!("Вход выполнен: user_id={}", session.user_id);
        }
        Command::SignOut => {
            let result = client.sign_out().await;
            forget_session().context("не удалось удалить .market_session")?;
            result.map_err(map_client_error)?;
            println!("Выход выполнен");
        }
        Command::Feed { limit } => {
            let mut feed = FeedState::new();
            client.refresh_feed(&mut feed, limit).await;
            if let Some(message) = feed.take_error() {
                anyhow::bail!(message);
            }
            print_feed(feed.posts());
        }
        Command::Like { post } => {
            let mut feed = single_post_feed(&client, post).await?;
            let state = client
                .toggle_like(&mut feed, post)
                .await
                .map_err(map_client_error)?;
            let verb = if state.liked { "поставлен" } else { "снят" };
            println!("Лайк {verb}: лайков {}", state.count);
        }
        Command::Comments { post } => {
            let comments = client.comments(post).await.map_err(map_client_error)?;
            print_comments(&comments);
        }
        Command::Comment { post, text } => {
            let mut feed = single_post_feed(&client, post).await?;
            let comment = client
                .add_comment(&mut feed, post, CommentDraft { content: text })
                .await
                .map_err(map_client_error)?;
            println!("Комментарий добавлен: id={}", comment.row.id);
        }
        Command::Post { content, media } => {
            let files = load_media(&media).await?;
            let post = client
                .create_post(PostDraft { content }, &files, print_progress)
                .await
                .map_err(map_client_error)?;
            println!();
            println!("Пост создан: id={}, вложений {}", post.id, post.media_urls.len());
        }
        Command::DeletePost { id } => {
            client.delete_post(id).await.map_err(map_client_error)?;
            println!("Пост удалён: id={id}");
        }
        Command::Services { category, limit } => {
            let services = client
                .services(category, limit)
                .await
                .map_err(map_client_error)?;
            print_services(&services);
        }
        Command::AddService {
            title,
            description,
            price,
            category,
            location,
            media,
        } => {
            let files = load_media(&media).await?;
            let draft = ServiceDraft {
                title,
                description,
                price,
                category,
                location,
            };
            let service = client
                .create_service(draft, &files, print_progress)
                .await
                .map_err(map_client_error)?;
            println!();
            println!("Услуга создана: id={}", service.id);
        }
        Command::ApplyProvider {
            business_name,
            description,
            phone,
            email,
            address,
        } => {
            let provider = client
                .apply_as_provider(ProviderDraft {
                    business_name,
                    description,
                    phone,
                    email,
                    address,
                })
                .await
                .map_err(map_client_error)?;
            println!("Заявка принята: {} (id={})", provider.business_name, provider.id);
        }
        Command::Profile { id } => {
            let profile = match id {
                Some(id) => client.profile(id).await,
                None => client.my_profile().await,
            }
            .map_err(map_client_error)?;
            print_profile(&profile);
        }
        Command::UpdateProfile {
            full_name,
            phone,
            bio,
            avatar_url,
        } => {
            let patch = ProfilePatch {
                full_name,
                avatar_url,
                role: None,
                phone,
                bio,
            };
            let profile = client
                .update_profile(&patch)
                .await
                .map_err(map_client_error)?;
            print_profile(&profile);
        }
    }

    Ok(())
}

/// Состояние экрана с одним постом: лайк и комментарий идут через тот же
/// путь с откатом, что и в ленте.
async fn single_post_feed(client: &MarketClient, post_id: Uuid) -> Result<FeedState> {
    let post = client
        .store()
        .get_post(post_id)
        .await
        .map_err(map_client_error)?;
    let rows = attach_profiles(client.store(), vec![post]).await;
    let views = attach_like_status(client.store(), rows, client.session().user_id()).await;
    Ok(FeedState::with_posts(views))
}

async fn load_media(paths: &[PathBuf]) -> Result<Vec<MediaFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = MediaFile::from_path(path)
            .await
            .map_err(map_client_error)
            .with_context(|| format!("не удалось прочитать {}", path.display()))?;
        files.push(file);
    }
    Ok(files)
}

fn print_progress(percent: u8) {
    eprint!("\rЗагрузка: {percent}%");
}

fn parse_category(raw: &str) -> Result<ServiceCategory, String> {
    ServiceCategory::parse(raw).ok_or_else(|| {
        let known = ServiceCategory::ALL
            .iter()
            .map(|category| category.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("неизвестная категория '{raw}', допустимые: {known}")
    })
}

fn parse_session_content(raw: &str) -> Option<Session> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(session) => Some(session),
        Err(err) => {
            warn!(error = %err, "saved session is malformed, ignoring it");
            None
        }
    }
}

fn load_session() -> io::Result<Option<Session>> {
    if !Path::new(SESSION_FILE).exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(SESSION_FILE)?;
    Ok(parse_session_content(&raw))
}

fn persist_session(session: &Session) -> io::Result<()> {
    let raw = serde_json::to_string_pretty(session)?;
    fs::write(SESSION_FILE, raw)
}

fn forget_session() -> io::Result<()> {
    match fs::remove_file(SESSION_FILE) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn map_client_error(err: MarketClientError) -> anyhow::Error {
    let message = match err {
        MarketClientError::Unauthorized | MarketClientError::NoSession => {
            "требуется авторизация: выполните `market-cli sign-in ...` или `market-cli sign-up ...`"
                .to_string()
        }
        MarketClientError::NotFound => "ресурс не найден".to_string(),
        MarketClientError::Conflict(message) => format!("конфликт: {message}"),
        MarketClientError::Rejected { status, message } => {
            format!("сервер отклонил запрос (status={status}): {message}")
        }
        MarketClientError::Validation(message) => format!("некорректный запрос: {message}"),
        MarketClientError::Media(rejection) => format!("файл отклонён: {rejection}"),
        MarketClientError::Upload(message) => format!("ошибка загрузки медиа: {message}"),
        MarketClientError::Http(err) => format!("ошибка HTTP: {err}"),
        MarketClientError::MutationInFlight(post_id) => {
            format!("предыдущее действие с постом {post_id} ещё выполняется")
        }
        other => other.to_string(),
    };
    anyhow::anyhow!(message)
}

fn print_feed(posts: &[PostView]) {
    println!("Постов: {}", posts.len());
    for view in posts {
        let liked = if view.is_liked { " ♥" } else { "" };
        println!(
            "- [{}] {}: {} (лайков {}{liked}, комментариев {}, вложений {})",
            view.post.id,
            view.author_name(),
            view.post.content,
            view.post.likes_count,
            view.post.comments_count,
            view.post.media_urls.len()
        );
    }
}

fn print_comments(comments: &[CommentView]) {
    println!("Комментариев: {}", comments.len());
    for comment in comments {
        let author = comment
            .profile
            .as_ref()
            .map(|profile| profile.full_name.as_str())
            .unwrap_or("Unknown user");
        println!(
            "- [{}] {author}: {}",
            comment.row.created_at, comment.row.content
        );
    }
}

fn print_services(services: &[ServiceView]) {
    println!("Услуг: {}", services.len());
    for service in services {
        let owner = service
            .profile
            .as_ref()
            .map(|profile| profile.full_name.as_str())
            .unwrap_or("Unknown user");
        println!(
            "- [{}] {} ({}, {}) {}, исполнитель: {owner}",
            service.row.id,
            service.row.title,
            service.row.category.as_str(),
            service.row.location,
            service.row.price
        );
    }
}

fn print_profile(profile: &Profile) {
    println!("Профиль");
    println!("id: {}", profile.id);
    println!("full_name: {}", profile.full_name);
    println!("role: {:?}", profile.role);
    if let Some(email) = &profile.email {
        println!("email: {email}");
    }
    if let Some(phone) = &profile.phone {
        println!("phone: {phone}");
    }
    if let Some(bio) = &profile.bio {
        println!("bio: {bio}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_flag_is_counted_after_subcommand() {
        let cli = Cli::try_parse_from(["market-cli", "sign-out", "-vv"]).expect("valid args");
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::SignOut));

        let quiet = Cli::try_parse_from(["market-cli", "sign-out"]).expect("valid args");
        assert_eq!(quiet.verbose, 0);
    }

    #[test]
    fn parse_category_accepts_known_names() {
        assert_eq!(parse_category("repair"), Ok(ServiceCategory::Repair));
    }

    #[test]
    fn parse_category_lists_choices_on_error() {
        let err = parse_category("gardening").expect_err("unknown category");
        assert!(err.contains("cleaning"));
    }

    #[test]
    fn parse_session_content_rejects_blank_and_garbage() {
        assert!(parse_session_content("   ").is_none());
        assert!(parse_session_content("not json").is_none());
    }

    #[test]
    fn parse_session_content_reads_saved_session() {
        let raw = r#"{"access_token":"jwt","user_id":"7f1c2d1e-0000-4000-8000-0000000000aa"}"#;
        let session = parse_session_content(raw).expect("session");
        assert_eq!(session.access_token, "jwt");
        assert!(session.expires_at.is_none());
    }

    #[test]
    fn map_client_error_explains_missing_session() {
        let err = map_client_error(MarketClientError::NoSession);
        assert!(err.to_string().contains("market-cli sign-in"));
    }

    #[test]
    fn map_client_error_keeps_server_message() {
        let err = map_client_error(MarketClientError::Rejected {
            status: 400,
            message: "bad filter".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "сервер отклонил запрос (status=400): bad filter"
        );
    }
}
