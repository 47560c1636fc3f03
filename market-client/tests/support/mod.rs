// In-process fake of the backend: table REST API, auth, object storage and
// the media host, all on one random local port.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use market_client::gateway::{Direction, Query as RowQuery};
use market_client::media::RetryPolicy;
use market_client::{ClientConfig, Credentials, MarketClient, MediaBackend};

pub const ANON_KEY: &str = "anon-test-key";
pub const CLOUD_NAME: &str = "test-cloud";
pub const PASSWORD: &str = "secret123";

#[derive(Debug, Default)]
pub struct Backend {
    pub tables: HashMap<String, Vec<Value>>,
    users: HashMap<String, (Uuid, String)>,
    tokens: HashMap<String, Uuid>,
    /// Loaded media file names in arrival order, one entry per attempt.
    pub media_attempts: Vec<String>,
    /// File name -> how many more uploads of it must fail.
    pub media_failures: HashMap<String, usize>,
    /// Bucket object keys as `bucket/path`.
    pub objects: Vec<String>,
}

impl Backend {
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.get(table).cloned().unwrap_or_default()
    }

    pub fn push_row(&mut self, table: &str, row: Value) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    fn caller(&self, headers: &HeaderMap) -> Option<Uuid> {
        let token = headers
            .get("authorization")?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        self.tokens.get(token).copied()
    }

    fn issue_token(&mut self, user_id: Uuid, email: &str) -> Value {
        let token = Uuid::new_v4().to_string();
        self.tokens.insert(token.clone(), user_id);
        json!({
            "access_token": token,
            "refresh_token": Uuid::new_v4().to_string(),
            "expires_in": 3600,
            "user": { "id": user_id, "email": email },
        })
    }
}

pub type Shared = Arc<Mutex<Backend>>;

pub struct Harness {
    pub base_url: String,
    pub state: Shared,
}

impl Harness {
    pub async fn start() -> Self {
        let state = Shared::default();
        let app = Router::new()
            .route(
                "/rest/v1/{table}",
                get(select_rows)
                    .post(insert_row)
                    .patch(update_rows)
                    .delete(delete_rows),
            )
            .route("/auth/v1/signup", post(sign_up))
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/logout", post(logout))
            .route("/storage/v1/object/{bucket}/{*path}", post(put_object))
            .route("/media/{cloud}/{kind}/upload", post(media_upload))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind fake backend");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake backend stopped");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.base_url.clone(), ANON_KEY);
        config.media_host_url = format!("{}/media", self.base_url);
        config.media_cloud_name = CLOUD_NAME.to_string();
        config.post_upload_retry = RetryPolicy::Fixed {
            attempts: 3,
            backoff: Duration::from_millis(10),
        };
        config
    }

    pub fn client(&self) -> MarketClient {
        MarketClient::new(self.config()).expect("valid config")
    }

    pub fn bucket_client(&self) -> MarketClient {
        let mut config = self.config();
        config.media_backend = MediaBackend::Bucket;
        MarketClient::new(config).expect("valid config")
    }

    /// Registers `name` and returns a client signed in as that user.
    pub async fn signed_in(&self, name: &str) -> MarketClient {
        let client = self.client();
        client
            .sign_up(&credentials(name), name)
            .await
            .expect("sign up")
            .expect("session issued");
        client
    }

    pub fn backend(&self) -> std::sync::MutexGuard<'_, Backend> {
        self.state.lock().expect("backend mutex poisoned")
    }
}

pub fn credentials(name: &str) -> Credentials {
    Credentials {
        email: format!("{name}@example.com"),
        password: PASSWORD.to_string(),
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn reject(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "code": code, "message": message }))).into_response()
}

fn unauthorized() -> Response {
    reject(StatusCode::UNAUTHORIZED, "42501", "permission denied")
}

struct Selection {
    filter: RowQuery,
    order: Option<(String, Direction)>,
    limit: Option<usize>,
}

fn parse_selection(params: &[(String, String)]) -> Selection {
    let mut selection = Selection {
        filter: RowQuery::new(),
        order: None,
        limit: None,
    };
    for (key, value) in params {
        match key.as_str() {
            "select" => {}
            "limit" => selection.limit = value.parse().ok(),
            "order" => {
                let (column, direction) = value.rsplit_once('.').unwrap_or((value.as_str(), "asc"));
                let direction = if direction == "desc" {
                    Direction::Desc
                } else {
                    Direction::Asc
                };
                selection.order = Some((column.to_string(), direction));
            }
            column => {
                if let Some(eq) = value.strip_prefix("eq.") {
                    selection.filter = selection.filter.clone().eq(column, eq);
                } else if let Some(list) = value
                    .strip_prefix("in.(")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    let values = list
                        .split(',')
                        .filter(|item| !item.is_empty())
                        .map(|item| item.trim_matches('"').to_string());
                    selection.filter = selection.filter.clone().in_(column, values);
                }
            }
        }
    }
    selection
}

fn sort_key(row: &Value, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

async fn select_rows(
    State(state): State<Shared>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let selection = parse_selection(&params);
    let backend = state.lock().expect("backend mutex poisoned");
    let mut rows: Vec<Value> = backend
        .rows(&table)
        .into_iter()
        .filter(|row| selection.filter.matches(row))
        .collect();
    if let Some((column, direction)) = &selection.order {
        rows.sort_by_key(|row| sort_key(row, column));
        if *direction == Direction::Desc {
            rows.reverse();
        }
    }
    if let Some(limit) = selection.limit {
        rows.truncate(limit);
    }
    Json(rows).into_response()
}

async fn insert_row(
    State(state): State<Shared>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(mut row): Json<Value>,
) -> Response {
    let mut backend = state.lock().expect("backend mutex poisoned");
    let Some(caller) = backend.caller(&headers) else {
        return unauthorized();
    };
    if row.get("user_id").and_then(Value::as_str) != Some(caller.to_string().as_str()) {
        return reject(
            StatusCode::FORBIDDEN,
            "42501",
            "new row violates row-level security policy",
        );
    }

    let existing = backend.rows(&table);
    let duplicate = match table.as_str() {
        "likes" => existing
            .iter()
            .any(|other| other["post_id"] == row["post_id"] && other["user_id"] == row["user_id"]),
        "service_providers" => existing
            .iter()
            .any(|other| other["user_id"] == row["user_id"]),
        _ => false,
    };
    if duplicate {
        return reject(
            StatusCode::CONFLICT,
            "23505",
            "duplicate key value violates unique constraint",
        );
    }

    let fields = row.as_object_mut().expect("insert body must be an object");
    fields.insert("id".to_string(), json!(Uuid::new_v4()));
    fields.insert("created_at".to_string(), json!(now()));
    let defaults = match table.as_str() {
        "posts" => vec![("likes_count", json!(0)), ("comments_count", json!(0))],
        "services" => vec![("rating", json!(0.0)), ("reviews_count", json!(0))],
        _ => Vec::new(),
    };
    for (column, value) in defaults {
        fields.entry(column).or_insert(value);
    }

    backend.push_row(&table, row.clone());
    (StatusCode::CREATED, Json(vec![row])).into_response()
}

async fn update_rows(
    State(state): State<Shared>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    Json(patch): Json<Value>,
) -> Response {
    let selection = parse_selection(&params);
    let mut backend = state.lock().expect("backend mutex poisoned");
    let Some(caller) = backend.caller(&headers) else {
        return unauthorized();
    };

    let caller = caller.to_string();
    let mut updated = Vec::new();
    if let Some(rows) = backend.tables.get_mut(&table) {
        for row in rows.iter_mut().filter(|row| selection.filter.matches(row)) {
            if table == "profiles" && row["id"].as_str() != Some(caller.as_str()) {
                continue;
            }
            if let (Some(fields), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                for (column, value) in changes {
                    fields.insert(column.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
    }
    Json(updated).into_response()
}

async fn delete_rows(
    State(state): State<Shared>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    let selection = parse_selection(&params);
    let mut backend = state.lock().expect("backend mutex poisoned");
    let Some(caller) = backend.caller(&headers) else {
        return unauthorized();
    };

    let caller = caller.to_string();
    let rows = backend.tables.remove(&table).unwrap_or_default();
    let (removed, kept): (Vec<Value>, Vec<Value>) = rows.into_iter().partition(|row| {
        selection.filter.matches(row) && row["user_id"].as_str() == Some(caller.as_str())
    });
    backend.tables.insert(table, kept);
    Json(removed).into_response()
}

#[derive(Debug, Deserialize)]
struct SignUpBody {
    email: String,
    password: String,
    #[serde(default)]
    data: Value,
}

async fn sign_up(State(state): State<Shared>, Json(body): Json<SignUpBody>) -> Response {
    let mut backend = state.lock().expect("backend mutex poisoned");
    if backend.users.contains_key(&body.email) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "msg": "User already registered" })),
        )
            .into_response();
    }

    let user_id = Uuid::new_v4();
    backend
        .users
        .insert(body.email.clone(), (user_id, body.password));
    let full_name = body.data["full_name"].as_str().unwrap_or_default().to_string();
    backend.push_row(
        "profiles",
        json!({
            "id": user_id,
            "full_name": full_name,
            "role": "user",
            "email": body.email,
            "created_at": now(),
        }),
    );
    Json(backend.issue_token(user_id, &body.email)).into_response()
}

#[derive(Debug, Deserialize)]
struct GrantQuery {
    grant_type: String,
}

#[derive(Debug, Deserialize)]
struct PasswordBody {
    email: String,
    password: String,
}

async fn token(
    State(state): State<Shared>,
    Query(grant): Query<GrantQuery>,
    Json(body): Json<PasswordBody>,
) -> Response {
    let mut backend = state.lock().expect("backend mutex poisoned");
    let known = backend
        .users
        .get(&body.email)
        .filter(|(_, password)| *password == body.password && grant.grant_type == "password")
        .map(|(user_id, _)| *user_id);
    match known {
        Some(user_id) => Json(backend.issue_token(user_id, &body.email)).into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials",
            })),
        )
            .into_response(),
    }
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> StatusCode {
    let mut backend = state.lock().expect("backend mutex poisoned");
    if let Some(token) = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        backend.tokens.remove(token);
    }
    StatusCode::NO_CONTENT
}

async fn put_object(
    State(state): State<Shared>,
    Path((bucket, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut backend = state.lock().expect("backend mutex poisoned");
    if backend.caller(&headers).is_none() {
        return unauthorized();
    }
    let key = format!("{bucket}/{path}");
    backend.objects.push(key.clone());
    Json(json!({ "Key": key })).into_response()
}

async fn media_upload(
    State(state): State<Shared>,
    Path((cloud, kind)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Response {
    let mut file_name = String::new();
    let mut preset = String::new();
    let mut folder = String::new();
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        match field.name() {
            Some("file") => {
                file_name = field.file_name().unwrap_or_default().to_string();
                field.bytes().await.expect("file bytes");
            }
            Some("upload_preset") => preset = field.text().await.expect("preset"),
            Some("folder") => folder = field.text().await.expect("folder"),
            _ => {}
        }
    }

    let mut backend = state.lock().expect("backend mutex poisoned");
    backend.media_attempts.push(file_name.clone());
    if preset != "market_unsigned" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "Upload preset not found" } })),
        )
            .into_response();
    }
    if let Some(remaining) = backend.media_failures.get_mut(&file_name) {
        if *remaining > 0 {
            *remaining -= 1;
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": { "message": "temporarily unavailable" } })),
            )
                .into_response();
        }
    }

    Json(json!({
        "secure_url": format!("https://media.test/{cloud}/{kind}/{folder}/{file_name}"),
    }))
    .into_response()
}
