use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{MarketClientError, MarketClientResult};
use crate::models::{Credentials, trimmed};
use crate::session::{Session, SessionStore};

#[derive(Debug, Serialize)]
struct PasswordGrantDto<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpDto<'a> {
    email: &'a str,
    password: &'a str,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AuthUserDto {
    id: Uuid,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthResponseDto {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: Option<AuthUserDto>,
    // Без подтверждения email сервер возвращает пользователя на верхнем уровне.
    id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct AuthErrorDto {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
}

impl AuthResponseDto {
    fn into_session(self) -> Option<Session> {
        let access_token = self.access_token?;
        let user = self.user?;
        Some(Session {
            access_token,
            refresh_token: self.refresh_token,
            user_id: user.id,
            email: user.email,
            expires_at: self
                .expires_in
                .map(|seconds| Utc::now() + Duration::seconds(seconds)),
        })
    }
}

#[derive(Debug, Clone)]
/// Клиент сервиса авторизации (`/auth/v1`). Единственный писатель
/// `SessionStore`.
pub struct AuthClient {
    base_url: String,
    anon_key: String,
    client: Client,
    session: SessionStore,
}

impl AuthClient {
    /// Создаёт клиент авторизации.
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        client: Client,
        session: SessionStore,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            anon_key: anon_key.into(),
            client,
            session,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/auth/v1/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn decode_error(response: reqwest::Response) -> MarketClientError {
        let status = response.status();
        match response.json::<AuthErrorDto>().await {
            Ok(body) if body.error.as_deref() == Some("invalid_grant") => {
                MarketClientError::Unauthorized
            }
            Ok(body) => {
                let message = body.error_description.or(body.msg).or(body.error);
                MarketClientError::from_http_status(status, None, message)
            }
            Err(_) => MarketClientError::from_http_status(status, None, None),
        }
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> MarketClientResult<AuthResponseDto> {
        let response = self
            .client
            .post(self.endpoint(path))
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await
            .map_err(MarketClientError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        response
            .json::<AuthResponseDto>()
            .await
            .map_err(MarketClientError::from_reqwest)
    }

    /// Регистрирует пользователя. Профиль создаётся сервером вместе с
    /// учётной записью.
    ///
    /// Возвращает `None`, если сервер требует подтверждения email и сессия
    /// ещё не выдана.
    pub async fn sign_up(
        &self,
        credentials: &Credentials,
        full_name: &str,
    ) -> MarketClientResult<Option<Session>> {
        let credentials = normalized(credentials)?;
        let payload = SignUpDto {
            email: &credentials.email,
            password: &credentials.password,
            data: json!({ "full_name": trimmed(full_name) }),
        };
        let dto = self.post_json("signup", &payload).await?;
        let pending_user = dto.id;

        match dto.into_session() {
            Some(session) => {
                info!(user_id = %session.user_id, "signed up");
                self.session.set(session.clone());
                Ok(Some(session))
            }
            None => {
                info!(user_id = ?pending_user, "sign up awaits email confirmation");
                Ok(None)
            }
        }
    }

    /// Вход по email и паролю; сессия сохраняется в `SessionStore`.
    pub async fn sign_in(&self, credentials: &Credentials) -> MarketClientResult<Session> {
        let credentials = normalized(credentials)?;
        let payload = PasswordGrantDto {
            email: &credentials.email,
            password: &credentials.password,
        };
        let session = self
            .post_json("token?grant_type=password", &payload)
            .await?
            .into_session()
            .ok_or_else(|| MarketClientError::Decode("token response without session".to_string()))?;

        info!(user_id = %session.user_id, "signed in");
        self.session.set(session.clone());
        Ok(session)
    }

    /// Выход. Локальная сессия сбрасывается, даже если сервер недоступен.
    pub async fn sign_out(&self) -> MarketClientResult<()> {
        let Some(token) = self.session.access_token() else {
            return Ok(());
        };
        let result = self
            .client
            .post(self.endpoint("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await;
        self.session.clear();

        match result {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                let err = Self::decode_error(response).await;
                warn!(error = %err, "server-side logout failed");
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "server-side logout failed");
                Err(MarketClientError::from_reqwest(err))
            }
        }
    }
}

fn normalized(credentials: &Credentials) -> MarketClientResult<Credentials> {
    let credentials = Credentials {
        email: trimmed(&credentials.email).to_lowercase(),
        password: credentials.password.clone(),
    };
    credentials.validate()?;
    Ok(credentials)
}
