use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use super::{Gateway, Query, Table, decode_error};
use crate::error::{MarketClientError, MarketClientResult};
use crate::session::SessionStore;

#[derive(Debug, Clone)]
/// HTTP-реализация `Gateway` поверх REST API таблиц (`/rest/v1`).
pub struct RestGateway {
    base_url: String,
    anon_key: String,
    client: Client,
    session: SessionStore,
}

impl RestGateway {
    /// Создаёт gateway с готовым HTTP-клиентом.
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

    fn endpoint(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table.name())
    }

    /// Запрос с ключом проекта и токеном сессии (или anon key без сессии).
    fn request(&self, method: Method, table: Table, query: Option<&Query>) -> RequestBuilder {
        let url = self.endpoint(table);
        let token = self
            .session
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());

        let mut request = self
            .client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token);
        if let Some(query) = query {
            request = request.query(&query.to_params());
        }
        request
    }

    async fn send_rows(&self, request: RequestBuilder) -> MarketClientResult<Vec<Value>> {
        let response = request
            .send()
            .await
            .map_err(MarketClientError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(decode_error(response).await);
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(MarketClientError::from_reqwest)?;
        match body {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            row @ Value::Object(_) => Ok(vec![row]),
            other => Err(MarketClientError::Decode(format!(
                "expected rows, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn select(&self, table: Table, query: &Query) -> MarketClientResult<Vec<Value>> {
        debug!(%table, params = ?query.to_params(), "select");
        let request = self.request(Method::GET, table, Some(query));
        self.send_rows(request).await
    }

    async fn insert(&self, table: Table, row: Value) -> MarketClientResult<Value> {
        debug!(%table, "insert");
        let request = self
            .request(Method::POST, table, None)
            .header("Prefer", "return=representation")
            .json(&row);
        self.send_rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MarketClientError::Decode(format!("insert into {table} returned no row")))
    }

    async fn update(
        &self,
        table: Table,
        query: &Query,
        patch: Value,
    ) -> MarketClientResult<Vec<Value>> {
        debug!(%table, params = ?query.to_params(), "update");
        let request = self
            .request(Method::PATCH, table, Some(query))
            .header("Prefer", "return=representation")
            .json(&patch);
        self.send_rows(request).await
    }

    async fn delete(&self, table: Table, query: &Query) -> MarketClientResult<Vec<Value>> {
        debug!(%table, params = ?query.to_params(), "delete");
        let request = self
            .request(Method::DELETE, table, Some(query))
            .header("Prefer", "return=representation");
        self.send_rows(request).await
    }
}
