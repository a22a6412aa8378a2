//! HTTP client for the hosted backend
//!
//! Speaks the PostgREST dialect for table access (`/rest/v1/<table>`) and the
//! GoTrue dialect for authentication (see `auth::rest`). Both share one
//! [`RestClient`] so the session token obtained at sign-in authorizes every
//! row operation.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::Error;
use crate::Result;

use super::store::{Filter, Query, RemoteStore, Table};

/// Connection settings and the current access token
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    pub(crate) async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    /// `apikey` plus a bearer token: the session's when signed in, the anon key otherwise
    pub(crate) async fn headers(&self) -> Result<reqwest::header::HeaderMap> {
        let bearer = self
            .access_token()
            .await
            .unwrap_or_else(|| self.anon_key.clone());

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("apikey", header_value(&self.anon_key)?);
        headers.insert(
            reqwest::header::AUTHORIZATION,
            header_value(&format!("Bearer {}", bearer))?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            header_value("application/json")?,
        );
        Ok(headers)
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

fn header_value(value: &str) -> Result<reqwest::header::HeaderValue> {
    value
        .parse()
        .map_err(|_| Error::Remote("Invalid header value".to_string()))
}

/// Turn a non-success response into a remote error carrying the backend's message
pub(crate) async fn ensure_success(
    resp: reqwest::Response,
    operation: &str,
) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let message = ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status));
    Err(Error::Remote(format!("{} failed: {}", operation, message)))
}

/// Render filters and ordering as PostgREST query parameters
pub fn query_string(query: &Query) -> String {
    let mut params = vec!["select=*".to_string()];
    for filter in &query.filters {
        match filter {
            Filter::Eq { column, value } => {
                params.push(format!("{}=eq.{}", column, urlencoding::encode(value)));
            }
            Filter::In { column, values } => {
                let values: Vec<String> = values
                    .iter()
                    .map(|value| urlencoding::encode(value).into_owned())
                    .collect();
                params.push(format!("{}=in.({})", column, values.join(",")));
            }
        }
    }
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(format!("order={}.{}", order.column, direction));
    }
    params.join("&")
}

/// Remote store over the backend's REST interface
#[derive(Clone)]
pub struct RestStore {
    client: RestClient,
}

impl RestStore {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>> {
        let url = format!("{}?{}", self.client.table_url(table), query_string(query));
        debug!(%url, "select");

        let resp = self
            .client
            .http()
            .get(&url)
            .headers(self.client.headers().await?)
            .send()
            .await?;
        let resp = ensure_success(resp, &format!("Reading {}", table)).await?;
        Ok(resp.json().await?)
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value> {
        debug!(%table, "insert");
        let resp = self
            .client
            .http()
            .post(self.client.table_url(table))
            .headers(self.client.headers().await?)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let resp = ensure_success(resp, &format!("Inserting into {}", table)).await?;

        let rows: Vec<Value> = resp.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::Remote(format!("Insert into {} returned no row", table)))
    }

    async fn update(&self, table: Table, id: Uuid, patch: Value) -> Result<()> {
        debug!(%table, %id, "update");
        let resp = self
            .client
            .http()
            .patch(format!("{}?id=eq.{}", self.client.table_url(table), id))
            .headers(self.client.headers().await?)
            .json(&patch)
            .send()
            .await?;
        ensure_success(resp, &format!("Updating {}", table)).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, id: Uuid) -> Result<()> {
        debug!(%table, %id, "delete");
        let resp = self
            .client
            .http()
            .delete(format!("{}?id=eq.{}", self.client.table_url(table), id))
            .headers(self.client.headers().await?)
            .send()
            .await?;
        ensure_success(resp, &format!("Deleting from {}", table)).await?;
        Ok(())
    }

    async fn create_board_with_columns(
        &self,
        _owner: Uuid,
        name: &str,
        description: Option<&str>,
        color: &str,
    ) -> Result<Uuid> {
        // The procedure takes the owner from the session token
        let resp = self
            .client
            .http()
            .post(format!(
                "{}/rest/v1/rpc/create_board_with_columns",
                self.client.base_url()
            ))
            .headers(self.client.headers().await?)
            .json(&json!({
                "p_name": name,
                "p_description": description,
                "p_color": color,
            }))
            .send()
            .await?;
        let resp = ensure_success(resp, "Creating board").await?;

        let board_id: Value = resp.json().await?;
        board_id
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| Error::Remote("Board creation returned no id".to_string()))
    }
}
