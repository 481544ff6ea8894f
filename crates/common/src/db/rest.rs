//! HTTPS row store client (PostgREST dialect)
//!
//! `GET /rest/v1/{table}?col=eq.value&select=*&order=col.desc&limit=n`
//! with `apikey` and `Authorization` headers. Transient failures are retried
//! with exponential backoff. Inserts and updates are only retried when the
//! connection was never established, since a timed-out or 5xx write may
//! already have been applied.

use crate::config::StoreConfig;
use crate::db::store::{Query, RowStore};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoffBuilder};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Remote row store over HTTPS
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    max_retries: u32,
}

impl RestStore {
    /// Create a new store client from configuration
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            access_token: None,
            max_retries: config.max_retries,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Query-string pairs for a read
    fn query_params(query: &Query) -> Vec<(String, String)> {
        let mut params = vec![(
            "select".to_string(),
            query.columns.clone().unwrap_or_else(|| "*".to_string()),
        )];

        params.extend(filter_params(query));

        if let Some(ref order) = query.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = query.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }

        params
    }

    /// Send a request, retrying connect errors, and for idempotent requests
    /// also timeouts and 5xx responses
    async fn send_with_retry<F>(
        &self,
        operation: &'static str,
        idempotent: bool,
        build: F,
    ) -> Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let max_retries = self.max_retries;
        let mut attempt: u32 = 0;

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(Duration::from_secs(10)))
            .build();

        retry(policy, || {
            attempt += 1;
            let current = attempt;
            let request = build();

            async move {
                match request.send().await {
                    Ok(response)
                        if idempotent
                            && is_transient_status(response.status())
                            && current <= max_retries =>
                    {
                        let status = response.status().as_u16();
                        warn!(operation, attempt = current, status, "Store request failed, retrying");
                        Err(backoff::Error::transient(AppError::Store {
                            status,
                            message: format!("{} failed with status {}", operation, status),
                        }))
                    }
                    Ok(response) => Ok(response),
                    Err(e)
                        if (e.is_connect() || (idempotent && e.is_timeout()))
                            && current <= max_retries =>
                    {
                        warn!(operation, attempt = current, error = %e, "Store request failed, retrying");
                        Err(backoff::Error::transient(AppError::HttpClient(e)))
                    }
                    Err(e) => Err(backoff::Error::permanent(AppError::HttpClient(e))),
                }
            }
        })
        .await
    }

    /// Turn a non-success response into a store error
    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
            .unwrap_or(body);

        Err(AppError::Store { status, message })
    }
}

fn filter_params(query: &Query) -> Vec<(String, String)> {
    query
        .filters
        .iter()
        .map(|f| (f.column.clone(), format!("{}.{}", f.op.as_str(), f.value)))
        .collect()
}

fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Total from a `Content-Range: 0-9/42` or `*/42` header
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl RowStore for RestStore {
    async fn select(&self, query: &Query) -> Result<Vec<Value>> {
        let url = self.table_url(&query.table);
        let params = Self::query_params(query);

        let response = self
            .send_with_retry("select", true, || {
                self.authorize(self.client.get(&url).query(&params))
            })
            .await?;
        let rows: Vec<Value> = Self::check(response).await?.json().await?;

        debug!(table = %query.table, rows = rows.len(), "Store select");
        Ok(rows)
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        let url = self.table_url(&query.table);
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(query));

        let response = self
            .send_with_retry("count", true, || {
                self.authorize(self.client.head(&url).query(&params))
                    .header("Prefer", "count=exact")
            })
            .await?;
        let response = Self::check(response).await?;

        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| AppError::Store {
                status: response.status().as_u16(),
                message: "Missing or invalid Content-Range in count response".to_string(),
            })
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let url = self.table_url(table);

        let response = self
            .send_with_retry("insert", false, || {
                self.authorize(self.client.post(&url))
                    .header("Prefer", "return=representation")
                    .json(&row)
            })
            .await?;
        let response = Self::check(response).await?;
        let status = response.status().as_u16();
        let rows: Vec<Value> = response.json().await?;

        rows.into_iter().next().ok_or(AppError::Store {
            status,
            message: format!("Insert into '{}' returned no row", table),
        })
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>> {
        let url = self.table_url(&query.table);
        let params = filter_params(query);

        let response = self
            .send_with_retry("update", false, || {
                self.authorize(self.client.patch(&url).query(&params))
                    .header("Prefer", "return=representation")
                    .json(&patch)
            })
            .await?;
        let rows: Vec<Value> = Self::check(response).await?.json().await?;

        debug!(table = %query.table, rows = rows.len(), "Store update");
        Ok(rows)
    }

    async fn delete(&self, query: &Query) -> Result<u64> {
        let url = self.table_url(&query.table);
        let params = filter_params(query);

        let response = self
            .send_with_retry("delete", true, || {
                self.authorize(self.client.delete(&url).query(&params))
                    .header("Prefer", "return=representation")
            })
            .await?;
        let rows: Vec<Value> = Self::check(response).await?.json().await?;

        Ok(rows.len() as u64)
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/rest/v1/", self.base_url);
        let response = self
            .send_with_retry("ping", true, || self.authorize(self.client.get(&url)))
            .await?;
        Self::check(response).await.map(|_| ())
    }

    fn with_access_token(&self, access_token: &str) -> Arc<dyn RowStore> {
        let mut scoped = self.clone();
        scoped.access_token = Some(access_token.to_string());
        Arc::new(scoped)
    }

    fn backend_name(&self) -> &str {
        "rest"
    }
}
