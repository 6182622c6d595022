//! REST client for the remote Supabase (PostgREST) store.
//!
//! Every request carries the service role key and, for non-public schemas,
//! the profile headers. Filters follow the PostgREST `column=op.value`
//! query convention; upserts use `Prefer: resolution=merge-duplicates`
//! with an `on_conflict` column list; row counts come from a HEAD request
//! with `Prefer: count=exact` and the `Content-Range` response header.

use anyhow::{bail, Context, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn is_falsey(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub base_url: String,
    pub service_role_key: String,
    pub schema: String,
    pub enabled: bool,
    pub primary: bool,
}

impl SupabaseConfig {
    /// Resolves once at process start; the result is passed by reference to
    /// every component that needs it.
    pub fn from_env() -> SupabaseConfig {
        let base_url = std::env::var("SUPABASE_URL")
            .unwrap_or_default()
            .trim()
            .trim_end_matches('/')
            .to_string();
        let service_role_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .unwrap_or_default()
            .trim()
            .to_string();
        let schema = {
            let s = std::env::var("SUPABASE_SCHEMA").unwrap_or_default();
            let s = s.trim();
            if s.is_empty() {
                "public".to_string()
            } else {
                s.to_string()
            }
        };
        let disabled = std::env::var("SUPABASE_SYNC_DISABLED")
            .map(|v| is_truthy(&v))
            .unwrap_or(false);
        let enabled = !base_url.is_empty() && !service_role_key.is_empty() && !disabled;
        let primary = enabled
            && !std::env::var("SUPABASE_PRIMARY")
                .map(|v| is_falsey(&v))
                .unwrap_or(false);

        SupabaseConfig {
            base_url,
            service_role_key,
            schema,
            enabled,
            primary,
        }
    }

    /// Fatal configuration check for code paths that require the remote store.
    pub fn require_credentials(&self) -> Result<()> {
        if self.base_url.is_empty() || self.service_role_key.is_empty() {
            bail!("SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY are required");
        }
        Ok(())
    }
}

/// A single PostgREST filter, rendered as `column=op.value`.
#[derive(Debug, Clone)]
pub struct Filter {
    column: String,
    operator: String,
    value: Option<String>,
}

impl Filter {
    pub fn eq(column: &str, value: impl ToString) -> Filter {
        Filter {
            column: column.to_string(),
            operator: "eq".to_string(),
            value: Some(value.to_string()),
        }
    }

    pub fn gt(column: &str, value: impl ToString) -> Filter {
        Filter {
            column: column.to_string(),
            operator: "gt".to_string(),
            value: Some(value.to_string()),
        }
    }

    pub fn lte(column: &str, value: impl ToString) -> Filter {
        Filter {
            column: column.to_string(),
            operator: "lte".to_string(),
            value: Some(value.to_string()),
        }
    }

    pub fn is_null(column: &str) -> Filter {
        Filter {
            column: column.to_string(),
            operator: "is".to_string(),
            value: None,
        }
    }

    pub fn not_null(column: &str) -> Filter {
        Filter {
            column: column.to_string(),
            operator: "not.is".to_string(),
            value: None,
        }
    }

    fn render(&self) -> (String, String) {
        match &self.value {
            Some(value) => (self.column.clone(), format!("{}.{}", self.operator, value)),
            None => (self.column.clone(), format!("{}.null", self.operator)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Query<'a> {
    pub select: &'a str,
    pub order: &'a [&'a str],
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Default for Query<'_> {
    fn default() -> Self {
        Query {
            select: "*",
            order: &[],
            limit: None,
            offset: None,
        }
    }
}

fn build_query_pairs(filters: &[Filter], query: &Query<'_>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = filters.iter().map(Filter::render).collect();
    pairs.push(("select".to_string(), query.select.to_string()));
    if !query.order.is_empty() {
        pairs.push(("order".to_string(), query.order.join(",")));
    }
    if let Some(limit) = query.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        pairs.push(("offset".to_string(), offset.to_string()));
    }
    pairs
}

pub struct SupabaseClient {
    http: reqwest::Client,
    config: SupabaseConfig,
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> SupabaseClient {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");
        SupabaseClient { http, config }
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder> {
        if !self.config.enabled {
            bail!("Remote store is disabled");
        }
        let url = format!("{}/rest/v1/{}", self.config.base_url, table);
        let mut req = self
            .http
            .request(method, url)
            .header("apikey", &self.config.service_role_key)
            .bearer_auth(&self.config.service_role_key);
        if self.config.schema != "public" {
            req = req
                .header("Accept-Profile", &self.config.schema)
                .header("Content-Profile", &self.config.schema);
        }
        Ok(req)
    }

    pub async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[Filter],
        query: &Query<'_>,
    ) -> Result<Vec<T>> {
        let response = self
            .request(Method::GET, table)?
            .query(&build_query_pairs(filters, query))
            .send()
            .await
            .with_context(|| format!("GET {} failed to connect", table))?;
        let response = expect_success(response, "GET", table).await?;
        response
            .json()
            .await
            .with_context(|| format!("GET {} returned invalid JSON", table))
    }

    pub async fn fetch_one<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[Filter],
        query: &Query<'_>,
    ) -> Result<Option<T>> {
        let limited = Query {
            limit: Some(1),
            ..query.clone()
        };
        let mut rows: Vec<T> = self.fetch_rows(table, filters, &limited).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Pages through a table in fixed-size batches keyed by strictly
    /// increasing `id` until a short page is returned. Rows appended beyond
    /// the last fetched id during the scan are not included in that pass.
    pub async fn fetch_all_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[Filter],
        select: &str,
        batch_size: u64,
    ) -> Result<Vec<T>> {
        let batch_size = batch_size.max(1);
        let mut all_rows: Vec<T> = Vec::new();
        let mut last_id: i64 = 0;

        loop {
            let mut page_filters = filters.to_vec();
            page_filters.push(Filter::gt("id", last_id));
            let query = Query {
                select,
                order: &["id.asc"],
                limit: Some(batch_size),
                offset: None,
            };
            let page: Vec<serde_json::Value> =
                self.fetch_rows(table, &page_filters, &query).await?;
            let page_len = page.len() as u64;

            for row in page {
                let id = row
                    .get("id")
                    .and_then(|v| v.as_i64())
                    .with_context(|| format!("Row from {} is missing an integer id", table))?;
                last_id = last_id.max(id);
                all_rows.push(serde_json::from_value(row)?);
            }

            if page_len < batch_size {
                break;
            }
        }
        Ok(all_rows)
    }

    /// Plain insert; fails loudly on a uniqueness conflict.
    pub async fn insert_rows<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        rows: &[T],
    ) -> Result<Vec<R>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .request(Method::POST, table)?
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await
            .with_context(|| format!("POST {} failed to connect", table))?;
        let response = expect_success(response, "POST", table).await?;
        response
            .json()
            .await
            .with_context(|| format!("POST {} returned invalid JSON", table))
    }

    /// Server-side merge-on-conflict upsert; silently idempotent.
    pub async fn upsert_rows<T: Serialize>(
        &self,
        table: &str,
        rows: &[T],
        on_conflict: &[&str],
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut req = self
            .request(Method::POST, table)?
            .header("Prefer", "resolution=merge-duplicates,return=minimal");
        if !on_conflict.is_empty() {
            req = req.query(&[("on_conflict", on_conflict.join(","))]);
        }
        let response = req
            .json(rows)
            .send()
            .await
            .with_context(|| format!("Upsert {} failed to connect", table))?;
        expect_success(response, "Upsert", table).await?;
        Ok(())
    }

    pub async fn patch_rows<T: Serialize>(
        &self,
        table: &str,
        patch: &T,
        filters: &[Filter],
    ) -> Result<()> {
        let pairs: Vec<(String, String)> = filters.iter().map(Filter::render).collect();
        let response = self
            .request(Method::PATCH, table)?
            .header("Prefer", "return=minimal")
            .query(&pairs)
            .json(patch)
            .send()
            .await
            .with_context(|| format!("PATCH {} failed to connect", table))?;
        expect_success(response, "PATCH", table).await?;
        Ok(())
    }

    pub async fn delete_rows(&self, table: &str, filters: &[Filter]) -> Result<()> {
        let pairs: Vec<(String, String)> = filters.iter().map(Filter::render).collect();
        let response = self
            .request(Method::DELETE, table)?
            .header("Prefer", "return=minimal")
            .query(&pairs)
            .send()
            .await
            .with_context(|| format!("DELETE {} failed to connect", table))?;
        expect_success(response, "DELETE", table).await?;
        Ok(())
    }

    /// Exact row count from a HEAD request's Content-Range total.
    pub async fn count_rows(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        let mut pairs: Vec<(String, String)> = filters.iter().map(Filter::render).collect();
        pairs.push(("select".to_string(), "id".to_string()));
        pairs.push(("limit".to_string(), "1".to_string()));
        let response = self
            .request(Method::HEAD, table)?
            .header("Prefer", "count=exact")
            .query(&pairs)
            .send()
            .await
            .with_context(|| format!("Count {} failed to connect", table))?;
        let response = expect_success(response, "Count", table).await?;

        let Some(content_range) = response.headers().get("content-range") else {
            return Ok(0);
        };
        let content_range = content_range.to_str().unwrap_or_default();
        let total = content_range
            .rsplit('/')
            .next()
            .and_then(|s| s.parse::<u64>().ok());
        Ok(total.unwrap_or(0))
    }

    /// Probe for a table's existence (404 means missing, not an error).
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let response = self
            .request(Method::HEAD, table)?
            .header("Prefer", "count=planned")
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await
            .with_context(|| format!("Table check {} failed to connect", table))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if response.status().is_success() {
            return Ok(true);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        bail!("Table check {} failed: {} {}", table, status, text)
    }

    /// The remote tables have no serial default on `id` (rows are replicated
    /// with their authoritative ids), so fresh inserts read the current max.
    pub async fn next_table_id(&self, table: &str) -> Result<i64> {
        #[derive(serde::Deserialize)]
        struct IdRow {
            id: i64,
        }
        let last: Option<IdRow> = self
            .fetch_one(
                table,
                &[],
                &Query {
                    select: "id",
                    order: &["id.desc"],
                    ..Query::default()
                },
            )
            .await?;
        Ok(last.map(|row| row.id.max(0)).unwrap_or(0) + 1)
    }
}

async fn expect_success(response: Response, method: &str, table: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    bail!("Supabase {} {} failed: {} {}", method, table, status, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_filters() {
        assert_eq!(
            Filter::eq("user_id", 7).render(),
            ("user_id".to_string(), "eq.7".to_string())
        );
        assert_eq!(
            Filter::lte("expires_at", "2024-01-01T00:00:00Z").render(),
            (
                "expires_at".to_string(),
                "lte.2024-01-01T00:00:00Z".to_string()
            )
        );
        assert_eq!(
            Filter::is_null("user_id").render(),
            ("user_id".to_string(), "is.null".to_string())
        );
        assert_eq!(
            Filter::not_null("user_id").render(),
            ("user_id".to_string(), "not.is.null".to_string())
        );
    }

    #[test]
    fn builds_query_pairs_in_order() {
        let filters = vec![Filter::eq("user_id", 1), Filter::gt("id", 100)];
        let query = Query {
            select: "id,song_id",
            order: &["position.asc", "id.asc"],
            limit: Some(50),
            offset: None,
        };
        let pairs = build_query_pairs(&filters, &query);
        assert_eq!(
            pairs,
            vec![
                ("user_id".to_string(), "eq.1".to_string()),
                ("id".to_string(), "gt.100".to_string()),
                ("select".to_string(), "id,song_id".to_string()),
                ("order".to_string(), "position.asc,id.asc".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn config_disabled_without_credentials() {
        let config = SupabaseConfig {
            base_url: String::new(),
            service_role_key: String::new(),
            schema: "public".to_string(),
            enabled: false,
            primary: false,
        };
        assert!(config.require_credentials().is_err());
    }

    #[test]
    fn truthy_and_falsey_parsing() {
        assert!(is_truthy("1"));
        assert!(is_truthy(" YES "));
        assert!(!is_truthy("0"));
        assert!(is_falsey("off"));
        assert!(is_falsey("False"));
        assert!(!is_falsey("enabled"));
    }
}
