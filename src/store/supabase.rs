use crate::chatlog::config::ChatlogStoreConfig;
use crate::chatlog::message::{ChatHistory, Message};
use crate::store::{ConversationStore, StorageId, StoredConversation};
use anyhow::{Context, Result};
use chrono::DateTime;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use std::env;
use std::time::Duration;

const SELECT_COLUMNS: &str = "id,messages,timestamp";

/// Conversations in a Supabase (PostgREST) table with `id`, `messages`, and
/// an insertion `timestamp` column defaulting to `now()`.
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
}

#[derive(Debug, Deserialize)]
struct ChatRow {
    id: Value,
    #[serde(default)]
    messages: ChatHistory,
    #[serde(default)]
    timestamp: Option<String>,
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn row_id(raw: &Value) -> Option<StorageId> {
    match raw {
        Value::String(s) if !s.trim().is_empty() => Some(StorageId::from(s.clone())),
        Value::Number(n) => Some(StorageId::from(n.to_string())),
        _ => None,
    }
}

fn timestamp_epoch_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.timestamp().max(0) as u64)
        .unwrap_or(0)
}

fn into_stored(row: ChatRow) -> Option<StoredConversation> {
    let id = row_id(&row.id)?;
    let created = timestamp_epoch_secs(row.timestamp.as_deref());
    Some(StoredConversation {
        id,
        messages: row.messages,
        created_at_epoch_secs: created,
        updated_at_epoch_secs: created,
    })
}

/// Total from a PostgREST `Content-Range` header such as `0-24/3573` or `*/0`.
fn parse_content_range_total(header: &str) -> Option<usize> {
    let (_, total) = header.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: &str, cfg: &ChatlogStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("failed to build supabase http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: cfg.table.clone(),
        })
    }

    pub fn from_env(cfg: &ChatlogStoreConfig) -> Result<Self> {
        let url = env_non_empty("SUPABASE_URL")
            .context("SUPABASE_URL is required for the supabase store backend")?;
        let key = env_non_empty("SUPABASE_KEY")
            .context("SUPABASE_KEY is required for the supabase store backend")?;
        Self::new(&url, &key, cfg)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn send(&self, builder: RequestBuilder, action: &str) -> Result<Response> {
        let response = self
            .authed(builder)
            .send()
            .with_context(|| format!("supabase {action} request failed"))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            anyhow::bail!("supabase {action} failed with status {status}: {}", body.trim());
        }
        Ok(response)
    }

    fn fetch_rows(&self, builder: RequestBuilder, action: &str) -> Result<Vec<StoredConversation>> {
        let rows: Vec<ChatRow> = self
            .send(builder, action)?
            .json()
            .with_context(|| format!("failed to parse supabase {action} response"))?;
        Ok(rows.into_iter().filter_map(into_stored).collect())
    }
}

impl ConversationStore for SupabaseStore {
    fn label(&self) -> &'static str {
        "supabase"
    }

    fn load(&self, id: &StorageId) -> Result<Option<StoredConversation>> {
        let request = self.client.get(self.table_url()).query(&[
            ("id", format!("eq.{id}")),
            ("select", SELECT_COLUMNS.to_string()),
        ]);
        Ok(self.fetch_rows(request, "load")?.into_iter().next())
    }

    fn save(&self, id: &StorageId, history: &[Message]) -> Result<StorageId> {
        let payload = serde_json::json!({
            "id": id.as_str(),
            "messages": history,
        });
        let request = self
            .client
            .post(self.table_url())
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&payload);
        self.send(request, "save")?;
        Ok(id.clone())
    }

    fn new_id(&self) -> Result<StorageId> {
        Ok(StorageId::generate())
    }

    fn list(&self) -> Result<Vec<StoredConversation>> {
        let request = self.client.get(self.table_url()).query(&[
            ("select", SELECT_COLUMNS),
            ("order", "timestamp.desc"),
        ]);
        self.fetch_rows(request, "list")
    }

    fn delete(&self, id: &StorageId) -> Result<bool> {
        let request = self
            .client
            .delete(self.table_url())
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation");
        let removed: Vec<Value> = self
            .send(request, "delete")?
            .json()
            .context("failed to parse supabase delete response")?;
        Ok(!removed.is_empty())
    }

    fn count(&self) -> Result<usize> {
        let request = self
            .client
            .get(self.table_url())
            .query(&[("select", "id"), ("limit", "1")])
            .header("Prefer", "count=exact");
        let response = self.send(request, "count")?;
        let header = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .context("supabase count response missing Content-Range header")?;
        parse_content_range_total(header)
            .with_context(|| format!("unexpected Content-Range header `{header}`"))
    }
}
