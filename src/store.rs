//! Publishing post metadata to the remote table (Supabase REST).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument};

use crate::models::PostMeta;
use crate::utils::{take_chars, truncate_for_log};

pub const DEFAULT_TABLE: &str = "engPost";

/// Characters of the English markdown used as the row description.
const DESC_CHARS: usize = 200;

static MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\((https?://[^\s)]+)\)").unwrap());

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store credentials missing: set {0}")]
    MissingCredentials(&'static str),
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// One row of the published-posts table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRow {
    pub title: String,
    pub content: String,
    pub desc: String,
    pub image: Option<String>,
    pub tags: Vec<String>,
    pub kor_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl PostRow {
    /// Row for a post, given its metadata and English markdown.
    pub fn from_meta(meta: &PostMeta, eng_markdown: &str) -> Self {
        let image = meta.image_url.clone().or_else(|| {
            MARKDOWN_IMAGE
                .captures(eng_markdown)
                .map(|caps| caps[1].to_string())
        });
        Self {
            title: meta.title.clone(),
            content: eng_markdown.to_string(),
            desc: take_chars(eng_markdown, DESC_CHARS).to_string(),
            image,
            tags: meta.tags.clone(),
            kor_url: meta.kor_url.clone(),
            address: meta.fields.address.is_some().then(|| meta.address.clone()),
        }
    }
}

/// A table that accepts published posts.
pub trait PostStore {
    /// Insert `row`, returning the inserted representation.
    async fn insert(&self, row: &PostRow) -> Result<serde_json::Value, StoreError>;
}

/// Supabase PostgREST table client.
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl SupabaseStore {
    /// Fails when the URL or key is missing; callers treat that as fatal.
    pub fn new(
        client: reqwest::Client,
        base_url: Option<&str>,
        api_key: Option<&str>,
        table: &str,
    ) -> Result<Self, StoreError> {
        let base_url = base_url
            .filter(|s| !s.trim().is_empty())
            .ok_or(StoreError::MissingCredentials("SUPABASE_URL"))?;
        let api_key = api_key
            .filter(|s| !s.trim().is_empty())
            .ok_or(StoreError::MissingCredentials("SUPABASE_KEY"))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
        })
    }

    /// REST URL rows are posted to.
    pub fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

impl fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("base_url", &self.base_url)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl PostStore for SupabaseStore {
    #[instrument(level = "info", skip_all, fields(table = %self.table, title = %row.title))]
    async fn insert(&self, row: &PostRow) -> Result<serde_json::Value, StoreError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let inserted: serde_json::Value = response.json().await?;
        info!("Inserted post row");
        Ok(inserted)
    }
}
