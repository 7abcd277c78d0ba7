//! Notion page sink.
//!
//! Ideas are appended to an existing page as blocks: a heading per theme
//! (when themes are known), then a heading and paragraph per idea.

use crate::models::{BackendError, IdeaforgeError, Result, ThemeMap};
use crate::parse::ItemRecord;
use crate::sink::ContentSink;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const NOTION_API: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// The API accepts at most this many children per append request.
const MAX_CHILDREN_PER_REQUEST: usize = 100;

/// Appends ideas to a Notion page.
pub struct NotionSink {
    client: reqwest::Client,
    token: String,
    page_id: String,
    base_url: String,
}

impl NotionSink {
    pub fn new(token: String, page_id: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(IdeaforgeError::Network)?;

        Ok(Self {
            client,
            token,
            page_id,
            base_url: NOTION_API.to_string(),
        })
    }

    /// Point the sink at another API root (e.g. a proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.token)).map_err(|_| {
            IdeaforgeError::Sink("Notion token contains invalid header characters".to_string())
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("notion-version", HeaderValue::from_static(NOTION_VERSION));
        Ok(headers)
    }

    async fn append_children(&self, children: &[Value]) -> Result<()> {
        let url = format!("{}/blocks/{}/children", self.base_url, self.page_id);
        let response = self
            .client
            .patch(&url)
            .headers(self.headers()?)
            .json(&json!({ "children": children }))
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                401 => BackendError::AuthenticationFailed.into(),
                _ => IdeaforgeError::Sink(format!("Notion API error (status {status}): {message}")),
            });
        }

        debug!(page_id = %self.page_id, blocks = children.len(), "Appended blocks");
        Ok(())
    }
}

#[async_trait]
impl ContentSink for NotionSink {
    fn name(&self) -> &'static str {
        "notion"
    }

    async fn publish(&self, records: &[ItemRecord], themes: &ThemeMap) -> Result<()> {
        let blocks = build_blocks(records, themes);
        for chunk in blocks.chunks(MAX_CHILDREN_PER_REQUEST) {
            self.append_children(chunk).await?;
        }
        Ok(())
    }
}

fn rich_text(content: &str) -> Value {
    json!([{ "type": "text", "text": { "content": content } }])
}

fn heading(level: u8, content: &str) -> Value {
    let kind = format!("heading_{level}");
    let mut block = json!({ "object": "block", "type": &kind });
    block[kind.as_str()] = json!({ "rich_text": rich_text(content) });
    block
}

fn paragraph(content: &str) -> Value {
    json!({ "object": "block", "type": "paragraph", "paragraph": { "rich_text": rich_text(content) } })
}

fn idea_blocks(record: &ItemRecord, blocks: &mut Vec<Value>) {
    blocks.push(heading(3, &record.title));
    blocks.push(paragraph(&record.description));
}

/// Lay out records as Notion blocks, grouped by theme when themes are known.
pub fn build_blocks(records: &[ItemRecord], themes: &ThemeMap) -> Vec<Value> {
    let mut blocks = Vec::with_capacity(records.len() * 2 + themes.len());

    if themes.is_empty() {
        for record in records {
            idea_blocks(record, &mut blocks);
        }
        return blocks;
    }

    let mut placed = vec![false; records.len()];
    for (theme, titles) in themes.iter() {
        let members: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(idx, r)| !placed[*idx] && titles.contains(&r.title))
            .map(|(idx, _)| idx)
            .collect();
        if members.is_empty() {
            continue;
        }

        blocks.push(heading(2, theme));
        for idx in members {
            placed[idx] = true;
            idea_blocks(&records[idx], &mut blocks);
        }
    }

    let leftovers: Vec<&ItemRecord> = records
        .iter()
        .zip(&placed)
        .filter(|(_, placed)| !**placed)
        .map(|(r, _)| r)
        .collect();
    if !leftovers.is_empty() {
        blocks.push(heading(2, "Other ideas"));
        for record in leftovers {
            idea_blocks(record, &mut blocks);
        }
    }

    blocks
}
