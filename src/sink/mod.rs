//! Publishing of final ideas.
//!
//! Publishing is best effort: a failing sink is logged and never affects
//! the run's result.

mod jsonl;
mod notion;

pub use jsonl::*;
pub use notion::*;

use crate::models::{Config, IdeaforgeError, Result, SinkKind, ThemeMap};
use crate::parse::ItemRecord;
use async_trait::async_trait;
use tracing::{info, warn};

/// Destination for accepted ideas.
#[async_trait]
pub trait ContentSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Append `records` (with their themes, when known) to the destination.
    async fn publish(&self, records: &[ItemRecord], themes: &ThemeMap) -> Result<()>;
}

/// Sink that discards everything.
pub struct NullSink;

#[async_trait]
impl ContentSink for NullSink {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn publish(&self, _records: &[ItemRecord], _themes: &ThemeMap) -> Result<()> {
        Ok(())
    }
}

/// Build the sink selected in config.
pub fn build_sink(config: &Config) -> Result<Box<dyn ContentSink>> {
    match config.sink.kind {
        SinkKind::None => Ok(Box::new(NullSink)),
        SinkKind::Jsonl => {
            let path = config.sink.path.clone().ok_or_else(|| {
                IdeaforgeError::Sink("sink.path is required for the jsonl sink".to_string())
            })?;
            Ok(Box::new(JsonlSink::new(path)))
        }
        SinkKind::Notion => {
            let (token, page_id) = config.resolve_notion()?;
            Ok(Box::new(NotionSink::new(token, page_id)?))
        }
    }
}

/// Publish, logging instead of returning any failure.
///
/// Returns whether publishing succeeded.
pub async fn publish_or_warn(
    sink: &dyn ContentSink,
    records: &[ItemRecord],
    themes: &ThemeMap,
) -> bool {
    if records.is_empty() {
        return true;
    }

    match sink.publish(records, themes).await {
        Ok(()) => {
            info!(sink = sink.name(), count = records.len(), "Ideas published");
            true
        }
        Err(e) => {
            warn!(sink = sink.name(), error = %e, "Failed to publish ideas");
            false
        }
    }
}
