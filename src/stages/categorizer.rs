//! Post-loop grouping of accepted ideas into themes.

use crate::client::ModelGateway;
use crate::models::{Item, Result, ThemeMap};
use crate::parse::parse_reply;
use crate::stages::prompts;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Buckets ideas by title into a handful of themes.
pub struct Categorizer {
    gateway: Arc<dyn ModelGateway>,
}

impl Categorizer {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Group `items` into themes.
    ///
    /// An unparsable reply yields an empty map. Backend errors propagate.
    pub async fn categorize(&self, items: &[Item]) -> Result<ThemeMap> {
        if items.is_empty() {
            return Ok(ThemeMap::new());
        }

        let prompt = prompts::categorization(items)?;
        let reply = self.gateway.query(prompts::CATEGORIZER_SYSTEM, &prompt).await?;

        let themes = match parse_reply::<Map<String, Value>>(&reply) {
            Ok(object) => to_theme_map(object),
            Err(e) => {
                warn!(error = %e, "Failed to parse categorization reply, returning no themes");
                ThemeMap::new()
            }
        };

        debug!(themes = themes.len(), "Ideas categorized");
        Ok(themes)
    }
}

/// Keep string titles of array-valued themes; anything else is dropped.
fn to_theme_map(object: Map<String, Value>) -> ThemeMap {
    let mut themes = ThemeMap::new();
    for (name, value) in object {
        let Value::Array(entries) = value else {
            continue;
        };
        let titles = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(title) => Some(title),
                _ => None,
            })
            .collect();
        themes.insert(name, titles);
    }
    themes
}
