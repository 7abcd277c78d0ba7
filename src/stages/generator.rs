//! Initial batch generation.

use crate::client::ModelGateway;
use crate::models::{IdeaforgeError, Item, Result};
use crate::parse::parse_items;
use crate::stages::prompts;
use std::sync::Arc;
use tracing::debug;

/// Asks the model for a fresh batch of ideas answering one question.
pub struct Generator {
    gateway: Arc<dyn ModelGateway>,
    question: String,
    batch_size: usize,
}

impl Generator {
    pub fn new(gateway: Arc<dyn ModelGateway>, question: impl Into<String>, batch_size: usize) -> Self {
        Self {
            gateway,
            question: question.into(),
            batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Generate a batch of unrated items.
    ///
    /// The reply may hold more or fewer items than requested; an empty or
    /// unparsable reply is a parse error.
    pub async fn generate(&self) -> Result<Vec<Item>> {
        let prompt = prompts::generation(&self.question, self.batch_size);
        let reply = self.gateway.query(prompts::GENERATOR_SYSTEM, &prompt).await?;

        let items = parse_items(&reply)?;
        if items.is_empty() {
            return Err(IdeaforgeError::Parse("generation reply held no ideas".to_string()));
        }

        debug!(requested = self.batch_size, received = items.len(), "Ideas generated");
        Ok(items)
    }
}
