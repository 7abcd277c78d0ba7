//! Rework of failing ideas, using accepted ones as exemplars.

use crate::client::ModelGateway;
use crate::models::{IdeaforgeError, Item, Result};
use crate::parse::parse_items;
use crate::stages::prompts;
use std::sync::Arc;
use tracing::debug;

/// Replaces a batch of weak ideas with improved ones in a single request.
pub struct Improver {
    gateway: Arc<dyn ModelGateway>,
}

impl Improver {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Ask for replacements of `pending`, showing `accepted` as exemplars.
    ///
    /// Returns the replacement batch, unrated. An unparsable or empty reply
    /// is a parse error; the original items are never handed back as if
    /// they had been improved.
    pub async fn improve(&self, accepted: &[Item], pending: &[Item]) -> Result<Vec<Item>> {
        if pending.is_empty() {
            return Err(IdeaforgeError::Internal(
                "improve called with no pending ideas".to_string(),
            ));
        }

        let prompt = prompts::improvement(accepted, pending)?;
        let reply = self.gateway.query(prompts::IMPROVER_SYSTEM, &prompt).await?;

        let improved = parse_items(&reply)?;
        if improved.is_empty() {
            return Err(IdeaforgeError::Parse(
                "improvement reply held no ideas".to_string(),
            ));
        }

        debug!(sent = pending.len(), received = improved.len(), "Ideas improved");
        Ok(improved)
    }
}
