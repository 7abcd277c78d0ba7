//! Backend contract used by every stage.

use crate::models::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Sends a system/user instruction pair to a generative model and returns
/// the raw text reply.
///
/// Implementations fail with `BackendError::EmptyReply` when the model
/// yields no usable content. Auth, transport and transport-level retries
/// are the implementation's business.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn query(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: ModelGateway + ?Sized> ModelGateway for Arc<T> {
    async fn query(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        (**self).query(system_prompt, user_prompt).await
    }
}
