//! In-memory gateway replaying canned replies, for tests.

use crate::client::ModelGateway;
use crate::models::{BackendError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A recorded request.
#[derive(Debug, Clone)]
pub struct Request {
    pub system: String,
    pub user: String,
}

/// Replays replies in order. `None` entries, and running out of replies,
/// produce `BackendError::EmptyReply`.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Option<String>>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedGateway {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Some(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply.
    pub fn push(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Some(reply.into()));
    }

    /// Queue an empty reply.
    pub fn push_empty(&self) {
        self.replies.lock().unwrap().push_back(None);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn query(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.requests.lock().unwrap().push(Request {
            system: system_prompt.to_string(),
            user: user_prompt.to_string(),
        });

        match self.replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            _ => Err(BackendError::EmptyReply.into()),
        }
    }
}

/// JSON array of `n` items titled `{prefix} 1..=n`.
pub fn items_reply(prefix: &str, n: usize) -> String {
    let items: Vec<_> = (1..=n)
        .map(|i| {
            serde_json::json!({
                "title": format!("{prefix} {i}"),
                "description": format!("Description of {prefix} {i}."),
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

/// Fenced JSON verdict array; `true` is "Good enough".
pub fn verdicts_reply(passes: &[bool]) -> String {
    let verdicts: Vec<_> = passes
        .iter()
        .map(|&pass| {
            serde_json::json!({
                "rating": if pass { "Good enough" } else { "Needs improvement" },
                "reason": if pass { "Clear and practical." } else { "Too vague." },
            })
        })
        .collect();
    format!(
        "```json\n{}\n```",
        serde_json::to_string_pretty(&verdicts).unwrap()
    )
}
