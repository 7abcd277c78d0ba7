//! Batch evaluation of candidate ideas.
//!
//! One request rates the whole batch. The reply is correlated back to the
//! items by the echoed `id` when every verdict carries a usable one, and
//! by position otherwise. Items left without a verdict fail, and an
//! unparsable reply fails the whole batch, so evaluation never stalls the
//! loop on a bad payload.
//!
//! Foundation:
//! - K_i: One verdict per item, pass or fail
//! - B_i: The model echoes ids and ratings (might not) → positional fallback
//! - I^R: An item without a verdict is treated as failed

use crate::client::ModelGateway;
use crate::models::{Item, Rating, Result};
use crate::parse::parse_reply;
use crate::stages::prompts;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// One verdict entry from the evaluation reply.
///
/// Any JSON object decodes: a malformed `id` only costs the id, and a
/// non-string `rating` or `reason` is kept in its JSON text form.
#[derive(Debug, Clone, Deserialize)]
struct VerdictRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<usize>,

    #[serde(default, alias = "verdict", deserialize_with = "lenient_text")]
    rating: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    reason: Option<String>,
}

/// Accepts `3`, `3.0` and `"3"`; anything else is no id.
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u32::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(id.and_then(|id| usize::try_from(id).ok()))
}

fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

impl VerdictRecord {
    fn passed(&self) -> bool {
        self.rating.as_deref().is_some_and(is_pass_label)
    }
}

fn is_pass_label(label: &str) -> bool {
    let label = label.trim().to_lowercase();
    matches!(label.as_str(), "good enough" | "pass" | "passed")
}

/// How the evaluation reply was matched to the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// Every verdict echoed a distinct, in-range id
    ById,
    /// Verdicts were zipped with the batch in order
    Positional,
    /// The reply could not be parsed; everything failed
    Unparsable,
}

/// Result of evaluating one batch.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    /// Per-item verdict, same length and order as the batch; `true` is pass
    pub verdicts: Vec<bool>,

    /// Per-item reason from the model, when given
    pub reasons: Vec<Option<String>>,

    pub correlation: Correlation,

    /// Items that had no matching verdict entry
    pub missing: usize,

    /// Parse error message when the reply was unparsable
    pub parse_error: Option<String>,
}

impl EvaluationReport {
    fn unparsable(len: usize, error: String) -> Self {
        Self {
            verdicts: vec![false; len],
            reasons: vec![None; len],
            correlation: Correlation::Unparsable,
            missing: len,
            parse_error: Some(error),
        }
    }

    pub fn passed(&self) -> usize {
        self.verdicts.iter().filter(|v| **v).count()
    }

    pub fn failed(&self) -> usize {
        self.verdicts.len() - self.passed()
    }

    pub fn is_unparsable(&self) -> bool {
        self.correlation == Correlation::Unparsable
    }
}

/// Rates a batch of ideas with a single backend request.
pub struct Evaluator {
    gateway: Arc<dyn ModelGateway>,
}

impl Evaluator {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Evaluate `items`, writing each item's rating.
    ///
    /// Only backend failures are returned as errors. An empty batch is
    /// answered without a request.
    pub async fn evaluate(&self, items: &mut [Item]) -> Result<EvaluationReport> {
        if items.is_empty() {
            return Ok(EvaluationReport {
                verdicts: Vec::new(),
                reasons: Vec::new(),
                correlation: Correlation::Positional,
                missing: 0,
                parse_error: None,
            });
        }

        let prompt = prompts::evaluation(items)?;
        let reply = self.gateway.query(prompts::EVALUATOR_SYSTEM, &prompt).await?;

        let report = match parse_reply::<Vec<Value>>(&reply) {
            Ok(entries) => correlate(items.len(), entries),
            Err(e) => EvaluationReport::unparsable(items.len(), e.to_string()),
        };

        for ((item, passed), reason) in items.iter_mut().zip(&report.verdicts).zip(&report.reasons) {
            item.rating = Rating::from_verdict(*passed);
            debug!(
                title = %item.title,
                rating = %item.rating,
                reason = reason.as_deref().unwrap_or(""),
                "Idea evaluated"
            );
        }

        Ok(report)
    }
}

/// Match verdict entries to a batch of `len` items.
fn correlate(len: usize, entries: Vec<Value>) -> EvaluationReport {
    // Entries that are not objects count as absent.
    let records: Vec<Option<VerdictRecord>> = entries
        .into_iter()
        .map(|v| match v {
            Value::Object(_) => serde_json::from_value(v).ok(),
            _ => None,
        })
        .collect();

    let mut slots: Vec<Option<VerdictRecord>> = vec![None; len];
    let correlation = if ids_are_usable(len, &records) {
        for record in records.into_iter().flatten() {
            if let Some(id) = record.id {
                slots[id - 1] = Some(record);
            }
        }
        Correlation::ById
    } else {
        for (slot, record) in slots.iter_mut().zip(records) {
            *slot = record;
        }
        Correlation::Positional
    };

    let missing = slots.iter().filter(|s| s.is_none()).count();
    let verdicts = slots
        .iter()
        .map(|s| s.as_ref().is_some_and(VerdictRecord::passed))
        .collect();
    let reasons = slots
        .into_iter()
        .map(|s| s.and_then(|r| r.reason))
        .collect();

    EvaluationReport {
        verdicts,
        reasons,
        correlation,
        missing,
        parse_error: None,
    }
}

/// Ids are trusted only if every entry has one, all are distinct and in range.
fn ids_are_usable(len: usize, records: &[Option<VerdictRecord>]) -> bool {
    if records.is_empty() {
        return false;
    }

    let mut seen = HashSet::new();
    records.iter().all(|record| {
        match record.as_ref().and_then(|r| r.id) {
            Some(id) => (1..=len).contains(&id) && seen.insert(id),
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{ScriptedGateway, verdicts_reply};
    use crate::models::{BackendError, IdeaforgeError};

    fn batch(n: usize) -> Vec<Item> {
        (1..=n).map(|i| Item::new(format!("Idea {i}"), "d")).collect()
    }

    #[tokio::test]
    async fn test_positional_verdicts_set_ratings() {
        let gateway = Arc::new(ScriptedGateway::new([verdicts_reply(&[true, false, true])]));
        let evaluator = Evaluator::new(gateway.clone());
        let mut items = batch(3);

        let report = evaluator.evaluate(&mut items).await.unwrap();

        assert_eq!(report.verdicts, vec![true, false, true]);
        assert_eq!(report.correlation, Correlation::Positional);
        assert_eq!(report.missing, 0);
        assert_eq!(report.reasons[1].as_deref(), Some("Too vague."));
        assert_eq!(items[0].rating, Rating::Pass);
        assert_eq!(items[1].rating, Rating::Fail);
        assert_eq!(items[2].rating, Rating::Pass);
        assert!(gateway.requests()[0].user.contains("\"id\": 3"));
    }

    #[tokio::test]
    async fn test_malformed_reply_fails_whole_batch() {
        let gateway = Arc::new(ScriptedGateway::new(["These ideas are mostly great!"]));
        let evaluator = Evaluator::new(gateway);
        let mut items = batch(4);

        let report = evaluator.evaluate(&mut items).await.unwrap();

        assert!(report.is_unparsable());
        assert_eq!(report.verdicts, vec![false; 4]);
        assert!(report.parse_error.is_some());
        assert!(items.iter().all(|i| i.rating == Rating::Fail));
    }

    #[tokio::test]
    async fn test_short_reply_fails_trailing_items() {
        let gateway = Arc::new(ScriptedGateway::new([verdicts_reply(&[true, true])]));
        let evaluator = Evaluator::new(gateway);
        let mut items = batch(5);

        let report = evaluator.evaluate(&mut items).await.unwrap();

        assert_eq!(report.verdicts, vec![true, true, false, false, false]);
        assert_eq!(report.missing, 3);
        assert_eq!(items[4].rating, Rating::Fail);
    }

    #[tokio::test]
    async fn test_long_reply_is_truncated_to_batch() {
        let gateway = Arc::new(ScriptedGateway::new([verdicts_reply(&[true, true, true])]));
        let evaluator = Evaluator::new(gateway);
        let mut items = batch(2);

        let report = evaluator.evaluate(&mut items).await.unwrap();

        assert_eq!(report.verdicts.len(), 2);
    }

    #[tokio::test]
    async fn test_reordered_reply_is_matched_by_id() {
        let reply = r#"[
            {"id": 3, "rating": "Good enough", "reason": "c"},
            {"id": 1, "rating": "Needs improvement", "reason": "a"},
            {"id": 2, "rating": "Good enough", "reason": "b"}
        ]"#;
        let gateway = Arc::new(ScriptedGateway::new([reply]));
        let evaluator = Evaluator::new(gateway);
        let mut items = batch(3);

        let report = evaluator.evaluate(&mut items).await.unwrap();

        assert_eq!(report.correlation, Correlation::ById);
        assert_eq!(report.verdicts, vec![false, true, true]);
        assert_eq!(report.reasons[0].as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_fall_back_to_position() {
        let reply = r#"[
            {"id": 1, "rating": "Good enough"},
            {"id": 1, "rating": "Needs improvement"}
        ]"#;
        let gateway = Arc::new(ScriptedGateway::new([reply]));
        let evaluator = Evaluator::new(gateway);
        let mut items = batch(2);

        let report = evaluator.evaluate(&mut items).await.unwrap();

        assert_eq!(report.correlation, Correlation::Positional);
        assert_eq!(report.verdicts, vec![true, false]);
    }

    #[tokio::test]
    async fn test_verdict_alias_and_odd_entries() {
        let reply = r#"[{"verdict": "pass"}, "Good enough", {"reason": "no rating"}]"#;
        let gateway = Arc::new(ScriptedGateway::new([reply]));
        let evaluator = Evaluator::new(gateway);
        let mut items = batch(3);

        let report = evaluator.evaluate(&mut items).await.unwrap();

        assert_eq!(report.verdicts, vec![true, false, false]);
        assert_eq!(report.missing, 1);
    }

    #[tokio::test]
    async fn test_numeric_string_ids_are_matched_by_id() {
        let reply = r#"[
            {"id": "2", "rating": "Good enough", "reason": "b"},
            {"id": "1", "rating": "Needs improvement", "reason": "a"}
        ]"#;
        let gateway = Arc::new(ScriptedGateway::new([reply]));
        let evaluator = Evaluator::new(gateway);
        let mut items = batch(2);

        let report = evaluator.evaluate(&mut items).await.unwrap();

        assert_eq!(report.correlation, Correlation::ById);
        assert_eq!(report.verdicts, vec![false, true]);
        assert_eq!(report.missing, 0);
    }

    #[tokio::test]
    async fn test_unusable_ids_keep_verdicts_by_position() {
        let reply = r#"[
            {"id": "first", "rating": "Good enough", "reason": "ok"},
            {"id": "second", "rating": "Good enough", "reason": "ok"}
        ]"#;
        let gateway = Arc::new(ScriptedGateway::new([reply]));
        let evaluator = Evaluator::new(gateway);
        let mut items = batch(2);

        let report = evaluator.evaluate(&mut items).await.unwrap();

        assert_eq!(report.correlation, Correlation::Positional);
        assert_eq!(report.verdicts, vec![true, true]);
        assert_eq!(report.missing, 0);
        assert!(items.iter().all(|i| i.rating == Rating::Pass));
    }

    #[tokio::test]
    async fn test_non_string_reason_and_float_id_keep_entry() {
        let reply = r#"[
            {"rating": "Good enough", "reason": 5},
            {"rating": "Good enough", "id": 2.0}
        ]"#;
        let gateway = Arc::new(ScriptedGateway::new([reply]));
        let evaluator = Evaluator::new(gateway);
        let mut items = batch(2);

        let report = evaluator.evaluate(&mut items).await.unwrap();

        assert_eq!(report.correlation, Correlation::Positional);
        assert_eq!(report.verdicts, vec![true, true]);
        assert_eq!(report.missing, 0);
        assert_eq!(report.reasons[0].as_deref(), Some("5"));
    }

    #[test]
    fn test_lenient_id_forms() {
        let id = |json: &str| {
            serde_json::from_str::<VerdictRecord>(json).unwrap().id
        };
        assert_eq!(id(r#"{"id": 3}"#), Some(3));
        assert_eq!(id(r#"{"id": " 3 "}"#), Some(3));
        assert_eq!(id(r#"{"id": 3.0}"#), Some(3));
        assert_eq!(id(r#"{"id": 3.5}"#), None);
        assert_eq!(id(r#"{"id": -1}"#), None);
        assert_eq!(id(r#"{"id": null}"#), None);
        assert_eq!(id(r#"{"id": [1]}"#), None);
        assert_eq!(id(r#"{}"#), None);
    }

    #[tokio::test]
    async fn test_non_array_reply_is_unparsable() {
        let gateway = Arc::new(ScriptedGateway::new([r#"{"rating": "Good enough"}"#]));
        let evaluator = Evaluator::new(gateway);
        let mut items = batch(2);

        let report = evaluator.evaluate(&mut items).await.unwrap();

        assert!(report.is_unparsable());
        assert_eq!(report.verdicts, vec![false, false]);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_backend() {
        let gateway = Arc::new(ScriptedGateway::default());
        let evaluator = Evaluator::new(gateway.clone());

        let report = evaluator.evaluate(&mut []).await.unwrap();

        assert!(report.verdicts.is_empty());
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_empty();
        let evaluator = Evaluator::new(gateway);
        let mut items = batch(1);

        let err = evaluator.evaluate(&mut items).await.unwrap_err();

        assert!(matches!(err, IdeaforgeError::Backend(BackendError::EmptyReply)));
        assert_eq!(items[0].rating, Rating::Unrated);
    }
}
