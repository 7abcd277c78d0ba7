//! Conversion between items and the JSON records exchanged with the model.

use crate::models::{IdeaforgeError, Item, Result};
use crate::parse::strip_code_fence;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Wire form of an item: `{"title": ..., "description": ...}`.
///
/// Missing or null fields decode as empty strings. The rating never leaves
/// the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
}

/// Item record tagged with a 1-based position, sent to the evaluator so
/// verdicts can be matched back explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberedRecord {
    pub id: usize,
    pub title: String,
    pub description: String,
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

impl From<&Item> for ItemRecord {
    fn from(item: &Item) -> Self {
        Self {
            title: item.title.clone(),
            description: item.description.clone(),
        }
    }
}

impl From<ItemRecord> for Item {
    fn from(record: ItemRecord) -> Self {
        Item::new(record.title, record.description)
    }
}

/// Project items to their wire records.
pub fn encode(items: &[Item]) -> Vec<ItemRecord> {
    items.iter().map(ItemRecord::from).collect()
}

/// Project items to wire records numbered from 1.
pub fn encode_numbered(items: &[Item]) -> Vec<NumberedRecord> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| NumberedRecord {
            id: idx + 1,
            title: item.title.clone(),
            description: item.description.clone(),
        })
        .collect()
}

/// Build unrated items from wire records.
pub fn decode(records: Vec<ItemRecord>) -> Vec<Item> {
    records.into_iter().map(Item::from).collect()
}

/// Strip any code fence from a reply and parse the remainder as JSON.
pub fn parse_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    serde_json::from_str(strip_code_fence(reply)).map_err(IdeaforgeError::parse)
}

/// Parse a reply holding a JSON array of item records.
pub fn parse_items(reply: &str) -> Result<Vec<Item>> {
    parse_reply::<Vec<ItemRecord>>(reply).map(decode)
}

/// Pretty-print a value for embedding in a prompt.
pub fn to_prompt_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| IdeaforgeError::Internal(format!("Failed to serialize prompt payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rating;

    #[test]
    fn test_decode_encode_preserves_title_and_description() {
        let mut items = vec![
            Item::new("Shared journal", "A private journal for two."),
            Item::new("Mood check-in", "Daily emoji check-ins. Ünïcode ok."),
        ];
        items[0].rating = Rating::Pass;

        let decoded = decode(encode(&items));

        assert_eq!(decoded.len(), 2);
        for (before, after) in items.iter().zip(&decoded) {
            assert_eq!(before.title, after.title);
            assert_eq!(before.description, after.description);
            assert_eq!(after.rating, Rating::Unrated);
        }
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let items = parse_items(r#"[{"title": "Only title"}, {"description": "Only desc"}, {}]"#)
            .unwrap();

        assert_eq!(items[0], Item::new("Only title", ""));
        assert_eq!(items[1], Item::new("", "Only desc"));
        assert_eq!(items[2], Item::new("", ""));
    }

    #[test]
    fn test_null_and_non_string_fields_are_tolerated() {
        let items = parse_items(r#"[{"title": null, "description": 42, "extra": true}]"#).unwrap();
        assert_eq!(items[0], Item::new("", "42"));
    }

    #[test]
    fn test_parse_items_strips_fence() {
        let reply = "```json\n[{\"title\": \"A\", \"description\": \"B\"}]\n```";
        assert_eq!(parse_items(reply).unwrap(), vec![Item::new("A", "B")]);
    }

    #[test]
    fn test_parse_items_rejects_non_array() {
        let err = parse_items(r#"{"title": "A"}"#).unwrap_err();
        assert!(err.is_parse());

        let err = parse_items("Sure! Here are your ideas.").unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_encode_never_emits_rating() {
        let mut item = Item::new("t", "d");
        item.rating = Rating::Fail;
        let json = serde_json::to_string(&encode(&[item])).unwrap();
        assert_eq!(json, r#"[{"title":"t","description":"d"}]"#);
    }

    #[test]
    fn test_encode_numbered_starts_at_one() {
        let records = encode_numbered(&[Item::new("a", ""), Item::new("b", "")]);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[1].id, 2);
        assert_eq!(records[1].title, "b");
    }
}
