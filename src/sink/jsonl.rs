//! JSON Lines file sink.

use crate::models::{IdeaforgeError, Result, ThemeMap};
use crate::parse::ItemRecord;
use crate::sink::ContentSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use uuid::Uuid;

/// One published idea, as written to the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedIdea {
    /// Identifies the run that produced the idea
    pub run_id: Uuid,

    pub title: String,

    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    pub published_at: DateTime<Utc>,
}

/// Appends one JSON object per idea to a file, creating it if needed.
pub struct JsonlSink {
    path: PathBuf,
    run_id: Uuid,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

#[async_trait]
impl ContentSink for JsonlSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn publish(&self, records: &[ItemRecord], themes: &ThemeMap) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| IdeaforgeError::io("creating output directory", e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| IdeaforgeError::io("opening output file", e))?;
        let mut writer = BufWriter::new(file);
        let published_at = Utc::now();

        for record in records {
            let line = PublishedIdea {
                run_id: self.run_id,
                title: record.title.clone(),
                description: record.description.clone(),
                theme: themes.theme_of(&record.title).map(str::to_string),
                published_at,
            };
            let json = serde_json::to_string(&line).map_err(|e| {
                IdeaforgeError::Internal(format!("Failed to serialize idea: {e}"))
            })?;
            writeln!(writer, "{json}").map_err(|e| IdeaforgeError::io("writing output", e))?;
        }

        writer
            .flush()
            .map_err(|e| IdeaforgeError::io("flushing output", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn record(title: &str) -> ItemRecord {
        ItemRecord {
            title: title.to_string(),
            description: format!("About {title}."),
        }
    }

    fn read_lines(path: &Path) -> Vec<PublishedIdea> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_writes_one_line_per_idea_with_theme() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join("ideas.jsonl");
        let sink = JsonlSink::new(&path);

        let mut themes = ThemeMap::new();
        themes.insert("Reflection", vec!["Journal".to_string()]);

        sink.publish(&[record("Journal"), record("Check-in")], &themes)
            .await
            .unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].title, "Journal");
        assert_eq!(lines[0].theme.as_deref(), Some("Reflection"));
        assert_eq!(lines[1].theme, None);
        assert!(lines.iter().all(|l| l.run_id == sink.run_id()));
    }

    #[tokio::test]
    async fn test_appends_across_publishes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ideas.jsonl");
        let sink = JsonlSink::new(&path);

        sink.publish(&[record("A")], &ThemeMap::new()).await.unwrap();
        sink.publish(&[record("B")], &ThemeMap::new()).await.unwrap();

        let titles: Vec<_> = read_lines(&path).into_iter().map(|l| l.title).collect();
        assert_eq!(titles, ["A", "B"]);
    }

    #[tokio::test]
    async fn test_unwritable_path_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(temp_dir.path());

        let err = sink.publish(&[record("A")], &ThemeMap::new()).await.unwrap_err();
        assert!(matches!(err, IdeaforgeError::Io { .. }));
    }
}
