//! Idea, working-set and theme types.
//!
//! These types carry the state of one refinement run: items are produced by
//! generation or improvement, rated by evaluation and partitioned into the
//! working set until nothing is left pending.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Evaluation state of an item.
///
/// Only the evaluator writes `Pass`/`Fail`; generation and improvement
/// always produce `Unrated` items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    /// Not yet evaluated
    #[default]
    Unrated,
    /// Judged "Good enough"
    Pass,
    /// Judged "Needs improvement" (or could not be judged)
    Fail,
}

impl Rating {
    pub fn from_verdict(passed: bool) -> Self {
        if passed {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    pub fn is_pass(self) -> bool {
        self == Self::Pass
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rating::Unrated => write!(f, "unrated"),
            Rating::Pass => write!(f, "Good enough"),
            Rating::Fail => write!(f, "Needs improvement"),
        }
    }
}

/// One brainstormed idea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Short descriptive title
    pub title: String,

    /// One or two sentence explanation
    pub description: String,

    #[serde(default)]
    pub rating: Rating,
}

impl Item {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            rating: Rating::Unrated,
        }
    }
}

/// Partition of all live candidates into accepted and pending items.
///
/// An item is in exactly one of the two lists. `accepted` only ever grows;
/// `pending` is rebuilt every round.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    accepted: Vec<Item>,
    pending: Vec<Item>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// True before the first successful generation.
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.pending.is_empty()
    }

    pub fn accepted(&self) -> &[Item] {
        &self.accepted
    }

    pub fn pending(&self) -> &[Item] {
        &self.pending
    }

    pub fn pending_mut(&mut self) -> &mut [Item] {
        &mut self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Replace the pending items wholesale. Replacements start unrated.
    pub fn replace_pending(&mut self, batch: Vec<Item>) {
        self.pending = batch
            .into_iter()
            .map(|mut item| {
                item.rating = Rating::Unrated;
                item
            })
            .collect();
    }

    /// Move passing pending items into `accepted` and mark the rest failed.
    ///
    /// Verdicts are positional; a pending item without a verdict fails.
    /// Returns the number of items accepted by this call.
    pub fn partition(&mut self, verdicts: &[bool]) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let before = self.accepted.len();

        for (idx, mut item) in pending.into_iter().enumerate() {
            if verdicts.get(idx).copied().unwrap_or(false) {
                item.rating = Rating::Pass;
                self.accepted.push(item);
            } else {
                item.rating = Rating::Fail;
                self.pending.push(item);
            }
        }

        self.accepted.len() - before
    }

    /// Accepted items followed by whatever is still pending.
    pub fn into_items(self) -> Vec<Item> {
        let mut items = self.accepted;
        items.extend(self.pending);
        items
    }
}

/// Theme name → titles of the ideas in that theme, in reply order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThemeMap {
    themes: Vec<(String, Vec<String>)>,
}

impl ThemeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a theme. Blank names are ignored; a repeated name extends the existing theme.
    pub fn insert(&mut self, theme: impl Into<String>, titles: Vec<String>) {
        let theme = theme.into();
        let theme = theme.trim();
        if theme.is_empty() {
            return;
        }

        match self.themes.iter_mut().find(|(name, _)| name == theme) {
            Some((_, existing)) => existing.extend(titles),
            None => self.themes.push((theme.to_string(), titles)),
        }
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    pub fn get(&self, theme: &str) -> Option<&[String]> {
        self.themes
            .iter()
            .find(|(name, _)| name == theme)
            .map(|(_, titles)| titles.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.themes
            .iter()
            .map(|(name, titles)| (name.as_str(), titles.as_slice()))
    }

    /// First theme listing the given title.
    pub fn theme_of(&self, title: &str) -> Option<&str> {
        self.themes
            .iter()
            .find(|(_, titles)| titles.iter().any(|t| t == title))
            .map(|(name, _)| name.as_str())
    }
}

/// Statistics for a refinement run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Outer iterations consumed
    pub attempts: usize,

    /// Whether every item passed before the budget ran out
    pub converged: bool,

    /// Items rated "Good enough" at the end
    pub total_accepted: usize,

    /// Items still needing improvement at the end
    pub total_pending: usize,

    /// Requests sent to the backend by the loop
    pub backend_calls: usize,

    /// Model replies that could not be parsed
    pub parse_failures: usize,

    /// Total runtime in seconds
    pub runtime_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(titles: &[&str]) -> Vec<Item> {
        titles.iter().map(|t| Item::new(*t, "desc")).collect()
    }

    #[test]
    fn test_partition_moves_passing_items() {
        let mut set = WorkingSet::new();
        set.replace_pending(batch(&["a", "b", "c"]));

        let moved = set.partition(&[true, false, true]);

        assert_eq!(moved, 2);
        let accepted: Vec<_> = set.accepted().iter().map(|i| i.title.as_str()).collect();
        assert_eq!(accepted, ["a", "c"]);
        assert!(set.accepted().iter().all(|i| i.rating == Rating::Pass));
        assert_eq!(set.pending().len(), 1);
        assert_eq!(set.pending()[0].title, "b");
        assert_eq!(set.pending()[0].rating, Rating::Fail);
    }

    #[test]
    fn test_partition_fails_items_without_verdict() {
        let mut set = WorkingSet::new();
        set.replace_pending(batch(&["a", "b", "c"]));

        set.partition(&[true]);

        assert_eq!(set.accepted().len(), 1);
        assert_eq!(set.pending().len(), 2);
        assert!(set.pending().iter().all(|i| i.rating == Rating::Fail));
    }

    #[test]
    fn test_replace_pending_resets_rating() {
        let mut set = WorkingSet::new();
        let mut items = batch(&["x"]);
        items[0].rating = Rating::Fail;

        set.replace_pending(items);

        assert_eq!(set.pending()[0].rating, Rating::Unrated);
    }

    #[test]
    fn test_into_items_keeps_accepted_first() {
        let mut set = WorkingSet::new();
        set.replace_pending(batch(&["a", "b"]));
        set.partition(&[false, true]);

        let titles: Vec<_> = set.into_items().into_iter().map(|i| i.title).collect();
        assert_eq!(titles, ["b", "a"]);
    }

    #[test]
    fn test_theme_map_ignores_blank_names_and_merges_duplicates() {
        let mut themes = ThemeMap::new();
        themes.insert("Communication", vec!["a".into()]);
        themes.insert("  ", vec!["b".into()]);
        themes.insert("Communication", vec!["c".into()]);
        themes.insert("Trust", vec!["d".into()]);

        assert_eq!(themes.len(), 2);
        assert_eq!(themes.get("Communication").unwrap(), ["a", "c"]);
        assert_eq!(themes.theme_of("d"), Some("Trust"));
        assert_eq!(themes.theme_of("b"), None);
    }

    #[test]
    fn test_rating_display() {
        assert_eq!(Rating::Pass.to_string(), "Good enough");
        assert_eq!(Rating::Fail.to_string(), "Needs improvement");
        assert_eq!(Rating::from_verdict(false), Rating::Fail);
    }
}
