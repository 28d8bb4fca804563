//! Filter state
//!
//! Derived views over a collection. Nothing here is ever persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Record, RecordSchema};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

/// Text, category and status predicates, all optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub text: Option<String>,
    pub category: Option<(String, Value)>,
    pub status: StatusFilter,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.text = if query.trim().is_empty() { None } else { Some(query) };
        self
    }

    pub fn category(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.category = Some((field.into(), value.into()));
        self
    }

    pub fn status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, record: &Record, schema: &RecordSchema) -> bool {
        if let Some(query) = &self.text {
            let needle = query.trim().to_lowercase();
            let haystack = record.text(&schema.text_field).unwrap_or_default().to_lowercase();
            if !haystack.contains(&needle) {
                return false;
            }
        }

        if let Some((field, value)) = &self.category {
            if record.get(field) != Some(value) {
                return false;
            }
        }

        match self.status {
            StatusFilter::All => true,
            StatusFilter::Active => !record.flag(&schema.status_field),
            StatusFilter::Completed => record.flag(&schema.status_field),
        }
    }

    /// Displayed subset, in collection order
    pub fn apply(&self, records: &[Record], schema: &RecordSchema) -> Vec<Record> {
        records
            .iter()
            .filter(|record| self.matches(record, schema))
            .cloned()
            .collect()
    }
}

/// Counts shown next to the list ("3 items left")
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
}

impl Stats {
    pub fn collect(records: &[Record], status_field: &str) -> Self {
        let completed = records.iter().filter(|r| r.flag(status_field)).count();
        Self {
            total: records.len(),
            active: records.len() - completed,
            completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Draft;
    use serde_json::json;

    fn sample() -> Vec<Record> {
        vec![
            Record::new("1", Draft::new().with("text", "Book flight").with("completed", true).with("day", 1).into_fields()),
            Record::new("2", Draft::new().with("text", "Pack bags").with("completed", false).with("day", 1).into_fields()),
            Record::new("3", Draft::new().with("text", "Visit museum").with("day", 2).into_fields()),
        ]
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_text_match_is_case_insensitive() {
        let schema = RecordSchema::default();
        let shown = Filter::new().text("BOOK").apply(&sample(), &schema);
        assert_eq!(ids(&shown), vec!["1"]);
    }

    #[test]
    fn test_blank_text_matches_everything() {
        let filter = Filter::new().text("  ");
        assert!(filter.text.is_none());
        assert_eq!(filter.apply(&sample(), &RecordSchema::default()).len(), 3);
    }

    #[test]
    fn test_category_and_status_combine() {
        let schema = RecordSchema::default();
        let shown = Filter::new()
            .category("day", json!(1))
            .status(StatusFilter::Active)
            .apply(&sample(), &schema);
        assert_eq!(ids(&shown), vec!["2"]);

        let done = Filter::new().status(StatusFilter::Completed).apply(&sample(), &schema);
        assert_eq!(ids(&done), vec!["1"]);
    }

    #[test]
    fn test_stats_treat_missing_status_as_active() {
        let stats = Stats::collect(&sample(), "completed");
        assert_eq!(stats, Stats { total: 3, active: 2, completed: 1 });
    }
}
