use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded dataset, kept for run provenance only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    /// Unique name.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub file_path: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(id: i64, name: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            file_path: file_path.into(),
            uploaded_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Human-readable prefixed identifier, e.g. `DS42`.
    pub fn prefid(&self) -> String {
        format!("DS{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefid() {
        let ds =
            Dataset::new(42, "reviews", "/data/reviews.csv").with_description("product reviews");
        assert_eq!(ds.prefid(), "DS42");
        assert_eq!(ds.description.as_deref(), Some("product reviews"));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let ds = Dataset::new(7, "eval", "/data/eval.jsonl");
        let json = serde_json::to_string(&ds).unwrap();
        let parsed: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ds);
    }
}
