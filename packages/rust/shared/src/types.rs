//! Core domain types for CardComply enrichment and rendering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Flat answer map supplied by the caller: question id → answer value.
///
/// Values may be strings or other JSON primitives; keys are not required to
/// cover every template placeholder.
pub type AnswerMap = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// LinkCandidate
// ---------------------------------------------------------------------------

/// An outbound link extracted from a source card, as a (label, url) pair.
///
/// The same URL may be produced by both extraction syntaxes (markdown and
/// anchor tags); callers deduplicate by URL before fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCandidate {
    /// Visible link text.
    pub label: String,
    /// Absolute target URL.
    pub url: String,
}

impl LinkCandidate {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

/// Classification of a fetched enrichment source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SourceKind {
    /// A PDF document (paper, technical report, datasheet).
    PdfPaper,
    /// Another model card on the registry, identified as `namespace/name`.
    LinkedModelCard(String),
    /// Anything else — no text is extracted for these.
    Unknown,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PdfPaper => write!(f, "PDF Paper"),
            Self::LinkedModelCard(id) => write!(f, "Linked Model Card ({id})"),
            Self::Unknown => write!(f, "External Link"),
        }
    }
}

// ---------------------------------------------------------------------------
// ExtractedContent
// ---------------------------------------------------------------------------

/// Text extracted from one enrichment source, before truncation/formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// What kind of source this came from.
    pub kind: SourceKind,
    /// Extracted plain text (may be empty).
    pub text: String,
    /// The URL the content was fetched from (after any rewrites).
    pub origin_url: String,
}

// ---------------------------------------------------------------------------
// EnrichmentResult
// ---------------------------------------------------------------------------

/// Outcome of one enrichment pass over a source document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentResult {
    /// Annotated text to append to the source document (may be empty).
    pub appended_text: String,
    /// URLs fetched during this pass, in fetch order, no duplicates.
    pub fetched_urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_display() {
        assert_eq!(SourceKind::PdfPaper.to_string(), "PDF Paper");
        assert_eq!(
            SourceKind::LinkedModelCard("mistralai/Mistral-7B-v0.1".into()).to_string(),
            "Linked Model Card (mistralai/Mistral-7B-v0.1)"
        );
        assert_eq!(SourceKind::Unknown.to_string(), "External Link");
    }

    #[test]
    fn enrichment_result_serialization() {
        let result = EnrichmentResult {
            appended_text: "extra context".into(),
            fetched_urls: vec!["https://arxiv.org/pdf/2310.06825.pdf".into()],
        };

        let json = serde_json::to_string(&result).expect("serialize");
        let parsed: EnrichmentResult = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.fetched_urls.len(), 1);
        assert_eq!(parsed.appended_text, "extra context");
    }

    #[test]
    fn answer_map_accepts_primitives() {
        let json = r#"{"model_name": "Mistral-7B", "open_weights": "yes", "param_count": 7}"#;
        let answers: AnswerMap = serde_json::from_str(json).expect("parse");
        assert_eq!(answers.len(), 3);
        assert!(answers["param_count"].is_number());
    }
}
