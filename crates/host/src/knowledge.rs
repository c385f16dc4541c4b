//! Static question/answer knowledge base.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Returned by the lookup tool when there is nothing to show.
pub const NO_KNOWLEDGE_BASE: &str = "No knowledge base available.";

/// One question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub question: String,
    pub answer: String,
}

impl KnowledgeEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Where the loaded entries came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnowledgeSource {
    /// Parsed from the configured file.
    File,
    /// The file was absent; built-in defaults are in use.
    Defaults,
    /// The file could not be read or parsed.
    Unavailable,
}

/// Entries loaded once at startup. Read-only afterwards.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
    source: KnowledgeSource,
}

impl KnowledgeBase {
    /// Load from a JSON array file.
    ///
    /// Never fails: a missing file yields [`KnowledgeBase::defaults`], an
    /// unreadable or malformed one logs a warning and yields an empty base.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "knowledge base not found, using defaults");
                return Self::defaults();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read knowledge base");
                return Self::unavailable();
            }
        };

        match Self::parse(&text) {
            Ok(entries) => {
                info!(path = %path.display(), entries = entries.len(), "loaded knowledge base");
                Self {
                    entries,
                    source: KnowledgeSource::File,
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed knowledge base");
                Self::unavailable()
            }
        }
    }

    /// Parse a JSON array of records.
    ///
    /// Objects missing a field get a placeholder; non-object items become
    /// `Item <n>` entries holding the item's JSON text.
    pub fn parse(text: &str) -> Result<Vec<KnowledgeEntry>, ParseError> {
        let value: Value = serde_json::from_str(text).map_err(ParseError::Json)?;
        let Value::Array(items) = value else {
            return Err(ParseError::NotAnArray);
        };

        Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(fields) => {
                    let field = |name: &str, fallback: &str| {
                        fields
                            .get(name)
                            .and_then(Value::as_str)
                            .unwrap_or(fallback)
                            .to_string()
                    };
                    KnowledgeEntry {
                        question: field("question", "Unknown question"),
                        answer: field("answer", "Unknown answer"),
                    }
                }
                Value::String(text) => KnowledgeEntry::new(format!("Item {}", i + 1), text),
                other => KnowledgeEntry::new(format!("Item {}", i + 1), other.to_string()),
            })
            .collect())
    }

    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Self {
        Self {
            entries,
            source: KnowledgeSource::File,
        }
    }

    /// Minimal built-in set used when no file is present.
    pub fn defaults() -> Self {
        Self {
            entries: vec![
                KnowledgeEntry::new(
                    "What is MCP?",
                    "MCP (Model Context Protocol) is a protocol for connecting AI models with external tools and data sources.",
                ),
                KnowledgeEntry::new(
                    "What is the default transport protocol for MCP?",
                    "The default transport protocol for MCP is stdio (standard input/output).",
                ),
            ],
            source: KnowledgeSource::Defaults,
        }
    }

    fn unavailable() -> Self {
        Self {
            entries: Vec::new(),
            source: KnowledgeSource::Unavailable,
        }
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn source(&self) -> KnowledgeSource {
        self.source
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `Q:`/`A:` blocks separated by blank lines, or [`NO_KNOWLEDGE_BASE`].
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return NO_KNOWLEDGE_BASE.to_string();
        }
        self.entries
            .iter()
            .map(|e| format!("Q: {}\nA: {}\n", e.question, e.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(serde_json::Error),

    #[error("expected a JSON array of {{question, answer}} records")]
    NotAnArray,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn render_joins_blocks_with_blank_lines() {
        let kb = KnowledgeBase::from_entries(vec![
            KnowledgeEntry::new("Q1?", "A1."),
            KnowledgeEntry::new("Q2?", "A2."),
        ]);
        assert_eq!(kb.render(), "Q: Q1?\nA: A1.\n\nQ: Q2?\nA: A2.\n");
    }

    #[test]
    fn empty_base_renders_sentinel() {
        let kb = KnowledgeBase::from_entries(Vec::new());
        assert_eq!(kb.render(), NO_KNOWLEDGE_BASE);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let kb = KnowledgeBase::load(&dir.path().join("kb.json"));
        assert_eq!(kb.source(), KnowledgeSource::Defaults);
        assert_eq!(kb.entries().len(), 2);
        assert!(kb.render().starts_with("Q: What is MCP?\n"));
    }

    #[test]
    fn malformed_file_is_unavailable_not_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let kb = KnowledgeBase::load(file.path());
        assert_eq!(kb.source(), KnowledgeSource::Unavailable);
        assert_eq!(kb.render(), NO_KNOWLEDGE_BASE);
    }

    #[test]
    fn loads_records_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"[{"question": "What is stdio?", "answer": "Standard input/output."}]"#,
        )
        .unwrap();
        let kb = KnowledgeBase::load(file.path());
        assert_eq!(kb.source(), KnowledgeSource::File);
        assert_eq!(
            kb.entries(),
            [KnowledgeEntry::new("What is stdio?", "Standard input/output.")]
        );
    }

    #[test]
    fn parse_tolerates_irregular_items() {
        let entries = KnowledgeBase::parse(r#"[{"question": "Only Q"}, "loose text", 42]"#).unwrap();
        assert_eq!(entries[0], KnowledgeEntry::new("Only Q", "Unknown answer"));
        assert_eq!(entries[1], KnowledgeEntry::new("Item 2", "loose text"));
        assert_eq!(entries[2], KnowledgeEntry::new("Item 3", "42"));
    }

    #[test]
    fn parse_rejects_non_array() {
        assert!(matches!(
            KnowledgeBase::parse(r#"{"question": "q"}"#),
            Err(ParseError::NotAnArray)
        ));
    }

    #[test]
    fn empty_array_is_an_empty_base() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[]").unwrap();
        let kb = KnowledgeBase::load(file.path());
        assert!(kb.is_empty());
        assert_eq!(kb.render(), NO_KNOWLEDGE_BASE);
    }
}
