//! Template merge engine: placeholder substitution over a document tree.
//!
//! A template document is modeled as a tree of two node kinds — text-bearing
//! paragraphs and tables of rows of cells — where a cell may itself contain
//! tables to arbitrary depth. Merging walks the whole tree and replaces
//! every `{{key}}` token with a display value computed from the answer map.
//! Tokens with no matching key are left verbatim so a partially-filled
//! report stays readable and visibly incomplete.
//!
//! Filling a DOCX package keeps the template's formatting: non-document
//! parts and untouched paragraphs are copied verbatim; only a paragraph
//! that receives a substitution has its runs rewritten.

pub mod docx;

use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};

use cardcomply_shared::{AnswerMap, Result};

pub use docx::{read_docx, write_docx};

/// Display glyph for a "yes" answer.
pub const CHECKED_BOX: &str = "☑";

/// Display glyph for a "no" answer.
pub const UNCHECKED_BOX: &str = "☐";

// ---------------------------------------------------------------------------
// Document tree
// ---------------------------------------------------------------------------

/// One structural node of a template document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocNode {
    /// A text-bearing unit.
    Paragraph(String),
    /// A table: rows of cells. Cells may nest further tables.
    Table(Vec<Vec<DocCell>>),
}

/// A single table cell, holding paragraphs and/or nested tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocCell {
    pub nodes: Vec<DocNode>,
}

/// A parsed template document: the body's node sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateDoc {
    pub nodes: Vec<DocNode>,
}

// ---------------------------------------------------------------------------
// Display formatting
// ---------------------------------------------------------------------------

/// Compute the display value for every answer, once, before traversal.
///
/// A trimmed, lowercased "yes" becomes a checked box, "no" an unchecked
/// box; anything else renders as its literal string form (strings without
/// quotes, other JSON primitives as their literal).
pub fn display_values(answers: &AnswerMap) -> BTreeMap<String, String> {
    answers
        .iter()
        .map(|(key, value)| {
            let raw = value_to_string(value);
            let display = match raw.trim().to_lowercase().as_str() {
                "yes" => CHECKED_BOX.to_string(),
                "no" => UNCHECKED_BOX.to_string(),
                _ => raw,
            };
            (key.clone(), display)
        })
        .collect()
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Substitute all `{{key}}` tokens in the document with display values.
///
/// Reaches every paragraph, every cell of every table, and recursively
/// every cell of every nested table. Idempotent once no tokens remain.
pub fn merge(doc: &mut TemplateDoc, answers: &AnswerMap) {
    let display = display_values(answers);
    merge_nodes(&mut doc.nodes, &display);
}

fn merge_nodes(nodes: &mut [DocNode], display: &BTreeMap<String, String>) {
    for node in nodes {
        match node {
            DocNode::Paragraph(text) => substitute(text, display),
            DocNode::Table(rows) => {
                for row in rows {
                    for cell in row {
                        merge_nodes(&mut cell.nodes, display);
                    }
                }
            }
        }
    }
}

/// Replace every `{{key}}` occurrence in one text unit; all distinct tokens
/// present in the unit are resolved in the same pass.
pub(crate) fn substitute(text: &mut String, display: &BTreeMap<String, String>) {
    if !text.contains("{{") {
        return;
    }

    for (key, value) in display {
        let token = format!("{{{{{key}}}}}");
        if text.contains(&token) {
            *text = text.replace(&token, value);
        }
    }
}

// ---------------------------------------------------------------------------
// End-to-end fill
// ---------------------------------------------------------------------------

/// Fill a DOCX template and write the rendered document to the
/// caller-supplied destination.
///
/// Every part of the template package (styles, relationships, run and
/// table formatting) is preserved; only paragraph text that receives a
/// substitution is rewritten.
pub fn fill_template<R, W>(template: R, out: W, answers: &AnswerMap) -> Result<()>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let display = display_values(answers);
    docx::fill_package(template, out, &display)
}
