//! Minimal parsers producing [`ParsedDocument`]s for free text and JSON.
//!
//! Other formats are produced by external pipelines and handed to the index
//! already parsed.

use crate::config::IndexConfig;
use crate::model::{DataNode, DocumentType, ParsedDocument};
use crate::tokenizer::{group_positions, token_count, tokenize};
use serde_json::Value;

pub fn parse_text(document_id: &str, text: &str, config: &IndexConfig) -> ParsedDocument {
    let mut doc = ParsedDocument::new(document_id, DocumentType::Text);
    doc.postings = group_positions(tokenize(text, 0, config));
    doc
}

/// Flattens `value` into dotted-key nodes and tokenizes every scalar.
/// Array elements share their parent's key.
pub fn parse_json(document_id: &str, value: &Value, config: &IndexConfig) -> ParsedDocument {
    let mut nodes = Vec::new();
    flatten("", value, &mut nodes);

    let mut tokens = Vec::new();
    let mut offset = 0u32;
    for node in &nodes {
        if let Some(text) = node.text() {
            tokens.extend(tokenize(&text, offset, config));
            offset += token_count(&text);
        }
    }

    let mut doc = ParsedDocument::new(document_id, DocumentType::Json);
    doc.title = value.get("title").and_then(Value::as_str).map(str::to_string);
    doc.source_url = value.get("url").and_then(Value::as_str).map(str::to_string);
    doc.postings = group_positions(tokens);
    doc.nodes = Some(nodes);
    doc
}

fn flatten(prefix: &str, value: &Value, nodes: &mut Vec<DataNode>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten(&path, child, nodes);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten(prefix, item, nodes);
            }
        }
        scalar => nodes.push(DataNode::new(prefix, scalar.clone())),
    }
}
