use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type DocumentId = String;
pub type CollectionId = u64;

/// Dictionary entry mapping a normalized term to its postings collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    pub term: String,
    pub collection_id: CollectionId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated_at: OffsetDateTime,
    /// Set while the collection is being checked and dropped. Writers wait for
    /// the flag to clear rather than publishing a competing entry.
    pub retiring: bool,
}

/// A (term, document) occurrence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub term: String,
    pub document_id: DocumentId,
    pub frequency: u32,
    /// Token offsets in discovery order, appended on repeated writes.
    pub positions: Vec<u32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Positions of one term inside a parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermPositions {
    pub term: String,
    pub positions: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Number,
    Boolean,
    Null,
    Unknown,
}

/// One flattened field of a structured document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataNode {
    /// Dotted path, e.g. `order.customer.name`.
    pub key: String,
    pub value: serde_json::Value,
    pub data_type: DataType,
}

impl DataNode {
    pub fn new<K: Into<String>>(key: K, value: serde_json::Value) -> Self {
        let data_type = match &value {
            serde_json::Value::String(_) => DataType::String,
            serde_json::Value::Number(_) => DataType::Number,
            serde_json::Value::Bool(_) => DataType::Boolean,
            serde_json::Value::Null => DataType::Null,
            _ => DataType::Unknown,
        };
        Self { key: key.into(), value, data_type }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Value rendered as text; strings are not quoted. `None` for null.
    pub fn text(&self) -> Option<String> {
        match &self.value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    Json,
    Xml,
    Sql,
    Csv,
    Html,
    Text,
    Unknown,
}

impl DocumentType {
    /// Structured formats expose a flattened node list and take part in filter evaluation.
    pub fn is_structured(self) -> bool {
        matches!(self, DocumentType::Json | DocumentType::Xml | DocumentType::Sql | DocumentType::Csv)
    }
}

/// Output of the parsing pipeline for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub document_id: DocumentId,
    pub document_type: DocumentType,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub nodes: Option<Vec<DataNode>>,
    #[serde(default)]
    pub postings: Vec<TermPositions>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ParsedDocument {
    pub fn new<S: Into<String>>(document_id: S, document_type: DocumentType) -> Self {
        Self {
            document_id: document_id.into(),
            document_type,
            title: None,
            source_url: None,
            nodes: None,
            postings: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.postings.iter().map(|p| p.term.as_str())
    }

    /// All nodes with the given key. Arrays flatten to several nodes sharing a key.
    pub fn nodes_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a DataNode> + 'a {
        self.nodes.iter().flatten().filter(move |n| n.key == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterCondition {
    Equals,
    NotEquals,
    Contains,
    ContainsNot,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub field: String,
    pub condition: FilterCondition,
    #[serde(default)]
    pub value: Option<String>,
}

impl SearchFilter {
    pub fn new<F: Into<String>>(field: F, condition: FilterCondition, value: Option<&str>) -> Self {
        Self { field: field.into(), condition, value: value.map(str::to_string) }
    }
}

/// Terms and filters of one query section (required, optional or exclude).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryClause {
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub filters: Vec<SearchFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub required: QueryClause,
    #[serde(default)]
    pub optional: QueryClause,
    #[serde(default)]
    pub exclude: QueryClause,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub start_index: usize,
    #[serde(default)]
    pub callback_url: Option<String>,
}

fn default_max_results() -> usize { 10 }

impl SearchQuery {
    pub fn new<I, S>(required_terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: QueryClause { terms: required_terms.into_iter().map(Into::into).collect(), filters: Vec::new() },
            optional: QueryClause::default(),
            exclude: QueryClause::default(),
            max_results: default_max_results(),
            start_index: 0,
            callback_url: None,
        }
    }

    pub fn with_optional_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional.terms = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.terms = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_required_filter(mut self, filter: SearchFilter) -> Self {
        self.required.filters.push(filter);
        self
    }

    pub fn with_optional_filter(mut self, filter: SearchFilter) -> Self {
        self.optional.filters.push(filter);
        self
    }

    pub fn with_exclude_filter(mut self, filter: SearchFilter) -> Self {
        self.exclude.filters.push(filter);
        self
    }

    pub fn with_page(mut self, start_index: usize, max_results: usize) -> Self {
        self.start_index = start_index;
        self.max_results = max_results;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingDocument {
    pub document_id: DocumentId,
    pub score: f64,
    pub document_type: DocumentType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCounts {
    /// Candidates surfaced by term matching.
    pub terms_match: usize,
    /// Candidates that also survived filter evaluation.
    pub filter_match: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub matches: Vec<MatchingDocument>,
    pub terms_not_found: Vec<String>,
    pub next_start_index: usize,
    pub match_counts: MatchCounts,
    /// True once the driving term's postings are exhausted.
    pub end_of_records: bool,
    #[serde(rename = "async")]
    pub is_async: bool,
}

impl SearchResult {
    /// Immediate acknowledgement returned for callback searches.
    pub fn acknowledged(start_index: usize) -> Self {
        Self { next_start_index: start_index, is_async: true, ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResult {
    pub document_id: DocumentId,
    pub terms_indexed: usize,
    pub replaced: bool,
}
