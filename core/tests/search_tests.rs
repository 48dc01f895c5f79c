use komodo_core::parser::parse_json;
use komodo_core::{
    DocumentType, FilterCondition, Index, IndexConfig, KomodoError, ParsedDocument, SearchFilter, SearchQuery,
    TermPositions,
};
use komodo_core::documents::DocumentStore;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn text_doc(id: &str, terms: Vec<(&str, Vec<u32>)>) -> ParsedDocument {
    let mut doc = ParsedDocument::new(id, DocumentType::Text);
    doc.postings = terms
        .into_iter()
        .map(|(term, positions)| TermPositions { term: term.to_string(), positions })
        .collect();
    doc
}

fn two_doc_index() -> Index {
    let index = Index::temporary("scenario", IndexConfig::default()).unwrap();
    index.add_document(text_doc("Doc1", vec![("alpha", vec![0, 4]), ("beta", vec![2])])).unwrap();
    index.add_document(text_doc("Doc2", vec![("alpha", vec![1])])).unwrap();
    index
}

fn ids(result: &komodo_core::SearchResult) -> Vec<&str> {
    result.matches.iter().map(|m| m.document_id.as_str()).collect()
}

#[test]
fn optional_terms_rank_documents() {
    let index = two_doc_index();
    let result = index.search(&SearchQuery::new(["alpha"]).with_optional_terms(["beta"])).unwrap();
    assert_eq!(ids(&result), vec!["Doc1", "Doc2"]);
    assert_eq!(result.matches[0].score, 1.0);
    assert_eq!(result.matches[1].score, 0.0);
    assert_eq!(result.matches[0].document_type, DocumentType::Text);
    assert_eq!(result.match_counts.terms_match, 2);
    assert_eq!(result.match_counts.filter_match, 2);
    assert!(result.end_of_records);
}

#[test]
fn exclude_terms_drop_documents() {
    let index = two_doc_index();
    let result = index.search(&SearchQuery::new(["alpha"]).with_exclude_terms(["beta"])).unwrap();
    assert_eq!(ids(&result), vec!["Doc2"]);
}

#[test]
fn unknown_required_term_is_reported() {
    let index = two_doc_index();
    let result = index.search(&SearchQuery::new(["gamma"])).unwrap();
    assert!(result.matches.is_empty());
    assert_eq!(result.terms_not_found, vec!["gamma"]);
}

#[test]
fn validation_errors_are_synchronous() {
    let index = two_doc_index();
    let empty = index.search(&SearchQuery::new(Vec::<String>::new()));
    assert!(matches!(empty, Err(KomodoError::MissingParameters(_))));
    let zero = index.search(&SearchQuery::new(["alpha"]).with_page(0, 0));
    assert!(matches!(zero, Err(KomodoError::InvalidParameters(_))));
}

#[test]
fn scores_stay_within_bounds() {
    let index = two_doc_index();
    let query = SearchQuery::new(["alpha"])
        .with_optional_terms(["beta", "delta"])
        .with_optional_filter(SearchFilter::new("x", FilterCondition::IsNull, None));
    let result = index.search(&query).unwrap();
    assert_eq!(result.matches.len(), 2);
    assert!(result.matches.iter().all(|m| (0.0..=1.0).contains(&m.score)));
    assert_eq!(result.terms_not_found, vec!["delta"]);
}

#[test]
fn structured_filters_include_and_exclude() {
    let index = Index::temporary("orders", IndexConfig::default()).unwrap();
    let doc = parse_json("order-1", &json!({ "item": "widget", "price": 42 }), index.config());
    index.add_document(doc).unwrap();

    let over = SearchQuery::new(["widget"])
        .with_required_filter(SearchFilter::new("price", FilterCondition::GreaterThan, Some("10")));
    assert_eq!(ids(&index.search(&over).unwrap()), vec!["order-1"]);

    let under = SearchQuery::new(["widget"])
        .with_required_filter(SearchFilter::new("price", FilterCondition::LessThan, Some("10")));
    let result = index.search(&under).unwrap();
    assert!(result.matches.is_empty());
    assert_eq!(result.match_counts.terms_match, 1);
    assert_eq!(result.match_counts.filter_match, 0);

    let missing_field = SearchQuery::new(["widget"])
        .with_required_filter(SearchFilter::new("weight", FilterCondition::IsNotNull, None));
    assert!(index.search(&missing_field).unwrap().matches.is_empty());

    let excluded = SearchQuery::new(["widget"])
        .with_exclude_filter(SearchFilter::new("item", FilterCondition::StartsWith, Some("wid")));
    assert!(index.search(&excluded).unwrap().matches.is_empty());
}

#[test]
fn optional_filters_blend_into_score() {
    let index = Index::temporary("orders", IndexConfig::default()).unwrap();
    index.add_document(parse_json("cheap", &json!({ "kind": "widget", "price": 5 }), index.config())).unwrap();
    index.add_document(parse_json("dear", &json!({ "kind": "widget", "price": 500 }), index.config())).unwrap();

    let query = SearchQuery::new(["widget"])
        .with_optional_filter(SearchFilter::new("price", FilterCondition::GreaterThan, Some("100")))
        .with_optional_filter(SearchFilter::new("kind", FilterCondition::Equals, Some("widget")));
    let result = index.search(&query).unwrap();
    assert_eq!(ids(&result), vec!["dear", "cheap"]);
    assert_eq!(result.matches[0].score, 1.0);
    assert_eq!(result.matches[1].score, 0.5);
}

#[test]
fn text_documents_are_exempt_from_filters() {
    let index = two_doc_index();
    let query = SearchQuery::new(["alpha"])
        .with_required_filter(SearchFilter::new("price", FilterCondition::GreaterThan, Some("10")));
    assert_eq!(index.search(&query).unwrap().matches.len(), 2);
}

#[test]
fn pagination_resumes_from_next_start_index() {
    let index = Index::temporary("paged", IndexConfig::default()).unwrap();
    for i in 0..12 {
        index.add_document(text_doc(&format!("d{i:02}"), vec![("common", vec![0])])).unwrap();
    }

    let mut seen = Vec::new();
    let mut start = 0;
    loop {
        let result = index.search(&SearchQuery::new(["common"]).with_page(start, 5)).unwrap();
        assert!(result.matches.len() <= 5);
        seen.extend(result.matches.iter().map(|m| m.document_id.clone()));
        start = result.next_start_index;
        if result.end_of_records {
            break;
        }
    }
    let expected: Vec<String> = (0..12).map(|i| format!("d{i:02}")).collect();
    assert_eq!(seen, expected);
}

#[test]
fn filters_do_not_starve_a_page() {
    let index = Index::temporary("sparse", IndexConfig::default()).unwrap();
    for i in 0..20 {
        let doc = parse_json(&format!("o{i:02}"), &json!({ "tag": "item", "n": i }), index.config());
        index.add_document(doc).unwrap();
    }
    // The first eight candidates fail the filter; the assembler keeps pulling.
    let query = SearchQuery::new(["item"])
        .with_page(0, 3)
        .with_required_filter(SearchFilter::new("n", FilterCondition::GreaterThanOrEqualTo, Some("8")));
    let result = index.search(&query).unwrap();
    assert_eq!(result.matches.len(), 3);
    assert!(result.matches.iter().all(|m| m.document_id.as_str() >= "o08"));
}

#[test]
fn deleting_a_document_removes_its_postings() {
    let index = two_doc_index();
    assert!(index.delete_document("Doc1").unwrap());
    assert!(index.dictionary().lookup("beta").unwrap().is_none());
    assert!(index.dictionary().lookup("alpha").unwrap().is_some());
    assert!(!index.delete_document("Doc1").unwrap());

    let result = index.search(&SearchQuery::new(["beta"])).unwrap();
    assert_eq!(result.terms_not_found, vec!["beta"]);
}

#[derive(Default)]
struct MemoryDocuments {
    docs: Mutex<HashMap<String, ParsedDocument>>,
}

impl DocumentStore for MemoryDocuments {
    fn get(&self, document_id: &str) -> komodo_core::Result<Option<ParsedDocument>> {
        Ok(self.docs.lock().get(document_id).cloned())
    }

    fn put(&self, document: &ParsedDocument) -> komodo_core::Result<()> {
        self.docs.lock().insert(document.document_id.clone(), document.clone());
        Ok(())
    }

    fn delete(&self, document_id: &str) -> komodo_core::Result<Option<ParsedDocument>> {
        Ok(self.docs.lock().remove(document_id))
    }

    fn count(&self) -> usize {
        self.docs.lock().len()
    }
}

#[test]
fn candidates_without_a_parsed_document_are_skipped() {
    let documents = Arc::new(MemoryDocuments::default());
    let index = Index::temporary("custom", IndexConfig::default())
        .unwrap()
        .with_document_store(documents.clone());
    index.add_document(text_doc("Doc1", vec![("alpha", vec![0])])).unwrap();
    index.add_document(text_doc("Doc2", vec![("alpha", vec![0])])).unwrap();
    assert_eq!(index.stats().unwrap().documents, 2);

    // Document vanishes between candidate gathering and assembly.
    documents.delete("Doc1").unwrap();
    let result = index.search(&SearchQuery::new(["alpha"])).unwrap();
    assert_eq!(ids(&result), vec!["Doc2"]);
    assert_eq!(result.match_counts.terms_match, 2);
    assert_eq!(result.match_counts.filter_match, 1);
}
