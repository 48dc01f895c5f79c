use crate::config::IndexConfig;
use crate::documents::DocumentStore;
use crate::error::Result;
use crate::filter::matches_document;
use crate::model::{MatchingDocument, SearchQuery, SearchResult};
use crate::postings::PostingsStore;
use crate::retriever::{validate, Candidate, Retriever, ValidatedQuery};
use tracing::{debug, warn};

/// Drives the [`Retriever`], applies field filters and produces the ranked page.
pub struct ResultAssembler<'a> {
    retriever: Retriever<'a>,
    documents: &'a dyn DocumentStore,
    config: &'a IndexConfig,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(postings: &'a PostingsStore, documents: &'a dyn DocumentStore, config: &'a IndexConfig) -> Self {
        Self { retriever: Retriever::new(postings), documents, config }
    }

    pub fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        let query = validate(query, self.config)?;
        let mut result = SearchResult { next_start_index: query.start_index, ..Default::default() };
        let mut cursor = query.start_index;

        while result.matches.len() < query.max_results {
            let wanted = query.max_results - result.matches.len();
            let page = match self.retriever.gather(&query, cursor, wanted) {
                Ok(page) => page,
                Err(err) => {
                    // Surfaced as an empty page; the cursor stays at the last
                    // driver offset that was gathered successfully.
                    warn!(error = %err, cursor, "candidate gathering failed, returning an empty page");
                    return Ok(SearchResult {
                        terms_not_found: result.terms_not_found,
                        next_start_index: cursor,
                        ..Default::default()
                    });
                }
            };

            for term in page.terms_not_found {
                if !result.terms_not_found.contains(&term) {
                    result.terms_not_found.push(term);
                }
            }
            result.match_counts.terms_match += page.candidates.len();
            let consumed = page.index_end > cursor;
            cursor = page.index_end;

            for candidate in page.candidates {
                if let Some(matched) = self.assemble(&query, candidate) {
                    result.matches.push(matched);
                }
            }

            if page.end_of_records {
                result.end_of_records = true;
                break;
            }
            if !consumed {
                break;
            }
        }

        result.match_counts.filter_match = result.matches.len();
        result.matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        result.matches.truncate(query.max_results);
        result.next_start_index = cursor;
        Ok(result)
    }

    /// Applies filters to one candidate; `None` drops it.
    fn assemble(&self, query: &ValidatedQuery, candidate: Candidate) -> Option<MatchingDocument> {
        let document = match self.documents.get(&candidate.document_id) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                debug!(document_id = %candidate.document_id, "candidate has no parsed document, skipping");
                return None;
            }
            Err(err) => {
                warn!(document_id = %candidate.document_id, error = %err, "failed to load parsed document");
                return None;
            }
        };

        // Free text and markup are exempt from filters.
        let filterable = document.document_type.is_structured() && document.nodes.is_some();
        let filter_score = if filterable {
            if !query.required_filters.iter().all(|f| matches_document(f, &document)) {
                return None;
            }
            if query.exclude_filters.iter().any(|f| matches_document(f, &document)) {
                return None;
            }
            if query.optional_filters.is_empty() {
                1.0
            } else {
                let matched = query.optional_filters.iter().filter(|f| matches_document(f, &document)).count();
                matched as f64 / query.optional_filters.len() as f64
            }
        } else {
            1.0
        };

        let score = blend(candidate.term_score, !query.optional_terms.is_empty(), filter_score, !query.optional_filters.is_empty());
        Some(MatchingDocument { document_id: document.document_id, score, document_type: document.document_type })
    }
}

/// Mean of the score components the query actually configured. With neither
/// optional terms nor optional filters every match scores 1.
fn blend(term_score: f64, has_optional_terms: bool, filter_score: f64, has_optional_filters: bool) -> f64 {
    let score = match (has_optional_terms, has_optional_filters) {
        (true, true) => (term_score + filter_score) / 2.0,
        (true, false) => term_score,
        (false, true) => filter_score,
        (false, false) => 1.0,
    };
    score.clamp(0.0, 1.0)
}
