//! Candidate gathering over the postings store.
//!
//! Required terms are intersected. The first required term, in query order,
//! drives pagination: its postings are scanned in pages of `2 × max_results`
//! from the caller's cursor and every other required, exclude and optional
//! term is checked by point lookup for each document the driver yields.
//! The cursor only advances over postings that were actually consumed, so a
//! resumed search neither skips nor repeats documents.

use crate::config::IndexConfig;
use crate::error::{KomodoError, Result};
use crate::model::{DocumentId, QueryClause, SearchFilter, SearchQuery};
use crate::postings::{PostingsStore, TermPostings};
use crate::tokenizer::normalize_term;
use std::collections::HashSet;
use tracing::debug;

/// A query after normalization, deduplication and bounds checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery {
    pub required_terms: Vec<String>,
    pub optional_terms: Vec<String>,
    pub exclude_terms: Vec<String>,
    pub required_filters: Vec<SearchFilter>,
    pub optional_filters: Vec<SearchFilter>,
    pub exclude_filters: Vec<SearchFilter>,
    pub max_results: usize,
    pub start_index: usize,
}

fn normalize_terms(terms: &[String], config: &IndexConfig) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .filter_map(|t| normalize_term(t, config))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn check_clause(name: &str, clause: &QueryClause, terms: &[String], config: &IndexConfig) -> Result<()> {
    if terms.len() > config.max_terms {
        return Err(KomodoError::invalid(format!(
            "{name} terms: {} supplied, at most {} allowed",
            terms.len(),
            config.max_terms
        )));
    }
    if clause.filters.len() > config.max_filters {
        return Err(KomodoError::invalid(format!(
            "{name} filters: {} supplied, at most {} allowed",
            clause.filters.len(),
            config.max_filters
        )));
    }
    if clause.filters.iter().any(|f| f.field.trim().is_empty()) {
        return Err(KomodoError::missing(format!("{name} filter without a field")));
    }
    Ok(())
}

/// Normalizes the query and rejects it synchronously if it is malformed.
pub fn validate(query: &SearchQuery, config: &IndexConfig) -> Result<ValidatedQuery> {
    let required_terms = normalize_terms(&query.required.terms, config);
    if required_terms.is_empty() {
        return Err(KomodoError::missing("at least one required term"));
    }
    let optional_terms = normalize_terms(&query.optional.terms, config);
    let exclude_terms = normalize_terms(&query.exclude.terms, config);

    check_clause("required", &query.required, &required_terms, config)?;
    check_clause("optional", &query.optional, &optional_terms, config)?;
    check_clause("exclude", &query.exclude, &exclude_terms, config)?;

    if query.max_results == 0 {
        return Err(KomodoError::invalid("max_results must be at least 1"));
    }

    Ok(ValidatedQuery {
        required_terms,
        optional_terms,
        exclude_terms,
        required_filters: query.required.filters.clone(),
        optional_filters: query.optional.filters.clone(),
        exclude_filters: query.exclude.filters.clone(),
        max_results: query.max_results.min(config.max_results_cap),
        start_index: query.start_index,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub document_id: DocumentId,
    pub optional_matches: usize,
    /// 1 without optional terms, otherwise the fraction of optional terms matched.
    pub term_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePage {
    /// Candidates in driver-term posting order.
    pub candidates: Vec<Candidate>,
    pub terms_not_found: Vec<String>,
    /// Cursor positioned at the first driver posting not consumed.
    pub index_end: usize,
    pub end_of_records: bool,
}

struct ResolvedTerms {
    required: Vec<TermPostings>,
    optional: Vec<TermPostings>,
    exclude: Vec<TermPostings>,
    not_found: Vec<String>,
    missing_required: bool,
}

pub struct Retriever<'a> {
    postings: &'a PostingsStore,
}

impl<'a> Retriever<'a> {
    pub fn new(postings: &'a PostingsStore) -> Self {
        Self { postings }
    }

    fn resolve(&self, query: &ValidatedQuery) -> Result<ResolvedTerms> {
        let mut resolved = ResolvedTerms {
            required: Vec::with_capacity(query.required_terms.len()),
            optional: Vec::with_capacity(query.optional_terms.len()),
            exclude: Vec::with_capacity(query.exclude_terms.len()),
            not_found: Vec::new(),
            missing_required: false,
        };
        for term in &query.required_terms {
            match self.postings.open_term(term)? {
                Some(p) => resolved.required.push(p),
                None => {
                    resolved.missing_required = true;
                    resolved.not_found.push(term.clone());
                }
            }
        }
        for term in &query.optional_terms {
            match self.postings.open_term(term)? {
                Some(p) => resolved.optional.push(p),
                None => resolved.not_found.push(term.clone()),
            }
        }
        for term in &query.exclude_terms {
            if let Some(p) = self.postings.open_term(term)? {
                resolved.exclude.push(p);
            }
        }
        Ok(resolved)
    }

    /// Gathers up to `wanted` candidates starting at driver offset `cursor`.
    pub fn gather(&self, query: &ValidatedQuery, cursor: usize, wanted: usize) -> Result<CandidatePage> {
        let terms = self.resolve(query)?;
        let mut page = CandidatePage {
            terms_not_found: terms.not_found,
            index_end: cursor,
            ..Default::default()
        };

        // An unknown required term empties the intersection.
        if terms.missing_required || wanted == 0 {
            page.end_of_records = terms.missing_required;
            return Ok(page);
        }

        let (driver, others) = match terms.required.split_first() {
            Some(split) => split,
            None => return Err(KomodoError::missing("at least one required term")),
        };
        if driver.is_empty() {
            debug!(term = %driver.term, "required term has no postings");
            page.end_of_records = true;
            return Ok(page);
        }

        let page_size = query.max_results.saturating_mul(2).max(1);
        let optional_total = query.optional_terms.len();
        let mut seen: HashSet<DocumentId> = HashSet::new();

        'pages: loop {
            let postings = driver.scan(page.index_end, page_size)?;
            let fetched = postings.len();
            if fetched == 0 {
                page.end_of_records = true;
                break;
            }

            for posting in postings {
                page.index_end += 1;
                let doc = posting.document_id;
                if !seen.insert(doc.clone()) {
                    continue;
                }
                if !all_contain(others, &doc)? || any_contains(&terms.exclude, &doc)? {
                    continue;
                }

                let optional_matches = count_containing(&terms.optional, &doc)?;
                let term_score = if optional_total == 0 {
                    1.0
                } else {
                    optional_matches as f64 / optional_total as f64
                };
                page.candidates.push(Candidate { document_id: doc, optional_matches, term_score });
                if page.candidates.len() >= wanted {
                    break 'pages;
                }
            }

            if fetched < page_size {
                page.end_of_records = true;
                break;
            }
        }

        debug!(
            driver = %driver.term,
            candidates = page.candidates.len(),
            from = cursor,
            to = page.index_end,
            end = page.end_of_records,
            "candidate page gathered"
        );
        Ok(page)
    }
}

fn all_contain(terms: &[TermPostings], doc: &str) -> Result<bool> {
    for t in terms {
        if !t.contains(doc)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_contains(terms: &[TermPostings], doc: &str) -> Result<bool> {
    for t in terms {
        if t.contains(doc)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn count_containing(terms: &[TermPostings], doc: &str) -> Result<usize> {
    let mut n = 0;
    for t in terms {
        if t.contains(doc)? {
            n += 1;
        }
    }
    Ok(n)
}
