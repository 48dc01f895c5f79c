use crate::assembler::ResultAssembler;
use crate::config::IndexConfig;
use crate::dictionary::TermDictionary;
use crate::documents::{DocumentStore, SledDocumentStore};
use crate::error::{KomodoError, Result};
use crate::model::{IndexResult, ParsedDocument, SearchQuery, SearchResult, TermPositions};
use crate::persist::{load_meta, save_meta, IndexPaths, MetaFile};
use crate::postings::PostingsStore;
use crate::store::RecordStore;
use crate::tokenizer::normalize_term;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub name: String,
    pub documents: usize,
    pub terms: usize,
    pub config: IndexConfig,
}

/// One open index: record store, dictionary, postings and parsed documents.
pub struct Index {
    name: String,
    config: IndexConfig,
    paths: Option<IndexPaths>,
    store: RecordStore,
    postings: PostingsStore,
    documents: Arc<dyn DocumentStore>,
    destroying: AtomicBool,
}

impl Index {
    /// Opens the index at `root`, creating it with `config` if it does not exist yet.
    /// An existing index keeps its persisted configuration.
    pub fn open_or_create<P: AsRef<Path>>(name: &str, root: P, config: IndexConfig) -> Result<Self> {
        let paths = IndexPaths::new(root);
        let meta = if paths.exists() {
            load_meta(&paths)?
        } else {
            let meta = MetaFile::new(name, config);
            save_meta(&paths, &meta)?;
            info!(index = name, root = %paths.root.display(), "index created");
            meta
        };
        let store = RecordStore::open(paths.store())?;
        Self::from_store(meta.name, meta.config, Some(paths), store)
    }

    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let paths = IndexPaths::new(root);
        if !paths.exists() {
            return Err(KomodoError::not_found(format!("no index at {}", paths.root.display())));
        }
        let meta = load_meta(&paths)?;
        let store = RecordStore::open(paths.store())?;
        Self::from_store(meta.name, meta.config, Some(paths), store)
    }

    /// In-memory index, discarded on drop.
    pub fn temporary(name: &str, config: IndexConfig) -> Result<Self> {
        Self::from_store(name.to_string(), config, None, RecordStore::temporary()?)
    }

    fn from_store(name: String, config: IndexConfig, paths: Option<IndexPaths>, store: RecordStore) -> Result<Self> {
        let dictionary = TermDictionary::open(&store)?;
        let postings = PostingsStore::new(&store, dictionary);
        let documents: Arc<dyn DocumentStore> = Arc::new(SledDocumentStore::open(&store)?);
        Ok(Self { name, config, paths, store, postings, documents, destroying: AtomicBool::new(false) })
    }

    /// Replaces the parsed-document store (the default keeps documents in the record store).
    pub fn with_document_store(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = documents;
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn config(&self) -> &IndexConfig { &self.config }
    pub fn postings(&self) -> &PostingsStore { &self.postings }
    pub fn dictionary(&self) -> &TermDictionary { self.postings.dictionary() }

    fn guard(&self) -> Result<()> {
        if self.destroying.load(Ordering::Acquire) {
            return Err(KomodoError::DestroyInProgress(self.name.clone()));
        }
        Ok(())
    }

    /// Stores the document and writes one posting per distinct normalized term.
    /// A document already stored under the same id is removed first.
    pub fn add_document(&self, document: ParsedDocument) -> Result<IndexResult> {
        self.guard()?;
        if document.document_id.trim().is_empty() {
            return Err(KomodoError::missing("document id"));
        }

        let replaced = self.delete_document(&document.document_id)?;

        let mut terms: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for tp in &document.postings {
            if let Some(term) = normalize_term(&tp.term, &self.config) {
                terms.entry(term).or_default().extend_from_slice(&tp.positions);
            }
        }
        let mut document = document;
        document.postings = terms
            .into_iter()
            .map(|(term, positions)| TermPositions { term, positions })
            .collect();

        self.documents.put(&document)?;
        for tp in &document.postings {
            self.postings.add_posting(&tp.term, &document.document_id, &tp.positions)?;
        }

        debug!(index = %self.name, document_id = %document.document_id, terms = document.postings.len(), replaced, "document indexed");
        Ok(IndexResult { document_id: document.document_id, terms_indexed: document.postings.len(), replaced })
    }

    /// Removes the parsed document, then each of its postings. Returns false if it was not indexed.
    pub fn delete_document(&self, document_id: &str) -> Result<bool> {
        self.guard()?;
        let Some(document) = self.documents.delete(document_id)? else { return Ok(false) };
        for term in document.terms() {
            self.postings.remove_posting(term, document_id)?;
        }
        debug!(index = %self.name, document_id, "document removed");
        Ok(true)
    }

    pub fn get_document(&self, document_id: &str) -> Result<Option<ParsedDocument>> {
        self.guard()?;
        self.documents.get(document_id)
    }

    pub fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        self.guard()?;
        ResultAssembler::new(&self.postings, self.documents.as_ref(), &self.config).search(query)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        self.guard()?;
        Ok(IndexStats {
            name: self.name.clone(),
            documents: self.documents.count(),
            terms: self.dictionary().count(),
            config: self.config.clone(),
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Tears the index down. Every later call on this handle fails with
    /// `DestroyInProgress`.
    pub fn destroy(&self) -> Result<()> {
        if self.destroying.swap(true, Ordering::AcqRel) {
            return Err(KomodoError::DestroyInProgress(self.name.clone()));
        }
        info!(index = %self.name, "destroying index");
        for table in self.store.table_names() {
            if table.starts_with("__sled__") {
                continue;
            }
            if let Err(err) = self.store.drop_table(&table) {
                warn!(index = %self.name, table = %table, error = %err, "failed to drop table");
            }
        }
        self.store.flush()?;
        if let Some(paths) = &self.paths {
            if let Err(err) = std::fs::remove_dir_all(&paths.root) {
                warn!(index = %self.name, root = %paths.root.display(), error = %err, "failed to remove index directory");
            }
        }
        Ok(())
    }
}
