use crate::error::Result;
use crate::model::ParsedDocument;
use crate::store::RecordStore;

const DOCUMENTS_TABLE: &str = "documents";

/// Parsed-document store consumed by indexing (term positions) and search
/// (flattened nodes for filter evaluation).
pub trait DocumentStore: Send + Sync {
    fn get(&self, document_id: &str) -> Result<Option<ParsedDocument>>;
    fn put(&self, document: &ParsedDocument) -> Result<()>;
    /// Removes the document, returning what was stored.
    fn delete(&self, document_id: &str) -> Result<Option<ParsedDocument>>;
    fn count(&self) -> usize;
}

/// Documents kept as JSON in a record-store table. JSON rather than bincode
/// because data nodes carry dynamically typed values.
pub struct SledDocumentStore {
    tree: sled::Tree,
}

impl SledDocumentStore {
    pub fn open(store: &RecordStore) -> Result<Self> {
        Ok(Self { tree: store.table(DOCUMENTS_TABLE)? })
    }
}

impl DocumentStore for SledDocumentStore {
    fn get(&self, document_id: &str) -> Result<Option<ParsedDocument>> {
        match self.tree.get(document_id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn put(&self, document: &ParsedDocument) -> Result<()> {
        let bytes = serde_json::to_vec(document)?;
        self.tree.insert(document.document_id.as_bytes(), bytes)?;
        Ok(())
    }

    fn delete(&self, document_id: &str) -> Result<Option<ParsedDocument>> {
        match self.tree.remove(document_id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn count(&self) -> usize {
        self.tree.len()
    }
}
