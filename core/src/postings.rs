use crate::dictionary::{collection_name, TermDictionary};
use crate::error::{KomodoError, Result};
use crate::model::{CollectionId, Posting};
use crate::store::{count_prefix, decode, encode, scan_page, RecordStore};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use time::OffsetDateTime;
use tracing::{debug, warn};

const SEQ_PREFIX: &[u8] = b"s/";
const DOC_PREFIX: &[u8] = b"d/";
const MAX_ADD_ATTEMPTS: usize = 16;

fn seq_key(seq: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(SEQ_PREFIX.len() + seq.len());
    key.extend_from_slice(SEQ_PREFIX);
    key.extend_from_slice(seq);
    key
}

fn doc_key(document_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(DOC_PREFIX.len() + document_id.len());
    key.extend_from_slice(DOC_PREFIX);
    key.extend_from_slice(document_id.as_bytes());
    key
}

fn abort(err: KomodoError) -> ConflictableTransactionError<KomodoError> {
    ConflictableTransactionError::Abort(err)
}

fn from_tx(err: TransactionError<KomodoError>) -> KomodoError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    }
}

/// `Ok(None)` when the collection was dropped underneath the transaction.
fn retired_as_none<T>(result: std::result::Result<T, TransactionError<KomodoError>>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(TransactionError::Storage(sled::Error::CollectionNotFound(_))) => Ok(None),
        Err(err) => Err(from_tx(err)),
    }
}

/// Postings of one term, resolved through the dictionary.
///
/// A collection keeps two key spaces: `s/<seq>` holds postings in insertion
/// order and `d/<document id>` points at the sequence for point lookups.
pub struct TermPostings {
    pub term: String,
    pub collection_id: CollectionId,
    tree: sled::Tree,
}

impl TermPostings {
    pub fn count(&self) -> Result<usize> {
        count_prefix(&self.tree, SEQ_PREFIX)
    }

    /// Postings in insertion order. Offsets are stable as long as this term's
    /// postings are not removed concurrently.
    pub fn scan(&self, offset: usize, limit: usize) -> Result<Vec<Posting>> {
        scan_page(&self.tree, SEQ_PREFIX, offset, limit)?
            .iter()
            .map(|raw| decode(raw))
            .collect()
    }

    pub fn contains(&self, document_id: &str) -> Result<bool> {
        Ok(self.tree.contains_key(doc_key(document_id))?)
    }

    pub fn get(&self, document_id: &str) -> Result<Option<Posting>> {
        let Some(seq) = self.tree.get(doc_key(document_id))? else { return Ok(None) };
        match self.tree.get(seq_key(&seq))? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// `Ok(None)` if the collection was retired before the write landed.
    fn merge(&self, document_id: &str, positions: &[u32], seq: u64) -> Result<Option<Posting>> {
        let dkey = doc_key(document_id);
        let result = self.tree.transaction(|tx| {
            let posting = match tx.get(&dkey)? {
                Some(existing) => {
                    let skey = seq_key(&existing);
                    let mut posting: Posting = match tx.get(&skey)? {
                        Some(raw) => decode(&raw).map_err(abort)?,
                        None => {
                            return Err(abort(KomodoError::not_found(format!(
                                "posting record for '{}' in '{document_id}'",
                                self.term
                            ))))
                        }
                    };
                    posting.frequency += positions.len() as u32;
                    posting.positions.extend_from_slice(positions);
                    tx.insert(skey, encode(&posting).map_err(abort)?)?;
                    posting
                }
                None => {
                    let seq_bytes = seq.to_be_bytes().to_vec();
                    let posting = Posting {
                        term: self.term.clone(),
                        document_id: document_id.to_string(),
                        frequency: positions.len() as u32,
                        positions: positions.to_vec(),
                        created_at: OffsetDateTime::now_utc(),
                    };
                    tx.insert(seq_key(&seq_bytes), encode(&posting).map_err(abort)?)?;
                    tx.insert(dkey.clone(), seq_bytes)?;
                    posting
                }
            };
            Ok(posting)
        });
        retired_as_none(result)
    }

    fn remove(&self, document_id: &str) -> Result<bool> {
        let dkey = doc_key(document_id);
        let result: std::result::Result<bool, TransactionError<KomodoError>> = self.tree.transaction(|tx| {
            let Some(seq) = tx.remove(dkey.clone())? else { return Ok(false) };
            tx.remove(seq_key(&seq))?;
            Ok(true)
        });
        // A dropped collection was empty, so there was nothing to remove.
        Ok(retired_as_none(result)?.unwrap_or(false))
    }
}

/// Per-term posting collections addressed through the [`TermDictionary`].
#[derive(Clone)]
pub struct PostingsStore {
    store: RecordStore,
    dictionary: TermDictionary,
}

impl PostingsStore {
    pub fn new(store: &RecordStore, dictionary: TermDictionary) -> Self {
        Self { store: store.clone(), dictionary }
    }

    pub fn dictionary(&self) -> &TermDictionary {
        &self.dictionary
    }

    /// Resolves a term to its postings; `None` if the term has no live entry.
    /// Waits out a retirement in flight.
    pub fn open_term(&self, term: &str) -> Result<Option<TermPostings>> {
        match self.dictionary.settle(term)? {
            Some(entry) => Ok(Some(self.collection(term, entry.collection_id)?)),
            None => Ok(None),
        }
    }

    fn collection(&self, term: &str, collection_id: CollectionId) -> Result<TermPostings> {
        let tree = self.store.table(&collection_name(collection_id))?;
        Ok(TermPostings { term: term.to_string(), collection_id, tree })
    }

    /// Inserts a posting for (term, document), or merges positions into the
    /// existing one. Creates the term on first use and retries when the term's
    /// collection is retired around the write.
    pub fn add_posting(&self, term: &str, document_id: &str, positions: &[u32]) -> Result<Posting> {
        for attempt in 0..MAX_ADD_ATTEMPTS {
            let entry = self.dictionary.ensure(term)?;
            let postings = self.collection(term, entry.collection_id)?;
            let seq = self.store.generate_id()?;
            let Some(posting) = postings.merge(document_id, positions, seq)? else {
                debug!(term, document_id, attempt, "term collection dropped before write, retrying");
                continue;
            };
            if self.dictionary.touch(term, entry.collection_id)? {
                return Ok(posting);
            }

            // A retirement overlapped the write. If it kept our collection the
            // posting is live; otherwise the collection is never published again.
            match self.dictionary.settle(term)? {
                Some(current) if current.collection_id == entry.collection_id => return Ok(posting),
                _ => {
                    debug!(term, document_id, attempt, "term collection retired during write, retrying");
                    let name = collection_name(entry.collection_id);
                    if let Err(err) = self.store.drop_table(&name) {
                        warn!(term, collection = %name, error = %err, "failed to drop retired collection");
                    }
                }
            }
        }
        Err(KomodoError::storage(format!("could not write posting for term '{term}'")))
    }

    /// Deletes the (term, document) posting. Emptied collections are removed
    /// together with their dictionary entry on a best-effort basis.
    pub fn remove_posting(&self, term: &str, document_id: &str) -> Result<bool> {
        let Some(postings) = self.open_term(term)? else { return Ok(false) };
        let removed = postings.remove(document_id)?;
        if postings.is_empty() {
            match self.dictionary.remove(term) {
                Ok(true) => debug!(term, "last posting removed, term retired"),
                Ok(false) => {}
                Err(err) => warn!(term, error = %err, "failed to retire empty term collection"),
            }
        }
        Ok(removed)
    }

    pub fn count(&self, term: &str) -> Result<usize> {
        match self.open_term(term)? {
            Some(postings) => postings.count(),
            None => Ok(0),
        }
    }

    pub fn scan(&self, term: &str, offset: usize, limit: usize) -> Result<Vec<Posting>> {
        match self.open_term(term)? {
            Some(postings) => postings.scan(offset, limit),
            None => Ok(Vec::new()),
        }
    }

    pub fn get(&self, term: &str, document_id: &str) -> Result<Option<Posting>> {
        match self.open_term(term)? {
            Some(postings) => postings.get(document_id),
            None => Ok(None),
        }
    }
}
