use crate::error::{KomodoError, Result};
use crate::model::{CollectionId, TermEntry};
use crate::store::{decode, encode, RecordStore};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

const TERMS_TABLE: &str = "terms";
const MAX_WAIT_ATTEMPTS: usize = 256;
const MAX_REMOVE_ATTEMPTS: usize = 4;

pub fn collection_name(id: CollectionId) -> String {
    format!("postings.{id:016x}")
}

fn backoff(attempt: usize) {
    if attempt < 16 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Maps each normalized term to the collection holding its postings.
///
/// A collection is always created before the entry naming it is published.
/// Retirement first marks the entry `retiring`, then checks the collection is
/// still empty, and only then drops it and deletes the entry. While the marker
/// is set no competing entry can be published, so a posting written during
/// retirement either keeps the original entry alive or is retried by its
/// writer against a fresh collection.
#[derive(Clone)]
pub struct TermDictionary {
    store: RecordStore,
    terms: sled::Tree,
}

impl TermDictionary {
    /// Opens the dictionary and finishes any retirement interrupted by a crash.
    pub fn open(store: &RecordStore) -> Result<Self> {
        let terms = store.table(TERMS_TABLE)?;
        let dictionary = Self { store: store.clone(), terms };
        dictionary.recover()?;
        Ok(dictionary)
    }

    fn recover(&self) -> Result<()> {
        for item in self.terms.iter() {
            let (key, raw) = item?;
            let entry: TermEntry = decode(&raw)?;
            if !entry.retiring {
                continue;
            }
            let term = String::from_utf8_lossy(&key).into_owned();
            let name = collection_name(entry.collection_id);
            if self.store.table(&name)?.is_empty() {
                self.store.drop_table(&name)?;
                self.unmark(&term, &raw, None)?;
            } else {
                let restored = TermEntry { retiring: false, ..entry };
                self.unmark(&term, &raw, Some(sled::IVec::from(encode(&restored)?)))?;
            }
            info!(term, collection = %name, "interrupted term retirement recovered");
        }
        Ok(())
    }

    /// Returns the term's entry, creating it and an empty collection if absent.
    /// Waits out a concurrent retirement of the same term.
    pub fn ensure(&self, term: &str) -> Result<TermEntry> {
        for attempt in 0..MAX_WAIT_ATTEMPTS {
            match self.lookup(term)? {
                Some(entry) if !entry.retiring => return Ok(entry),
                Some(_) => {
                    backoff(attempt);
                    continue;
                }
                None => {}
            }

            let collection_id = self.store.generate_id()?;
            let name = collection_name(collection_id);
            self.store.table(&name)?;

            let now = OffsetDateTime::now_utc();
            let entry = TermEntry {
                term: term.to_string(),
                collection_id,
                created_at: now,
                last_updated_at: now,
                retiring: false,
            };
            let swap = self.terms.compare_and_swap(term.as_bytes(), None as Option<&[u8]>, Some(encode(&entry)?))?;
            match swap {
                Ok(()) => {
                    debug!(term, collection = %name, "term created");
                    return Ok(entry);
                }
                Err(conflict) => {
                    if let Err(err) = self.store.drop_table(&name) {
                        warn!(term, collection = %name, error = %err, "failed to drop speculative collection");
                    }
                    if let Some(current) = conflict.current {
                        let current: TermEntry = decode(&current)?;
                        if !current.retiring {
                            return Ok(current);
                        }
                    }
                    debug!(term, attempt, "lost term creation race, retrying");
                    backoff(attempt);
                }
            }
        }
        Err(KomodoError::storage(format!("could not establish dictionary entry for term '{term}'")))
    }

    /// Raw entry, including one that is mid-retirement.
    pub fn lookup(&self, term: &str) -> Result<Option<TermEntry>> {
        match self.terms.get(term.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Waits until no retirement of `term` is in flight and returns the entry it left behind.
    pub fn settle(&self, term: &str) -> Result<Option<TermEntry>> {
        for attempt in 0..MAX_WAIT_ATTEMPTS {
            match self.lookup(term)? {
                Some(entry) if entry.retiring => backoff(attempt),
                other => return Ok(other),
            }
        }
        Err(KomodoError::storage(format!("term '{term}' is stuck retiring")))
    }

    /// Refreshes `last_updated_at` if the entry still points at `collection_id`.
    /// Returns false when the entry has gone, been replaced or is being retired.
    pub fn touch(&self, term: &str, collection_id: CollectionId) -> Result<bool> {
        let Some(raw) = self.terms.get(term.as_bytes())? else { return Ok(false) };
        let mut entry: TermEntry = decode(&raw)?;
        if entry.collection_id != collection_id || entry.retiring {
            return Ok(false);
        }
        entry.last_updated_at = OffsetDateTime::now_utc();
        // Losing this race only loses a timestamp refresh.
        let _ = self.terms.compare_and_swap(term.as_bytes(), Some(&raw), Some(encode(&entry)?))?;
        Ok(true)
    }

    /// Deletes the entry and its collection if the collection is empty.
    /// Returns `Ok(false)` and leaves the mapping unchanged when a concurrent
    /// writer refilled it or another caller is already retiring the term.
    pub fn remove(&self, term: &str) -> Result<bool> {
        for _ in 0..MAX_REMOVE_ATTEMPTS {
            let Some(raw) = self.terms.get(term.as_bytes())? else { return Ok(false) };
            let entry: TermEntry = decode(&raw)?;
            if entry.retiring {
                return Ok(false);
            }
            let marked = encode(&TermEntry { retiring: true, ..entry.clone() })?;
            match self.terms.compare_and_swap(term.as_bytes(), Some(&raw), Some(marked.clone()))? {
                Ok(()) => return self.retire(term, &entry, raw, &marked),
                // A writer refreshed the entry; look again.
                Err(_) => continue,
            }
        }
        debug!(term, "term entry kept changing, retirement skipped");
        Ok(false)
    }

    fn retire(&self, term: &str, entry: &TermEntry, original: sled::IVec, marked: &[u8]) -> Result<bool> {
        let name = collection_name(entry.collection_id);
        let collection = self.store.table(&name)?;
        if !collection.is_empty() {
            self.unmark(term, marked, Some(original))?;
            debug!(term, collection = %name, "collection refilled during retirement, entry kept");
            return Ok(false);
        }
        if let Err(err) = self.store.drop_table(&name) {
            self.unmark(term, marked, Some(original))?;
            return Err(err);
        }
        self.unmark(term, marked, None)?;
        debug!(term, collection = %name, "term removed");
        Ok(true)
    }

    /// Replaces the retiring marker. Only the marker's owner writes over it.
    fn unmark(&self, term: &str, marked: &[u8], next: Option<sled::IVec>) -> Result<()> {
        if self.terms.compare_and_swap(term.as_bytes(), Some(marked), next)?.is_err() {
            warn!(term, "retiring marker changed underneath its owner");
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.terms.len()
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(self.terms.len());
        for item in self.terms.iter() {
            let (key, _) = item?;
            out.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(out)
    }
}
