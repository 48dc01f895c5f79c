use crate::config::IndexConfig;
use crate::error::{KomodoError, Result};
use crate::index::Index;
use crate::persist::IndexPaths;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Owned set of open indices, keyed by name.
///
/// With a root directory each index lives in `<root>/<name>`; without one
/// indices are temporary and vanish when dropped.
pub struct IndexRegistry {
    root: Option<PathBuf>,
    indices: RwLock<HashMap<String, Arc<Index>>>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KomodoError::missing("index name"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(KomodoError::invalid(format!("index name '{name}' may only contain [A-Za-z0-9_-]")));
    }
    Ok(())
}

impl IndexRegistry {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: Some(root.as_ref().to_path_buf()), indices: RwLock::new(HashMap::new()) }
    }

    pub fn in_memory() -> Self {
        Self { root: None, indices: RwLock::new(HashMap::new()) }
    }

    /// Opens every index found under the root directory. Returns how many were opened.
    pub fn open_all(&self) -> Result<usize> {
        let Some(root) = &self.root else { return Ok(0) };
        if !root.is_dir() {
            return Ok(0);
        }
        let mut opened = 0;
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if !IndexPaths::new(&path).exists() {
                continue;
            }
            match Index::open(&path) {
                Ok(index) => {
                    let name = index.name().to_string();
                    self.indices.write().insert(name, Arc::new(index));
                    opened += 1;
                }
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable index"),
            }
        }
        info!(opened, "indices loaded");
        Ok(opened)
    }

    /// Returns the named index, creating it with `config` if it is not open yet.
    pub fn create(&self, name: &str, config: IndexConfig) -> Result<Arc<Index>> {
        validate_name(name)?;
        let mut indices = self.indices.write();
        if let Some(existing) = indices.get(name) {
            return Ok(Arc::clone(existing));
        }
        let index = match &self.root {
            Some(root) => Index::open_or_create(name, root.join(name), config)?,
            None => Index::temporary(name, config)?,
        };
        let index = Arc::new(index);
        indices.insert(name.to_string(), Arc::clone(&index));
        Ok(index)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Index>> {
        self.indices.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Unregisters and destroys the named index. Handles still held elsewhere
    /// observe `DestroyInProgress`.
    pub fn destroy(&self, name: &str) -> Result<bool> {
        let Some(index) = self.indices.write().remove(name) else { return Ok(false) };
        index.destroy()?;
        Ok(true)
    }

    /// Flushes and unregisters every index.
    pub fn close_all(&self) {
        let drained: Vec<Arc<Index>> = self.indices.write().drain().map(|(_, v)| v).collect();
        for index in drained {
            if let Err(err) = index.flush() {
                warn!(index = index.name(), error = %err, "flush on close failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentType, ParsedDocument, TermPositions};

    #[test]
    fn create_is_idempotent_and_listed() {
        let reg = IndexRegistry::in_memory();
        let a = reg.create("books", IndexConfig::default()).unwrap();
        let b = reg.create("books", IndexConfig::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        reg.create("music", IndexConfig::default()).unwrap();
        assert_eq!(reg.list(), vec!["books", "music"]);
        assert!(matches!(reg.create("bad name", IndexConfig::default()), Err(KomodoError::InvalidParameters(_))));
    }

    #[test]
    fn destroy_unregisters_and_poisons_handles() {
        let reg = IndexRegistry::in_memory();
        let held = reg.create("tmp", IndexConfig::default()).unwrap();
        assert!(reg.destroy("tmp").unwrap());
        assert!(reg.get("tmp").is_none());
        assert!(!reg.destroy("tmp").unwrap());
        assert!(matches!(held.stats(), Err(KomodoError::DestroyInProgress(_))));
    }

    #[test]
    fn reopens_indices_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = IndexRegistry::new(dir.path());
            let index = reg.create("books", IndexConfig::default()).unwrap();
            let mut doc = ParsedDocument::new("d1", DocumentType::Text);
            doc.postings = vec![TermPositions { term: "rust".into(), positions: vec![0] }];
            index.add_document(doc).unwrap();
            reg.close_all();
        }
        let reg = IndexRegistry::new(dir.path());
        assert_eq!(reg.open_all().unwrap(), 1);
        let index = reg.get("books").unwrap();
        assert_eq!(index.postings().count("rust").unwrap(), 1);
    }
}
