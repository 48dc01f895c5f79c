use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RESULTS_CAP: usize = 1000;
pub const DEFAULT_MAX_TERMS: usize = 32;
pub const DEFAULT_MAX_FILTERS: usize = 32;

/// Per-index settings, persisted next to the record store as `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Case-fold terms at index and query time.
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
    #[serde(default)]
    pub stem: bool,
    #[serde(default)]
    pub remove_stopwords: bool,
    #[serde(default = "default_max_results_cap")]
    pub max_results_cap: usize,
    #[serde(default = "default_max_terms")]
    pub max_terms: usize,
    #[serde(default = "default_max_filters")]
    pub max_filters: usize,
}

fn default_true() -> bool { true }
fn default_max_results_cap() -> usize { DEFAULT_MAX_RESULTS_CAP }
fn default_max_terms() -> usize { DEFAULT_MAX_TERMS }
fn default_max_filters() -> usize { DEFAULT_MAX_FILTERS }

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            case_insensitive: true,
            stem: false,
            remove_stopwords: false,
            max_results_cap: DEFAULT_MAX_RESULTS_CAP,
            max_terms: DEFAULT_MAX_TERMS,
            max_filters: DEFAULT_MAX_FILTERS,
        }
    }
}
