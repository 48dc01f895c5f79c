//! Komodo postings engine: per-term postings collections, boolean candidate
//! retrieval and structured field filtering over a sled record store.

pub mod assembler;
pub mod config;
pub mod dictionary;
pub mod documents;
pub mod error;
pub mod filter;
pub mod index;
pub mod model;
pub mod parser;
pub mod persist;
pub mod postings;
pub mod registry;
pub mod retriever;
pub mod store;
pub mod tokenizer;

pub use config::IndexConfig;
pub use error::{KomodoError, Result};
pub use index::{Index, IndexStats};
pub use model::*;
pub use registry::IndexRegistry;
