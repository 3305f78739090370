//! Forward and inverted document indexes stored on disk.
//!
//! A corpus (one file per document, one document per line, or libsvm
//! feature vectors) is tokenized into term ids and persisted either as
//! document rows (forward) or term rows (inverted). A forward index can
//! also be derived from an inverted one by re-sorting its postings on disk.
//! Opened indexes serve rows through a size-bounded splay cache.

pub mod builder;
pub mod cache;
pub mod config;
pub mod corpus;
pub mod error;
pub mod external_sort;
pub mod ids;
pub mod index;
pub mod persist;
pub mod postings;
pub mod tokenizer;
pub mod uninvert;
pub mod vocab;

pub use builder::{make_forward_index, make_inverted_index};
pub use cache::SplayCache;
pub use config::{AnalyzerConfig, CorpusKind, IndexConfig};
pub use error::{IndexError, Result};
pub use ids::{DocId, Ident, TermId};
pub use index::{DiskIndex, ForwardIndex, InvertedIndex};
pub use persist::IndexKind;
pub use postings::PostingsData;
pub use uninvert::uninvert;
