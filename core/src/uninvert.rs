//! Derives a forward index from a finished inverted index.
//!
//! Every `(term, doc, weight)` posting is re-keyed as `(doc, term, weight)`
//! and pushed through the external sorter, so memory stays bounded by
//! `build.postings_per_run` regardless of corpus size. The sorted stream is
//! grouped into one row per document.

use crate::builder::{commit, RowWriter};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::external_sort::ExternalSorter;
use crate::ids::{DocId, TermId};
use crate::index::{ForwardIndex, InvertedIndex};
use crate::persist::{IndexKind, IndexPaths, MetaFile, PostingsStore};
use crate::postings::PostingEntry;

/// Writes the forward index at `config.forward_index` from `inverted` and
/// opens it. Whatever was in the target directory is discarded first.
///
/// Document sizes, labels and names are carried over from the inverted
/// index; the vocabulary is shared unchanged.
pub fn uninvert(inverted: &InvertedIndex, config: &IndexConfig) -> Result<ForwardIndex> {
    let start = std::time::Instant::now();
    let paths = IndexPaths::new(&config.forward_index);
    tracing::info!(
        from = %inverted.index_dir().display(),
        to = %paths.root.display(),
        total_postings = inverted.total_postings(),
        "uninverting"
    );
    paths.clear()?;
    let store = PostingsStore::create(&paths)?;

    let mut sorter = ExternalSorter::new(paths.runs_dir(), config.build.postings_per_run);
    for row in inverted.rows() {
        let (term, docs) = row?;
        for (doc, weight) in docs.into_counts() {
            sorter.push(PostingEntry::<DocId, TermId> { primary: doc, secondary: term, weight })?;
        }
    }

    let runs = sorter.spilled_runs();
    let stream = sorter.finish()?;
    let mut writer = RowWriter::<DocId, TermId>::new(&store, inverted.num_docs());
    for entry in stream {
        writer.push(entry?)?;
    }
    let total_postings = writer.finish()?;
    if total_postings != inverted.total_postings() {
        return Err(IndexError::corrupt(
            inverted.index_dir(),
            format!(
                "{total_postings} postings after uninverting, {} recorded",
                inverted.total_postings()
            ),
        ));
    }
    let runs_dir = paths.runs_dir();
    if runs_dir.exists() {
        std::fs::remove_dir_all(runs_dir)?;
    }
    store.flush()?;
    drop(store);

    let mut meta = MetaFile::new(
        IndexKind::Forward,
        inverted.num_docs(),
        inverted.unique_terms(),
        total_postings,
        inverted.meta().source.clone(),
    );
    meta.uninverted = true;
    commit(&paths, inverted.vocabulary(), inverted.doc_table(), &meta)?;
    tracing::info!(
        num_docs = meta.num_docs,
        unique_terms = meta.unique_terms,
        total_postings,
        runs,
        secs = start.elapsed().as_secs_f64(),
        "uninverted index complete"
    );
    ForwardIndex::open(&paths.root, config.cache_capacity)
}
