//! Index construction and the open-or-build entry points.

use std::collections::HashMap;
use std::fs;

use crate::config::IndexConfig;
use crate::corpus::{self, Corpus, DocContent, Document};
use crate::error::{IndexError, Result};
use crate::external_sort::ExternalSorter;
use crate::ids::{DocId, Ident, TermId};
use crate::index::{ForwardIndex, InvertedIndex};
use crate::persist::{
    save_docs, save_meta, save_vocab, DocTable, IndexKind, IndexPaths, MetaFile, PostingsStore,
    SourceDescriptor,
};
use crate::postings::{PostingEntry, PostingsData};
use crate::tokenizer::Analyzer;
use crate::uninvert::uninvert;
use crate::vocab::Vocabulary;

const PROGRESS_EVERY: u64 = 10_000;

/// Opens the forward index named by `config`, building it first when no
/// committed index with a matching source exists.
///
/// With `uninvert = true` the forward index is derived from the inverted
/// index (which is itself opened or built) instead of the corpus.
pub fn make_forward_index(config: &IndexConfig) -> Result<ForwardIndex> {
    config.validate()?;
    let paths = IndexPaths::new(&config.forward_index);
    let source = SourceDescriptor::from_config(config);
    if let Some(index) = ForwardIndex::open_matching(&paths, config.cache_capacity, &source)? {
        let num_docs = index.num_docs();
        tracing::info!(path = %paths.root.display(), num_docs, "reusing forward index");
        return Ok(index);
    }
    if config.uninvert {
        let inverted = make_inverted_index(config)?;
        return uninvert(&inverted, config);
    }
    let mut corpus = corpus::open(config)?;
    IndexBuilder::new(config).build_forward(corpus.as_mut(), &paths)?;
    ForwardIndex::open(&paths.root, config.cache_capacity)
}

/// Opens the inverted index named by `config`, building it first when
/// needed.
pub fn make_inverted_index(config: &IndexConfig) -> Result<InvertedIndex> {
    config.validate()?;
    let paths = IndexPaths::new(&config.inverted_index);
    let source = SourceDescriptor::from_config(config);
    if let Some(index) = InvertedIndex::open_matching(&paths, config.cache_capacity, &source)? {
        let unique_terms = index.unique_terms();
        tracing::info!(path = %paths.root.display(), unique_terms, "reusing inverted index");
        return Ok(index);
    }
    let mut corpus = corpus::open(config)?;
    IndexBuilder::new(config).build_inverted(corpus.as_mut(), &paths)?;
    InvertedIndex::open(&paths.root, config.cache_capacity)
}

/// Turns a corpus into a persisted index in one pass.
///
/// Any error aborts the build before `meta.json` is written, so the
/// partial directory is never mistaken for a finished index.
pub struct IndexBuilder<'a> {
    config: &'a IndexConfig,
    analyzer: Analyzer,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(config: &'a IndexConfig) -> Self {
        Self { config, analyzer: Analyzer::new(config.analyzer) }
    }

    /// Document rows arrive in doc id order and are written as they come.
    pub fn build_forward(&self, corpus: &mut dyn Corpus, paths: &IndexPaths) -> Result<()> {
        let start = std::time::Instant::now();
        paths.clear()?;
        let store = PostingsStore::create(paths)?;
        let mut vocab = Vocabulary::new();
        let mut docs = DocTable::default();
        let mut total_postings = 0u64;

        for doc in corpus {
            let doc = doc?;
            let row = self.ingest(&doc, docs.len() as u64, &mut vocab, &mut docs)?;
            total_postings += row.len() as u64;
            store.put(doc.id, &row)?;
            log_progress(docs.len() as u64);
        }
        store.flush()?;

        let meta = MetaFile::new(
            IndexKind::Forward,
            docs.len() as u64,
            vocab.len() as u64,
            total_postings,
            SourceDescriptor::from_config(self.config),
        );
        commit(paths, &vocab, &docs, &meta)?;
        tracing::info!(
            num_docs = meta.num_docs,
            unique_terms = meta.unique_terms,
            total_postings,
            secs = start.elapsed().as_secs_f64(),
            "forward index build complete"
        );
        Ok(())
    }

    /// Term rows need every document first, so `(term, doc, count)` entries
    /// go through an external sort and are grouped per term afterwards.
    pub fn build_inverted(&self, corpus: &mut dyn Corpus, paths: &IndexPaths) -> Result<()> {
        let start = std::time::Instant::now();
        paths.clear()?;
        let store = PostingsStore::create(paths)?;
        let mut vocab = Vocabulary::new();
        let mut docs = DocTable::default();
        let mut sorter = ExternalSorter::new(paths.runs_dir(), self.config.build.postings_per_run);

        for doc in corpus {
            let doc = doc?;
            let row = self.ingest(&doc, docs.len() as u64, &mut vocab, &mut docs)?;
            for (term, weight) in row.into_counts() {
                sorter.push(PostingEntry { primary: term, secondary: doc.id, weight })?;
            }
            log_progress(docs.len() as u64);
        }

        let runs = sorter.spilled_runs();
        let stream = sorter.finish()?;
        let mut writer = RowWriter::<TermId, DocId>::new(&store, vocab.len() as u64);
        for entry in stream {
            writer.push(entry?)?;
        }
        let total_postings = writer.finish()?;
        remove_runs(paths)?;
        store.flush()?;

        let meta = MetaFile::new(
            IndexKind::Inverted,
            docs.len() as u64,
            vocab.len() as u64,
            total_postings,
            SourceDescriptor::from_config(self.config),
        );
        commit(paths, &vocab, &docs, &meta)?;
        tracing::info!(
            num_docs = meta.num_docs,
            unique_terms = meta.unique_terms,
            total_postings,
            runs,
            secs = start.elapsed().as_secs_f64(),
            "inverted index build complete"
        );
        Ok(())
    }

    /// Counts one document into a forward row and records its size, label
    /// and name under the next doc id.
    fn ingest(
        &self,
        doc: &Document,
        expected: u64,
        vocab: &mut Vocabulary,
        docs: &mut DocTable,
    ) -> Result<PostingsData<TermId>> {
        if doc.id.get() != expected {
            return Err(IndexError::format(
                "corpus",
                expected + 1,
                format!("document arrived as doc_id {} where {expected} was expected", doc.id),
            ));
        }
        let (row, size) = match &doc.content {
            DocContent::Text(text) => {
                let terms = self.analyzer.analyze(text);
                let mut counts: HashMap<TermId, f64> = HashMap::new();
                for term in &terms {
                    let id = vocab.resolve_or_allocate(term);
                    *counts.entry(id).or_insert(0.0) += 1.0;
                }
                (PostingsData::from_counts(counts), terms.len() as u64)
            }
            DocContent::Features(features) => {
                for &(id, _) in features {
                    vocab.ensure_feature(id);
                }
                let size: f64 = features.iter().map(|&(_, w)| w).sum();
                (PostingsData::from_counts(features.iter().copied()), size as u64)
            }
        };
        docs.push(size, doc.label.clone(), doc.name.clone());
        Ok(row)
    }
}

fn log_progress(done: u64) {
    if done % PROGRESS_EVERY == 0 {
        tracing::debug!(documents = done, "ingested documents");
    }
}

fn remove_runs(paths: &IndexPaths) -> Result<()> {
    let runs = paths.runs_dir();
    if runs.exists() {
        fs::remove_dir_all(runs)?;
    }
    Ok(())
}

/// Writes vocabulary and document table, then the metadata commit marker.
pub(crate) fn commit(
    paths: &IndexPaths,
    vocab: &Vocabulary,
    docs: &DocTable,
    meta: &MetaFile,
) -> Result<()> {
    save_vocab(paths, vocab.terms())?;
    save_docs(paths, docs)?;
    save_meta(paths, meta)
}

/// Groups a stream of entries sorted by `(primary, secondary)` into rows
/// and stores one row for every primary id in `[0, num_rows)`, writing
/// empty rows for ids that had no entries.
pub(crate) struct RowWriter<'s, P, S> {
    store: &'s PostingsStore,
    num_rows: u64,
    next: u64,
    current: Option<(P, PostingsData<S>)>,
    total: u64,
}

impl<'s, P: Ident, S: Ident> RowWriter<'s, P, S> {
    pub(crate) fn new(store: &'s PostingsStore, num_rows: u64) -> Self {
        Self { store, num_rows, next: 0, current: None, total: 0 }
    }

    pub(crate) fn push(&mut self, entry: PostingEntry<P, S>) -> Result<()> {
        if let Some((primary, row)) = &mut self.current {
            if *primary == entry.primary {
                row.push_sorted(entry.secondary, entry.weight);
                return Ok(());
            }
        }
        if let Some((primary, row)) = self.current.take() {
            self.write(primary, row)?;
        }
        let mut row = PostingsData::new();
        row.push_sorted(entry.secondary, entry.weight);
        self.current = Some((entry.primary, row));
        Ok(())
    }

    fn write(&mut self, primary: P, row: PostingsData<S>) -> Result<()> {
        let id = primary.as_u64();
        if id >= self.num_rows || id < self.next {
            return Err(IndexError::corrupt(
                self.store.path(),
                format!("{} {id} is out of order or beyond {}", P::NAME, self.num_rows),
            ));
        }
        while self.next < id {
            self.store.put(P::from_u64(self.next), &PostingsData::<S>::new())?;
            self.next += 1;
        }
        self.total += row.len() as u64;
        self.store.put(primary, &row)?;
        self.next = id + 1;
        Ok(())
    }

    /// Flushes the open row and pads the tail; returns the postings written.
    pub(crate) fn finish(mut self) -> Result<u64> {
        if let Some((primary, row)) = self.current.take() {
            self.write(primary, row)?;
        }
        while self.next < self.num_rows {
            self.store.put(P::from_u64(self.next), &PostingsData::<S>::new())?;
            self.next += 1;
        }
        Ok(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_writer_groups_and_pads() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let store = PostingsStore::create(&paths).unwrap();
        let mut writer = RowWriter::<DocId, TermId>::new(&store, 5);
        for (d, t, w) in [(1u64, 0u64, 1.0), (1, 4, 2.0), (3, 2, 1.0)] {
            writer
                .push(PostingEntry { primary: DocId::new(d), secondary: TermId::new(t), weight: w })
                .unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 3);
        assert_eq!(store.len(), 5);
        let row: PostingsData<TermId> = store.get(DocId::new(1)).unwrap().unwrap();
        assert_eq!(row.counts(), &[(TermId::new(0), 1.0), (TermId::new(4), 2.0)]);
        let empty: PostingsData<TermId> = store.get(DocId::new(4)).unwrap().unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn row_writer_rejects_ids_past_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let store = PostingsStore::create(&paths).unwrap();
        let mut writer = RowWriter::<TermId, DocId>::new(&store, 2);
        writer
            .push(PostingEntry { primary: TermId::new(2), secondary: DocId::new(0), weight: 1.0 })
            .unwrap();
        assert!(writer.finish().unwrap_err().is_corrupt());
    }
}
