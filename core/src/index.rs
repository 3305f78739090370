use parking_lot::Mutex;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use crate::cache::SplayCache;
use crate::error::{IndexError, Result};
use crate::ids::{DocId, Ident, TermId};
use crate::persist::{
    load_docs, load_meta, load_vocab, DocTable, IndexKind, IndexPaths, MetaFile, PostingsStore,
    SourceDescriptor, FORMAT_VERSION,
};
use crate::postings::PostingsData;
use crate::vocab::Vocabulary;

/// Which id keys the rows of an index and which id the rows contain.
pub trait Orientation: Send + Sync + 'static {
    type Primary: Ident;
    type Secondary: Ident;
    const KIND: IndexKind;
}

/// Rows keyed by document, holding term weights.
pub enum Forward {}

/// Rows keyed by term, holding document weights.
pub enum Inverted {}

impl Orientation for Forward {
    type Primary = DocId;
    type Secondary = TermId;
    const KIND: IndexKind = IndexKind::Forward;
}

impl Orientation for Inverted {
    type Primary = TermId;
    type Secondary = DocId;
    const KIND: IndexKind = IndexKind::Inverted;
}

pub type Row<O> = Arc<PostingsData<<O as Orientation>::Secondary>>;

/// A finalized on-disk index with a splay cache in front of its rows.
///
/// Everything except the cache is immutable after open, so one handle can
/// be shared across threads (e.g. behind an `Arc`). The postings store
/// holds an exclusive lock on its directory; share a handle instead of
/// opening the same directory twice.
pub struct DiskIndex<O: Orientation> {
    paths: IndexPaths,
    meta: MetaFile,
    docs: DocTable,
    vocab: Vocabulary,
    store: PostingsStore,
    cache: Mutex<SplayCache<O::Primary, Row<O>>>,
    _orientation: PhantomData<O>,
}

pub type ForwardIndex = DiskIndex<Forward>;
pub type InvertedIndex = DiskIndex<Inverted>;

impl<O: Orientation> DiskIndex<O> {
    /// Opens a committed index; a missing `meta.json` is reported as corruption.
    pub fn open(dir: impl AsRef<Path>, cache_capacity: usize) -> Result<Self> {
        let paths = IndexPaths::new(dir);
        let meta = load_meta(&paths)?
            .ok_or_else(|| IndexError::corrupt(paths.meta(), "index has not been committed"))?;
        Self::load(paths, meta, cache_capacity)
    }

    /// `Ok(None)` when nothing is committed at `paths` or the committed
    /// index was built from a different source.
    pub(crate) fn open_matching(
        paths: &IndexPaths,
        cache_capacity: usize,
        source: &SourceDescriptor,
    ) -> Result<Option<Self>> {
        let Some(meta) = load_meta(paths)? else {
            return Ok(None);
        };
        if meta.kind != O::KIND {
            return Err(IndexError::WrongIndexKind {
                path: paths.root.clone(),
                expected: O::KIND,
                found: meta.kind,
            });
        }
        if meta.source != *source {
            tracing::warn!(
                path = %paths.root.display(),
                stored = ?meta.source,
                requested = ?source,
                "index was built from a different source; rebuilding"
            );
            return Ok(None);
        }
        Self::load(paths.clone(), meta, cache_capacity).map(Some)
    }

    fn load(paths: IndexPaths, meta: MetaFile, cache_capacity: usize) -> Result<Self> {
        if meta.kind != O::KIND {
            return Err(IndexError::WrongIndexKind {
                path: paths.root.clone(),
                expected: O::KIND,
                found: meta.kind,
            });
        }
        if meta.version != FORMAT_VERSION {
            return Err(IndexError::corrupt(
                paths.meta(),
                format!("format version {} is not {FORMAT_VERSION}", meta.version),
            ));
        }

        let docs = load_docs(&paths)?;
        if docs.len() as u64 != meta.num_docs {
            return Err(IndexError::corrupt(
                paths.docs(),
                format!("{} document sizes for {} documents", docs.len(), meta.num_docs),
            ));
        }

        let terms = load_vocab(&paths)?;
        if terms.len() as u64 != meta.unique_terms {
            return Err(IndexError::corrupt(
                paths.vocab(),
                format!("{} terms for {} unique terms", terms.len(), meta.unique_terms),
            ));
        }
        let vocab = Vocabulary::from_terms(terms)
            .ok_or_else(|| IndexError::corrupt(paths.vocab(), "duplicate term text"))?;

        let store = PostingsStore::open(&paths)?;
        let expected_rows = match O::KIND {
            IndexKind::Forward => meta.num_docs,
            IndexKind::Inverted => meta.unique_terms,
        };
        check_row_bounds::<O::Primary>(&store, expected_rows)?;

        tracing::debug!(
            path = %paths.root.display(),
            kind = %O::KIND,
            num_docs = meta.num_docs,
            unique_terms = meta.unique_terms,
            "opened index"
        );
        Ok(Self {
            paths,
            meta,
            docs,
            vocab,
            store,
            cache: Mutex::new(SplayCache::new(cache_capacity)),
            _orientation: PhantomData,
        })
    }

    pub fn kind(&self) -> IndexKind {
        O::KIND
    }

    pub fn index_dir(&self) -> &Path {
        &self.paths.root
    }

    pub fn meta(&self) -> &MetaFile {
        &self.meta
    }

    pub fn num_docs(&self) -> u64 {
        self.meta.num_docs
    }

    pub fn unique_terms(&self) -> u64 {
        self.meta.unique_terms
    }

    pub fn total_postings(&self) -> u64 {
        self.meta.total_postings
    }

    /// Number of tokens the document held when it was indexed.
    pub fn doc_size(&self, doc: DocId) -> Result<u64> {
        self.docs
            .sizes
            .get(doc.index())
            .copied()
            .ok_or_else(|| IndexError::out_of_range(doc, self.num_docs()))
    }

    pub fn doc_label(&self, doc: DocId) -> Result<Option<&str>> {
        self.docs
            .labels
            .get(doc.index())
            .map(Option::as_deref)
            .ok_or_else(|| IndexError::out_of_range(doc, self.num_docs()))
    }

    pub fn doc_name(&self, doc: DocId) -> Result<Option<&str>> {
        self.docs
            .names
            .get(doc.index())
            .map(Option::as_deref)
            .ok_or_else(|| IndexError::out_of_range(doc, self.num_docs()))
    }

    pub fn term_text(&self, term: TermId) -> Result<&str> {
        self.vocab
            .text_of(term)
            .ok_or_else(|| IndexError::out_of_range(term, self.unique_terms()))
    }

    pub fn term_id(&self, text: &str) -> Option<TermId> {
        self.vocab.term_id(text)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn doc_table(&self) -> &DocTable {
        &self.docs
    }

    /// Rows cached right now.
    pub fn cached_rows(&self) -> usize {
        self.cache.lock().len()
    }

    /// The postings row for `id`, served from the cache when resident.
    ///
    /// The returned `Arc` stays valid after the entry is evicted. A row
    /// that is missing from the store is corruption, never an empty row.
    pub fn search_primary(&self, id: O::Primary) -> Result<Row<O>> {
        let bound = self.primary_bound();
        if id.as_u64() >= bound {
            return Err(IndexError::out_of_range(id, bound));
        }
        let mut cache = self.cache.lock();
        cache.get_or_load(id, |id| self.load_row(id))
    }

    /// Reads every row straight from storage in ascending id order,
    /// bypassing the cache.
    pub fn rows(
        &self,
    ) -> impl Iterator<Item = Result<(O::Primary, PostingsData<O::Secondary>)>> + '_ {
        self.store.iter::<O::Primary, O::Secondary>()
    }

    fn load_row(&self, id: O::Primary) -> Result<Row<O>> {
        match self.store.get(id)? {
            Some(row) => Ok(Arc::new(row)),
            None => Err(IndexError::corrupt(
                self.store.path(),
                format!("no row stored for {} {id}", O::Primary::NAME),
            )),
        }
    }

    fn primary_bound(&self) -> u64 {
        match O::KIND {
            IndexKind::Forward => self.meta.num_docs,
            IndexKind::Inverted => self.meta.unique_terms,
        }
    }
}

/// Rows are written with contiguous keys, so matching end keys stand in for
/// a full count without scanning the store.
fn check_row_bounds<K: Ident>(store: &PostingsStore, expected_rows: u64) -> Result<()> {
    let first = store.first_key::<K>()?.map(K::as_u64);
    let last = store.last_key::<K>()?.map(K::as_u64);
    let expected = expected_rows.checked_sub(1).map(|last| (Some(0), Some(last)));
    match expected {
        None if first.is_none() => Ok(()),
        None => Err(IndexError::corrupt(store.path(), "rows stored for an empty index")),
        Some(bounds) if bounds == (first, last) => Ok(()),
        Some(_) => Err(IndexError::corrupt(
            store.path(),
            format!(
                "stored {} ids span {first:?}..={last:?}, expected 0..={}",
                K::NAME,
                expected_rows - 1
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::make_forward_index;
    use crate::config::{CorpusKind, IndexConfig};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn handles_can_be_shared_between_threads() {
        assert_send_sync::<ForwardIndex>();
        assert_send_sync::<InvertedIndex>();
    }

    #[test]
    fn uncommitted_directory_is_reported_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let err = ForwardIndex::open(dir.path(), 16).err().unwrap();
        assert!(err.is_corrupt());
    }

    fn build_small(prefix: &Path) -> IndexConfig {
        let data = prefix.join("small");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("small.dat"), "1 1:1\n-1 2:2\n1 1:1 3:1\n1 2:4\n").unwrap();
        let config = IndexConfig::new(prefix, "small", CorpusKind::Libsvm);
        drop(make_forward_index(&config).unwrap());
        config
    }

    fn remove_row(config: &IndexConfig, doc: u64) {
        let store = PostingsStore::open(&IndexPaths::new(&config.forward_index)).unwrap();
        store.remove(DocId::new(doc)).unwrap();
        store.flush().unwrap();
    }

    #[test]
    fn missing_last_row_is_detected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = build_small(dir.path());
        remove_row(&config, 3);
        let err = ForwardIndex::open(&config.forward_index, 8).err().unwrap();
        assert!(err.is_corrupt(), "{err}");
    }

    #[test]
    fn missing_first_row_is_detected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = build_small(dir.path());
        remove_row(&config, 0);
        let err = ForwardIndex::open(&config.forward_index, 8).err().unwrap();
        assert!(err.is_corrupt(), "{err}");
    }

    #[test]
    fn missing_inner_row_is_corrupt_on_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let config = build_small(dir.path());
        remove_row(&config, 2);
        let index = ForwardIndex::open(&config.forward_index, 8).unwrap();
        assert_eq!(index.search_primary(DocId::new(1)).unwrap().count(TermId::new(1)), 2.0);
        let err = index.search_primary(DocId::new(2)).err().unwrap();
        assert!(err.is_corrupt(), "{err}");
    }
}
