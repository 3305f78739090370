use crate::config::{AnalyzerConfig, CorpusKind, IndexConfig};
use crate::error::{IndexError, Result};
use crate::ids::Ident;
use crate::postings::PostingsData;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, create_dir_all, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Forward,
    Inverted,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Forward => f.write_str("forward"),
            IndexKind::Inverted => f.write_str("inverted"),
        }
    }
}

/// What an index was built from. A stored descriptor that differs from the
/// requested one means the index has to be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub corpus: CorpusKind,
    pub dataset: String,
    pub analyzer: AnalyzerConfig,
}

impl SourceDescriptor {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            corpus: config.corpus,
            dataset: config.dataset.clone(),
            analyzer: config.analyzer,
        }
    }
}

/// Scalar facts about a finalized index. Written last; its presence marks
/// the index as complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub kind: IndexKind,
    pub num_docs: u64,
    pub unique_terms: u64,
    pub total_postings: u64,
    pub source: SourceDescriptor,
    #[serde(default)]
    pub uninverted: bool,
    pub created_at: String,
}

impl MetaFile {
    pub fn new(
        kind: IndexKind,
        num_docs: u64,
        unique_terms: u64,
        total_postings: u64,
        source: SourceDescriptor,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            kind,
            num_docs,
            unique_terms,
            total_postings,
            source,
            uninverted: false,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
        }
    }
}

/// Per-document data indexed by doc id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocTable {
    pub sizes: Vec<u64>,
    pub labels: Vec<Option<String>>,
    pub names: Vec<Option<String>>,
}

impl DocTable {
    pub fn push(&mut self, size: u64, label: Option<String>, name: Option<String>) {
        self.sizes.push(size);
        self.labels.push(label);
        self.names.push(name);
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    fn is_consistent(&self) -> bool {
        self.labels.len() == self.sizes.len() && self.names.len() == self.sizes.len()
    }
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn meta_tmp(&self) -> PathBuf { self.root.join("meta.json.tmp") }
    pub fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    pub fn vocab(&self) -> PathBuf { self.root.join("vocab.bin") }
    pub fn postings_dir(&self) -> PathBuf { self.root.join("postings") }
    pub fn runs_dir(&self) -> PathBuf { self.root.join("runs") }

    /// Entries an index directory may hold. `clear` removes nothing else.
    const OWNED_FILES: [&str; 4] = ["meta.json", "meta.json.tmp", "docs.bin", "vocab.bin"];
    const OWNED_DIRS: [&str; 2] = ["postings", "runs"];

    /// Removes the files of a previous or abandoned build. Refuses to touch
    /// a directory that holds anything it did not write.
    pub fn clear(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let mut owned = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let is_dir = entry.file_type()?.is_dir();
            let known = match name.to_str() {
                Some(n) if is_dir => Self::OWNED_DIRS.contains(&n),
                Some(n) => Self::OWNED_FILES.contains(&n),
                None => false,
            };
            if !known {
                return Err(IndexError::Config(format!(
                    "refusing to clear {}: it contains {:?}, which is not part of an index",
                    self.root.display(),
                    name
                )));
            }
            owned.push((entry.path(), is_dir));
        }
        for (path, is_dir) in owned {
            if is_dir {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut f, value)?;
    f.flush()?;
    Ok(())
}

fn read_bincode<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(IndexError::corrupt(path, "file is missing"));
        }
        Err(e) => return Err(e.into()),
    };
    bincode::deserialize_from(BufReader::new(f))
        .map_err(|e| IndexError::corrupt(path, format!("cannot decode: {e}")))
}

/// Writes `meta.json` through a temporary file so a crash never leaves a
/// half-written commit marker.
pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta_tmp())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    f.sync_all()?;
    fs::rename(paths.meta_tmp(), paths.meta())?;
    Ok(())
}

/// `Ok(None)` when no index has been committed at this location.
pub fn load_meta(paths: &IndexPaths) -> Result<Option<MetaFile>> {
    let mut f = match File::open(paths.meta()) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)
        .map_err(|e| IndexError::corrupt(paths.meta(), format!("unreadable metadata: {e}")))?;
    Ok(Some(meta))
}

pub fn save_docs(paths: &IndexPaths, docs: &DocTable) -> Result<()> {
    write_bincode(&paths.docs(), docs)
}

pub fn load_docs(paths: &IndexPaths) -> Result<DocTable> {
    let docs: DocTable = read_bincode(&paths.docs())?;
    if !docs.is_consistent() {
        return Err(IndexError::corrupt(paths.docs(), "label/name columns disagree with sizes"));
    }
    Ok(docs)
}

pub fn save_vocab(paths: &IndexPaths, terms: &[String]) -> Result<()> {
    write_bincode(&paths.vocab(), &terms)
}

pub fn load_vocab(paths: &IndexPaths) -> Result<Vec<String>> {
    read_bincode(&paths.vocab())
}

/// Disk-resident postings rows keyed by primary id.
///
/// Backed by a sled tree: keys are big-endian ids so iteration order is id
/// order, values are bincode-encoded rows.
pub struct PostingsStore {
    db: sled::Db,
    path: PathBuf,
}

impl PostingsStore {
    /// Opens an empty store, discarding any previous contents.
    pub fn create(paths: &IndexPaths) -> Result<Self> {
        let path = paths.postings_dir();
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        create_dir_all(&paths.root)?;
        Self::open_at(path)
    }

    pub fn open(paths: &IndexPaths) -> Result<Self> {
        let path = paths.postings_dir();
        if !path.is_dir() {
            return Err(IndexError::corrupt(&path, "postings store is missing"));
        }
        Self::open_at(path)
    }

    fn open_at(path: PathBuf) -> Result<Self> {
        let db = sled::Config::new().path(&path).flush_every_ms(None).open()?;
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn put<K: Ident, V: Ident>(&self, key: K, row: &PostingsData<V>) -> Result<()> {
        let bytes = bincode::serialize(row)?;
        self.db.insert(key.to_key(), bytes)?;
        Ok(())
    }

    pub fn get<K: Ident, V: Ident>(&self, key: K) -> Result<Option<PostingsData<V>>> {
        match self.db.get(key.to_key())? {
            Some(bytes) => {
                let row = bincode::deserialize(&bytes).map_err(|e| {
                    let reason = format!("row for {} {key} cannot be decoded: {e}", K::NAME);
                    IndexError::corrupt(&self.path, reason)
                })?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    /// Counts rows by scanning the whole tree.
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Smallest stored key, without reading any other row.
    pub fn first_key<K: Ident>(&self) -> Result<Option<K>> {
        match self.db.first()? {
            Some((key, _)) => self.decode_key(&key).map(Some),
            None => Ok(None),
        }
    }

    /// Largest stored key, without reading any other row.
    pub fn last_key<K: Ident>(&self) -> Result<Option<K>> {
        match self.db.last()? {
            Some((key, _)) => self.decode_key(&key).map(Some),
            None => Ok(None),
        }
    }

    fn decode_key<K: Ident>(&self, key: &[u8]) -> Result<K> {
        K::from_key(key).ok_or_else(|| {
            IndexError::corrupt(&self.path, format!("malformed key of {} bytes", key.len()))
        })
    }

    #[cfg(test)]
    pub(crate) fn remove<K: Ident>(&self, key: K) -> Result<()> {
        self.db.remove(key.to_key())?;
        Ok(())
    }

    /// Streams every row in ascending key order.
    pub fn iter<K: Ident, V: Ident>(
        &self,
    ) -> impl Iterator<Item = Result<(K, PostingsData<V>)>> + '_ {
        self.db.iter().map(move |item| -> Result<(K, PostingsData<V>)> {
            let (key, bytes) = item?;
            let id: K = self.decode_key(&key)?;
            let row = bincode::deserialize(&bytes).map_err(|e| {
                let reason = format!("row for {} {id} cannot be decoded: {e}", K::NAME);
                IndexError::corrupt(&self.path, reason)
            })?;
            Ok((id, row))
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
