use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_POSTINGS_PER_RUN: usize = 1_000_000;
pub const DEFAULT_MAX_FEATURES: u64 = 1 << 20;

/// Which corpus adapter feeds the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorpusKind {
    /// `<dataset>-full-corpus.txt` lists one document file per line.
    File,
    /// `<dataset>.dat` holds one document per line.
    Line,
    /// `<dataset>.dat` holds sparse `label idx:value` lines with 1-based indices.
    Libsvm,
}

impl fmt::Display for CorpusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CorpusKind::File => "file",
            CorpusKind::Line => "line",
            CorpusKind::Libsvm => "libsvm",
        };
        f.write_str(s)
    }
}

/// Text analysis settings applied to `file` and `line` corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AnalyzerConfig {
    pub lowercase: bool,
    pub stopwords: bool,
    pub stem: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            stopwords: true,
            stem: true,
        }
    }
}

impl AnalyzerConfig {
    /// Lowercasing only: every word of the input becomes a term.
    pub fn plain() -> Self {
        Self {
            lowercase: true,
            stopwords: false,
            stem: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Postings held in memory before a sorted run is spilled to disk.
    pub postings_per_run: usize,
    /// Largest 1-based libsvm feature index accepted. Every index below
    /// the largest one seen gets a vocabulary entry.
    pub max_features: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            postings_per_run: DEFAULT_POSTINGS_PER_RUN,
            max_features: DEFAULT_MAX_FEATURES,
        }
    }
}

/// Options recognized when building or opening an index.
///
/// ```toml
/// prefix = "data"
/// dataset = "ceeaus"
/// corpus = "line"
/// forward-index = "ceeaus-fwd"
/// inverted-index = "ceeaus-inv"
/// uninvert = false
/// cache-capacity = 10000
///
/// [analyzer]
/// stem = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexConfig {
    #[serde(default = "default_prefix")]
    pub prefix: PathBuf,
    pub dataset: String,
    pub corpus: CorpusKind,
    pub forward_index: PathBuf,
    pub inverted_index: PathBuf,
    #[serde(default)]
    pub uninvert: bool,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

fn default_prefix() -> PathBuf {
    PathBuf::from(".")
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl IndexConfig {
    /// Index directories default to `<prefix>/<dataset>-fwd` and `<prefix>/<dataset>-inv`.
    pub fn new(prefix: impl Into<PathBuf>, dataset: impl Into<String>, corpus: CorpusKind) -> Self {
        let prefix = prefix.into();
        let dataset = dataset.into();
        Self {
            forward_index: prefix.join(format!("{dataset}-fwd")),
            inverted_index: prefix.join(format!("{dataset}-inv")),
            prefix,
            dataset,
            corpus,
            uninvert: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            analyzer: AnalyzerConfig::default(),
            build: BuildConfig::default(),
        }
    }

    /// Loads a TOML file; relative paths inside it are taken relative to the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.resolve_relative_to(base))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: IndexConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn resolve_relative_to(mut self, base: &Path) -> Self {
        for path in [&mut self.prefix, &mut self.forward_index, &mut self.inverted_index] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset.trim().is_empty() {
            return Err(IndexError::Config("dataset must not be empty".into()));
        }
        if self.build.postings_per_run == 0 {
            return Err(IndexError::Config("build.postings-per-run must be at least 1".into()));
        }
        if self.build.max_features == 0 {
            return Err(IndexError::Config("build.max-features must be at least 1".into()));
        }
        let (fwd, inv) = (&self.forward_index, &self.inverted_index);
        if fwd.starts_with(inv) || inv.starts_with(fwd) {
            return Err(IndexError::Config(format!(
                "forward-index {} and inverted-index {} overlap",
                fwd.display(),
                inv.display()
            )));
        }
        let corpus = self.dataset_dir();
        for dir in [fwd, inv] {
            if corpus.starts_with(dir) {
                return Err(IndexError::Config(format!(
                    "index directory {} contains the corpus directory {}",
                    dir.display(),
                    corpus.display()
                )));
            }
        }
        Ok(())
    }

    /// Directory holding the corpus files: `<prefix>/<dataset>`.
    pub fn dataset_dir(&self) -> PathBuf {
        self.prefix.join(&self.dataset)
    }

    pub fn with_uninvert(mut self, uninvert: bool) -> Self {
        self.uninvert = uninvert;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_postings_per_run(mut self, postings_per_run: usize) -> Self {
        self.build.postings_per_run = postings_per_run;
        self
    }

    pub fn with_max_features(mut self, max_features: u64) -> Self {
        self.build.max_features = max_features;
        self
    }

    pub fn with_index_dirs(
        mut self,
        forward: impl Into<PathBuf>,
        inverted: impl Into<PathBuf>,
    ) -> Self {
        self.forward_index = forward.into();
        self.inverted_index = inverted.into();
        self
    }
}
