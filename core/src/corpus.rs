//! Corpus adapters: enumerate raw documents in doc id order.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use crate::config::{CorpusKind, IndexConfig};
use crate::error::{IndexError, Result};
use crate::ids::{DocId, TermId};

#[derive(Debug, Clone, PartialEq)]
pub enum DocContent {
    /// Raw text, analyzed by the builder.
    Text(String),
    /// Already-counted features with 0-based term ids.
    Features(Vec<(TermId, f64)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub name: Option<String>,
    pub label: Option<String>,
    pub content: DocContent,
}

/// A finite stream of documents with sequential ids starting at zero.
pub trait Corpus: Iterator<Item = Result<Document>> {
    /// Human readable origin, used in logs.
    fn source(&self) -> &Path;
}

/// Opens the adapter selected by `config.corpus`.
pub fn open(config: &IndexConfig) -> Result<Box<dyn Corpus>> {
    let dir = config.dataset_dir();
    let dataset = &config.dataset;
    let corpus: Box<dyn Corpus> = match config.corpus {
        CorpusKind::File => {
            let list = dir.join(format!("{dataset}-full-corpus.txt"));
            Box::new(FileCorpus::open(list, &dir)?)
        }
        CorpusKind::Line => {
            let data = dir.join(format!("{dataset}.dat"));
            let labels = dir.join(format!("{dataset}.dat.labels"));
            Box::new(LineCorpus::open(data, labels.is_file().then_some(labels))?)
        }
        CorpusKind::Libsvm => {
            let data = dir.join(format!("{dataset}.dat"));
            Box::new(LibsvmCorpus::open(data, config.build.max_features)?)
        }
    };
    tracing::info!(kind = %config.corpus, source = %corpus.source().display(), "opened corpus");
    Ok(corpus)
}

fn open_lines(path: &Path) -> Result<Lines<BufReader<File>>> {
    let f = File::open(path).map_err(|source| IndexError::Corpus {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(f).lines())
}

/// Invalid UTF-8 becomes a format error at `line`; other read failures stay I/O errors.
fn read_error(source_name: &str, line: u64, err: io::Error) -> IndexError {
    if err.kind() == io::ErrorKind::InvalidData {
        IndexError::format(source_name, line, "line is not valid UTF-8")
    } else {
        IndexError::Io(err)
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One document per file. The list file holds `label path` or `path` per
/// line; paths are relative to `base`.
pub struct FileCorpus {
    list: PathBuf,
    name: String,
    base: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: u64,
    next_id: u64,
}

impl FileCorpus {
    pub fn open(list: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Result<Self> {
        let list = list.into();
        let lines = open_lines(&list)?;
        let name = source_name(&list);
        Ok(Self { list, name, base: base.into(), lines, line_no: 0, next_id: 0 })
    }

    fn read_entry(&self, entry: &str) -> Result<Document> {
        let (label, rel) = match entry.split_once(char::is_whitespace) {
            Some((label, rel)) => (Some(label.to_string()), rel.trim()),
            None => (None, entry),
        };
        let text = fs::read_to_string(self.base.join(rel)).map_err(|e| {
            let reason = format!("cannot read document {rel}: {e}");
            IndexError::format(&self.name, self.line_no, reason)
        })?;
        Ok(Document {
            id: DocId::new(self.next_id),
            name: Some(rel.to_string()),
            label,
            content: DocContent::Text(text),
        })
    }
}

impl Iterator for FileCorpus {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(read_error(&self.name, self.line_no, e))),
            };
            let entry = line.trim();
            if entry.is_empty() {
                continue;
            }
            let doc = self.read_entry(entry);
            if doc.is_ok() {
                self.next_id += 1;
            }
            return Some(doc);
        }
    }
}

impl Corpus for FileCorpus {
    fn source(&self) -> &Path {
        &self.list
    }
}

struct LabelLines {
    name: String,
    lines: Lines<BufReader<File>>,
}

/// One document per line; an empty line is an empty document. Labels come
/// from an optional parallel file that must have one line per document.
pub struct LineCorpus {
    path: PathBuf,
    name: String,
    lines: Lines<BufReader<File>>,
    labels: Option<LabelLines>,
    line_no: u64,
    done: bool,
}

impl LineCorpus {
    pub fn open(path: impl Into<PathBuf>, labels: Option<PathBuf>) -> Result<Self> {
        let path = path.into();
        let lines = open_lines(&path)?;
        let labels = match labels {
            Some(p) => Some(LabelLines { name: source_name(&p), lines: open_lines(&p)? }),
            None => None,
        };
        let name = source_name(&path);
        Ok(Self { path, name, lines, labels, line_no: 0, done: false })
    }

    fn next_label(&mut self) -> Result<Option<String>> {
        let Some(labels) = self.labels.as_mut() else {
            return Ok(None);
        };
        match labels.lines.next() {
            Some(Ok(label)) => {
                let label = label.trim();
                Ok((!label.is_empty()).then(|| label.to_string()))
            }
            Some(Err(e)) => Err(read_error(&labels.name, self.line_no, e)),
            None => Err(IndexError::format(
                &labels.name,
                self.line_no,
                format!("labels end before document line {} of {}", self.line_no, self.name),
            )),
        }
    }

    /// Trailing blank lines are tolerated; any further label is a mismatch.
    fn check_labels_exhausted(&mut self) -> Result<()> {
        let Some(labels) = self.labels.as_mut() else {
            return Ok(());
        };
        let mut line = self.line_no;
        for label in labels.lines.by_ref() {
            line += 1;
            match label {
                Ok(label) if label.trim().is_empty() => {}
                Ok(_) => {
                    let reason =
                        format!("more labels than the {} lines of {}", self.line_no, self.name);
                    return Err(IndexError::format(&labels.name, line, reason));
                }
                Err(e) => return Err(read_error(&labels.name, line, e)),
            }
        }
        Ok(())
    }
}

impl Iterator for LineCorpus {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some(line) = self.lines.next() else {
            self.done = true;
            return self.check_labels_exhausted().err().map(Err);
        };
        self.line_no += 1;
        let text = match line {
            Ok(text) => text,
            Err(e) => {
                self.done = true;
                return Some(Err(read_error(&self.name, self.line_no, e)));
            }
        };
        let label = match self.next_label() {
            Ok(label) => label,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        let id = DocId::new(self.line_no - 1);
        Some(Ok(Document { id, name: None, label, content: DocContent::Text(text) }))
    }
}

impl Corpus for LineCorpus {
    fn source(&self) -> &Path {
        &self.path
    }
}

/// Sparse labeled features, one document per non-empty line:
/// `label idx:value idx:value ...` with 1-based feature indices.
pub struct LibsvmCorpus {
    path: PathBuf,
    name: String,
    lines: Lines<BufReader<File>>,
    max_features: u64,
    line_no: u64,
    next_id: u64,
}

impl LibsvmCorpus {
    /// Feature indices above `max_features` are rejected as format errors.
    pub fn open(path: impl Into<PathBuf>, max_features: u64) -> Result<Self> {
        let path = path.into();
        let lines = open_lines(&path)?;
        let name = source_name(&path);
        Ok(Self { path, name, lines, max_features, line_no: 0, next_id: 0 })
    }
}

impl Iterator for LibsvmCorpus {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(read_error(&self.name, self.line_no, e))),
            };
            if line.trim().is_empty() {
                continue;
            }
            let parsed = parse_libsvm_line(&line, &self.name, self.line_no, self.max_features);
            return Some(parsed.map(|(label, features)| {
                let id = DocId::new(self.next_id);
                self.next_id += 1;
                let content = DocContent::Features(features);
                Document { id, name: None, label: Some(label), content }
            }));
        }
    }
}

impl Corpus for LibsvmCorpus {
    fn source(&self) -> &Path {
        &self.path
    }
}

/// Parses `label idx:value ...`. A stored feature index `k` becomes
/// `TermId(k - 1)`; index 0, indices above `max_features`, negative or
/// non-finite values are rejected.
pub fn parse_libsvm_line(
    line: &str,
    source_name: &str,
    line_no: u64,
    max_features: u64,
) -> Result<(String, Vec<(TermId, f64)>)> {
    let err = |reason: String| IndexError::format(source_name, line_no, reason);
    let mut fields = line.split_whitespace();
    let label = match fields.next() {
        Some(label) if !label.contains(':') => label.to_string(),
        Some(field) => {
            return Err(err(format!("expected a label before features, found {field:?}")))
        }
        None => return Err(err("empty line".into())),
    };
    let mut features = Vec::new();
    for field in fields {
        let (idx, value) = field
            .split_once(':')
            .ok_or_else(|| err(format!("feature {field:?} is not idx:value")))?;
        let idx: u64 = idx
            .parse()
            .map_err(|_| err(format!("feature index {idx:?} is not an integer")))?;
        if idx == 0 {
            return Err(err("feature index 0 is not 1-based".into()));
        }
        if idx > max_features {
            return Err(err(format!("feature index {idx} exceeds max-features {max_features}")));
        }
        let value: f64 = value
            .parse()
            .map_err(|_| err(format!("feature value {value:?} is not a number")))?;
        if !value.is_finite() || value < 0.0 {
            return Err(err(format!("feature value {value} must be finite and non-negative")));
        }
        features.push((TermId::new(idx - 1), value));
    }
    Ok((label, features))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u64 = 100;

    fn lines_of(corpus: LineCorpus) -> Vec<Result<Document>> {
        corpus.collect()
    }

    #[test]
    fn libsvm_indices_shift_down_by_one() {
        let (label, features) = parse_libsvm_line("2 1:5 3:1 10:4.5", "bc.dat", 1, MAX).unwrap();
        assert_eq!(label, "2");
        assert_eq!(
            features,
            vec![(TermId::new(0), 5.0), (TermId::new(2), 1.0), (TermId::new(9), 4.5)]
        );
    }

    #[test]
    fn libsvm_rejects_malformed_features() {
        let bad = [
            "1 0:1",
            "1 2:x",
            "1 2",
            "1:3 2:1",
            "1 a:1",
            "1 2:-1",
            "1 101:1",
            "1 3000000:1",
            "1 18446744073709551615:1",
            "1 18446744073709551616:1",
        ];
        for line in bad {
            let err = parse_libsvm_line(line, "bc.dat", 7, MAX).unwrap_err();
            assert!(matches!(err, IndexError::Format { line: 7, .. }), "{line}: {err}");
        }
        assert!(parse_libsvm_line("1 100:1", "bc.dat", 7, MAX).is_ok());
    }

    #[test]
    fn libsvm_corpus_stops_at_oversized_feature() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("bc.dat");
        fs::write(&data, "1 1:1\n\n-1 5000:1\n").unwrap();
        let docs: Vec<_> = LibsvmCorpus::open(&data, 10).unwrap().collect();
        assert!(docs[0].is_ok());
        assert!(matches!(docs[1], Err(IndexError::Format { line: 3, .. })));
    }

    #[test]
    fn line_corpus_pairs_labels_and_keeps_empty_docs() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("d.dat");
        let labels = dir.path().join("d.dat.labels");
        fs::write(&data, "one two\n\nthree\n").unwrap();
        fs::write(&labels, "a\nb\n\n\n").unwrap();
        let docs: Vec<Document> = LineCorpus::open(&data, Some(labels))
            .unwrap()
            .map(|d| d.unwrap())
            .collect();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[1].id, DocId::new(1));
        assert_eq!(docs[1].content, DocContent::Text(String::new()));
        assert_eq!(docs[1].label.as_deref(), Some("b"));
        assert_eq!(docs[2].label, None);
    }

    #[test]
    fn short_labels_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("d.dat");
        let labels = dir.path().join("d.dat.labels");
        fs::write(&data, "one\ntwo\nthree\n").unwrap();
        fs::write(&labels, "a\nb\n").unwrap();
        let docs = lines_of(LineCorpus::open(&data, Some(labels)).unwrap());
        assert_eq!(docs.len(), 3);
        assert!(docs[1].is_ok());
        assert!(matches!(docs[2], Err(IndexError::Format { line: 3, .. })));
    }

    #[test]
    fn long_labels_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("d.dat");
        let labels = dir.path().join("d.dat.labels");
        fs::write(&data, "one\ntwo\n").unwrap();
        fs::write(&labels, "a\nb\nc\n").unwrap();
        let docs = lines_of(LineCorpus::open(&data, Some(labels)).unwrap());
        assert_eq!(docs.len(), 3);
        assert!(matches!(docs[2], Err(IndexError::Format { line: 3, .. })));
    }

    #[test]
    fn invalid_utf8_is_a_format_error_with_its_line() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("d.dat");
        fs::write(&data, b"fine\nbad \xff\xfe bytes\nnever read\n").unwrap();
        let docs = lines_of(LineCorpus::open(&data, None).unwrap());
        assert_eq!(docs.len(), 2);
        assert!(docs[0].is_ok());
        assert!(matches!(docs[1], Err(IndexError::Format { line: 2, .. })), "{:?}", docs[1]);
    }

    #[test]
    fn file_corpus_reads_listed_documents() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/a.txt"), "alpha").unwrap();
        fs::write(dir.path().join("docs/b.txt"), "beta").unwrap();
        let list = dir.path().join("list.txt");
        fs::write(&list, "pos docs/a.txt\n\ndocs/b.txt\n").unwrap();
        let docs: Vec<Document> = FileCorpus::open(&list, dir.path())
            .unwrap()
            .map(|d| d.unwrap())
            .collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].label.as_deref(), Some("pos"));
        assert_eq!(docs[0].name.as_deref(), Some("docs/a.txt"));
        assert_eq!(docs[1].id, DocId::new(1));
        assert_eq!(docs[1].content, DocContent::Text("beta".into()));
    }

    #[test]
    fn missing_listed_document_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        fs::write(&list, "gone.txt\n").unwrap();
        let mut corpus = FileCorpus::open(&list, dir.path()).unwrap();
        assert!(matches!(corpus.next(), Some(Err(IndexError::Format { line: 1, .. }))));
    }
}
