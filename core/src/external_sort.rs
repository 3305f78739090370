//! Bounded-memory sorting: run generation plus a k-way merge.
//!
//! Items are buffered until `run_capacity` is reached, then the buffer is
//! sorted and spilled to a run file as a sequence of bincode records. When
//! nothing was spilled the buffer is sorted and streamed from memory.
//! Otherwise the remaining buffer becomes the last run and all runs are
//! merged through a binary heap holding one head item per run.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use crate::error::{IndexError, Result};

struct RunFile {
    path: PathBuf,
    len: u64,
}

pub struct ExternalSorter<T> {
    dir: PathBuf,
    run_capacity: usize,
    buffer: Vec<T>,
    runs: Vec<RunFile>,
    pushed: u64,
}

impl<T: Ord + Serialize + DeserializeOwned> ExternalSorter<T> {
    /// Run files are created inside `dir`, which is created on first spill.
    pub fn new(dir: impl Into<PathBuf>, run_capacity: usize) -> Self {
        let run_capacity = run_capacity.max(1);
        Self {
            dir: dir.into(),
            run_capacity,
            buffer: Vec::with_capacity(run_capacity.min(1 << 16)),
            runs: Vec::new(),
            pushed: 0,
        }
    }

    pub fn push(&mut self, item: T) -> Result<()> {
        self.buffer.push(item);
        self.pushed += 1;
        if self.buffer.len() >= self.run_capacity {
            self.spill()?;
        }
        Ok(())
    }

    /// Items pushed so far.
    pub fn len(&self) -> u64 {
        self.pushed
    }

    pub fn is_empty(&self) -> bool {
        self.pushed == 0
    }

    pub fn spilled_runs(&self) -> usize {
        self.runs.len()
    }

    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        self.buffer.sort();
        let path = self.dir.join(format!("run-{:05}.bin", self.runs.len()));
        let mut w = BufWriter::new(File::create(&path)?);
        for item in &self.buffer {
            bincode::serialize_into(&mut w, item)?;
        }
        w.flush()?;
        let len = self.buffer.len() as u64;
        let run = self.runs.len();
        tracing::debug!(run, items = len, path = %path.display(), "spilled sorted run");
        self.runs.push(RunFile { path, len });
        self.buffer.clear();
        Ok(())
    }

    /// Consumes the sorter and yields every pushed item in ascending order.
    pub fn finish(mut self) -> Result<SortedStream<T>> {
        if self.runs.is_empty() {
            let mut items = std::mem::take(&mut self.buffer);
            items.sort();
            return Ok(SortedStream::Memory(items.into_iter()));
        }
        self.spill()?;

        let mut readers = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            let reader = BufReader::new(File::open(&run.path)?);
            readers.push(RunReader { reader, remaining: run.len, path: run.path });
        }
        let mut merge = KWayMerge {
            readers,
            heap: BinaryHeap::new(),
        };
        for run in 0..merge.readers.len() {
            if let Some(item) = merge.readers[run].next_item()? {
                merge.heap.push(Reverse(HeapEntry { item, run }));
            }
        }
        tracing::debug!(runs = merge.readers.len(), "merging sorted runs");
        Ok(SortedStream::Merge(merge))
    }
}

impl<T> Drop for ExternalSorter<T> {
    fn drop(&mut self) {
        for run in &self.runs {
            let _ = fs::remove_file(&run.path);
        }
    }
}

struct RunReader {
    reader: BufReader<File>,
    remaining: u64,
    path: PathBuf,
}

impl RunReader {
    fn next_item<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let item = bincode::deserialize_from(&mut self.reader)
            .map_err(|e| IndexError::corrupt(&self.path, format!("truncated sort run: {e}")))?;
        self.remaining -= 1;
        Ok(Some(item))
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry<T> {
    item: T,
    run: usize,
}

pub struct KWayMerge<T> {
    readers: Vec<RunReader>,
    heap: BinaryHeap<Reverse<HeapEntry<T>>>,
}

impl<T: Ord + DeserializeOwned> KWayMerge<T> {
    fn next_item(&mut self) -> Result<Option<T>> {
        let Some(Reverse(HeapEntry { item, run })) = self.heap.pop() else {
            return Ok(None);
        };
        if let Some(next) = self.readers[run].next_item()? {
            self.heap.push(Reverse(HeapEntry { item: next, run }));
        }
        Ok(Some(item))
    }
}

impl<T> Drop for KWayMerge<T> {
    fn drop(&mut self) {
        for reader in &self.readers {
            let _ = fs::remove_file(&reader.path);
        }
    }
}

/// Output of [`ExternalSorter::finish`].
pub enum SortedStream<T> {
    Memory(std::vec::IntoIter<T>),
    Merge(KWayMerge<T>),
}

impl<T> SortedStream<T> {
    /// True when the items had to be merged from disk.
    pub fn is_external(&self) -> bool {
        matches!(self, SortedStream::Merge(_))
    }
}

impl<T: Ord + DeserializeOwned> Iterator for SortedStream<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SortedStream::Memory(items) => items.next().map(Ok),
            SortedStream::Merge(merge) => merge.next_item().transpose(),
        }
    }
}
