use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::ids::Ident;

/// One postings row: an ordered sparse mapping from identifier to weight.
///
/// Keys are unique and kept in ascending order. A forward index stores
/// `PostingsData<TermId>` per document, an inverted index stores
/// `PostingsData<DocId>` per term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingsData<K> {
    counts: Vec<(K, f64)>,
}

impl<K> Default for PostingsData<K> {
    fn default() -> Self {
        Self { counts: Vec::new() }
    }
}

impl<K: Ident> PostingsData<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a row from unordered pairs; weights of repeated keys are summed.
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut pairs: Vec<(K, f64)> = counts.into_iter().collect();
        pairs.sort_by_key(|&(k, _)| k);
        let mut row = Self {
            counts: Vec::with_capacity(pairs.len()),
        };
        for (key, weight) in pairs {
            row.push_sorted(key, weight);
        }
        row
    }

    pub fn increase_count(&mut self, key: K, amount: f64) {
        match self.counts.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(pos) => self.counts[pos].1 += amount,
            Err(pos) => self.counts.insert(pos, (key, amount)),
        }
    }

    /// Appends a pair whose key is not below the current last key.
    /// An equal key is merged into the last pair.
    pub(crate) fn push_sorted(&mut self, key: K, weight: f64) {
        match self.counts.last_mut() {
            Some((last, w)) if *last == key => *w += weight,
            _ => {
                debug_assert!(self.counts.last().map_or(true, |&(last, _)| last < key));
                self.counts.push((key, weight));
            }
        }
    }

    /// Weight recorded for `key`, zero when absent.
    pub fn count(&self, key: K) -> f64 {
        self.counts
            .binary_search_by_key(&key, |&(k, _)| k)
            .map(|pos| self.counts[pos].1)
            .unwrap_or(0.0)
    }

    pub fn counts(&self) -> &[(K, f64)] {
        &self.counts
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.counts.iter().map(|&(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.counts.iter().map(|&(_, w)| w).sum()
    }

    pub fn into_counts(self) -> Vec<(K, f64)> {
        self.counts
    }
}

/// A single `(primary, secondary, weight)` triple as it flows through the
/// external sort. Ordered by `(primary, secondary)`; the weight is payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PostingEntry<P, S> {
    pub primary: P,
    pub secondary: S,
    pub weight: f64,
}

impl<P: Ord, S: Ord> PartialEq for PostingEntry<P, S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<P: Ord, S: Ord> Eq for PostingEntry<P, S> {}

impl<P: Ord, S: Ord> PartialOrd for PostingEntry<P, S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P: Ord, S: Ord> Ord for PostingEntry<P, S> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.primary
            .cmp(&other.primary)
            .then_with(|| self.secondary.cmp(&other.secondary))
    }
}
