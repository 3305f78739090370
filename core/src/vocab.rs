use std::collections::HashMap;

use crate::ids::{Ident, TermId};

/// Bidirectional term text <-> term id table.
///
/// Ids are handed out sequentially on first sight, so `terms()` is also the
/// insertion order. Once an index is finalized its vocabulary is only read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    ids: HashMap<String, TermId>,
    terms: Vec<String>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the table from terms stored in id order. Returns `None`
    /// when a term appears twice.
    pub fn from_terms(terms: Vec<String>) -> Option<Self> {
        let mut ids = HashMap::with_capacity(terms.len());
        for (i, term) in terms.iter().enumerate() {
            if ids.insert(term.clone(), TermId::from_u64(i as u64)).is_some() {
                return None;
            }
        }
        Some(Self { ids, terms })
    }

    pub fn resolve_or_allocate(&mut self, text: &str) -> TermId {
        if let Some(&id) = self.ids.get(text) {
            return id;
        }
        let id = TermId::from_u64(self.terms.len() as u64);
        self.ids.insert(text.to_string(), id);
        self.terms.push(text.to_string());
        id
    }

    /// Makes `id` valid for sparse feature input: every missing id up to and
    /// including it is allocated with the 1-based feature index as its text.
    pub fn ensure_feature(&mut self, id: TermId) {
        while self.terms.len() <= id.index() {
            let feature = (self.terms.len() + 1).to_string();
            self.resolve_or_allocate(&feature);
        }
    }

    pub fn text_of(&self, id: TermId) -> Option<&str> {
        self.terms.get(id.index()).map(String::as_str)
    }

    pub fn term_id(&self, text: &str) -> Option<TermId> {
        self.ids.get(text).copied()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}
