//! Bounded self-adjusting cache for postings rows.
//!
//! Entries live in a splay tree stored in a dense arena (`Vec<Node>`, links
//! are indices). Every hit or insert splays the node to the root, so keys
//! touched recently cluster near the top while cold keys sink to the
//! leaves. When the tree grows past its capacity a leaf is evicted: the
//! walk starts at the root and always steps into the larger subtree (ties
//! alternate sides between evictions) until it reaches the deepest node on
//! that path. The root is the entry that was just accessed, so it is never
//! the victim, and its recent neighbours sit in small subtrees near the top.

use std::cmp::Ordering;

struct Node<K, V> {
    key: K,
    value: V,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
    size: usize,
}

pub struct SplayCache<K, V> {
    nodes: Vec<Node<K, V>>,
    root: Option<usize>,
    capacity: usize,
    evict_left: bool,
}

impl<K: Ord + Copy, V: Clone> SplayCache<K, V> {
    /// A capacity of zero disables caching: every lookup goes to the loader.
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity.min(1024)),
            root: None,
            capacity,
            evict_left: true,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks residency without changing the tree shape.
    pub fn contains(&self, key: &K) -> bool {
        self.find(key).0.is_some()
    }

    /// Returns a resident value and promotes its node to the root.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let node = self.find(key).0?;
        self.splay(node);
        Some(self.nodes[node].value.clone())
    }

    /// Returns the resident value for `key`, or materializes it with
    /// `loader`, caches it and evicts down to capacity. Loader errors are
    /// returned untouched and leave the cache unchanged.
    pub fn get_or_load<E, F>(&mut self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce(K) -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = loader(key)?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let (found, last) = self.find(&key);
        let node = match found {
            Some(node) => {
                self.nodes[node].value = value;
                node
            }
            None => {
                let node = self.nodes.len();
                self.nodes.push(Node {
                    key,
                    value,
                    parent: last,
                    left: None,
                    right: None,
                    size: 1,
                });
                match last {
                    Some(parent) if key < self.nodes[parent].key => {
                        self.nodes[parent].left = Some(node)
                    }
                    Some(parent) => self.nodes[parent].right = Some(node),
                    None => self.root = Some(node),
                }
                let mut ancestor = last;
                while let Some(a) = ancestor {
                    self.nodes[a].size += 1;
                    ancestor = self.nodes[a].parent;
                }
                node
            }
        };
        self.splay(node);
        while self.nodes.len() > self.capacity {
            self.evict_one();
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    pub fn root_key(&self) -> Option<K> {
        self.root.map(|r| self.nodes[r].key)
    }

    /// Keys in ascending order (in-order traversal).
    pub fn keys(&self) -> Vec<K> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::new();
        let mut cur = self.root;
        while cur.is_some() || !stack.is_empty() {
            while let Some(n) = cur {
                stack.push(n);
                cur = self.nodes[n].left;
            }
            if let Some(n) = stack.pop() {
                out.push(self.nodes[n].key);
                cur = self.nodes[n].right;
            }
        }
        out
    }

    /// Distance from the root, `None` when not resident.
    pub fn depth(&self, key: &K) -> Option<usize> {
        let mut cur = self.root;
        let mut depth = 0;
        while let Some(n) = cur {
            match key.cmp(&self.nodes[n].key) {
                Ordering::Less => cur = self.nodes[n].left,
                Ordering::Greater => cur = self.nodes[n].right,
                Ordering::Equal => return Some(depth),
            }
            depth += 1;
        }
        None
    }

    /// Returns the matching node, if any, and the last node visited.
    fn find(&self, key: &K) -> (Option<usize>, Option<usize>) {
        let mut cur = self.root;
        let mut last = None;
        while let Some(n) = cur {
            last = Some(n);
            match key.cmp(&self.nodes[n].key) {
                Ordering::Less => cur = self.nodes[n].left,
                Ordering::Greater => cur = self.nodes[n].right,
                Ordering::Equal => return (Some(n), last),
            }
        }
        (None, last)
    }

    /// Lifts `x` above its parent.
    fn rotate(&mut self, x: usize) {
        let Some(p) = self.nodes[x].parent else {
            return;
        };
        let g = self.nodes[p].parent;
        if self.nodes[p].left == Some(x) {
            let inner = self.nodes[x].right;
            self.nodes[p].left = inner;
            if let Some(inner) = inner {
                self.nodes[inner].parent = Some(p);
            }
            self.nodes[x].right = Some(p);
        } else {
            let inner = self.nodes[x].left;
            self.nodes[p].right = inner;
            if let Some(inner) = inner {
                self.nodes[inner].parent = Some(p);
            }
            self.nodes[x].left = Some(p);
        }
        self.nodes[p].parent = Some(x);
        self.nodes[x].parent = g;
        match g {
            Some(g) if self.nodes[g].left == Some(p) => self.nodes[g].left = Some(x),
            Some(g) => self.nodes[g].right = Some(x),
            None => self.root = Some(x),
        }
        self.update_size(p);
        self.update_size(x);
    }

    fn subtree_size(&self, node: Option<usize>) -> usize {
        node.map_or(0, |n| self.nodes[n].size)
    }

    fn update_size(&mut self, node: usize) {
        let (left, right) = (self.nodes[node].left, self.nodes[node].right);
        let size = 1 + self.subtree_size(left) + self.subtree_size(right);
        self.nodes[node].size = size;
    }

    fn splay(&mut self, x: usize) {
        while let Some(p) = self.nodes[x].parent {
            match self.nodes[p].parent {
                None => self.rotate(x),
                Some(g) => {
                    let x_is_left = self.nodes[p].left == Some(x);
                    let p_is_left = self.nodes[g].left == Some(p);
                    if x_is_left == p_is_left {
                        // zig-zig
                        self.rotate(p);
                        self.rotate(x);
                    } else {
                        // zig-zag
                        self.rotate(x);
                        self.rotate(x);
                    }
                }
            }
        }
    }

    fn evict_one(&mut self) {
        let Some(mut cur) = self.root else {
            return;
        };
        let prefer_left = self.evict_left;
        self.evict_left = !self.evict_left;
        loop {
            let node = &self.nodes[cur];
            cur = match (node.left, node.right) {
                (None, None) => break,
                (Some(l), None) => l,
                (None, Some(r)) => r,
                (Some(l), Some(r)) => {
                    let (ls, rs) = (self.nodes[l].size, self.nodes[r].size);
                    if ls > rs || (ls == rs && prefer_left) {
                        l
                    } else {
                        r
                    }
                }
            };
        }
        self.remove_leaf(cur);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        let mut ancestor = self.nodes[leaf].parent;
        while let Some(a) = ancestor {
            self.nodes[a].size -= 1;
            ancestor = self.nodes[a].parent;
        }
        match self.nodes[leaf].parent {
            Some(p) if self.nodes[p].left == Some(leaf) => self.nodes[p].left = None,
            Some(p) => self.nodes[p].right = None,
            None => self.root = None,
        }

        let last = self.nodes.len() - 1;
        self.nodes.swap_remove(leaf);
        if leaf == last {
            return;
        }
        // The former last node now sits at `leaf`; repoint its neighbours.
        let (parent, left, right) = {
            let moved = &self.nodes[leaf];
            (moved.parent, moved.left, moved.right)
        };
        match parent {
            Some(p) if self.nodes[p].left == Some(last) => self.nodes[p].left = Some(leaf),
            Some(p) => self.nodes[p].right = Some(leaf),
            None => self.root = Some(leaf),
        }
        if let Some(l) = left {
            self.nodes[l].parent = Some(leaf);
        }
        if let Some(r) = right {
            self.nodes[r].parent = Some(leaf);
        }
    }
}
