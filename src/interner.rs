use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::rc::Rc;

/// Interns structurally equal keys to one dense, insertion-ordered id and
/// remembers every consumer that asked for each key.
#[derive(Debug, Clone)]
pub struct RequestTable<K, C = usize> {
    entries: Vec<(K, Vec<C>)>,
    index: HashMap<K, usize>,
}

impl<K, C> Default for RequestTable<K, C> {
    fn default() -> Self {
        Self { entries: Vec::new(), index: HashMap::new() }
    }
}

impl<K: Clone + Eq + Hash, C> RequestTable<K, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `key`, allocating `len()` for a new key; `consumer` is recorded
    /// either way.
    pub fn request(&mut self, key: K, consumer: C) -> usize {
        let id = match self.index.get(&key) {
            Some(&id) => id,
            None => {
                let id = self.entries.len();
                self.index.insert(key.clone(), id);
                self.entries.push((key, Vec::new()));
                id
            }
        };
        self.entries[id].1.push(consumer);
        id
    }

    pub fn id(&self, key: &K) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn key(&self, id: usize) -> Option<&K> {
        self.entries.get(id).map(|(k, _)| k)
    }

    pub fn consumers(&self, id: usize) -> &[C] {
        self.entries.get(id).map(|(_, c)| c.as_slice()).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &K, &[C])> {
        self.entries.iter().enumerate().map(|(id, (k, c))| (id, k, c.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type Permutations = Rc<Vec<Vec<usize>>>;

/// Lazily computed `n!` orderings per element count.
#[derive(Debug, Default, Clone)]
pub struct PermutationTables {
    tables: BTreeMap<usize, Permutations>,
}

impl PermutationTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, n: usize) -> Permutations {
        self.tables.entry(n).or_insert_with(|| Rc::new(permutations(n))).clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Permutations)> {
        self.tables.iter().map(|(n, p)| (*n, p))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// All orderings of `0..n` in lexicographic order.
pub fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn go(prefix: &mut Vec<usize>, rest: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if rest.is_empty() {
            out.push(prefix.clone());
            return;
        }
        for i in 0..rest.len() {
            let v = rest.remove(i);
            prefix.push(v);
            go(prefix, rest, out);
            prefix.pop();
            rest.insert(i, v);
        }
    }

    let mut out = Vec::new();
    go(&mut Vec::with_capacity(n), &mut (0..n).collect(), &mut out);
    out
}
