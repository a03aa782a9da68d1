// Id interning tables
//
// Dense NUPN ids for PNML string ids. Each table owns a monotonic counter
// seeded at construction; lookups never allocate an id.

use rustc_hash::FxHashMap;

/// Mapping from PNML ids to dense NUPN ids, allocated in first-seen order
#[derive(Debug, Clone)]
pub struct IdTable {
    ids: FxHashMap<String, u64>,
    first: u64,
    next: u64,
}

impl IdTable {
    /// Table whose first allocated id is `first`
    pub fn starting_at(first: u64) -> Self {
        Self {
            ids: FxHashMap::default(),
            first,
            next: first,
        }
    }

    /// Existing id of `key`, or the next id from the counter
    pub fn intern(&mut self, key: &str) -> u64 {
        if let Some(&id) = self.ids.get(key) {
            return id;
        }
        let id = self.next;
        self.next += 1;
        self.ids.insert(key.to_string(), id);
        id
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.ids.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.ids.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Id the next allocation will receive
    pub fn next_id(&self) -> u64 {
        self.next
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.ids.values().copied()
    }

    /// Entries ordered by NUPN id
    pub fn sorted_by_id(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> =
            self.ids.iter().map(|(k, &v)| (k.as_str(), v)).collect();
        entries.sort_unstable_by_key(|&(_, id)| id);
        entries
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.next = self.first;
    }
}
