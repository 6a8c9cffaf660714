//! Access-ordered entry table
//!
//! Uses an intrusive linked list over a slab of nodes for O(1) touch and
//! O(1) removal. The head of the list is the most-recently-used entry;
//! eviction candidates are taken from the tail.

use std::collections::HashMap;

use ahash::RandomState;

/// Identifier of the editor currently holding an entry, if any
pub(crate) type EditorId = u64;

/// Metadata for one cache entry
pub(crate) struct Entry {
    /// Cache key, `[a-z0-9_-]{1,64}`
    pub(crate) key: String,

    /// Byte length of each committed slot, 0 if never committed
    pub(crate) lengths: Vec<u64>,

    /// True once the entry has been published by a successful commit
    pub(crate) readable: bool,

    /// The ongoing edit, or `None` if the entry is not being edited
    pub(crate) current_editor: Option<EditorId>,

    /// Sequence number of the most recent successful commit
    pub(crate) sequence: u64,
}

impl Entry {
    pub(crate) fn new(key: &str, slot_count: usize) -> Self {
        Self {
            key: key.to_string(),
            lengths: vec![0; slot_count],
            readable: false,
            current_editor: None,
            sequence: 0,
        }
    }

    /// Total committed bytes across all slots
    pub(crate) fn total_length(&self) -> u64 {
        self.lengths.iter().sum()
    }
}

struct Node {
    entry: Entry,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Insertion-ordered map with access-order iteration
pub(crate) struct EntryTable {
    map: HashMap<String, usize, RandomState>,
    nodes: Vec<Option<Node>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    slot_count: usize,
}

impl EntryTable {
    pub(crate) fn new(slot_count: usize) -> Self {
        Self {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            head: None,
            tail: None,
            free_list: Vec::new(),
            slot_count,
        }
    }

    /// Look up an entry, optionally marking it most recently used
    pub(crate) fn get_mut(&mut self, key: &str, touch: bool) -> Option<&mut Entry> {
        let idx = *self.map.get(key)?;
        if touch {
            self.move_to_front(idx);
        }
        self.nodes[idx].as_mut().map(|node| &mut node.entry)
    }

    /// Look up an entry without disturbing the access order
    pub(crate) fn peek(&self, key: &str) -> Option<&Entry> {
        let idx = *self.map.get(key)?;
        self.nodes[idx].as_ref().map(|node| &node.entry)
    }

    /// Fetch an entry, creating it if absent; either way it becomes MRU
    pub(crate) fn get_or_insert(&mut self, key: &str) -> &mut Entry {
        if let Some(&idx) = self.map.get(key) {
            self.move_to_front(idx);
            return self.nodes[idx].as_mut().map(|n| &mut n.entry).unwrap();
        }

        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            entry: Entry::new(key, self.slot_count),
            prev: None,
            next: self.head,
        });

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }

        self.map.insert(key.to_string(), idx);
        self.nodes[idx].as_mut().map(|n| &mut n.entry).unwrap()
    }

    /// Mark an entry most recently used
    pub(crate) fn touch(&mut self, key: &str) {
        if let Some(&idx) = self.map.get(key) {
            self.move_to_front(idx);
        }
    }

    /// Remove an entry from the table
    pub(crate) fn remove(&mut self, key: &str) -> Option<Entry> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free_node(idx);
        self.nodes[idx].take().map(|node| node.entry)
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Key of the least-recently-used entry that has no live editor
    pub(crate) fn lru_candidate(&self) -> Option<&str> {
        self.iter_lru()
            .find(|entry| entry.current_editor.is_none())
            .map(|entry| entry.key.as_str())
    }

    /// Iterate entries from least to most recently used
    pub(crate) fn iter_lru(&self) -> LruIter<'_> {
        LruIter {
            nodes: &self.nodes,
            cursor: self.tail,
        }
    }

    /// Keys from least to most recently used
    pub(crate) fn keys_lru(&self) -> Vec<String> {
        self.iter_lru().map(|entry| entry.key.clone()).collect()
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return; // Already at front
        }

        self.unlink(idx);

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = if let Some(node) = &self.nodes[idx] {
            (node.prev, node.next)
        } else {
            return;
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }
}

/// Iterator over entries from LRU to MRU
pub(crate) struct LruIter<'a> {
    nodes: &'a [Option<Node>],
    cursor: Option<usize>,
}

impl<'a> Iterator for LruIter<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.nodes[idx].as_ref()?;
        self.cursor = node.prev;
        Some(&node.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(keys: &[&str]) -> EntryTable {
        let mut table = EntryTable::new(1);
        for key in keys {
            table.get_or_insert(key);
        }
        table
    }

    #[test]
    fn test_insertion_order_is_access_order() {
        let table = table_with(&["a", "b", "c"]);

        assert_eq!(table.keys_lru(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_get_touches() {
        let mut table = table_with(&["a", "b", "c"]);

        table.get_mut("a", true).unwrap();

        assert_eq!(table.keys_lru(), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_peek_does_not_touch() {
        let mut table = table_with(&["a", "b"]);

        table.peek("a").unwrap();

        assert_eq!(table.keys_lru(), vec!["a", "b"]);
        assert_eq!(table.get_mut("a", false).unwrap().key, "a");
        assert_eq!(table.keys_lru(), vec!["a", "b"]);
    }

    #[test]
    fn test_reinsert_touches() {
        let mut table = table_with(&["a", "b"]);

        table.get_or_insert("a");

        assert_eq!(table.keys_lru(), vec!["b", "a"]);
    }

    #[test]
    fn test_remove() {
        let mut table = table_with(&["a", "b", "c"]);

        let removed = table.remove("b").unwrap();

        assert_eq!(removed.key, "b");
        assert_eq!(table.len(), 2);
        assert_eq!(table.keys_lru(), vec!["a", "c"]);
        assert!(table.remove("b").is_none());
    }

    #[test]
    fn test_lru_candidate_skips_entries_in_edit() {
        let mut table = table_with(&["a", "b", "c"]);

        table.get_mut("a", false).unwrap().current_editor = Some(7);

        assert_eq!(table.lru_candidate(), Some("b"));
    }

    #[test]
    fn test_lru_candidate_none_when_all_in_edit() {
        let mut table = table_with(&["a"]);

        table.get_mut("a", false).unwrap().current_editor = Some(1);

        assert_eq!(table.lru_candidate(), None);
    }

    #[test]
    fn test_slot_reuse_after_remove() {
        let mut table = table_with(&["a", "b"]);

        table.remove("a");
        table.get_or_insert("c");

        assert_eq!(table.len(), 2);
        assert_eq!(table.keys_lru(), vec!["b", "c"]);
    }

    #[test]
    fn test_entry_total_length() {
        let mut entry = Entry::new("k", 2);
        entry.lengths = vec![100, 20];

        assert_eq!(entry.total_length(), 120);
    }
}
