//! The QPACK dynamic table (RFC 9204 §3.2.2 / §3.2.3): an ordered ring of
//! entries indexed by an absolute index that increases monotonically for
//! the lifetime of the table and is never reused, with capacity-bounded
//! FIFO eviction. spec.md §3 "QPACK dynamic table".
//!
//! Both the encoder and the decoder own one of these — RFC 9204 requires
//! their contents to stay byte-identical entry-for-entry as encoder-stream
//! instructions are applied in order (spec.md §8).

use std::collections::VecDeque;

use super::HeaderField;

/// A dynamic-table entry plus its absolute insertion index.
#[derive(Debug, Clone)]
struct Entry {
    absolute_index: u64,
    field: HeaderField,
}

#[derive(Debug)]
pub struct DynamicTable {
    entries: VecDeque<Entry>,
    /// Absolute index that will be assigned to the *next* inserted entry.
    next_absolute_index: u64,
    /// Sum of `HeaderField::size()` for all entries currently held.
    size: usize,
    /// Negotiated capacity; never exceeded (spec.md §3 invariant).
    capacity: usize,
    /// The maximum capacity the peer is allowed to request via "Set
    /// Dynamic Table Capacity" — `SETTINGS_QPACK_MAX_TABLE_CAPACITY`.
    max_capacity: usize,
    /// Entries referenced by a header block that hasn't been acknowledged
    /// yet must not be evicted. Keyed by absolute index, counted because
    /// more than one in-flight block may reference the same entry.
    refcounts: std::collections::HashMap<u64, u32>,
}

impl DynamicTable {
    pub fn new(max_capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_absolute_index: 0,
            size: 0,
            capacity: 0,
            max_capacity,
            refcounts: std::collections::HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn insert_count(&self) -> u64 {
        self.next_absolute_index
    }

    /// Entries currently held, oldest first.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest absolute index still present, or `insert_count()` if empty.
    fn oldest_index(&self) -> u64 {
        self.entries.front().map(|e| e.absolute_index).unwrap_or(self.next_absolute_index)
    }

    /// "Set Dynamic Table Capacity" (§4.1 instruction). Never exceeds
    /// `max_capacity`; evicts down to fit if shrinking.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), super::QpackError> {
        if capacity > self.max_capacity {
            return Err(super::QpackError::EncoderStreamError(format!(
                "capacity {capacity} exceeds negotiated maximum {}",
                self.max_capacity
            )));
        }
        self.capacity = capacity;
        self.evict_to_fit();
        Ok(())
    }

    fn evict_to_fit(&mut self) {
        while self.size > self.capacity {
            let Some(front) = self.entries.front() else { break };
            if self.refcounts.contains_key(&front.absolute_index) {
                // Referenced by an un-acked block; cannot evict yet
                // (spec.md §3 eviction policy). The caller is expected not
                // to have let size exceed capacity in this situation; this
                // is a defensive stop, not an expected steady state.
                break;
            }
            let front = self.entries.pop_front().expect("checked above");
            self.size -= front.field.size();
        }
    }

    /// Insert a new entry, evicting from the oldest end as needed to make
    /// room. Returns the new entry's absolute index, or `None` if the entry
    /// alone exceeds capacity (RFC 9204 §3.2.2).
    pub fn insert(&mut self, field: HeaderField) -> Option<u64> {
        let entry_size = field.size();
        if entry_size > self.capacity {
            return None;
        }
        while self.size + entry_size > self.capacity {
            let Some(front) = self.entries.front() else { break };
            if self.refcounts.contains_key(&front.absolute_index) {
                return None;
            }
            let front = self.entries.pop_front().expect("checked above");
            self.size -= front.field.size();
        }
        let index = self.next_absolute_index;
        self.entries.push_back(Entry { absolute_index: index, field });
        self.size += entry_size;
        self.next_absolute_index += 1;
        Some(index)
    }

    /// Duplicate an existing entry, re-inserting it at the front of
    /// eviction order with a fresh absolute index (the "Duplicate"
    /// encoder-stream instruction, spec.md §4.1 step 2b).
    pub fn duplicate(&mut self, absolute_index: u64) -> Option<u64> {
        let field = self.get(absolute_index)?.clone();
        self.insert(field)
    }

    /// Look up an entry by absolute index.
    pub fn get(&self, absolute_index: u64) -> Option<&HeaderField> {
        if absolute_index < self.oldest_index() || absolute_index >= self.next_absolute_index {
            return None;
        }
        let offset = (absolute_index - self.oldest_index()) as usize;
        self.entries.get(offset).map(|e| &e.field)
    }

    /// Find an entry by exact `(name, value)`, for the encoder.
    pub fn find(&self, name: &[u8], value: &[u8]) -> Option<u64> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.field.name == name && e.field.value == value)
            .map(|e| e.absolute_index)
    }

    /// Find an entry by name only, for "literal with name reference".
    pub fn find_name(&self, name: &[u8]) -> Option<u64> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.field.name == name)
            .map(|e| e.absolute_index)
    }

    /// Mark an entry as referenced by an outstanding (un-acked) header
    /// block so it survives eviction until released.
    pub fn add_ref(&mut self, absolute_index: u64) {
        *self.refcounts.entry(absolute_index).or_insert(0) += 1;
    }

    /// Release a reference previously taken with [`Self::add_ref`], then
    /// retry eviction in case this was the last thing blocking it.
    pub fn release_ref(&mut self, absolute_index: u64) {
        if let std::collections::hash_map::Entry::Occupied(mut o) =
            self.refcounts.entry(absolute_index)
        {
            *o.get_mut() -= 1;
            if *o.get() == 0 {
                o.remove();
            }
        }
        self.evict_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, value: &str) -> HeaderField {
        HeaderField::new(name.as_bytes().to_vec(), value.as_bytes().to_vec())
    }

    #[test]
    fn absolute_indices_never_reused() {
        let mut table = DynamicTable::new(1024);
        table.set_capacity(1024).unwrap();
        let i0 = table.insert(field("a", "1")).unwrap();
        let i1 = table.insert(field("b", "2")).unwrap();
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
        assert_eq!(table.insert_count(), 2);
    }

    #[test]
    fn evicts_oldest_first_under_capacity_pressure() {
        let mut table = DynamicTable::new(1024);
        // Each entry costs len("k")+len("v")+32 = 34 bytes.
        table.set_capacity(34 * 2).unwrap();
        let i0 = table.insert(field("k0", "v")).unwrap();
        let _i1 = table.insert(field("k1", "v")).unwrap();
        assert!(table.get(i0).is_some());
        let _i2 = table.insert(field("k2", "v")).unwrap();
        assert!(table.get(i0).is_none(), "oldest entry should have been evicted");
        assert!(table.size() <= table.capacity());
    }

    #[test]
    fn referenced_entries_survive_eviction_pressure() {
        let mut table = DynamicTable::new(1024);
        table.set_capacity(34 * 2).unwrap();
        let i0 = table.insert(field("k0", "v")).unwrap();
        table.add_ref(i0);
        let _i1 = table.insert(field("k1", "v")).unwrap();
        // Would normally evict i0 to fit i2, but it's referenced.
        assert!(table.insert(field("k2", "v")).is_none());
        assert!(table.get(i0).is_some());
        table.release_ref(i0);
        assert!(table.insert(field("k2", "v")).is_some());
    }

    #[test]
    fn capacity_never_exceeds_negotiated_maximum() {
        let mut table = DynamicTable::new(100);
        assert!(table.set_capacity(200).is_err());
        assert!(table.set_capacity(100).is_ok());
    }

    #[test]
    fn duplicate_gets_a_fresh_absolute_index() {
        let mut table = DynamicTable::new(1024);
        table.set_capacity(1024).unwrap();
        let i0 = table.insert(field("k", "v")).unwrap();
        let i1 = table.duplicate(i0).unwrap();
        assert_ne!(i0, i1);
        assert_eq!(table.get(i0), table.get(i1));
    }
}
