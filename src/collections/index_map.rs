// ============================================================================
// spark-observe - Index Map
// Per-slot provenance of a collection since the last flush
// ============================================================================

/// Slot value for an item inserted since the last flush
pub const NEW_ITEM: i32 = -2;

/// Describes how the current contents of a collection relate to its contents
/// at the last flush.
///
/// `entries[i]` is the pre-flush index of the item now at position `i`, or
/// [`NEW_ITEM`]. `deleted_items` lists the pre-flush indices of items that
/// were removed or overwritten. Together, the non-negative entries and the
/// deleted items form a permutation of the pre-flush index range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMap {
    pub entries: Vec<i32>,
    pub deleted_items: Vec<i32>,
}

impl IndexMap {
    /// `[0, 1, ..., len - 1]` with nothing deleted.
    pub fn identity(len: usize) -> Self {
        Self {
            entries: (0..len as i32).collect(),
            deleted_items: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nothing happened since the last flush.
    pub fn is_identity(&self) -> bool {
        self.deleted_items.is_empty()
            && self.entries.iter().enumerate().all(|(i, &e)| e == i as i32)
    }

    /// Whether any slot holds a new item or anything was deleted.
    pub fn has_changes(&self) -> bool {
        !self.is_identity()
    }

    // =========================================================================
    // MUTATION BOOKKEEPING
    // =========================================================================

    pub(crate) fn push_new(&mut self, count: usize) {
        self.entries.extend(std::iter::repeat_n(NEW_ITEM, count));
    }

    pub(crate) fn pop(&mut self) {
        if let Some(entry) = self.entries.pop() {
            self.record_deleted(entry);
        }
    }

    pub(crate) fn shift(&mut self) {
        if !self.entries.is_empty() {
            let entry = self.entries.remove(0);
            self.record_deleted(entry);
        }
    }

    pub(crate) fn unshift_new(&mut self, count: usize) {
        self.entries.splice(0..0, std::iter::repeat_n(NEW_ITEM, count));
    }

    /// Replace `delete_count` slots at `start` with `insert_count` new ones.
    pub(crate) fn splice(&mut self, start: usize, delete_count: usize, insert_count: usize) {
        let start = start.min(self.entries.len());
        let end = start.saturating_add(delete_count).min(self.entries.len());
        let removed: Vec<i32> = self
            .entries
            .splice(start..end, std::iter::repeat_n(NEW_ITEM, insert_count))
            .collect();
        for entry in removed {
            self.record_deleted(entry);
        }
    }

    pub(crate) fn remove(&mut self, index: usize) {
        if index < self.entries.len() {
            let entry = self.entries.remove(index);
            self.record_deleted(entry);
        }
    }

    /// Overwrite a slot: the previous occupant counts as deleted.
    pub(crate) fn replace(&mut self, index: usize) {
        if let Some(slot) = self.entries.get_mut(index) {
            let entry = std::mem::replace(slot, NEW_ITEM);
            self.record_deleted(entry);
        }
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        while self.entries.len() > len {
            self.pop();
        }
    }

    pub(crate) fn clear(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        for entry in entries {
            self.record_deleted(entry);
        }
    }

    pub(crate) fn reverse(&mut self) {
        self.entries.reverse();
    }

    fn record_deleted(&mut self, entry: i32) {
        if entry >= 0 {
            self.deleted_items.push(entry);
        }
    }

    // =========================================================================
    // REPLAY
    // =========================================================================

    /// Rebuild the current contents from the pre-flush contents.
    ///
    /// `current` supplies the items at new slots. Returns `None` when the map
    /// does not fit the given collections.
    pub fn replay<T: Clone>(&self, previous: &[T], current: &[T]) -> Option<Vec<T>> {
        if self.entries.len() != current.len() {
            return None;
        }
        self.entries
            .iter()
            .enumerate()
            .map(|(i, &entry)| {
                if entry == NEW_ITEM {
                    Some(current[i].clone())
                } else {
                    usize::try_from(entry).ok().and_then(|e| previous.get(e).cloned())
                }
            })
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
