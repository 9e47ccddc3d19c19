//! Dense index → wrapper tables.
//!
//! The solver issues small integer indices for bodies and shapes and reuses
//! them once freed. A [`HandleTable`] maps each index to the wrapper that
//! currently owns it. Slots are cleared the moment a wrapper is destroyed,
//! before the solver may hand the index out again, so a stale event for a
//! reused index can never resolve to the old wrapper.

/// Sparse-by-slot, dense-by-index table of wrappers.
#[derive(Debug)]
pub(crate) struct HandleTable<T> {
    slots: Vec<Option<T>>,
    live: usize,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
        }
    }

    /// Bind `value` to `index`, growing the table as needed.
    ///
    /// Returns the previous occupant, which indicates the solver reissued an
    /// index that was never released here.
    pub fn insert(&mut self, index: u32, value: T) -> Option<T> {
        let i = index as usize;
        if i >= self.slots.len() {
            self.slots.resize_with(i + 1, || None);
        }
        let previous = self.slots[i].replace(value);
        if previous.is_none() {
            self.live += 1;
        }
        previous
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    /// Clear the slot at `index`.
    pub fn remove(&mut self, index: u32) -> Option<T> {
        let removed = self.slots.get_mut(index as usize).and_then(Option::take);
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|value| (i as u32, value)))
    }

    /// Empty the table, returning every occupant in index order.
    pub fn drain(&mut self) -> Vec<(u32, T)> {
        self.live = 0;
        std::mem::take(&mut self.slots)
            .into_iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|value| (i as u32, value)))
            .collect()
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
