//! Dense index tables and collider tags.

use crate::solver::{Filter, ShapeIndex};

#[derive(Debug)]
enum Slot<T> {
    Vacant,
    Live(T),
    /// Destroyed but not yet freed; the index cannot be reissued.
    Retired,
}

/// Dense `u32` indices with explicit two-phase release.
///
/// [`retire`](Self::retire) drops the record but keeps the index reserved,
/// [`free`](Self::free) makes it available again.
#[derive(Debug)]
pub(super) struct IndexTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    capacity: usize,
}

impl<T> IndexTable<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
        }
    }

    /// Reserve an index and store the record `make` builds for it.
    /// `None` when every index is taken; `make` is not called then.
    pub fn claim(&mut self, make: impl FnOnce(u32) -> T) -> Option<u32> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.slots.len() < self.capacity => {
                let index = u32::try_from(self.slots.len()).ok()?;
                self.slots.push(Slot::Vacant);
                index
            }
            None => return None,
        };
        self.slots[index as usize] = Slot::Live(make(index));
        Some(index)
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        match self.slots.get(index as usize) {
            Some(Slot::Live(record)) => Some(record),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        match self.slots.get_mut(index as usize) {
            Some(Slot::Live(record)) => Some(record),
            _ => None,
        }
    }

    pub fn retire(&mut self, index: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        match std::mem::replace(slot, Slot::Retired) {
            Slot::Live(record) => Some(record),
            Slot::Retired => None,
            Slot::Vacant => {
                *slot = Slot::Vacant;
                None
            }
        }
    }

    pub fn free(&mut self, index: u32) {
        let Some(slot) = self.slots.get_mut(index as usize) else {
            return;
        };
        if !matches!(slot, Slot::Vacant) {
            *slot = Slot::Vacant;
            self.free.push(index);
        }
    }

    /// Retire every live record matching `pred`.
    pub fn retire_where(&mut self, mut pred: impl FnMut(&T) -> bool) {
        for slot in &mut self.slots {
            if let Slot::Live(record) = slot
                && pred(record)
            {
                *slot = Slot::Retired;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Live(record) => Some((index as u32, record)),
            _ => None,
        })
    }
}

const CHAIN_BIT: u32 = 81;
const HIT_BIT: u32 = 80;

/// What a collider's `user_data` carries so hooks and event handlers can
/// work from the collider set alone.
///
/// Bits 0..32 hold shape index + 1, then category, mask and group at 16
/// bits each, then the hit and chain flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ColliderTag {
    pub shape: ShapeIndex,
    pub filter: Filter,
    pub hit_events: bool,
    pub chain: bool,
}

impl ColliderTag {
    pub fn pack(self) -> u128 {
        let mut raw = u128::from(self.shape.0) + 1;
        raw |= u128::from(self.filter.category) << 32;
        raw |= u128::from(self.filter.mask) << 48;
        raw |= u128::from(self.filter.group as u16) << 64;
        raw |= u128::from(self.hit_events) << HIT_BIT;
        raw |= u128::from(self.chain) << CHAIN_BIT;
        raw
    }

    pub fn unpack(raw: u128) -> Option<Self> {
        let low = (raw as u32).checked_sub(1)?;
        Some(Self {
            shape: ShapeIndex(low),
            filter: Filter {
                category: (raw >> 32) as u16,
                mask: (raw >> 48) as u16,
                group: (raw >> 64) as u16 as i16,
            },
            hit_events: (raw >> HIT_BIT) & 1 == 1,
            chain: (raw >> CHAIN_BIT) & 1 == 1,
        })
    }
}

/// Body `user_data`: index + 1, zero for bodies the adapter never sees.
pub(super) fn body_tag(index: u32) -> u128 {
    u128::from(index) + 1
}

pub(super) fn body_index(raw: u128) -> Option<u32> {
    u32::try_from(raw).ok()?.checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_respects_capacity() {
        let mut table = IndexTable::new(2);
        assert_eq!(table.claim(|i| i * 10), Some(0));
        assert_eq!(table.claim(|i| i * 10), Some(1));
        assert_eq!(table.claim(|i| i * 10), None);
        assert_eq!(table.get(1), Some(&10));
    }

    #[test]
    fn test_retired_index_is_not_reissued_until_freed() {
        let mut table = IndexTable::new(1);
        let index = table.claim(|_| "a").unwrap();
        assert_eq!(table.retire(index), Some("a"));
        assert_eq!(table.get(index), None);
        assert_eq!(table.claim(|_| "b"), None);

        table.free(index);
        assert_eq!(table.claim(|_| "c"), Some(index));
        assert_eq!(table.get(index), Some(&"c"));
    }

    #[test]
    fn test_double_free_pushes_once() {
        let mut table = IndexTable::new(4);
        let index = table.claim(|_| ()).unwrap();
        table.free(index);
        table.free(index);
        assert_eq!(table.claim(|_| ()), Some(index));
        assert_eq!(table.claim(|_| ()), Some(1));
    }

    #[test]
    fn test_retire_where() {
        let mut table = IndexTable::new(4);
        for i in 0..3 {
            table.claim(|_| i);
        }
        table.retire_where(|v| *v != 1);
        let live: Vec<_> = table.iter().map(|(i, _)| i).collect();
        assert_eq!(live, vec![1]);
    }

    #[test]
    fn test_collider_tag_packing() {
        let tag = ColliderTag {
            shape: ShapeIndex(8191),
            filter: Filter {
                category: 0x8001,
                mask: 0x00F0,
                group: -3,
            },
            hit_events: true,
            chain: false,
        };
        assert_eq!(ColliderTag::unpack(tag.pack()), Some(tag));
        assert_eq!(ColliderTag::unpack(0), None);
    }

    #[test]
    fn test_body_tag() {
        assert_eq!(body_index(body_tag(0)), Some(0));
        assert_eq!(body_index(0), None);
    }
}
