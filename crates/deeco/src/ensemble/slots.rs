//! Fixed-size member tables
//!
//! Coordinators often aggregate into a small table of "latest value per
//! member". [`SlotTable`] is that table. It is plain knowledge (it has a
//! [`Layout`]), so it can sit inside a record and travel with it.

use rand::{Rng, RngCore};

use crate::{ComponentId, knowledge::Layout, logging::debug};

/// One table entry. Unused entries have `id == ComponentId::NONE`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot<T> {
    pub id: ComponentId,
    pub value: T,
}

/// Up to `N` `(id, value)` pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotTable<T, const N: usize> {
    slots: [Slot<T>; N],
}

/// Where [`SlotTable::admit`] put a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The id already had a slot.
    Updated(usize),
    /// The id took a free slot.
    Inserted(usize),
    /// The table was full and `evicted` lost its slot.
    Evicted { index: usize, evicted: ComponentId },
    /// `ComponentId::NONE` marks free slots and cannot be stored.
    Rejected,
}

impl<T: Copy, const N: usize> SlotTable<T, N> {
    /// An empty table; every slot holds `empty`.
    pub const fn new(empty: T) -> Self {
        assert!(N > 0, "a slot table needs at least one slot");
        Self {
            slots: [Slot {
                id: ComponentId::NONE,
                value: empty,
            }; N],
        }
    }

    /// Store `value` for `id`.
    ///
    /// Updates `id`'s slot if it has one, else takes the first free slot,
    /// else overwrites a slot picked uniformly at random. The reserved
    /// [`ComponentId::NONE`] is refused.
    pub fn admit<G: RngCore>(&mut self, id: ComponentId, value: T, rng: &mut G) -> Admission {
        if id.is_none() {
            debug!("slot table: refusing reserved id {}", id);
            return Admission::Rejected;
        }
        if let Some(index) = self.slots.iter().position(|s| s.id == id) {
            self.slots[index].value = value;
            return Admission::Updated(index);
        }
        if let Some(index) = self.slots.iter().position(|s| s.id.is_none()) {
            self.slots[index] = Slot { id, value };
            return Admission::Inserted(index);
        }
        let index = rng.gen_range(0..N);
        let evicted = self.slots[index].id;
        self.slots[index] = Slot { id, value };
        Admission::Evicted { index, evicted }
    }

    pub fn get(&self, id: ComponentId) -> Option<&T> {
        if id.is_none() {
            return None;
        }
        self.slots.iter().find(|s| s.id == id).map(|s| &s.value)
    }

    /// Free `id`'s slot. The stale value stays behind but is no longer
    /// reachable.
    pub fn remove(&mut self, id: ComponentId) -> Option<T> {
        if id.is_none() {
            return None;
        }
        let slot = self.slots.iter_mut().find(|s| s.id == id)?;
        slot.id = ComponentId::NONE;
        Some(slot.value)
    }

    /// Occupied slots, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &T)> {
        self.slots
            .iter()
            .filter(|s| !s.id.is_none())
            .map(|s| (s.id, &s.value))
    }

    /// Every slot, occupied or not.
    pub fn slots(&self) -> &[Slot<T>; N] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T: Copy + Default, const N: usize> Default for SlotTable<T, N> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Layout> Layout for Slot<T> {
    const SIZE: usize = ComponentId::SIZE + T::SIZE;

    fn write_to(&self, out: &mut [u8]) {
        self.id.write_to(&mut out[..ComponentId::SIZE]);
        self.value.write_to(&mut out[ComponentId::SIZE..Self::SIZE]);
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self {
            id: ComponentId::read_from(&bytes[..ComponentId::SIZE]),
            value: T::read_from(&bytes[ComponentId::SIZE..Self::SIZE]),
        }
    }
}

impl<T: Layout, const N: usize> Layout for SlotTable<T, N> {
    const SIZE: usize = <[Slot<T>; N]>::SIZE;

    fn write_to(&self, out: &mut [u8]) {
        self.slots.write_to(out)
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self {
            slots: <[Slot<T>; N]>::read_from(bytes),
        }
    }
}
