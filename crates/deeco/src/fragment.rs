//! Knowledge fragments
//!
//! A fragment is the unit that crosses the wire: a byte range of one
//! component's record, addressed by `(type, id)` and an offset. Fragments are
//! transient. They are built right before they are framed and sent, or right
//! after they are decoded, and are consumed by the next hop.

use core::fmt;

use heapless::Vec;

use crate::{
    ComponentId, ComponentType, KnowledgeKey,
    knowledge::{Knowledge, Schema},
};

/// The largest payload a fragment carries, and so the largest record size
/// that can be published as a single fragment.
pub const MAX_FRAGMENT_DATA: usize = 512;

/// A byte range of a knowledge record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeFragment {
    key: KnowledgeKey,
    offset: u16,
    data: Vec<u8, MAX_FRAGMENT_DATA>,
}

#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FragmentError {
    /// The payload does not fit `MAX_FRAGMENT_DATA`, or the end offset does
    /// not fit the 16-bit wire field.
    TooLarge,
    /// The range ends past the end of the record.
    OutOfBounds,
    /// The record has no group with that index.
    NoSuchGroup,
}

/// Hex dump of a fragment for diagnostics.
///
/// One header line, then the payload 16 bytes per line in pairs. Long
/// payloads are cut after [`FragmentDump::LIMIT`] bytes.
pub struct FragmentDump<'a>(pub &'a KnowledgeFragment);

// ---- impls ----

impl KnowledgeFragment {
    /// Wrap raw payload bytes destined for `offset` of record `key`.
    pub fn new(key: KnowledgeKey, offset: u16, data: &[u8]) -> Result<Self, FragmentError> {
        let end = usize::from(offset) + data.len();
        if end > usize::from(u16::MAX) {
            return Err(FragmentError::TooLarge);
        }
        let data = Vec::from_slice(data).map_err(|_| FragmentError::TooLarge)?;
        Ok(Self { key, offset, data })
    }

    /// Copy `size` bytes at `offset` out of `knowledge`'s wire image.
    pub fn encode<K: Knowledge>(
        knowledge: &K,
        id: ComponentId,
        offset: usize,
        size: usize,
    ) -> Result<Self, FragmentError> {
        let end = offset.checked_add(size).ok_or(FragmentError::OutOfBounds)?;
        if end > K::SIZE {
            return Err(FragmentError::OutOfBounds);
        }
        let image = knowledge
            .to_bytes::<MAX_FRAGMENT_DATA>()
            .ok_or(FragmentError::TooLarge)?;
        let offset = u16::try_from(offset).map_err(|_| FragmentError::TooLarge)?;
        Self::new(
            KnowledgeKey::new(K::TYPE, id),
            offset,
            &image[usize::from(offset)..end],
        )
    }

    /// The fragment carrying field group `index` of `knowledge`.
    pub fn group<K: Knowledge>(
        knowledge: &K,
        id: ComponentId,
        index: usize,
    ) -> Result<Self, FragmentError> {
        let (offset, size) = Schema::of::<K>()
            .group_ranges()
            .nth(index)
            .ok_or(FragmentError::NoSuchGroup)?;
        Self::encode(knowledge, id, offset, size)
    }

    /// The fragment carrying the full record.
    pub fn whole<K: Knowledge>(knowledge: &K, id: ComponentId) -> Result<Self, FragmentError> {
        Self::encode(knowledge, id, 0, K::SIZE)
    }

    #[inline]
    pub fn key(&self) -> KnowledgeKey {
        self.key
    }

    #[inline]
    pub fn ty(&self) -> ComponentType {
        self.key.ty
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.key.id
    }

    #[inline]
    pub fn offset(&self) -> usize {
        usize::from(self.offset)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl FragmentDump<'_> {
    pub const LIMIT: usize = 256;
}

impl fmt::Display for FragmentDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frag = self.0;
        write!(
            f,
            "Fragment:Type:{} Id:{} Size:{:04X} Offset:{:04X}",
            frag.ty(),
            frag.id(),
            frag.size(),
            frag.offset()
        )?;
        for (i, byte) in frag.data().iter().enumerate() {
            if i == Self::LIMIT {
                return f.write_str(" ...");
            }
            if i % 16 == 0 {
                f.write_str("\n\t")?;
            }
            if i % 2 == 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "defmt-v1")]
impl defmt::Format for FragmentDump<'_> {
    fn format(&self, f: defmt::Formatter<'_>) {
        let frag = self.0;
        let shown = frag.size().min(Self::LIMIT);
        defmt::write!(
            f,
            "Fragment:Type:{=u32:x} Id:{=u32:x} Size:{=usize} Offset:{=usize} {=[u8]:x}",
            frag.ty().0,
            frag.id().0,
            frag.size(),
            frag.offset(),
            &frag.data()[..shown],
        )
    }
}

impl fmt::Display for FragmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentError::TooLarge => f.write_str("fragment too large"),
            FragmentError::OutOfBounds => f.write_str("range past end of record"),
            FragmentError::NoSuchGroup => f.write_str("no such field group"),
        }
    }
}

impl core::error::Error for FragmentError {}
