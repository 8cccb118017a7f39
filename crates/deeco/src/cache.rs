//! The knowledge cache
//!
//! Every node keeps the latest bytes it has seen for each remote
//! `(type, id)`. Fragments are applied in place, whole field groups at a
//! time, under the cache's [`BlockingMutex`], so a reader never sees a group
//! that is half old and half new.
//!
//! The cache has a fixed number of entries (`N`) of a fixed size (`S`
//! bytes). When it is full, a fragment for a new key takes over the entry
//! that has gone longest without an update. Entries are never expired by
//! age: stale knowledge is still knowledge, and [`KnowledgeCache::last_update`]
//! is there for callers that want to judge it.

use core::fmt;

use heapless::Vec;
use mutex::{BlockingMutex, ConstInit, ScopedRawMutex};

use crate::{
    ComponentId, ComponentType, KnowledgeKey,
    fragment::{FragmentDump, KnowledgeFragment, MAX_FRAGMENT_DATA},
    knowledge::{Knowledge, RangeError, Schema, Schemas},
    logging::{debug, trace, warn},
};

/// Read access to knowledge of other components, as used by ensembles.
pub trait KnowledgeView {
    /// The latest known record of `K` for `id`.
    fn lookup<K: Knowledge>(&self, id: ComponentId) -> Option<K>;

    /// Visit every known record of `K`, in no particular order.
    fn for_each<K: Knowledge, F: FnMut(ComponentId, &K)>(&self, f: F);
}

/// What happened to the cache when a fragment was applied.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// First fragment for this key; the rest of the record reads as zeroes.
    Created,
    Updated,
    /// The cache was full and `evicted` made room for the new key.
    Replaced { evicted: KnowledgeKey },
}

/// A fragment the cache refused. The cache is unchanged.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolViolation {
    UnknownType(ComponentType),
    /// The record type is larger than this cache's entries.
    RecordTooLarge(ComponentType),
    Empty(KnowledgeKey),
    OutOfBounds(KnowledgeKey),
    /// The fragment splits a field group, applying it would tear the group.
    StraddlesGroup(KnowledgeKey),
}

struct Entry<const S: usize> {
    key: KnowledgeKey,
    updated_ms: u64,
    data: [u8; S],
}

/// Fixed-capacity store of remote knowledge.
pub struct KnowledgeCache<R: ScopedRawMutex, const N: usize, const S: usize = MAX_FRAGMENT_DATA> {
    schemas: &'static [Schema],
    entries: BlockingMutex<R, Vec<Entry<S>, N>>,
}

// ---- impl KnowledgeCache ----

impl<R, const N: usize, const S: usize> KnowledgeCache<R, N, S>
where
    R: ScopedRawMutex + ConstInit,
{
    /// Create an empty cache that accepts the record types in `schemas`.
    ///
    /// ```rust
    /// # deeco::knowledge! {
    /// #     #[component_type(deeco::ComponentType(1))]
    /// #     #[derive(Clone, Copy)]
    /// #     pub struct Sensor { group { pub v: f32 } }
    /// # }
    /// use deeco::{KnowledgeCache, Schema};
    /// use mutex::raw_impls::cs::CriticalSectionRawMutex as CSRMutex;
    ///
    /// static SCHEMAS: &[Schema] = &[Schema::of::<Sensor>()];
    /// static CACHE: KnowledgeCache<CSRMutex, 16, 64> = KnowledgeCache::new(SCHEMAS);
    /// ```
    pub const fn new(schemas: &'static [Schema]) -> Self {
        Self {
            schemas,
            entries: BlockingMutex::new(Vec::new()),
        }
    }
}

impl<R, const N: usize, const S: usize> KnowledgeCache<R, N, S>
where
    R: ScopedRawMutex,
{
    /// Create an empty cache with an explicit mutex instance.
    pub const fn const_new(r: R, schemas: &'static [Schema]) -> Self {
        Self {
            schemas,
            entries: BlockingMutex::const_new(r, Vec::new()),
        }
    }

    /// The record types this cache accepts. Frame decoders feeding the
    /// cache should validate against the same table.
    pub fn schemas(&self) -> &'static [Schema] {
        self.schemas
    }

    /// Copy `frag` into the record it addresses.
    ///
    /// Fragments must cover whole field groups. Anything else is refused
    /// without touching the cache.
    pub fn apply(&self, frag: &KnowledgeFragment, now_ms: u64) -> Result<Applied, ProtocolViolation> {
        let key = frag.key();
        let schema = self
            .schemas
            .schema(key.ty)
            .ok_or(ProtocolViolation::UnknownType(key.ty))?;
        if schema.size > S {
            return Err(ProtocolViolation::RecordTooLarge(key.ty));
        }
        schema
            .check(frag.offset(), frag.size())
            .map_err(|e| match e {
                RangeError::Empty => ProtocolViolation::Empty(key),
                RangeError::OutOfBounds => ProtocolViolation::OutOfBounds(key),
                RangeError::StraddlesGroup => ProtocolViolation::StraddlesGroup(key),
            })?;

        let range = frag.offset()..frag.offset() + frag.size();
        let applied = self.entries.with_lock(|entries| {
            if let Some(entry) = entries.iter_mut().find(|e| e.key == key) {
                entry.data[range].copy_from_slice(frag.data());
                entry.updated_ms = now_ms;
                return Applied::Updated;
            }

            let mut fresh = Entry {
                key,
                updated_ms: now_ms,
                data: [0u8; S],
            };
            fresh.data[range].copy_from_slice(frag.data());

            match entries.push(fresh) {
                Ok(()) => Applied::Created,
                Err(fresh) => {
                    // Full: the entry with the oldest update makes room.
                    let mut oldest = 0;
                    for (i, e) in entries.iter().enumerate() {
                        if e.updated_ms < entries[oldest].updated_ms {
                            oldest = i;
                        }
                    }
                    match entries.get_mut(oldest) {
                        Some(slot) => {
                            let evicted = slot.key;
                            *slot = fresh;
                            Applied::Replaced { evicted }
                        }
                        // N == 0, nothing can ever be cached.
                        None => Applied::Replaced { evicted: key },
                    }
                }
            }
        });

        match applied {
            Applied::Created => debug!("cache: new entry {}", key),
            Applied::Replaced { evicted } => debug!("cache: {} replaced {}", key, evicted),
            Applied::Updated => {}
        }
        trace!("cache: applied {}", FragmentDump(frag));
        Ok(applied)
    }

    /// The latest known record of `K` for `id`.
    pub fn lookup<K: Knowledge>(&self, id: ComponentId) -> Option<K> {
        if K::SIZE > S {
            warn!("cache: {} records do not fit {} byte entries", K::TYPE, S);
            return None;
        }
        let key = KnowledgeKey::new(K::TYPE, id);
        self.entries.with_lock(|entries| {
            entries
                .iter()
                .find(|e| e.key == key)
                .map(|e| K::read_from(&e.data[..K::SIZE]))
        })
    }

    /// Run `f` on the raw bytes of the record for `key`.
    ///
    /// `f` runs with the cache locked. It must be short and must not touch
    /// this cache.
    pub fn lookup_raw<U, F: FnOnce(&[u8]) -> U>(&self, key: KnowledgeKey, f: F) -> Option<U> {
        let size = self.schemas.schema(key.ty)?.size.min(S);
        self.entries.with_lock(|entries| {
            entries
                .iter()
                .find(|e| e.key == key)
                .map(|e| f(&e.data[..size]))
        })
    }

    /// When `key` was last written, in the time base passed to [`apply`](Self::apply).
    pub fn last_update(&self, key: KnowledgeKey) -> Option<u64> {
        self.entries.with_lock(|entries| {
            entries
                .iter()
                .find(|e| e.key == key)
                .map(|e| e.updated_ms)
        })
    }

    /// Visit every known record of `K`, in no particular order.
    ///
    /// The cache is locked once per entry, not for the whole walk, so `f`
    /// may take other locks. Records applied during the walk may or may not
    /// be visited.
    pub fn for_each<K: Knowledge, F: FnMut(ComponentId, &K)>(&self, mut f: F) {
        if K::SIZE > S {
            warn!("cache: {} records do not fit {} byte entries", K::TYPE, S);
            return;
        }
        for idx in 0..N {
            let item = self.entries.with_lock(|entries| {
                entries.get(idx).map(|e| {
                    (e.key.ty == K::TYPE).then(|| (e.key.id, K::read_from(&e.data[..K::SIZE])))
                })
            });
            match item {
                None => break,
                Some(None) => {}
                Some(Some((id, k))) => f(id, &k),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.with_lock(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<R, const N: usize, const S: usize> KnowledgeView for KnowledgeCache<R, N, S>
where
    R: ScopedRawMutex,
{
    fn lookup<K: Knowledge>(&self, id: ComponentId) -> Option<K> {
        KnowledgeCache::lookup::<K>(self, id)
    }

    fn for_each<K: Knowledge, F: FnMut(ComponentId, &K)>(&self, f: F) {
        KnowledgeCache::for_each::<K, F>(self, f)
    }
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolViolation::UnknownType(ty) => write!(f, "unknown record type {ty}"),
            ProtocolViolation::RecordTooLarge(ty) => write!(f, "{ty} records exceed cache entries"),
            ProtocolViolation::Empty(key) => write!(f, "empty fragment for {key}"),
            ProtocolViolation::OutOfBounds(key) => write!(f, "fragment past end of {key}"),
            ProtocolViolation::StraddlesGroup(key) => {
                write!(f, "fragment for {key} splits a field group")
            }
        }
    }
}

impl core::error::Error for ProtocolViolation {}
