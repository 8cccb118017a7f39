//! Components
//!
//! A [`Component`] owns one knowledge record. Tasks, ensembles and the
//! publish path all go through it, and every access holds the component's
//! lock, so a reader never sees a half-written record.
//!
//! Components are usually `static`s, shared by reference with the tasks
//! that run on them:
//!
//! ```rust
//! # deeco::knowledge! {
//! #     #[component_type(deeco::ComponentType(1))]
//! #     #[derive(Clone, Copy, Default)]
//! #     pub struct Sensor { group { pub v: f32 } }
//! # }
//! use deeco::{Component, ComponentId};
//! use mutex::raw_impls::cs::CriticalSectionRawMutex as CSRMutex;
//!
//! static SENSOR: Component<CSRMutex, Sensor> =
//!     Component::new(ComponentId(1), Sensor { v: 0.0 });
//!
//! SENSOR.write(deeco::field!(Sensor, v), 21.5);
//! assert_eq!(SENSOR.snapshot().v, 21.5);
//! ```

use core::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use maitake_sync::WaitQueue;
use mutex::{BlockingMutex, ConstInit, ScopedRawMutex};

use crate::{
    ComponentId, KnowledgeKey,
    fragment::{FragmentError, KnowledgeFragment},
    knowledge::{Field, Knowledge},
    logging::trace,
    transport::{FragmentSink, SendError},
};

/// One component instance and its knowledge.
pub struct Component<R: ScopedRawMutex, K: Knowledge> {
    id: ComponentId,
    knowledge: BlockingMutex<R, K>,
    // Bumped under the knowledge lock, so plain load/store is enough.
    generation: AtomicU32,
    changed: WaitQueue,
}

#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PublishError {
    Fragment(FragmentError),
    Send(SendError),
}

// ---- impl Component ----

impl<R, K> Component<R, K>
where
    R: ScopedRawMutex + ConstInit,
    K: Knowledge,
{
    pub const fn new(id: ComponentId, initial: K) -> Self {
        Self::const_new(R::INIT, id, initial)
    }
}

impl<R, K> Component<R, K>
where
    R: ScopedRawMutex,
    K: Knowledge,
{
    pub const fn const_new(r: R, id: ComponentId, initial: K) -> Self {
        Self {
            id,
            knowledge: BlockingMutex::const_new(r, initial),
            generation: AtomicU32::new(0),
            changed: WaitQueue::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[inline]
    pub fn key(&self) -> KnowledgeKey {
        KnowledgeKey::new(K::TYPE, self.id)
    }

    /// A consistent copy of the whole record.
    pub fn snapshot(&self) -> K {
        self.knowledge.with_lock(|k| *k)
    }

    /// Run `f` on the record with the component locked.
    pub fn read<U, F: FnOnce(&K) -> U>(&self, f: F) -> U {
        self.knowledge.with_lock(|k| f(k))
    }

    /// Modify the record with the component locked.
    ///
    /// Counts as a change for [`wait_changed`](Self::wait_changed) whether or
    /// not `f` actually altered anything.
    pub fn update<U, F: FnOnce(&mut K) -> U>(&self, f: F) -> U {
        self.modify(|k| (f(k), true))
    }

    /// Store `value` in one field.
    pub fn write<T>(&self, field: Field<K, T>, value: T) {
        self.update(|k| field.set(k, value))
    }

    /// Like [`update`](Self::update), but `f` reports whether it wrote.
    pub(crate) fn modify<U, F: FnOnce(&mut K) -> (U, bool)>(&self, f: F) -> U {
        let (out, wrote) = self.knowledge.with_lock(|k| {
            let (out, wrote) = f(k);
            if wrote {
                let next = self.generation.load(Ordering::Relaxed).wrapping_add(1);
                self.generation.store(next, Ordering::Release);
            }
            (out, wrote)
        });
        if wrote {
            self.changed.wake_all();
        }
        out
    }

    /// Number of writes so far, wrapping.
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Wait until the generation differs from `seen`, and return the new one.
    pub async fn wait_changed(&self, seen: u32) -> u32 {
        // Only fails if the queue is closed, and ours never is.
        let _ = self.changed.wait_for(|| self.generation() != seen).await;
        self.generation()
    }

    /// One fragment per field group, all cut from the same snapshot.
    pub fn fragments(&self) -> impl Iterator<Item = Result<KnowledgeFragment, FragmentError>> {
        let snap = self.snapshot();
        let id = self.id;
        (0..K::GROUPS.len()).map(move |i| KnowledgeFragment::group(&snap, id, i))
    }

    /// Send the current record to `sink`, one fragment per field group.
    ///
    /// Returns how many fragments were sent. Stops at the first failure.
    pub fn publish<S: FragmentSink + ?Sized>(&self, sink: &S) -> Result<usize, PublishError> {
        let mut sent = 0;
        for frag in self.fragments() {
            let frag = frag.map_err(PublishError::Fragment)?;
            sink.send_fragment(&frag).map_err(PublishError::Send)?;
            sent += 1;
        }
        trace!("published {} in {} fragments", self.key(), sent);
        Ok(sent)
    }
}

impl<R, K> fmt::Debug for Component<R, K>
where
    R: ScopedRawMutex,
    K: Knowledge + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("generation", &self.generation())
            .field("knowledge", &self.snapshot())
            .finish()
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Fragment(e) => write!(f, "cannot fragment record: {e}"),
            PublishError::Send(e) => write!(f, "cannot send fragment: {e}"),
        }
    }
}

impl core::error::Error for PublishError {}
