//! # deeco
//!
//! Components, knowledge and ensembles for small embedded nodes that share
//! state over a slow, lossy byte link.
//!
//! Each node hosts one or more [`Component`]s. A component owns a single,
//! fixed-layout [`Knowledge`] record and a handful of tasks that read the
//! record and write results back into it. Components never call each other.
//! Instead, they publish their knowledge as [`KnowledgeFragment`]s, other
//! nodes decode those fragments into their [`KnowledgeCache`], and
//! [`Ensemble`]s periodically move data between a coordinator component and
//! every member component the cache knows about.
//!
//! ```text
//! task ──write──► Component ──fragments──► wire ──► FrameDecoder
//!                     ▲                                  │
//!                     │                                  ▼
//!                 Ensemble ◄────────── lookup ───── KnowledgeCache
//! ```
//!
//! All storage is fixed at compile time: cache capacity, record sizes, the
//! number of scheduled jobs and aggregate tables are const generics. Shared
//! state is guarded by [`mutex::BlockingMutex`], so the same code runs on a
//! bare-metal MCU with a critical-section mutex, or on a host inside `tokio`.
//!
//! [`Component`]: crate::component::Component
//! [`Knowledge`]: crate::knowledge::Knowledge
//! [`KnowledgeFragment`]: crate::fragment::KnowledgeFragment
//! [`KnowledgeCache`]: crate::cache::KnowledgeCache
//! [`Ensemble`]: crate::ensemble::Ensemble

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub(crate) mod logging;

pub mod cache;
pub mod component;
pub mod ensemble;
pub mod fragment;
pub mod knowledge;
#[cfg(feature = "tokio-std")]
pub mod runtime;
pub mod sched;
pub mod task;
pub mod transport;
pub mod wire_frames;

use core::fmt;

pub use cache::KnowledgeCache;
pub use component::Component;
pub use ensemble::{Ensemble, slots::SlotTable};
pub use fragment::KnowledgeFragment;
pub use knowledge::{Field, Knowledge, Layout, Schema};
pub use logging::set_deeco_internal_log_sink;
pub use sched::{Activation, Job, Scheduler};
pub use transport::{FragmentSink, Receiver, SharedLink, Transport};

/// Identifies a knowledge schema, i.e. the role of a component.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentType(pub u32);

/// Identifies one instance of a component role.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u32);

/// The global addressing key of a knowledge record.
///
/// Unique per node, but the same key may exist on several nodes when the
/// same logical component is replicated.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KnowledgeKey {
    pub ty: ComponentType,
    pub id: ComponentId,
}

// ---- impls ----

impl ComponentId {
    /// Marks an unused slot in aggregate tables.
    pub const NONE: Self = Self(u32::MAX);

    #[inline]
    pub const fn is_none(&self) -> bool {
        self.0 == Self::NONE.0
    }
}

impl KnowledgeKey {
    #[inline]
    pub const fn new(ty: ComponentType, id: ComponentId) -> Self {
        Self { ty, id }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl fmt::Display for KnowledgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ty, self.id)
    }
}
