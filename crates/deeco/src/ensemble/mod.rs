//! Ensembles
//!
//! An ensemble ties one coordinator role to one member role. It is declared
//! once and instantiated on both sides:
//!
//! - on the coordinator's node, a [`CoordinatorExchange`] periodically walks
//!   the cached members, keeps those that [`is_member`](Ensemble::is_member)
//!   accepts, and folds each one into the coordinator's aggregate field;
//! - on a member's node, a [`MemberExchange`] looks for cached coordinators
//!   that accept it and writes the mapped value into the member.
//!
//! Neither side talks to the other directly. Both only read the local
//! [`KnowledgeCache`](crate::KnowledgeCache) and write local components.

pub mod slots;

use mutex::ScopedRawMutex;

use crate::{
    ComponentId,
    cache::KnowledgeView,
    component::Component,
    knowledge::{Field, Knowledge},
    logging::trace,
    sched::{Activation, Job},
};

/// A coordinator/member relationship.
///
/// The methods take `&mut self` so an ensemble may keep state between
/// calls, e.g. a random number generator for slot eviction.
pub trait Ensemble {
    type Coord: Knowledge;
    type Member: Knowledge;
    /// The coordinator field members are aggregated into.
    type CoordField: Copy;
    /// The member field written from the coordinator.
    type MemberField;

    const PERIOD_MS: u32;

    /// Whether `member` belongs with `coord`. Evaluated on both sides.
    fn is_member(
        &mut self,
        coord_id: ComponentId,
        coord: &Self::Coord,
        member_id: ComponentId,
        member: &Self::Member,
    ) -> bool;

    /// The coordinator's aggregate after taking in one member.
    ///
    /// `coord` already holds the aggregate built from the members before
    /// this one.
    fn member_to_coord(
        &mut self,
        coord: &Self::Coord,
        member_id: ComponentId,
        member: &Self::Member,
    ) -> Self::CoordField;

    /// The value to write into the member for this coordinator.
    fn coord_to_member(
        &mut self,
        member: &Self::Member,
        coord_id: ComponentId,
        coord: &Self::Coord,
    ) -> Self::MemberField;
}

/// The coordinator side of an ensemble.
pub struct CoordinatorExchange<'a, E, R, V>
where
    E: Ensemble,
    R: ScopedRawMutex,
{
    ensemble: E,
    coordinator: &'a Component<R, E::Coord>,
    aggregate: Field<E::Coord, E::CoordField>,
    cache: &'a V,
}

/// The member side of an ensemble.
pub struct MemberExchange<'a, E, R, V>
where
    E: Ensemble,
    R: ScopedRawMutex,
{
    ensemble: E,
    member: &'a Component<R, E::Member>,
    target: Field<E::Member, E::MemberField>,
    cache: &'a V,
}

/// Both roles share a type and the cache holds this very component.
fn is_self<E: Ensemble>(coord_id: ComponentId, member_id: ComponentId) -> bool {
    <E::Member as Knowledge>::TYPE == <E::Coord as Knowledge>::TYPE && coord_id == member_id
}

// ---- impl CoordinatorExchange ----

impl<'a, E, R, V> CoordinatorExchange<'a, E, R, V>
where
    E: Ensemble,
    R: ScopedRawMutex,
    V: KnowledgeView,
{
    pub fn new(
        ensemble: E,
        coordinator: &'a Component<R, E::Coord>,
        aggregate: Field<E::Coord, E::CoordField>,
        cache: &'a V,
    ) -> Self {
        Self {
            ensemble,
            coordinator,
            aggregate,
            cache,
        }
    }

    /// One exchange pass. Returns how many members were taken in.
    ///
    /// The coordinator is written once, at the end, and only if at least one
    /// member was accepted.
    pub fn exchange(&mut self) -> usize {
        let coord_id = self.coordinator.id();
        let mut working = self.coordinator.snapshot();
        let mut accepted = 0;

        let Self {
            ensemble,
            aggregate,
            cache,
            ..
        } = self;
        cache.for_each::<E::Member, _>(|member_id, member| {
            if is_self::<E>(coord_id, member_id) {
                return;
            }
            if !ensemble.is_member(coord_id, &working, member_id, member) {
                return;
            }
            let value = ensemble.member_to_coord(&working, member_id, member);
            aggregate.set(&mut working, value);
            accepted += 1;
        });

        if accepted > 0 {
            let value = *aggregate.get(&working);
            self.coordinator.write(*aggregate, value);
            trace!("ensemble: {} took in {} members", self.coordinator.key(), accepted);
        }
        accepted
    }
}

impl<E, R, V> Job for CoordinatorExchange<'_, E, R, V>
where
    E: Ensemble,
    R: ScopedRawMutex,
    V: KnowledgeView,
{
    fn activation(&self) -> Activation {
        Activation::Periodic {
            period_ms: E::PERIOD_MS,
        }
    }

    fn fire(&mut self) -> bool {
        self.exchange();
        true
    }
}

// ---- impl MemberExchange ----

impl<'a, E, R, V> MemberExchange<'a, E, R, V>
where
    E: Ensemble,
    R: ScopedRawMutex,
    V: KnowledgeView,
{
    pub fn new(
        ensemble: E,
        member: &'a Component<R, E::Member>,
        target: Field<E::Member, E::MemberField>,
        cache: &'a V,
    ) -> Self {
        Self {
            ensemble,
            member,
            target,
            cache,
        }
    }

    /// One exchange pass. Returns how many coordinators accepted the member.
    ///
    /// Each accepting coordinator's mapped value is written in turn, so with
    /// several of them the one visited last wins. With none cached, the
    /// member is left alone. The check, the mapping and the write for one
    /// coordinator happen under a single lock of the member.
    pub fn exchange(&mut self) -> usize {
        let member_id = self.member.id();
        let mut accepted = 0;

        let Self {
            ensemble,
            member,
            target,
            cache,
        } = self;
        cache.for_each::<E::Coord, _>(|coord_id, coord| {
            if is_self::<E>(coord_id, member_id) {
                return;
            }
            let took = member.modify(|k| {
                if !ensemble.is_member(coord_id, coord, member_id, k) {
                    return (false, false);
                }
                let value = ensemble.coord_to_member(k, coord_id, coord);
                target.set(k, value);
                (true, true)
            });
            if took {
                accepted += 1;
            }
        });

        if accepted == 0 {
            trace!("ensemble: no coordinator for {}", self.member.key());
        }
        accepted
    }
}

impl<E, R, V> Job for MemberExchange<'_, E, R, V>
where
    E: Ensemble,
    R: ScopedRawMutex,
    V: KnowledgeView,
{
    fn activation(&self) -> Activation {
        Activation::Periodic {
            period_ms: E::PERIOD_MS,
        }
    }

    fn fire(&mut self) -> bool {
        self.exchange();
        true
    }
}
