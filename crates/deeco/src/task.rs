//! Tasks bound to a component's knowledge
//!
//! A task reads its component's record and writes one result field. Both
//! happen under a single component lock, so the result always matches the
//! snapshot it was computed from.
//!
//! Triggered tasks chain: the output of one can be the trigger of another,
//! forming a dataflow graph over fields. The [`Scheduler`](crate::Scheduler)
//! rejects graphs that never settle.

use mutex::ScopedRawMutex;

use crate::{
    component::Component,
    knowledge::{Field, Knowledge},
    logging::{trace, warn},
    sched::{Activation, Job},
    transport::FragmentSink,
};

/// Runs `body` every `period_ms` and stores its result in `output`.
pub struct PeriodicTask<'c, R, K, T, F>
where
    R: ScopedRawMutex,
    K: Knowledge,
{
    component: &'c Component<R, K>,
    period_ms: u32,
    output: Field<K, T>,
    body: F,
}

/// Runs `body` whenever the value of `trigger` changes.
///
/// A write that stores the same value again does not count as a change.
/// The task starts armed with the trigger's value at construction.
pub struct TriggeredTask<'c, R, K, T, O, F>
where
    R: ScopedRawMutex,
    K: Knowledge,
{
    component: &'c Component<R, K>,
    trigger: Field<K, T>,
    output: Option<Field<K, O>>,
    last: T,
    body: F,
}

/// Publishes a component's knowledge every `period_ms`.
pub struct PublishTask<'c, R, K, S>
where
    R: ScopedRawMutex,
    K: Knowledge,
    S: FragmentSink + ?Sized,
{
    component: &'c Component<R, K>,
    sink: &'c S,
    period_ms: u32,
}

// ---- impl PeriodicTask ----

impl<'c, R, K, T, F> PeriodicTask<'c, R, K, T, F>
where
    R: ScopedRawMutex,
    K: Knowledge,
    F: FnMut(&K) -> T,
{
    pub fn new(component: &'c Component<R, K>, period_ms: u32, output: Field<K, T>, body: F) -> Self {
        Self {
            component,
            period_ms,
            output,
            body,
        }
    }

    /// Run the body once, now.
    pub fn run(&mut self) {
        let Self {
            component,
            output,
            body,
            ..
        } = self;
        component.update(|k| {
            let out = body(&*k);
            output.set(k, out);
        });
    }
}

impl<R, K, T, F> Job for PeriodicTask<'_, R, K, T, F>
where
    R: ScopedRawMutex,
    K: Knowledge,
    F: FnMut(&K) -> T,
{
    fn activation(&self) -> Activation {
        Activation::Periodic {
            period_ms: self.period_ms,
        }
    }

    fn fire(&mut self) -> bool {
        self.run();
        true
    }
}

// ---- impl TriggeredTask ----

impl<'c, R, K, T, O, F> TriggeredTask<'c, R, K, T, O, F>
where
    R: ScopedRawMutex,
    K: Knowledge,
    T: Copy + PartialEq,
    F: FnMut(&K) -> O,
{
    /// A task whose result is stored in `output`.
    pub fn new(
        component: &'c Component<R, K>,
        trigger: Field<K, T>,
        output: Field<K, O>,
        body: F,
    ) -> Self {
        Self::build(component, trigger, Some(output), body)
    }

    fn build(
        component: &'c Component<R, K>,
        trigger: Field<K, T>,
        output: Option<Field<K, O>>,
        body: F,
    ) -> Self {
        let last = component.read(|k| *trigger.get(k));
        Self {
            component,
            trigger,
            output,
            last,
            body,
        }
    }

    /// Check the trigger and run the body if it changed.
    ///
    /// Returns whether the body ran.
    pub fn poll(&mut self) -> bool {
        let Self {
            component,
            trigger,
            output,
            last,
            body,
        } = self;
        component.modify(|k| {
            let now = *trigger.get(k);
            if now == *last {
                return (false, false);
            }
            *last = now;
            let out = body(&*k);
            match output {
                Some(field) => {
                    field.set(k, out);
                    (true, true)
                }
                None => (true, false),
            }
        })
    }
}

impl<'c, R, K, T, F> TriggeredTask<'c, R, K, T, (), F>
where
    R: ScopedRawMutex,
    K: Knowledge,
    T: Copy + PartialEq,
    F: FnMut(&K),
{
    /// A task that only reacts, without writing a result.
    pub fn observer(component: &'c Component<R, K>, trigger: Field<K, T>, body: F) -> Self {
        Self::build(component, trigger, None, body)
    }
}

impl<R, K, T, O, F> Job for TriggeredTask<'_, R, K, T, O, F>
where
    R: ScopedRawMutex,
    K: Knowledge,
    T: Copy + PartialEq,
    F: FnMut(&K) -> O,
{
    fn activation(&self) -> Activation {
        Activation::OnChange
    }

    fn fire(&mut self) -> bool {
        let ran = self.poll();
        if ran {
            trace!("triggered task ran on {}", self.component.key());
        }
        ran
    }
}

// ---- impl PublishTask ----

impl<'c, R, K, S> PublishTask<'c, R, K, S>
where
    R: ScopedRawMutex,
    K: Knowledge,
    S: FragmentSink + ?Sized,
{
    pub fn new(component: &'c Component<R, K>, sink: &'c S, period_ms: u32) -> Self {
        Self {
            component,
            sink,
            period_ms,
        }
    }
}

impl<R, K, S> Job for PublishTask<'_, R, K, S>
where
    R: ScopedRawMutex,
    K: Knowledge,
    S: FragmentSink + ?Sized,
{
    fn activation(&self) -> Activation {
        Activation::Periodic {
            period_ms: self.period_ms,
        }
    }

    fn fire(&mut self) -> bool {
        if let Err(e) = self.component.publish(self.sink) {
            warn!("publish of {} failed: {}", self.component.key(), e);
        }
        true
    }
}
