//! Cooperative scheduling
//!
//! Everything that runs on a node, whether a task, an ensemble exchange or
//! a publisher, is a [`Job`]. A job is either periodic or fires when its
//! component changes. [`Scheduler`] runs a fixed set of jobs from a super
//! loop:
//!
//! ```rust,ignore
//! loop {
//!     sched.tick(clock.now_ms())?;
//!     sleep_until(sched.next_deadline());
//! }
//! ```
//!
//! Hosts with an async runtime can drive jobs from the `runtime` module
//! instead.

use core::fmt;

use heapless::Vec;

use crate::logging::{error, trace};

/// When a job wants to run.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Periodic { period_ms: u32 },
    /// Whenever the knowledge it watches may have changed.
    OnChange,
}

/// A unit of work the scheduler can run.
pub trait Job {
    fn activation(&self) -> Activation;

    /// Run the job, or for change-triggered jobs, check and maybe run.
    ///
    /// Returns whether the job's body actually ran.
    fn fire(&mut self) -> bool;
}

#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchedError {
    /// No free job slot.
    Full,
    /// Change-triggered jobs kept triggering each other.
    Cycle,
}

struct Slot<'a> {
    job: &'a mut dyn Job,
    due_ms: u64,
}

/// Runs up to `N` jobs.
pub struct Scheduler<'a, const N: usize> {
    slots: Vec<Slot<'a>, N>,
}

impl<'a, const N: usize> Scheduler<'a, N> {
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Add a job. Periodic jobs first run one period after `now_ms`.
    pub fn add(&mut self, job: &'a mut dyn Job, now_ms: u64) -> Result<(), SchedError> {
        let due_ms = match job.activation() {
            Activation::Periodic { period_ms } => now_ms + u64::from(period_ms),
            Activation::OnChange => now_ms,
        };
        self.slots
            .push(Slot { job, due_ms })
            .map_err(|_| SchedError::Full)
    }

    /// Run every periodic job that is due, then let change-triggered jobs
    /// react until nothing changes any more.
    ///
    /// Returns how many job bodies ran.
    pub fn tick(&mut self, now_ms: u64) -> Result<usize, SchedError> {
        let mut ran = 0;

        for slot in self.slots.iter_mut() {
            let Activation::Periodic { period_ms } = slot.job.activation() else {
                continue;
            };
            if slot.due_ms > now_ms {
                continue;
            }
            if slot.job.fire() {
                ran += 1;
            }
            slot.due_ms += u64::from(period_ms);
            if slot.due_ms <= now_ms {
                // Fell behind. Skip the missed periods rather than bursting.
                trace!("sched: job overran, skipping missed periods");
                slot.due_ms = now_ms + u64::from(period_ms);
            }
        }

        // A chain of triggered jobs settles within one pass per job, plus a
        // quiet pass to see it settled.
        for _ in 0..=N + 1 {
            let mut any = false;
            for slot in self.slots.iter_mut() {
                if slot.job.activation() == Activation::OnChange && slot.job.fire() {
                    any = true;
                    ran += 1;
                }
            }
            if !any {
                return Ok(ran);
            }
        }

        error!("sched: triggered jobs did not settle, dependency cycle?");
        Err(SchedError::Cycle)
    }

    /// The earliest time a periodic job is due, if there are any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.slots
            .iter()
            .filter(|s| matches!(s.job.activation(), Activation::Periodic { .. }))
            .map(|s| s.due_ms)
            .min()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<const N: usize> Default for Scheduler<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::Full => f.write_str("no free job slot"),
            SchedError::Cycle => f.write_str("triggered jobs form a cycle"),
        }
    }
}

impl core::error::Error for SchedError {}

#[cfg(test)]
mod test {
    use super::{Activation, Job, SchedError, Scheduler};

    struct Counter {
        period_ms: u32,
        runs: u32,
    }

    impl Job for Counter {
        fn activation(&self) -> Activation {
            Activation::Periodic {
                period_ms: self.period_ms,
            }
        }

        fn fire(&mut self) -> bool {
            self.runs += 1;
            true
        }
    }

    struct Restless;

    impl Job for Restless {
        fn activation(&self) -> Activation {
            Activation::OnChange
        }

        fn fire(&mut self) -> bool {
            true
        }
    }

    #[test]
    fn periodic_jobs_run_once_per_period() {
        let mut fast = Counter {
            period_ms: 10,
            runs: 0,
        };
        let mut slow = Counter {
            period_ms: 25,
            runs: 0,
        };
        {
            let mut sched = Scheduler::<4>::new();
            sched.add(&mut fast, 0).unwrap();
            sched.add(&mut slow, 0).unwrap();
            assert_eq!(sched.next_deadline(), Some(10));

            for now in 0..=50 {
                sched.tick(now).unwrap();
            }
            assert_eq!(sched.next_deadline(), Some(60));
        }
        assert_eq!(fast.runs, 5);
        assert_eq!(slow.runs, 2);
    }

    #[test]
    fn late_ticks_do_not_burst() {
        let mut job = Counter {
            period_ms: 10,
            runs: 0,
        };
        {
            let mut sched = Scheduler::<1>::new();
            sched.add(&mut job, 0).unwrap();
            assert_eq!(sched.tick(100), Ok(1));
            assert_eq!(sched.next_deadline(), Some(110));
        }
        assert_eq!(job.runs, 1);
    }

    #[test]
    fn full_and_cycle_are_reported() {
        let mut a = Restless;
        let mut b = Restless;
        let mut sched = Scheduler::<1>::new();
        sched.add(&mut a, 0).unwrap();
        assert_eq!(sched.add(&mut b, 0), Err(SchedError::Full));
        assert_eq!(sched.tick(0), Err(SchedError::Cycle));
    }
}
