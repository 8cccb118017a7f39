//! Driving jobs from tokio
//!
//! On a host there is no need for the super-loop [`Scheduler`](crate::Scheduler):
//! each job gets its own tokio task. Periodic jobs sleep on an interval,
//! change-triggered jobs wait on their component, and the receive path
//! awaits bytes from a channel-backed link.
//!
//! ```rust,no_run
//! # deeco::knowledge! {
//! #     #[component_type(deeco::ComponentType(1))]
//! #     #[derive(Clone, Copy, Default)]
//! #     pub struct Sensor { group { pub v: f32 } }
//! # }
//! use deeco::{Component, ComponentId, runtime, task::PeriodicTask};
//! use mutex::raw_impls::cs::CriticalSectionRawMutex as CSRMutex;
//!
//! static SENSOR: Component<CSRMutex, Sensor> = Component::new(ComponentId(1), Sensor { v: 0.0 });
//!
//! # async fn run() {
//! tokio::spawn(async {
//!     let mut task = PeriodicTask::new(&SENSOR, 1000, deeco::field!(Sensor, v), |k| k.v + 0.5);
//!     runtime::drive_periodic(&mut task).await
//! });
//! # }
//! ```

use std::time::Duration;

use mutex::ScopedRawMutex;
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior, interval},
};

use crate::{
    component::Component,
    knowledge::Knowledge,
    logging::{debug, info, warn},
    sched::{Activation, Job},
    transport::{Receiver, Transport},
};

/// Milliseconds since the clock was created, the time base for caches.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

/// Sending half of an in-process serial link.
#[derive(Debug, Clone)]
pub struct ChannelTx {
    tx: mpsc::Sender<u8>,
}

/// Receiving half of an in-process serial link.
#[derive(Debug)]
pub struct ChannelRx {
    rx: mpsc::Receiver<u8>,
}

/// An in-process serial link that buffers up to `capacity` bytes.
///
/// A frame that does not fit the free space is refused with
/// `SendError::Full`, so size it for at least one whole frame.
pub fn channel_link(capacity: usize) -> (ChannelTx, ChannelRx) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelTx { tx }, ChannelRx { rx })
}

impl Clock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ChannelTx {
    fn can_send(&self) -> bool {
        self.tx.capacity() > 0 || self.tx.is_closed()
    }

    fn send(&mut self, byte: u8) {
        // A closed link drops the byte, like a UART with nothing attached.
        let _ = self.tx.try_send(byte);
    }

    fn send_room(&self) -> Option<usize> {
        // Closed links swallow anything.
        (!self.tx.is_closed()).then(|| self.tx.capacity())
    }

    fn can_recv(&self) -> bool {
        false
    }

    fn recv(&mut self) -> u8 {
        0
    }
}

impl ChannelRx {
    /// Wait for the next byte. `None` once every sender is gone.
    pub async fn next_byte(&mut self) -> Option<u8> {
        self.rx.recv().await
    }
}

impl Transport for ChannelRx {
    fn can_send(&self) -> bool {
        false
    }

    fn send(&mut self, _byte: u8) {}

    fn can_recv(&self) -> bool {
        !self.rx.is_empty()
    }

    fn recv(&mut self) -> u8 {
        self.rx.try_recv().unwrap_or(0)
    }
}

/// Run a periodic job forever, first firing one period from now.
///
/// Returns at once for jobs that are not periodic.
pub async fn drive_periodic<J: Job + ?Sized>(job: &mut J) {
    let Activation::Periodic { period_ms } = job.activation() else {
        warn!("drive_periodic: job is not periodic");
        return;
    };
    let mut ticker = interval(Duration::from_millis(u64::from(period_ms.max(1))));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        job.fire();
    }
}

/// Run a change-triggered job forever, checking it after every write to
/// `component`.
pub async fn drive_triggered<R, K, J>(component: &Component<R, K>, job: &mut J)
where
    R: ScopedRawMutex,
    K: Knowledge,
    J: Job + ?Sized,
{
    let mut seen = component.generation();
    loop {
        seen = component.wait_changed(seen).await;
        job.fire();
    }
}

/// Feed `receiver` from `link` until every sender is gone.
pub async fn drive_receiver<R, const N: usize, const S: usize>(
    receiver: &mut Receiver<'_, R, N, S>,
    mut link: ChannelRx,
    clock: &Clock,
) where
    R: ScopedRawMutex,
{
    info!("rx: link up");
    while let Some(byte) = link.next_byte().await {
        let _ = receiver.on_byte(byte, clock.now_ms());
    }
    receiver.link_closed();
    let stats = receiver.stats();
    debug!(
        "rx: link down after {} applied, {} malformed, {} rejected",
        stats.applied, stats.malformed, stats.rejected
    );
}
