// Which sink do the crate's own diagnostics go to?
//
// * Until a sink is injected: the global `log::logger()`.
// * After `set_deeco_internal_log_sink`: the injected sink, forever.
//
// Injection is one-shot. Allowing it to change later would let a reader
// observe a half-written `&dyn Log`.

use core::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

use critical_section::CriticalSection;

const STATE_GLOBAL: u8 = 0;
const STATE_INJECTED: u8 = 1;

struct InternalSink {
    injected: UnsafeCell<MaybeUninit<&'static dyn log::Log>>,
    state: AtomicU8,
}

// SAFETY: `injected` is written once, inside a critical section, strictly
// before `state` flips to `STATE_INJECTED`, and never written again.
unsafe impl Sync for InternalSink {}

impl InternalSink {
    const fn new() -> Self {
        Self {
            injected: UnsafeCell::new(MaybeUninit::uninit()),
            state: AtomicU8::new(STATE_GLOBAL),
        }
    }

    fn inject(&'static self, _cs: CriticalSection<'_>, sink: &'static dyn log::Log) {
        if self.state.load(Ordering::Acquire) == STATE_INJECTED {
            return;
        }
        // SAFETY: we hold a critical section and the state is still GLOBAL,
        // so nobody reads `injected` yet and nobody else writes it.
        unsafe {
            self.injected.get().write(MaybeUninit::new(sink));
        }
        self.state.store(STATE_INJECTED, Ordering::Release);
    }

    fn get(&'static self) -> &'static dyn log::Log {
        match self.state.load(Ordering::Acquire) {
            STATE_INJECTED => {
                // SAFETY: see `inject`, the slot is initialized and immutable.
                unsafe { (*self.injected.get()).assume_init() }
            }
            _ => log::logger(),
        }
    }
}

static SINK: InternalSink = InternalSink::new();

#[inline]
pub(crate) fn current() -> &'static dyn log::Log {
    SINK.get()
}

/// Route deeco's own diagnostics to `sink` instead of the global logger.
///
/// Only the first call has an effect. Useful on nodes whose global logger
/// shares the serial link with the fragment stream, where interleaving text
/// would only confuse the receiving side.
pub fn set_deeco_internal_log_sink(sink: &'static dyn log::Log) {
    critical_section::with(|cs| SINK.inject(cs, sink))
}
