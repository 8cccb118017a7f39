//! Crate-internal logging macros.
//!
//! With `defmt-v1` on a `no_std` target the macros are defmt's own. Otherwise
//! they forward to the `log` facade, but through the sink picked in
//! [`sink`], so the node's diagnostics can be routed away from the global
//! logger (for example when the global logger writes to the same serial
//! port that carries knowledge fragments).
//!
//! Logging is diagnostics only. Nothing in the crate branches on whether a
//! message was emitted.

#![allow(unused_macros)]

pub(crate) mod sink;

pub use sink::set_deeco_internal_log_sink;

#[allow(unused_imports)]
#[cfg(all(feature = "defmt-v1", not(feature = "std")))]
pub(crate) use defmt::{debug, error, info, trace, warn};

#[clippy::format_args]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
macro_rules! trace {
    ($($arg:tt)+) => (log::trace!(logger: $crate::logging::sink::current(), target: "deeco", $($arg)+))
}

#[clippy::format_args]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
macro_rules! debug {
    ($($arg:tt)+) => (log::debug!(logger: $crate::logging::sink::current(), target: "deeco", $($arg)+))
}

#[clippy::format_args]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
macro_rules! info {
    ($($arg:tt)+) => (log::info!(logger: $crate::logging::sink::current(), target: "deeco", $($arg)+))
}

#[clippy::format_args]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
macro_rules! warni {
    ($($arg:tt)+) => (log::warn!(logger: $crate::logging::sink::current(), target: "deeco", $($arg)+))
}

#[clippy::format_args]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
macro_rules! error {
    ($($arg:tt)+) => (log::error!(logger: $crate::logging::sink::current(), target: "deeco", $($arg)+))
}

#[allow(unused_imports)]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
pub(crate) use {debug, error, info, trace, warni as warn};
