//! Error type shared by the fallible setup paths.
//!
//! Position commands never fail: out-of-range values are clamped and commands on
//! an invalid channel are ignored. Only allocation, attachment and hardware
//! installation report errors.

use derive_more::{Display, Error};

/// Errors reported by `servo-envoy`.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Every channel of the multiplexer has already been handed out.
    #[display("servo channel pool exhausted")]
    PoolExhausted,

    /// The servo handle does not own a channel.
    #[display("servo handle has no channel")]
    InvalidChannel,

    /// The requested pulse range is empty or too far from the defaults to be
    /// stored as a 4 µs trim.
    #[display("invalid pulse range {min_us}..{max_us} µs")]
    InvalidPulseRange {
        /// Requested minimum pulse width (µs).
        min_us: u16,
        /// Requested maximum pulse width (µs).
        max_us: u16,
    },

    /// Pins and timers have not been installed with `ServoMux::init`.
    #[display("servo multiplexer hardware not installed")]
    NotInitialized,

    /// `ServoMux::init` was called twice.
    #[display("servo multiplexer hardware already installed")]
    AlreadyInitialized,
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
