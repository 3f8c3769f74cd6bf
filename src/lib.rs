//! Interrupt-driven driver for many hobby servos on plain GPIO pins.
//!
//! One 16-bit timer compare interrupt per [timer group](crate#glossary) pulses up
//! to 12 servos in turn, so the foreground never waits on pulse timing. On top of
//! raw pulse-width control the crate offers speed-limited moves and a polled
//! [sequence player](servo_player).
//!
//! The crate is hardware agnostic: the board implements [`hal::PinBank`] (or
//! passes an array of `embedded-hal` output pins) and [`hal::CompareTimer`], and
//! calls [`ServoMux::on_compare`] from each timer's interrupt vector.
//!
//! **Start with:**
//!
//! - [`servo_mux!`] or [`ServoMux`] to declare the multiplexer.
//! - [`Servo`] to attach and move one servo.
//! - [`servo_player`] for waypoint sequences.
//!
//! # Glossary
//!
//! - **Channel:** one slot of the multiplexer's fixed table. A [`Servo`] owns
//!   exactly one for its whole life.
//! - **Timer group:** 12 consecutive channels driven by one timer. Channels 0 to
//!   11 use timer 0, 12 to 23 timer 1, and so on.
//! - **Refresh interval:** minimum time between two pulses on the same channel
//!   (16 ms by default).
//! - **Tick:** one count of a group timer, 0.5 µs at the default 2 MHz.
//! - **Speed:** ticks the pulse width moves per refresh interval while ramping;
//!   0 means move immediately.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod channel;
pub mod config;
mod error;
pub mod group;
pub mod hal;
pub mod mux;
pub mod ramp;
pub mod servo;
pub mod servo_player;

pub use crate::channel::{ChannelIndex, Position};
pub use crate::config::MuxConfig;
// Re-export error types and result (used throughout)
pub use crate::error::{Error, Result};
pub use crate::group::GroupId;
pub use crate::mux::{Multiplexer, ServoMux};
pub use crate::servo::Servo;
pub use crate::servo_player::{AtEnd, Playback, SequencePoint};
