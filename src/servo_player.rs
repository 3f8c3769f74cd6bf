//! A polled sequence player that walks a servo through a list of waypoints.
//!
//! Each waypoint is a position (degrees, or microseconds from 544 up) and the
//! ramp speed used to reach it. Call [`Servo::sequence_play`](crate::servo::Servo::sequence_play)
//! once per main-loop iteration: when the servo has reached the current
//! waypoint the player commands the next one.
//!
//! # Example
//!
//! ```rust,ignore
//! use servo_envoy::combine;
//! use servo_envoy::servo_player::{AtEnd, SequencePoint, linear};
//!
//! const SWEEP_UP: [SequencePoint; 5] = linear(0, 180, 40);
//! const PAUSE: [SequencePoint; 1] = [SequencePoint::new(180, 0)];
//! const SWEEP_DOWN: [SequencePoint; 5] = linear(180, 0, 20);
//! const STEPS: [SequencePoint; 11] = combine!(SWEEP_UP, PAUSE, SWEEP_DOWN);
//!
//! loop {
//!     servo.sequence_play_with(&STEPS, AtEnd::Loop, 0);
//!     // other work
//! }
//! ```

use core::fmt;

/// One waypoint of a sequence.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequencePoint {
    /// Degrees if below 544, otherwise microseconds.
    pub position: u16,
    /// Ramp speed toward `position`; 0 jumps immediately.
    pub speed: u8,
}

impl SequencePoint {
    /// Create a waypoint.
    #[must_use]
    pub const fn new(position: u16, speed: u8) -> Self {
        Self { position, speed }
    }
}

/// What happens after the last waypoint is reached.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtEnd {
    /// Start over at the first waypoint.
    #[default]
    Loop,
    /// Stay at the last waypoint and report [`Playback::Stopped`].
    Hold,
}

impl From<bool> for AtEnd {
    /// `true` loops, `false` holds.
    fn from(looping: bool) -> Self {
        if looping { Self::Loop } else { Self::Hold }
    }
}

/// Progress of a sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Playback {
    /// Moving to, or waiting at, the waypoint with this index.
    Playing(usize),
    /// Not playing: finished, stopped, or never started.
    Stopped,
}

impl Playback {
    /// Waypoint index while playing.
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::Playing(index) => Some(index),
            Self::Stopped => None,
        }
    }

    /// `true` when not playing.
    #[must_use]
    pub const fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for Playback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing(index) => write!(f, "playing {index}"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// The servo operations a [`SequencePlayer`] drives.
pub trait SequenceTarget {
    /// `true` if the servo's live position is `position`.
    fn is_at(&self, position: u16) -> bool;

    /// Start moving to `position` at `speed`.
    fn move_to(&mut self, position: u16, speed: u8);
}

/// Playback state of one servo.
///
/// Remembers which list it is playing by address only, so passing a different
/// array (even one with the same contents) restarts playback.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SequencePlayer {
    sequence: Option<usize>,
    playback: Playback,
}

impl Default for SequencePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl SequencePlayer {
    /// A player that has not seen any sequence.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sequence: None,
            playback: Playback::Stopped,
        }
    }

    /// Progress as of the last call to [`play`](Self::play).
    #[must_use]
    pub const fn playback(&self) -> Playback {
        self.playback
    }

    /// Advance playback of `sequence` on `target` by at most one waypoint.
    ///
    /// A sequence other than the last one restarts at `start` and commands that
    /// waypoint. Otherwise, once `target` is at the current waypoint, the next
    /// one is commanded; past the end playback wraps or stops per `at_end`.
    /// An empty sequence or a `start` past its end yields [`Playback::Stopped`].
    pub fn play<T>(&mut self, target: &mut T, sequence: &[SequencePoint], at_end: AtEnd, start: usize) -> Playback
    where
        T: SequenceTarget + ?Sized,
    {
        let address = sequence.as_ptr().addr();
        let previous = if self.sequence == Some(address) {
            self.playback
        } else {
            self.sequence = Some(address);
            self.playback = if start < sequence.len() {
                Playback::Playing(start)
            } else {
                Playback::Stopped
            };
            debug!("sequence: new list of {} points from {}", sequence.len(), start);
            // Forces the first waypoint to be commanded below.
            Playback::Stopped
        };

        if let Playback::Playing(index) = self.playback {
            self.playback = match sequence.get(index) {
                Some(point) if target.is_at(point.position) => {
                    let next = index + 1;
                    if next < sequence.len() {
                        Playback::Playing(next)
                    } else {
                        match at_end {
                            AtEnd::Loop => Playback::Playing(0),
                            AtEnd::Hold => Playback::Stopped,
                        }
                    }
                }
                Some(_) => Playback::Playing(index),
                // The list shrank under us.
                None => Playback::Stopped,
            };
        }

        if self.playback != previous {
            if let Some(point) = self.playback.index().and_then(|index| sequence.get(index)) {
                trace!("sequence: point {} -> {}", self.playback, point);
                target.move_to(point.position, point.speed);
            }
        }
        self.playback
    }

    /// Stop playback. The next call to [`play`](Self::play) with the same
    /// list stays stopped; a different list starts fresh.
    pub fn stop(&mut self) {
        self.playback = Playback::Stopped;
    }

    /// Forget the last list, so the next [`play`](Self::play) restarts even
    /// with the same one.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Build a const approach of `N` waypoints spaced evenly from `start` to
/// `end`. Every waypoint is ramped to at the same `speed`, so a low speed
/// gives a slow, steady move with a check-in at each point.
///
/// ```
/// use servo_envoy::servo_player::{SequencePoint, linear};
///
/// // Four stops on the way to 90 degrees, 15 ticks per refresh cycle each.
/// const APPROACH: [SequencePoint; 4] = linear(0, 90, 15);
/// assert_eq!(APPROACH.map(|point| point.position), [0, 30, 60, 90]);
/// assert!(APPROACH.iter().all(|point| point.speed == 15));
/// ```
#[must_use]
pub const fn linear<const N: usize>(start: u16, end: u16, speed: u8) -> [SequencePoint; N] {
    assert!(N > 0, "at least one point required");
    let span = end as i32 - start as i32;
    let gaps = if N > 1 { (N - 1) as i32 } else { 1 };

    let mut points = [SequencePoint::new(start, speed); N];
    let mut index = 1;
    while index < N {
        points[index].position = (start as i32 + span * index as i32 / gaps) as u16;
        index += 1;
    }
    points
}

/// Concatenate two waypoint arrays. Use [`combine!`](macro@crate::combine) for
/// more than two.
#[must_use]
#[doc(hidden)]
pub const fn combine<const N1: usize, const N2: usize, const OUT_N: usize>(
    first: [SequencePoint; N1],
    second: [SequencePoint; N2],
) -> [SequencePoint; OUT_N] {
    assert!(OUT_N == N1 + N2, "OUT_N must equal N1 + N2");

    let mut points = [SequencePoint::new(0, 0); OUT_N];
    let mut index = 0;
    while index < OUT_N {
        points[index] = if index < N1 { first[index] } else { second[index - N1] };
        index += 1;
    }
    points
}

/// Concatenate any number of const waypoint arrays, for sequences whose legs
/// run at different speeds.
///
/// ```
/// use servo_envoy::combine;
/// use servo_envoy::servo_player::{SequencePoint, linear};
///
/// // Swing out fast, creep the last 40 degrees, then snap back to 1500 µs.
/// const SWING: [SequencePoint; 2] = linear(0, 140, 200);
/// const CREEP: [SequencePoint; 2] = linear(160, 180, 5);
/// const PARK: [SequencePoint; 1] = [SequencePoint::new(1_500, 0)];
/// const STEPS: [SequencePoint; 5] = combine!(SWING, CREEP, PARK);
/// assert_eq!(STEPS.map(|point| point.speed), [200, 200, 5, 5, 0]);
/// assert_eq!(STEPS[4].position, 1_500);
/// ```
#[macro_export]
macro_rules! combine {
    () => {
        []
    };
    ($single:expr) => {
        $single
    };
    ($first:expr, $second:expr) => {{
        const FIRST: &[$crate::servo_player::SequencePoint] = &$first;
        const SECOND: &[$crate::servo_player::SequencePoint] = &$second;
        $crate::servo_player::combine::<{FIRST.len()}, {SECOND.len()}, {FIRST.len() + SECOND.len()}>($first, $second)
    }};
    ($first:expr, $($rest:expr),+ $(,)?) => {{
        const FIRST: &[$crate::servo_player::SequencePoint] = &$first;
        const REST: &[$crate::servo_player::SequencePoint] = &$crate::combine!($($rest),+);
        $crate::servo_player::combine::<{FIRST.len()}, {REST.len()}, {FIRST.len() + REST.len()}>($first, $crate::combine!($($rest),+))
    }};
}
