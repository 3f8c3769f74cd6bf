//! Speed ramping: how far the live pulse width moves toward its target on
//! each refresh cycle.
//!
//! `speed` is the step size in timer ticks per cycle, so 1 is the slowest ramp
//! and 255 the fastest. The step never passes the target, so a ramp converges
//! monotonically and lands exactly on it.

/// Result of one ramp step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RampStep {
    /// Pulse width after the step.
    pub ticks: u16,
    /// `true` once `ticks` equals the target; the ramp should be switched off.
    pub arrived: bool,
}

/// Move `ticks` toward `target` by at most `speed`.
///
/// A `speed` of 0 leaves `ticks` where it is and reports arrival only if it
/// already equals `target`.
///
/// ```
/// use servo_envoy::ramp::{step, RampStep};
///
/// assert_eq!(step(1_000, 1_030, 20), RampStep { ticks: 1_020, arrived: false });
/// assert_eq!(step(1_020, 1_030, 20), RampStep { ticks: 1_030, arrived: true });
/// assert_eq!(step(1_030, 1_000, 20), RampStep { ticks: 1_010, arrived: false });
/// ```
#[must_use]
pub const fn step(ticks: u16, target: u16, speed: u8) -> RampStep {
    let speed = speed as u16;
    let next = if target > ticks {
        let raised = ticks.saturating_add(speed);
        if raised > target { target } else { raised }
    } else {
        let lowered = ticks.saturating_sub(speed);
        if lowered < target { target } else { lowered }
    };
    RampStep {
        ticks: next,
        arrived: next == target,
    }
}

/// Refresh cycles a ramp of `speed` needs to cover `from` to `to`, or `None`
/// when `speed` is 0.
#[must_use]
pub const fn cycles_to_arrive(from: u16, to: u16, speed: u8) -> Option<u32> {
    if speed == 0 {
        return None;
    }
    let distance = from.abs_diff(to) as u32;
    Some(distance.div_ceil(speed as u32))
}
