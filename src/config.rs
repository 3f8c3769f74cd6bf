//! Pulse constants and the timer configuration of a [`ServoMux`](crate::mux::ServoMux).

/// Default minimum pulse width for hobby servos (microseconds).
///
/// Values written below this are treated as angles in degrees.
pub const SERVO_MIN_US_DEFAULT: u16 = 544;

/// Default maximum pulse width for hobby servos (microseconds).
pub const SERVO_MAX_US_DEFAULT: u16 = 2_400;

/// Pulse width a freshly allocated channel starts with (microseconds).
pub const SERVO_CENTER_US: u16 = 1_500;

/// Largest angle accepted by [`Servo::write`](crate::servo::Servo::write).
pub const MAX_DEGREES: u16 = 180;

/// Minimum length of one group cycle (microseconds).
pub const REFRESH_INTERVAL_US_DEFAULT: u32 = 16_000;

/// Channels multiplexed by one timer.
pub const SERVOS_PER_GROUP: usize = 12;

/// Subtracted from every pulse to cover the pin toggle overhead in the handler.
pub const TRIM_DURATION_US: u16 = 5;

/// Delay between position checks while waiting for a ramp to finish.
pub const POLL_INTERVAL_MS: u32 = 5;

/// Timer ticks left between "now" and the next compare event at the end of a cycle.
pub const REFRESH_GUARD_TICKS: u16 = 4;

/// Timer frequency of a 16 MHz part with a /8 prescaler: one tick every 0.5 µs.
pub const TIMER_HZ_DEFAULT: u32 = 2_000_000;

const MICROS_PER_SECOND: u64 = 1_000_000;

/// Timer rate and refresh interval shared by all groups of a multiplexer.
///
/// ```
/// use servo_envoy::config::MuxConfig;
///
/// const CONFIG: MuxConfig = MuxConfig::new().with_timer_hz(1_000_000).with_refresh_us(20_000);
/// assert_eq!(CONFIG.us_to_ticks(1_500), 1_500);
/// assert_eq!(CONFIG.refresh_ticks(), 20_000);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MuxConfig {
    timer_hz: u32,
    refresh_us: u32,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MuxConfig {
    /// Configuration with [`TIMER_HZ_DEFAULT`] and [`REFRESH_INTERVAL_US_DEFAULT`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timer_hz: TIMER_HZ_DEFAULT,
            refresh_us: REFRESH_INTERVAL_US_DEFAULT,
        }
    }

    /// Set the counting frequency of the group timers.
    #[must_use]
    pub const fn with_timer_hz(mut self, timer_hz: u32) -> Self {
        assert!(timer_hz > 0, "timer_hz must be positive");
        self.timer_hz = timer_hz;
        self
    }

    /// Set the minimum length of one group cycle.
    #[must_use]
    pub const fn with_refresh_us(mut self, refresh_us: u32) -> Self {
        self.refresh_us = refresh_us;
        self
    }

    /// Counting frequency of the group timers (Hz).
    #[must_use]
    pub const fn timer_hz(&self) -> u32 {
        self.timer_hz
    }

    /// Minimum length of one group cycle (µs).
    #[must_use]
    pub const fn refresh_us(&self) -> u32 {
        self.refresh_us
    }

    /// Convert microseconds to timer ticks, rounding down and saturating at `u16::MAX`.
    #[must_use]
    pub const fn us_to_ticks(&self, us: u32) -> u16 {
        let ticks = us as u64 * self.timer_hz as u64 / MICROS_PER_SECOND;
        if ticks > u16::MAX as u64 {
            u16::MAX
        } else {
            ticks as u16
        }
    }

    /// Convert timer ticks back to microseconds, rounding down.
    #[must_use]
    pub const fn ticks_to_us(&self, ticks: u16) -> u32 {
        (ticks as u64 * MICROS_PER_SECOND / self.timer_hz as u64) as u32
    }

    /// The refresh interval in timer ticks.
    #[must_use]
    pub const fn refresh_ticks(&self) -> u16 {
        self.us_to_ticks(self.refresh_us)
    }

    /// Panics (at compile time when used in a `static`) if a full group of
    /// default-range pulses or the refresh interval does not fit the 16-bit counter.
    pub(crate) const fn assert_fits_counter(&self) {
        let refresh = self.refresh_us as u64 * self.timer_hz as u64 / MICROS_PER_SECOND;
        assert!(
            refresh < u16::MAX as u64,
            "refresh interval must fit in the 16-bit timer counter"
        );
        let full_group = (SERVOS_PER_GROUP as u64) * (SERVO_MAX_US_DEFAULT as u64)
            * self.timer_hz as u64
            / MICROS_PER_SECOND;
        assert!(
            full_group < u16::MAX as u64,
            "a full group of maximum-width pulses must fit in the 16-bit timer counter"
        );
    }
}
