//! A device abstraction for one hobby servo on a [`ServoMux`](crate::mux::ServoMux) channel.
//!
//! Positions are given as angles (0 to 180 degrees) or pulse widths in
//! microseconds: any value below [`SERVO_MIN_US_DEFAULT`] is an angle. Out of
//! range values are clamped, never rejected. A handle that failed to get a
//! channel ignores every command and reads back 0.
//!
//! See [`Servo`] for usage.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;

use crate::channel::{ChannelIndex, ChannelSlot, Position};
use crate::config::{
    MAX_DEGREES, POLL_INTERVAL_MS, SERVO_MAX_US_DEFAULT, SERVO_MIN_US_DEFAULT, TRIM_DURATION_US,
};
use crate::hal::PinId;
use crate::mux::Multiplexer;
use crate::servo_player::{AtEnd, Playback, SequencePlayer, SequencePoint, SequenceTarget};
use crate::{Error, Result};

/// Resolution of the per-servo min/max trims.
const TRIM_STEP_US: i32 = 4;

/// A device abstraction for one servo channel.
///
/// # Example
///
/// ```rust,ignore
/// use servo_envoy::servo::Servo;
///
/// let mut servo = Servo::new(&SERVOS);
/// servo.attach(9)?;
///
/// servo.write(45);                    // 45 degrees, immediately
/// servo.write_microseconds(1_500);    // center
/// servo.write_with_speed(180, 30);    // ramp to 180 degrees
/// servo.wait(&mut delay);             // block until it gets there
/// servo.detach();                     // stop pulsing
/// ```
pub struct Servo<'a> {
    mux: &'a dyn Multiplexer,
    index: ChannelIndex,
    player: SequencePlayer,
}

impl<'a> Servo<'a> {
    /// Allocate a channel on `mux`.
    ///
    /// When every channel is taken the handle gets [`ChannelIndex::INVALID`]
    /// and all its commands are ignored; check [`index`](Self::index) or use
    /// [`try_new`](Self::try_new) to detect this.
    pub fn new(mux: &'a dyn Multiplexer) -> Self {
        let index = mux.allocate().unwrap_or_else(|| {
            warn!("servo: channel pool exhausted");
            ChannelIndex::INVALID
        });
        Self {
            mux,
            index,
            player: SequencePlayer::new(),
        }
    }

    /// Allocate a channel on `mux`.
    ///
    /// # Errors
    ///
    /// [`Error::PoolExhausted`] when every channel is taken.
    pub fn try_new(mux: &'a dyn Multiplexer) -> Result<Self> {
        let index = mux.allocate().ok_or(Error::PoolExhausted)?;
        Ok(Self {
            mux,
            index,
            player: SequencePlayer::new(),
        })
    }

    /// Channel index of this servo, or [`ChannelIndex::INVALID`].
    #[must_use]
    pub const fn index(&self) -> ChannelIndex {
        self.index
    }

    /// Attach to `pin` with the default pulse range
    /// ([`SERVO_MIN_US_DEFAULT`] to [`SERVO_MAX_US_DEFAULT`]).
    ///
    /// # Errors
    ///
    /// See [`attach_with_range`](Self::attach_with_range).
    pub fn attach(&mut self, pin: PinId) -> Result<ChannelIndex> {
        self.attach_with_range(pin, SERVO_MIN_US_DEFAULT, SERVO_MAX_US_DEFAULT)
    }

    /// Attach to `pin` and start pulsing it, with pulse widths limited to
    /// `min_us..=max_us`.
    ///
    /// The bounds are stored in 4 µs steps relative to the defaults, so they
    /// must lie within about ±500 µs of them. The last commanded position is
    /// applied again within the new bounds. The group timer is started before
    /// the channel is marked active, so the first pulse always comes from a
    /// freshly started cycle.
    ///
    /// Attaching an attached servo to another pin drives the old pin low first.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidChannel`] if this handle has no channel.
    /// - [`Error::InvalidPulseRange`] if `min_us >= max_us` or a bound is too
    ///   far from its default.
    /// - [`Error::NotInitialized`] if the multiplexer hardware is not installed.
    pub fn attach_with_range(&mut self, pin: PinId, min_us: u16, max_us: u16) -> Result<ChannelIndex> {
        let slot = self.slot().ok_or(Error::InvalidChannel)?;
        let group = self.index.group().ok_or(Error::InvalidChannel)?;
        let (min_trim, max_trim) = trims(min_us, max_us)?;

        self.mux.configure_output(pin)?;
        if slot.pin() != pin && slot.deactivate() {
            self.release_pin(slot.pin());
        }
        slot.set_pin(pin);
        slot.set_trims(min_trim, max_trim);
        self.command(slot.command());
        if !self.mux.group_has_active_channel(group) {
            self.mux.start_group(group)?;
        }
        // Only now may the interrupt pulse this channel.
        slot.set_active(true);

        info!(
            "servo {}: attached to pin {}, {}..{} us",
            self.index,
            pin,
            slot.min_us(),
            slot.max_us()
        );
        Ok(self.index)
    }

    /// Stop pulsing. The pin is driven low and the group timer stops if no
    /// other channel of the group is attached. Does nothing if not attached.
    pub fn detach(&mut self) {
        let Some(slot) = self.slot() else {
            return;
        };
        if !slot.deactivate() {
            return;
        }
        self.release_pin(slot.pin());
        if let Some(group) = self.index.group() {
            if !self.mux.group_has_active_channel(group) {
                if let Err(error) = self.mux.stop_group(group) {
                    warn!("servo {}: could not stop group: {}", self.index, error);
                }
            }
        }
        debug!("servo {}: detached", self.index);
    }

    /// `true` while attached.
    #[must_use]
    pub fn attached(&self) -> bool {
        self.slot().is_some_and(ChannelSlot::is_active)
    }

    /// Move immediately to `value`: an angle if below [`SERVO_MIN_US_DEFAULT`],
    /// otherwise a pulse width in microseconds.
    pub fn write(&mut self, value: u16) {
        self.command(Position::from_raw(value));
    }

    /// Move immediately to a pulse width of `value` microseconds, clamped to
    /// this servo's range.
    pub fn write_microseconds(&mut self, value: u16) {
        self.command(Position::Microseconds(value));
    }

    /// Move to `value` at `speed` (1 slowest, 255 fastest). A `speed` of 0
    /// moves immediately, exactly like [`write`](Self::write).
    pub fn write_with_speed(&mut self, value: u16, speed: u8) {
        if speed == 0 {
            self.write(value);
            return;
        }
        let Some(slot) = self.slot() else {
            return;
        };
        let position = clamp_position(slot, Position::from_raw(value));
        slot.set_command(position);
        slot.set_ramp(self.ticks_for(slot, position), speed);
        trace!("servo {}: ramp to {} at speed {}", self.index, position, speed);
    }

    /// Like [`write_with_speed`](Self::write_with_speed), then if `wait` block
    /// until the servo reaches `value`.
    pub fn write_and_wait<D: DelayNs>(&mut self, value: u16, speed: u8, wait: bool, delay: &mut D) {
        self.write_with_speed(value, speed);
        if wait {
            self.wait(delay);
        }
    }

    /// Same as [`write_with_speed`](Self::write_with_speed).
    pub fn slowmove(&mut self, value: u16, speed: u8) {
        self.write_with_speed(value, speed);
    }

    /// Current position in degrees.
    #[must_use]
    pub fn read(&self) -> u16 {
        self.slot()
            .map_or(0, |slot| self.degrees_for_ticks(slot, slot.ticks()))
    }

    /// Current pulse width in microseconds.
    #[must_use]
    pub fn read_microseconds(&self) -> u16 {
        self.slot()
            .map_or(0, |slot| self.microseconds_for_ticks(slot.ticks()))
    }

    /// Ramp goal in degrees. Equals [`read`](Self::read) when no ramp is running.
    #[must_use]
    pub fn target_position(&self) -> u16 {
        self.slot()
            .map_or(0, |slot| self.degrees_for_ticks(slot, slot.target()))
    }

    /// Ramp goal in microseconds.
    #[must_use]
    pub fn target_position_microseconds(&self) -> u16 {
        self.slot()
            .map_or(0, |slot| self.microseconds_for_ticks(slot.target()))
    }

    /// Hold the current position, cancelling any ramp in progress.
    pub fn stop(&mut self) {
        let degrees = self.read();
        self.write(degrees);
    }

    /// `true` until the servo reaches the last commanded position.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.slot()
            .is_some_and(|slot| !self.reached(slot, slot.command()))
    }

    /// Block until the servo reaches the last commanded position, checking
    /// every [`POLL_INTERVAL_MS`].
    ///
    /// Returns early if the servo is detached, since a ramp only advances
    /// while its channel is pulsing. Other channels keep pulsing in the
    /// background, but the caller's loop does not run until this returns.
    pub fn wait<D: DelayNs>(&self, delay: &mut D) {
        while self.keeps_moving() {
            delay.delay_ms(POLL_INTERVAL_MS);
        }
    }

    /// Like [`wait`](Self::wait) but yields to the executor between checks.
    pub async fn wait_async<D: embedded_hal_async::delay::DelayNs>(&self, delay: &mut D) {
        while self.keeps_moving() {
            delay.delay_ms(POLL_INTERVAL_MS).await;
        }
    }

    /// Play `sequence` in a loop from its first point. Call repeatedly, for
    /// example once per main-loop iteration.
    ///
    /// See [`sequence_play_with`](Self::sequence_play_with).
    pub fn sequence_play(&mut self, sequence: &[SequencePoint]) -> Playback {
        self.sequence_play_with(sequence, AtEnd::Loop, 0)
    }

    /// Advance through `sequence`, moving to the next point once the servo
    /// reaches the current one.
    ///
    /// A different list than last time (compared by address, not content)
    /// restarts playback at `start`. Returns the current point or
    /// [`Playback::Stopped`] once a non-looping sequence is done.
    pub fn sequence_play_with(&mut self, sequence: &[SequencePoint], at_end: AtEnd, start: usize) -> Playback {
        let mut player = self.player;
        let playback = player.play(self, sequence, at_end, start);
        self.player = player;
        playback
    }

    /// Hold the current position and stop sequence playback.
    pub fn sequence_stop(&mut self) {
        self.stop();
        self.player.stop();
    }

    fn slot(&self) -> Option<&'a ChannelSlot> {
        self.mux.slot(self.index)
    }

    fn release_pin(&self, pin: PinId) {
        if let Err(error) = self.mux.set_pin_level(pin, PinState::Low) {
            warn!("servo {}: could not release pin {}: {}", self.index, pin, error);
        }
    }

    fn keeps_moving(&self) -> bool {
        self.slot()
            .is_some_and(|slot| slot.is_active() && !self.reached(slot, slot.command()))
    }

    fn command(&mut self, position: Position) {
        let Some(slot) = self.slot() else {
            return;
        };
        let position = clamp_position(slot, position);
        slot.set_command(position);
        slot.set_ticks(self.ticks_for(slot, position));
        trace!("servo {}: write {}", self.index, position);
    }

    /// `true` if the live pulse width is the one `position` converts to.
    fn reached(&self, slot: &ChannelSlot, position: Position) -> bool {
        slot.ticks() == self.ticks_for(slot, position)
    }

    fn ticks_for(&self, slot: &ChannelSlot, position: Position) -> u16 {
        let pulse_us = pulse_us(slot, position).saturating_sub(TRIM_DURATION_US);
        self.mux.config().us_to_ticks(u32::from(pulse_us))
    }

    fn microseconds_for_ticks(&self, ticks: u16) -> u16 {
        let us = self.mux.config().ticks_to_us(ticks) + u32::from(TRIM_DURATION_US);
        u16::try_from(us).unwrap_or(u16::MAX)
    }

    fn degrees_for_ticks(&self, slot: &ChannelSlot, ticks: u16) -> u16 {
        // The +1 offsets the rounding down in the two conversions.
        let us = i32::from(self.microseconds_for_ticks(ticks)) + 1;
        let degrees = map(
            us,
            i32::from(slot.min_us()),
            i32::from(slot.max_us()),
            0,
            i32::from(MAX_DEGREES),
        );
        u16::try_from(degrees.clamp(0, i32::from(MAX_DEGREES))).unwrap_or(0)
    }
}

impl SequenceTarget for Servo<'_> {
    fn is_at(&self, position: u16) -> bool {
        self.slot()
            .is_some_and(|slot| self.reached(slot, Position::from_raw(position)))
    }

    fn move_to(&mut self, position: u16, speed: u8) {
        self.write_with_speed(position, speed);
    }
}

/// Clamp to 0..=180 degrees or to the servo's pulse range, keeping the unit.
fn clamp_position(slot: &ChannelSlot, position: Position) -> Position {
    match position {
        Position::Degrees(degrees) => Position::Degrees(degrees.min(MAX_DEGREES)),
        Position::Microseconds(us) => Position::Microseconds(us.clamp(slot.min_us(), slot.max_us())),
    }
}

/// Pulse width for `position`, inside the servo's range.
fn pulse_us(slot: &ChannelSlot, position: Position) -> u16 {
    let (min_us, max_us) = (slot.min_us(), slot.max_us());
    match clamp_position(slot, position) {
        Position::Degrees(degrees) => {
            let us = map(
                i32::from(degrees),
                0,
                i32::from(MAX_DEGREES),
                i32::from(min_us),
                i32::from(max_us),
            );
            u16::try_from(us.clamp(i32::from(min_us), i32::from(max_us))).unwrap_or(min_us)
        }
        Position::Microseconds(us) => us,
    }
}

/// Integer linear re-mapping of `value` from one range onto another,
/// truncating toward zero.
fn map(value: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    let in_span = in_max - in_min;
    if in_span == 0 {
        return out_min;
    }
    (value - in_min) * (out_max - out_min) / in_span + out_min
}

/// Encode a pulse range as 4 µs trims relative to the defaults.
fn trims(min_us: u16, max_us: u16) -> Result<(i8, i8)> {
    let invalid = Error::InvalidPulseRange { min_us, max_us };
    if min_us >= max_us {
        return Err(invalid);
    }
    let min_trim = (i32::from(SERVO_MIN_US_DEFAULT) - i32::from(min_us)) / TRIM_STEP_US;
    let max_trim = (i32::from(SERVO_MAX_US_DEFAULT) - i32::from(max_us)) / TRIM_STEP_US;
    match (i8::try_from(min_trim), i8::try_from(max_trim)) {
        (Ok(min_trim), Ok(max_trim)) => Ok((min_trim, max_trim)),
        _ => Err(invalid),
    }
}
