//! The channel descriptor table: a fixed arena of per-servo records shared by
//! the foreground API and the compare interrupt.
//!
//! Every field is its own atomic, so the interrupt never sees a torn pulse
//! width. Fields that must change together (ramp target and speed) are written
//! inside a critical section.

use portable_atomic::{AtomicBool, AtomicI8, AtomicU8, AtomicU16, Ordering};

use crate::config::{SERVO_CENTER_US, SERVO_MAX_US_DEFAULT, SERVO_MIN_US_DEFAULT};
use crate::group::GroupId;
use crate::hal::PinId;
use crate::ramp;

/// Index of a channel in the table, or [`ChannelIndex::INVALID`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    /// Handed out when the pool is exhausted.
    pub const INVALID: Self = Self(u8::MAX);

    /// Wrap a raw index. `u8::MAX` is the invalid sentinel.
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// `false` for [`ChannelIndex::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u8::MAX
    }

    /// The raw index, if valid.
    #[must_use]
    pub const fn get(self) -> Option<usize> {
        if self.is_valid() {
            Some(self.0 as usize)
        } else {
            None
        }
    }

    /// The timer group that drives this channel, if valid.
    #[must_use]
    pub const fn group(self) -> Option<GroupId> {
        match self.get() {
            Some(index) => Some(GroupId::of(index)),
            None => None,
        }
    }
}

/// A commanded position in the unit the caller used.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Position {
    /// Angle in degrees.
    Degrees(u16),
    /// Pulse width in microseconds.
    Microseconds(u16),
}

impl Position {
    /// Values below [`SERVO_MIN_US_DEFAULT`] are angles, the rest pulse widths.
    #[must_use]
    pub const fn from_raw(value: u16) -> Self {
        if value < SERVO_MIN_US_DEFAULT {
            Self::Degrees(value)
        } else {
            Self::Microseconds(value)
        }
    }

    /// The number without its unit.
    #[must_use]
    pub const fn raw(self) -> u16 {
        match self {
            Self::Degrees(value) | Self::Microseconds(value) => value,
        }
    }
}

/// State of one servo channel.
pub struct ChannelSlot {
    pin: AtomicU8,
    active: AtomicBool,
    ticks: AtomicU16,
    value: AtomicU16,
    value_in_degrees: AtomicBool,
    target: AtomicU16,
    speed: AtomicU8,
    min_trim: AtomicI8,
    max_trim: AtomicI8,
}

impl ChannelSlot {
    const fn new(ticks: u16) -> Self {
        Self {
            pin: AtomicU8::new(0),
            active: AtomicBool::new(false),
            ticks: AtomicU16::new(ticks),
            value: AtomicU16::new(SERVO_CENTER_US),
            value_in_degrees: AtomicBool::new(false),
            target: AtomicU16::new(ticks),
            speed: AtomicU8::new(0),
            min_trim: AtomicI8::new(0),
            max_trim: AtomicI8::new(0),
        }
    }

    /// Output pin of this channel.
    pub fn pin(&self) -> PinId {
        self.pin.load(Ordering::SeqCst)
    }

    /// `true` while the channel is attached and pulsing.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Live pulse width in timer ticks, as the interrupt will use it next.
    pub fn ticks(&self) -> u16 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Last commanded position, clamped, before conversion to ticks.
    pub fn command(&self) -> Position {
        critical_section::with(|_| {
            let value = self.value.load(Ordering::SeqCst);
            if self.value_in_degrees.load(Ordering::SeqCst) {
                Position::Degrees(value)
            } else {
                Position::Microseconds(value)
            }
        })
    }

    /// Ramp goal in timer ticks.
    pub fn target(&self) -> u16 {
        self.target.load(Ordering::SeqCst)
    }

    /// Ramp rate in ticks per refresh cycle; 0 when no ramp is running.
    pub fn speed(&self) -> u8 {
        self.speed.load(Ordering::SeqCst)
    }

    /// Lower pulse bound in microseconds, from the trim stored at attach.
    pub fn min_us(&self) -> u16 {
        trimmed(SERVO_MIN_US_DEFAULT, self.min_trim.load(Ordering::SeqCst))
    }

    /// Upper pulse bound in microseconds, from the trim stored at attach.
    pub fn max_us(&self) -> u16 {
        trimmed(SERVO_MAX_US_DEFAULT, self.max_trim.load(Ordering::SeqCst))
    }

    pub(crate) fn set_pin(&self, pin: PinId) {
        self.pin.store(pin, Ordering::SeqCst);
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Clear the active flag, returning whether it was set.
    pub(crate) fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn set_command(&self, position: Position) {
        critical_section::with(|_| {
            self.value_in_degrees
                .store(matches!(position, Position::Degrees(_)), Ordering::SeqCst);
            self.value.store(position.raw(), Ordering::SeqCst);
        });
    }

    pub(crate) fn set_trims(&self, min_trim: i8, max_trim: i8) {
        self.min_trim.store(min_trim, Ordering::SeqCst);
        self.max_trim.store(max_trim, Ordering::SeqCst);
    }

    /// Jump to `ticks` and drop any ramp in progress.
    pub(crate) fn set_ticks(&self, ticks: u16) {
        critical_section::with(|_| {
            self.speed.store(0, Ordering::SeqCst);
            self.target.store(ticks, Ordering::SeqCst);
            self.ticks.store(ticks, Ordering::SeqCst);
        });
    }

    /// Start a ramp toward `target`. Both fields change in one critical section
    /// so the interrupt never pairs a new target with an old speed.
    pub(crate) fn set_ramp(&self, target: u16, speed: u8) {
        critical_section::with(|_| {
            self.target.store(target, Ordering::SeqCst);
            self.speed.store(speed, Ordering::SeqCst);
        });
    }

    /// One ramp step, called by the interrupt at the start of this channel's pulse.
    pub(crate) fn advance_ramp(&self) {
        let speed = self.speed();
        if speed == 0 {
            return;
        }
        let step = ramp::step(self.ticks(), self.target(), speed);
        self.ticks.store(step.ticks, Ordering::SeqCst);
        if step.arrived {
            self.speed.store(0, Ordering::SeqCst);
        }
    }
}

fn trimmed(default_us: u16, trim: i8) -> u16 {
    let us = i32::from(default_us) - 4 * i32::from(trim);
    us.clamp(0, i32::from(u16::MAX)) as u16
}

/// Fixed-capacity arena of [`ChannelSlot`]s. Channels are handed out in order
/// and never returned.
pub struct ChannelTable<const N: usize> {
    slots: [ChannelSlot; N],
    allocated: AtomicU8,
}

impl<const N: usize> ChannelTable<N> {
    /// Create a table whose channels start at `initial_ticks`.
    #[must_use]
    pub const fn new(initial_ticks: u16) -> Self {
        assert!(N < u8::MAX as usize, "at most 254 channels are supported");
        Self {
            slots: [const { ChannelSlot::new(0) }; N],
            allocated: AtomicU8::new(0),
        }
        .with_initial_ticks(initial_ticks)
    }

    const fn with_initial_ticks(mut self, ticks: u16) -> Self {
        let mut index = 0;
        while index < N {
            self.slots[index] = ChannelSlot::new(ticks);
            index += 1;
        }
        self
    }

    /// Hand out the next free channel, or `None` when all `N` are taken.
    pub fn allocate(&self) -> Option<ChannelIndex> {
        self.allocated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (usize::from(count) < N).then(|| count + 1)
            })
            .ok()
            .map(ChannelIndex::new)
    }

    /// Number of channels handed out so far.
    pub fn allocated(&self) -> usize {
        usize::from(self.allocated.load(Ordering::SeqCst))
    }

    /// The allocated slots.
    pub fn slots(&self) -> &[ChannelSlot] {
        self.slots.get(..self.allocated()).unwrap_or(&[])
    }

    /// The slot at `index`, if it has been allocated.
    pub fn get(&self, index: usize) -> Option<&ChannelSlot> {
        self.slots().get(index)
    }
}
