//! Timer group assignment: which timer multiplexes which channels.
//!
//! Channels are assigned to groups in blocks of [`SERVOS_PER_GROUP`]: channels
//! 0 to 11 belong to group 0, 12 to 23 to group 1, and so on.

use portable_atomic::{AtomicI8, Ordering};

use crate::channel::ChannelSlot;
use crate::config::SERVOS_PER_GROUP;

/// Index of a timer group.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupId(u8);

impl GroupId {
    /// Wrap a raw group number.
    #[must_use]
    pub const fn new(group: u8) -> Self {
        Self(group)
    }

    /// The group that drives channel `index`.
    #[must_use]
    pub const fn of(index: usize) -> Self {
        Self((index / SERVOS_PER_GROUP) as u8)
    }

    /// Raw group number.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Table index of position `slot` within this group.
    #[must_use]
    pub const fn channel(self, slot: usize) -> usize {
        self.index() * SERVOS_PER_GROUP + slot
    }

    /// The table indices this group covers.
    #[must_use]
    pub const fn channels(self) -> core::ops::Range<usize> {
        self.channel(0)..self.channel(SERVOS_PER_GROUP)
    }
}

/// Position of channel `index` within its group.
#[must_use]
pub const fn slot_in_group(index: usize) -> usize {
    index % SERVOS_PER_GROUP
}

/// `true` if any allocated channel of `group` is attached.
///
/// Recomputed by scanning on every attach and detach instead of keeping a
/// counter, so it cannot drift from the active flags.
pub fn group_has_active_channel(slots: &[ChannelSlot], group: GroupId) -> bool {
    slots
        .iter()
        .enumerate()
        .filter(|(index, _)| group.channels().contains(index))
        .any(|(_, slot)| slot.is_active())
}

/// Round-robin position of one group: which slot is pulsing, or
/// [`Cursor::REFRESH_WAIT`] while idling out the rest of the refresh interval.
pub struct Cursor(AtomicI8);

impl Cursor {
    /// Between the last pulse of a cycle and the first pulse of the next.
    pub const REFRESH_WAIT: i8 = -1;

    /// A cursor waiting for the next cycle.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicI8::new(Self::REFRESH_WAIT))
    }

    /// Current slot, or `None` during the refresh wait.
    pub fn slot(&self) -> Option<usize> {
        usize::try_from(self.0.load(Ordering::SeqCst)).ok()
    }

    /// Move to the next slot and return it.
    pub(crate) fn advance(&self) -> usize {
        let next = self.0.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        usize::try_from(next).unwrap_or(0)
    }

    /// Return to the refresh wait.
    pub(crate) fn rewind(&self) {
        self.0.store(Self::REFRESH_WAIT, Ordering::SeqCst);
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}
