//! The pulse multiplexer: one compare interrupt per timer group drives up to
//! [`SERVOS_PER_GROUP`] servo pins round-robin.
//!
//! Each group cycle raises the first channel's pin, lowers it after that
//! channel's pulse width and raises the next, and so on through the group.
//! After the last channel the timer idles until [`MuxConfig::refresh_us`] has
//! passed since the cycle started, then begins again. A cycle therefore never
//! takes less than the refresh interval, however few channels are attached.
//!
//! See [`ServoMux`] for setup and [`servo_mux!`] for a keyword-driven
//! declaration with defaults.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::digital::PinState;

use crate::channel::{ChannelIndex, ChannelSlot, ChannelTable};
use crate::config::{MuxConfig, REFRESH_GUARD_TICKS, SERVO_CENTER_US, SERVOS_PER_GROUP, TRIM_DURATION_US};
use crate::group::{Cursor, GroupId, group_has_active_channel};
use crate::hal::{CompareTimer, PinBank, PinId};
use crate::servo::Servo;
use crate::{Error, Result};

/// Declare a static [`ServoMux`] with keyword arguments and defaults.
///
/// Required: a name, the pin bank type and the timer type.
///
/// Optional fields: `groups` (default 1), `channels` (default `groups * 12`),
/// `timer_hz` (default [`TIMER_HZ_DEFAULT`](crate::config::TIMER_HZ_DEFAULT)),
/// `refresh_us` (default [`REFRESH_INTERVAL_US_DEFAULT`](crate::config::REFRESH_INTERVAL_US_DEFAULT)).
///
/// ```rust,ignore
/// use servo_envoy::servo_mux;
///
/// servo_mux! {
///     pub SERVOS: BoardPins, BoardTimer {
///         groups: 2,
///         timer_hz: 2_000_000,
///     }
/// }
/// ```
#[macro_export]
macro_rules! servo_mux {
    ($($tt:tt)*) => { $crate::__servo_mux_impl! { $($tt)* } };
}

// Public for macro expansion in downstream crates.
#[doc(hidden)]
#[macro_export]
macro_rules! __servo_mux_impl {
    (
        $vis:vis $name:ident : $pins:ty, $timer:ty {
            $($fields:tt)*
        }
    ) => {
        $crate::__servo_mux_impl! {
            @__fill_defaults
            vis: $vis,
            name: $name,
            pins: $pins,
            timer: $timer,
            groups: 1,
            channels: _UNSET_,
            timer_hz: $crate::config::TIMER_HZ_DEFAULT,
            refresh_us: $crate::config::REFRESH_INTERVAL_US_DEFAULT,
            fields: [ $($fields)* ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        pins: $pins:ty,
        timer: $timer:ty,
        groups: $groups:tt,
        channels: $channels:tt,
        timer_hz: $timer_hz:expr,
        refresh_us: $refresh_us:expr,
        fields: [ groups: $groups_value:expr $(, $($rest:tt)* )? ]
    ) => {
        $crate::__servo_mux_impl! {
            @__fill_defaults
            vis: $vis,
            name: $name,
            pins: $pins,
            timer: $timer,
            groups: $groups_value,
            channels: $channels,
            timer_hz: $timer_hz,
            refresh_us: $refresh_us,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        pins: $pins:ty,
        timer: $timer:ty,
        groups: $groups:tt,
        channels: $channels:tt,
        timer_hz: $timer_hz:expr,
        refresh_us: $refresh_us:expr,
        fields: [ channels: $channels_value:expr $(, $($rest:tt)* )? ]
    ) => {
        $crate::__servo_mux_impl! {
            @__fill_defaults
            vis: $vis,
            name: $name,
            pins: $pins,
            timer: $timer,
            groups: $groups,
            channels: $channels_value,
            timer_hz: $timer_hz,
            refresh_us: $refresh_us,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        pins: $pins:ty,
        timer: $timer:ty,
        groups: $groups:tt,
        channels: $channels:tt,
        timer_hz: $timer_hz:expr,
        refresh_us: $refresh_us:expr,
        fields: [ timer_hz: $timer_hz_value:expr $(, $($rest:tt)* )? ]
    ) => {
        $crate::__servo_mux_impl! {
            @__fill_defaults
            vis: $vis,
            name: $name,
            pins: $pins,
            timer: $timer,
            groups: $groups,
            channels: $channels,
            timer_hz: $timer_hz_value,
            refresh_us: $refresh_us,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        pins: $pins:ty,
        timer: $timer:ty,
        groups: $groups:tt,
        channels: $channels:tt,
        timer_hz: $timer_hz:expr,
        refresh_us: $refresh_us:expr,
        fields: [ refresh_us: $refresh_us_value:expr $(, $($rest:tt)* )? ]
    ) => {
        $crate::__servo_mux_impl! {
            @__fill_defaults
            vis: $vis,
            name: $name,
            pins: $pins,
            timer: $timer,
            groups: $groups,
            channels: $channels,
            timer_hz: $timer_hz,
            refresh_us: $refresh_us_value,
            fields: [ $($($rest)*)? ]
        }
    };

    // All fields consumed.
    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        pins: $pins:ty,
        timer: $timer:ty,
        groups: $groups:tt,
        channels: _UNSET_,
        timer_hz: $timer_hz:expr,
        refresh_us: $refresh_us:expr,
        fields: [ ]
    ) => {
        $crate::__servo_mux_impl! {
            @__build
            vis: $vis,
            name: $name,
            pins: $pins,
            timer: $timer,
            groups: $groups,
            channels: ($groups * $crate::config::SERVOS_PER_GROUP),
            timer_hz: $timer_hz,
            refresh_us: $refresh_us
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        pins: $pins:ty,
        timer: $timer:ty,
        groups: $groups:tt,
        channels: $channels:tt,
        timer_hz: $timer_hz:expr,
        refresh_us: $refresh_us:expr,
        fields: [ ]
    ) => {
        $crate::__servo_mux_impl! {
            @__build
            vis: $vis,
            name: $name,
            pins: $pins,
            timer: $timer,
            groups: $groups,
            channels: $channels,
            timer_hz: $timer_hz,
            refresh_us: $refresh_us
        }
    };

    (@__build
        vis: $vis:vis,
        name: $name:ident,
        pins: $pins:ty,
        timer: $timer:ty,
        groups: $groups:tt,
        channels: $channels:tt,
        timer_hz: $timer_hz:expr,
        refresh_us: $refresh_us:expr
    ) => {
        $vis static $name: $crate::mux::ServoMux<$pins, $timer, { $channels }, { $groups }> =
            $crate::mux::ServoMux::new(
                $crate::config::MuxConfig::new()
                    .with_timer_hz($timer_hz)
                    .with_refresh_us($refresh_us),
            );
    };
}

/// What a [`Servo`] handle needs from its multiplexer.
///
/// Implemented by [`ServoMux`]; servo handles hold it as `&dyn Multiplexer`
/// so their type does not depend on the board's pin and timer types.
pub trait Multiplexer {
    /// Timer rate and refresh interval.
    fn config(&self) -> &MuxConfig;

    /// The allocated channel slots.
    fn slots(&self) -> &[ChannelSlot];

    /// Hand out the next free channel.
    fn allocate(&self) -> Option<ChannelIndex>;

    /// Put `pin` into output mode.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before [`ServoMux::init`].
    fn configure_output(&self, pin: PinId) -> Result<()>;

    /// Drive `pin` to `level` outside the interrupt.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before [`ServoMux::init`].
    fn set_pin_level(&self, pin: PinId, level: PinState) -> Result<()>;

    /// Reset the group's cycle and enable its timer.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before [`ServoMux::init`].
    fn start_group(&self, group: GroupId) -> Result<()>;

    /// Disable the group's timer.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before [`ServoMux::init`].
    fn stop_group(&self, group: GroupId) -> Result<()>;

    /// The slot of a valid, allocated channel.
    fn slot(&self, index: ChannelIndex) -> Option<&ChannelSlot> {
        index.get().and_then(|index| self.slots().get(index))
    }

    /// `true` if any channel of `group` is attached.
    fn group_has_active_channel(&self, group: GroupId) -> bool {
        group_has_active_channel(self.slots(), group)
    }
}

struct Hardware<P, T, const GROUPS: usize> {
    pins: P,
    timers: [T; GROUPS],
}

/// Interrupt-driven pulse multiplexer for up to `CHANNELS` servos on `GROUPS` timers.
///
/// Create it in a `static` (or with [`servo_mux!`]), install the pins and
/// timers once with [`init`](Self::init), and call [`on_compare`](Self::on_compare)
/// from each timer's compare interrupt.
///
/// ```rust,ignore
/// use servo_envoy::{config::MuxConfig, group::GroupId, mux::ServoMux, servo::Servo};
///
/// static SERVOS: ServoMux<BoardPins, BoardTimer, 12, 1> = ServoMux::new(MuxConfig::new());
///
/// #[interrupt]
/// fn TCB0() {
///     SERVOS.on_compare(GroupId::new(0));
/// }
///
/// fn main() -> ! {
///     SERVOS.init(board_pins(), [board_timer()]).unwrap();
///     let mut servo = Servo::new(&SERVOS);
///     servo.attach(9).unwrap();
///     servo.write(90);
///     loop {}
/// }
/// ```
pub struct ServoMux<P, T, const CHANNELS: usize, const GROUPS: usize> {
    config: MuxConfig,
    table: ChannelTable<CHANNELS>,
    cursors: [Cursor; GROUPS],
    hardware: Mutex<CriticalSectionRawMutex, RefCell<Option<Hardware<P, T, GROUPS>>>>,
}

impl<P, T, const CHANNELS: usize, const GROUPS: usize> ServoMux<P, T, CHANNELS, GROUPS>
where
    P: PinBank,
    T: CompareTimer,
{
    /// Create a multiplexer with no hardware installed.
    ///
    /// Panics (at compile time in a `static`) if the channels do not fit the
    /// groups or the timing does not fit a 16-bit counter.
    #[must_use]
    pub const fn new(config: MuxConfig) -> Self {
        assert!(GROUPS > 0, "at least one timer group is required");
        assert!(
            CHANNELS <= GROUPS * SERVOS_PER_GROUP,
            "each timer group drives at most 12 channels"
        );
        config.assert_fits_counter();
        let initial_ticks = config.us_to_ticks((SERVO_CENTER_US - TRIM_DURATION_US) as u32);
        Self {
            config,
            table: ChannelTable::new(initial_ticks),
            cursors: [const { Cursor::new() }; GROUPS],
            hardware: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install the pin bank and one timer per group.
    ///
    /// Timers stay disabled until the first servo of their group attaches.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyInitialized`] if hardware was installed before.
    pub fn init(&self, pins: P, timers: [T; GROUPS]) -> Result<()> {
        self.hardware.lock(|hardware| {
            let mut hardware = hardware.borrow_mut();
            if hardware.is_some() {
                return Err(Error::AlreadyInitialized);
            }
            *hardware = Some(Hardware { pins, timers });
            info!(
                "servo mux: {} channels on {} groups, timer {} Hz, refresh {} us",
                CHANNELS,
                GROUPS,
                self.config.timer_hz(),
                self.config.refresh_us()
            );
            Ok(())
        })
    }

    /// Allocate a channel and wrap it in a [`Servo`] handle.
    ///
    /// # Errors
    ///
    /// [`Error::PoolExhausted`] once all `CHANNELS` are taken.
    pub fn servo(&self) -> Result<Servo<'_>> {
        Servo::try_new(self)
    }

    /// The slot of channel `index`, if allocated.
    pub fn channel(&self, index: ChannelIndex) -> Option<&ChannelSlot> {
        self.slot(index)
    }

    /// Current round-robin position of `group`; `None` during the refresh wait.
    pub fn cursor(&self, group: GroupId) -> Option<usize> {
        self.cursors.get(group.index()).and_then(Cursor::slot)
    }

    /// Compare-match handler for `group`. Call it from the group timer's
    /// interrupt vector.
    ///
    /// Ends the current pulse, starts the next channel's pulse, or idles out
    /// the rest of the refresh interval. Does nothing before [`init`](Self::init)
    /// or for a group this multiplexer does not have.
    pub fn on_compare(&self, group: GroupId) {
        let Some(cursor) = self.cursors.get(group.index()) else {
            return;
        };
        self.hardware.lock(|hardware| {
            let mut hardware = hardware.borrow_mut();
            let Some(Hardware { pins, timers }) = hardware.as_mut() else {
                return;
            };
            let Some(timer) = timers.get_mut(group.index()) else {
                return;
            };

            match cursor.slot() {
                // Refresh wait is over: a new cycle starts at counter 0.
                None => timer.reset_counter(),
                Some(slot) => {
                    if let Some(channel) = self.table.get(group.channel(slot)) {
                        if channel.is_active() {
                            pins.set_level(channel.pin(), PinState::Low);
                        }
                    }
                }
            }

            let slot = cursor.advance();
            let next = if slot < SERVOS_PER_GROUP {
                self.table.get(group.channel(slot))
            } else {
                None
            };

            if let Some(channel) = next {
                channel.advance_ramp();
                timer.set_compare(timer.counter().wrapping_add(channel.ticks()));
                // Inactive channels keep their time slot but their pin stays low.
                if channel.is_active() {
                    pins.set_level(channel.pin(), PinState::High);
                }
            } else {
                let now = timer.counter();
                let refresh_ticks = self.config.refresh_ticks();
                if u32::from(now) + u32::from(REFRESH_GUARD_TICKS) < u32::from(refresh_ticks) {
                    timer.set_compare(refresh_ticks);
                } else {
                    // The refresh interval has already passed.
                    timer.set_compare(now.wrapping_add(REFRESH_GUARD_TICKS));
                }
                cursor.rewind();
            }

            timer.clear_interrupt();
        });
    }

    fn with_hardware<R>(&self, f: impl FnOnce(&mut Hardware<P, T, GROUPS>) -> R) -> Result<R> {
        self.hardware.lock(|hardware| {
            let mut hardware = hardware.borrow_mut();
            hardware.as_mut().map(f).ok_or(Error::NotInitialized)
        })
    }
}

impl<P, T, const CHANNELS: usize, const GROUPS: usize> Multiplexer
    for ServoMux<P, T, CHANNELS, GROUPS>
where
    P: PinBank,
    T: CompareTimer,
{
    fn config(&self) -> &MuxConfig {
        &self.config
    }

    fn slots(&self) -> &[ChannelSlot] {
        self.table.slots()
    }

    fn allocate(&self) -> Option<ChannelIndex> {
        self.table.allocate()
    }

    fn configure_output(&self, pin: PinId) -> Result<()> {
        self.with_hardware(|hardware| hardware.pins.configure_output(pin))
    }

    fn set_pin_level(&self, pin: PinId, level: PinState) -> Result<()> {
        self.with_hardware(|hardware| hardware.pins.set_level(pin, level))
    }

    fn start_group(&self, group: GroupId) -> Result<()> {
        let cursor = self.cursors.get(group.index());
        self.with_hardware(|hardware| {
            if let (Some(timer), Some(cursor)) = (hardware.timers.get_mut(group.index()), cursor) {
                cursor.rewind();
                timer.reset_counter();
                timer.set_compare(REFRESH_GUARD_TICKS);
                timer.clear_interrupt();
                timer.enable();
                debug!("servo mux: group {} started", group.index());
            }
        })
    }

    fn stop_group(&self, group: GroupId) -> Result<()> {
        self.with_hardware(|hardware| {
            if let Some(timer) = hardware.timers.get_mut(group.index()) {
                timer.disable();
                debug!("servo mux: group {} stopped", group.index());
            }
        })
    }
}
