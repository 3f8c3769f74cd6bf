//! Platform services the multiplexer runs on.
//!
//! The board crate implements [`PinBank`] and [`CompareTimer`] for its GPIO and
//! timer peripherals. Both are called from the compare interrupt, so every
//! method must finish in a small, bounded time.

use embedded_hal::digital::{OutputPin, PinState};

/// Identifies an output pin inside a [`PinBank`].
pub type PinId = u8;

/// Pin output primitives addressed by pin number.
pub trait PinBank {
    /// Put `pin` into push-pull output mode.
    fn configure_output(&mut self, pin: PinId);

    /// Drive `pin` high or low.
    fn set_level(&mut self, pin: PinId, level: PinState);
}

/// An array of `embedded-hal` output pins is a pin bank indexed by position.
///
/// HAL output pins are already in output mode, so `configure_output` only
/// parks the pin low. Unknown pin numbers are ignored. Pin errors cannot be
/// returned from the interrupt, so they are only logged.
impl<P: OutputPin, const N: usize> PinBank for [P; N] {
    fn configure_output(&mut self, pin: PinId) {
        self.set_level(pin, PinState::Low);
    }

    fn set_level(&mut self, pin: PinId, level: PinState) {
        if let Some(output) = self.get_mut(usize::from(pin)) {
            if output.set_state(level).is_err() {
                trace!("pin {}: could not set level", pin);
            }
        }
    }
}

/// One 16-bit timer/counter with a compare-match interrupt.
///
/// The counter counts up at [`MuxConfig::timer_hz`](crate::config::MuxConfig::timer_hz)
/// and raises the interrupt when it reaches the compare value. The interrupt
/// vector must call [`ServoMux::on_compare`](crate::mux::ServoMux::on_compare)
/// with the group this timer drives.
pub trait CompareTimer {
    /// Start counting and enable the compare interrupt.
    fn enable(&mut self);

    /// Disable the compare interrupt; no further events are delivered.
    fn disable(&mut self);

    /// Current counter value.
    fn counter(&self) -> u16;

    /// Restart counting from zero.
    fn reset_counter(&mut self);

    /// Current compare value.
    fn compare(&self) -> u16;

    /// Program the next compare event.
    fn set_compare(&mut self, ticks: u16);

    /// Acknowledge the compare interrupt.
    fn clear_interrupt(&mut self);
}
