//! Simulated timers, pins and delays for host tests.
//!
//! Time is counted in ticks of the default 2 MHz timer. `run_for` delivers
//! compare events in time order, so pulse edges land exactly where a real
//! timer would put them.
#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::digital::PinState;
use servo_envoy::hal::{CompareTimer, PinBank, PinId};
use servo_envoy::{GroupId, MuxConfig, ServoMux};

pub const GROUPS: usize = 2;
pub const CHANNELS: usize = 24;
pub const NS_PER_TICK: u64 = 500;
pub const REFRESH_TICKS: u64 = 32_000;

pub type SimMux = ServoMux<SimPins, SimTimer, CHANNELS, GROUPS>;

/// A multiplexer with the default configuration and no hardware.
pub fn mux() -> SimMux {
    SimMux::new(MuxConfig::new())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub at: u64,
    pub pin: PinId,
    pub high: bool,
}

#[derive(Default)]
struct TimerState {
    start: u64,
    compare: u16,
    enabled: bool,
}

#[derive(Default)]
struct World {
    now: u64,
    timers: [TimerState; GROUPS],
    levels: [bool; 32],
    configured: Vec<PinId>,
    edges: Vec<Edge>,
}

#[derive(Clone, Default)]
pub struct Sim(Rc<RefCell<World>>);

impl Sim {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh simulation with its pins and timers installed in `mux`.
    pub fn installed(mux: &SimMux) -> Self {
        let sim = Self::new();
        let timers = [0, 1].map(|group| SimTimer::new(&sim, group));
        mux.init(SimPins::new(&sim), timers).expect("first init");
        sim
    }

    pub fn now(&self) -> u64 {
        self.0.borrow().now
    }

    pub fn timer_enabled(&self, group: usize) -> bool {
        self.0.borrow().timers[group].enabled
    }

    pub fn is_high(&self, pin: PinId) -> bool {
        self.0.borrow().levels[usize::from(pin)]
    }

    pub fn configured(&self) -> Vec<PinId> {
        self.0.borrow().configured.clone()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.0.borrow().edges.clone()
    }

    pub fn clear_edges(&self) {
        self.0.borrow_mut().edges.clear();
    }

    /// Completed pulses on `pin` as `(rise time, width)` in ticks.
    pub fn pulses(&self, pin: PinId) -> Vec<(u64, u64)> {
        let mut rise = None;
        let mut pulses = Vec::new();
        for edge in self.edges().into_iter().filter(|edge| edge.pin == pin) {
            if edge.high {
                rise = Some(edge.at);
            } else if let Some(start) = rise.take() {
                pulses.push((start, edge.at - start));
            }
        }
        pulses
    }

    /// Pulse widths on `pin` in ticks.
    pub fn widths(&self, pin: PinId) -> Vec<u64> {
        self.pulses(pin).into_iter().map(|(_, width)| width).collect()
    }

    /// Advance the clock by `ticks`, delivering every compare event on the way.
    pub fn run_for(&self, mux: &SimMux, ticks: u64) {
        let end = self.now() + ticks;
        loop {
            let next = {
                let world = self.0.borrow();
                world
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.enabled)
                    .map(|(group, timer)| (timer.start + u64::from(timer.compare), group))
                    .min()
            };
            match next {
                Some((at, group)) if at <= end => {
                    {
                        let mut world = self.0.borrow_mut();
                        world.now = world.now.max(at);
                    }
                    mux.on_compare(GroupId::new(group as u8));
                }
                _ => break,
            }
        }
        self.0.borrow_mut().now = end;
    }

    pub fn run_cycles(&self, mux: &SimMux, cycles: u64) {
        self.run_for(mux, cycles * REFRESH_TICKS);
    }
}

pub struct SimPins(Sim);

impl SimPins {
    pub fn new(sim: &Sim) -> Self {
        Self(sim.clone())
    }
}

impl PinBank for SimPins {
    fn configure_output(&mut self, pin: PinId) {
        self.0.0.borrow_mut().configured.push(pin);
        self.set_level(pin, PinState::Low);
    }

    fn set_level(&mut self, pin: PinId, level: PinState) {
        let mut world = self.0.0.borrow_mut();
        let high = level == PinState::High;
        if world.levels[usize::from(pin)] != high {
            world.levels[usize::from(pin)] = high;
            let at = world.now;
            world.edges.push(Edge { at, pin, high });
        }
    }
}

pub struct SimTimer {
    sim: Sim,
    group: usize,
}

impl SimTimer {
    pub fn new(sim: &Sim, group: usize) -> Self {
        Self {
            sim: sim.clone(),
            group,
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut TimerState, u64) -> R) -> R {
        let mut world = self.sim.0.borrow_mut();
        let now = world.now;
        f(&mut world.timers[self.group], now)
    }
}

impl CompareTimer for SimTimer {
    fn enable(&mut self) {
        self.with(|timer, _| timer.enabled = true);
    }

    fn disable(&mut self) {
        self.with(|timer, _| timer.enabled = false);
    }

    fn counter(&self) -> u16 {
        self.with(|timer, now| (now - timer.start) as u16)
    }

    fn reset_counter(&mut self) {
        self.with(|timer, now| timer.start = now);
    }

    fn compare(&self) -> u16 {
        self.with(|timer, _| timer.compare)
    }

    fn set_compare(&mut self, ticks: u16) {
        self.with(|timer, _| timer.compare = ticks);
    }

    fn clear_interrupt(&mut self) {}
}

/// A delay that runs the simulation instead of sleeping.
pub struct SimDelay<'a> {
    sim: Sim,
    mux: &'a SimMux,
    pub slept_ns: u64,
}

impl<'a> SimDelay<'a> {
    pub fn new(sim: &Sim, mux: &'a SimMux) -> Self {
        Self {
            sim: sim.clone(),
            mux,
            slept_ns: 0,
        }
    }
}

impl embedded_hal::delay::DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.slept_ns += u64::from(ns);
        self.sim.run_for(self.mux, u64::from(ns) / NS_PER_TICK);
    }
}

impl embedded_hal_async::delay::DelayNs for SimDelay<'_> {
    async fn delay_ns(&mut self, ns: u32) {
        self.slept_ns += u64::from(ns);
        self.sim.run_for(self.mux, u64::from(ns) / NS_PER_TICK);
    }
}
