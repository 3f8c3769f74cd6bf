#![allow(missing_docs)]
//! Host-level tests for channel allocation, attach and detach.

mod common;

use common::{CHANNELS, Sim, mux};
use servo_envoy::{ChannelIndex, Error, Servo};

#[test]
fn attach_configures_pin_and_starts_group() {
    let mux = mux();
    let sim = Sim::installed(&mux);
    let mut servo = Servo::new(&mux);
    assert!(!servo.attached());
    assert!(!sim.timer_enabled(0));

    assert_eq!(servo.attach(9), Ok(ChannelIndex::new(0)));

    assert!(servo.attached());
    assert_eq!(sim.configured(), vec![9]);
    assert!(sim.timer_enabled(0));
    assert!(!sim.timer_enabled(1));
}

#[test]
fn group_timer_runs_while_any_channel_is_attached() {
    let mux = mux();
    let sim = Sim::installed(&mux);
    let mut servos: Vec<Servo<'_>> = (0..13).map(|_| Servo::new(&mux)).collect();

    servos[1].attach(1).expect("attach");
    servos[2].attach(2).expect("attach");
    servos[12].attach(12).expect("attach");
    assert!(sim.timer_enabled(0));
    assert!(sim.timer_enabled(1));

    servos[1].detach();
    assert!(sim.timer_enabled(0));
    servos[2].detach();
    assert!(!sim.timer_enabled(0));
    assert!(sim.timer_enabled(1));

    servos[12].detach();
    assert!(!sim.timer_enabled(1));

    servos[2].attach(2).expect("reattach");
    assert!(sim.timer_enabled(0));
}

#[test]
fn detach_drops_pin_and_stops_pulsing() {
    let mux = mux();
    let sim = Sim::installed(&mux);
    let mut keep = Servo::new(&mux);
    let mut servo = Servo::new(&mux);
    keep.attach(3).expect("attach");
    servo.attach(4).expect("attach");
    keep.write_microseconds(1_000);

    // Inside the second channel's pulse.
    sim.run_for(&mux, 2_100);
    assert!(sim.is_high(4));

    servo.detach();
    assert!(!servo.attached());
    assert!(!sim.is_high(4));

    sim.clear_edges();
    sim.run_cycles(&mux, 3);
    assert!(sim.pulses(4).is_empty());
    assert_eq!(sim.pulses(3).len(), 3);
}

#[test]
fn detach_without_attach_leaves_pins_alone() {
    let mux = mux();
    let sim = Sim::installed(&mux);
    let mut live = Servo::new(&mux);
    let mut idle = Servo::new(&mux);
    live.attach(0).expect("attach");
    live.write_microseconds(2_000);

    sim.run_for(&mux, 1_000);
    assert!(sim.is_high(0));
    // Never attached, so its pin number is the default 0.
    idle.detach();
    assert!(sim.is_high(0));
    assert!(sim.timer_enabled(0));

    sim.run_cycles(&mux, 2);
    let widths = sim.widths(0);
    assert_eq!(widths.len(), 2);
    assert!(widths.iter().all(|&width| width == 3_990));
}

#[test]
fn second_detach_leaves_reused_pin_alone() {
    let mux = mux();
    let sim = Sim::installed(&mux);
    let mut old = Servo::new(&mux);
    let mut new = Servo::new(&mux);
    old.attach(3).expect("attach");
    old.detach();
    new.attach(3).expect("attach");
    new.write_microseconds(2_000);

    // Past the old channel's idle slot, inside the new channel's pulse.
    sim.run_for(&mux, 4_000);
    assert!(sim.is_high(3));
    old.detach();
    assert!(sim.is_high(3));

    sim.run_cycles(&mux, 2);
    assert!(sim.widths(3).iter().all(|&width| width == 3_990));
}

#[test]
fn attach_to_another_pin_releases_the_old_one() {
    let mux = mux();
    let sim = Sim::installed(&mux);
    let mut servo = Servo::new(&mux);
    servo.attach(3).expect("attach");

    sim.run_for(&mux, 1_000);
    assert!(sim.is_high(3));

    servo.attach(4).expect("move to pin 4");
    assert!(!sim.is_high(3));
    assert!(servo.attached());
    assert_eq!(sim.configured(), vec![3, 4]);

    sim.clear_edges();
    sim.run_cycles(&mux, 3);
    assert!(sim.edges().iter().all(|edge| edge.pin == 4));
    let widths = sim.widths(4);
    assert_eq!(widths.len(), 3);
    assert!(widths.iter().all(|&width| width == 2_990));
    assert!(!sim.is_high(3));
}

#[test]
fn pool_exhaustion_yields_inert_handle() {
    let mux = mux();
    let sim = Sim::installed(&mux);
    let servos: Vec<Servo<'_>> = (0..CHANNELS).map(|_| Servo::new(&mux)).collect();
    assert!(servos.iter().all(|servo| servo.index().is_valid()));

    let mut extra = Servo::new(&mux);
    assert_eq!(extra.index(), ChannelIndex::INVALID);
    assert!(matches!(Servo::try_new(&mux), Err(Error::PoolExhausted)));
    assert!(matches!(mux.servo(), Err(Error::PoolExhausted)));

    assert_eq!(extra.attach(7), Err(Error::InvalidChannel));
    extra.write(90);
    extra.write_with_speed(90, 10);
    extra.detach();
    assert!(!extra.attached());
    assert!(!extra.is_moving());
    assert_eq!(extra.read(), 0);
    assert_eq!(extra.read_microseconds(), 0);
    assert!(sim.configured().is_empty());
}

#[test]
fn attach_before_init_fails() {
    let mux = mux();
    let mut servo = Servo::new(&mux);
    assert_eq!(servo.attach(2), Err(Error::NotInitialized));
    assert!(!servo.attached());
}

#[test]
fn second_init_is_rejected() {
    let mux = mux();
    let _sim = Sim::installed(&mux);
    let other = Sim::new();
    let timers = [0, 1].map(|group| common::SimTimer::new(&other, group));
    assert_eq!(
        mux.init(common::SimPins::new(&other), timers),
        Err(Error::AlreadyInitialized)
    );
}

#[test]
fn invalid_pulse_range_is_rejected() {
    let mux = mux();
    let sim = Sim::installed(&mux);
    let mut servo = Servo::new(&mux);
    assert_eq!(
        servo.attach_with_range(5, 2_000, 1_000),
        Err(Error::InvalidPulseRange {
            min_us: 2_000,
            max_us: 1_000
        })
    );
    assert!(!servo.attached());
    assert!(!sim.timer_enabled(0));
}

#[test]
fn mux_hands_out_servos_in_order() {
    let mux = mux();
    let first = mux.servo().expect("channel");
    let second = mux.servo().expect("channel");
    assert_eq!(first.index(), ChannelIndex::new(0));
    assert_eq!(second.index(), ChannelIndex::new(1));
    assert_eq!(mux.channel(ChannelIndex::new(1)).map(|slot| slot.ticks()), Some(2_990));
    assert!(mux.channel(ChannelIndex::new(2)).is_none());
}
