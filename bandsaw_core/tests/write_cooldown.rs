use std::sync::Arc;

use bandsaw_core::config::LinkCfg;
use bandsaw_core::{HardwareLink, SetpointWriter, SpeedLimits};
use bandsaw_hardware::SimulatedBus;
use bandsaw_traits::{Clock, ManualClock};
use rstest::rstest;

fn connected_link() -> (HardwareLink<SimulatedBus>, bandsaw_hardware::SimHandle, ManualClock) {
    let clock = ManualClock::new();
    let bus = SimulatedBus::new();
    let sim = bus.handle();
    let link = HardwareLink::new(bus, LinkCfg::default(), Arc::new(clock.clone()));
    assert!(link.connect());
    (link, sim, clock)
}

#[rstest]
#[case(0)]
#[case(50)]
#[case(99)]
fn second_write_inside_cooldown_never_reaches_bus(#[case] gap_ms: u64) {
    let (link, sim, clock) = connected_link();
    assert!(link.write_register(2101, 4000));
    clock.advance_ms(gap_ms);
    assert!(!link.write_register(2101, 3900));
    assert_eq!(sim.writes(), vec![(2101, 4000)]);
}

#[test]
fn write_after_cooldown_is_accepted() {
    let (link, sim, clock) = connected_link();
    assert!(link.write_register(2101, 4000));
    clock.advance_ms(100);
    assert!(link.write_register(2101, 3900));
    assert_eq!(sim.writes().len(), 2);
}

#[test]
fn cooldown_is_per_register() {
    let (link, sim, _clock) = connected_link();
    assert!(link.write_descent_speed(38.5));
    assert!(link.write_cutting_speed(90.0));
    assert_eq!(sim.writes(), vec![(2101, 3850), (2100, 90)]);
}

#[test]
fn negative_descent_uses_twos_complement_on_the_wire() {
    let (link, sim, _clock) = connected_link();
    assert!(link.write_descent_speed(-1.0));
    assert_eq!(sim.writes(), vec![(2101, 0xFF9C)]);
}

#[test]
fn emergency_stop_waits_out_cooldown() {
    let (link, sim, clock) = connected_link();
    assert!(link.write_descent_speed(40.0));
    let before = clock.now();
    assert!(bandsaw_core::runner::emergency_stop(&link));
    assert!(clock.now() > before);
    assert_eq!(sim.writes(), vec![(2101, 4000), (2101, 0), (2100, 0)]);
}

#[test]
fn writes_are_dropped_while_link_is_down() {
    let clock = ManualClock::new();
    let bus = SimulatedBus::new();
    let sim = bus.handle();
    sim.lock().refuse_connect = true;
    let link = HardwareLink::new(bus, LinkCfg::default(), Arc::new(clock.clone()));
    assert!(link.read_all().is_none());
    assert!(!link.write_descent_speed(30.0));
    assert!(sim.writes().is_empty());
}

#[test]
fn read_fault_forces_reconnect_on_next_read() {
    let (link, sim, clock) = connected_link();
    sim.lock().fail_reads = 1;
    assert!(link.read_all().is_none());
    assert!(!link.is_connected());
    // Still inside the connect cooldown
    assert!(link.read_all().is_none());
    clock.advance_ms(2_000);
    assert!(link.read_all().is_some());
    assert!(link.is_connected());
    assert_eq!(sim.lock().connect_attempts, 2);
}

#[test]
fn limits_without_a_register_step_refuse_the_write() {
    let clock = ManualClock::new();
    let bus = SimulatedBus::new();
    let sim = bus.handle();
    let cfg = LinkCfg {
        limits: Some(SpeedLimits::new(65.2, 65.8, 20.0, 60.0).unwrap()),
        ..LinkCfg::default()
    };
    let link = HardwareLink::new(bus, cfg, Arc::new(clock.clone()));
    assert!(link.connect());
    assert!(!link.write_cutting_speed(65.5));
    assert!(link.write_descent_speed(60.4));
    assert_eq!(sim.writes(), vec![(2101, 6000)]);
}
