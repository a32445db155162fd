use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use bandsaw_core::config::{DelayCfg, ExpertCfg, GateCfg, LinkCfg};
use bandsaw_core::diagnostics::MemorySink;
use bandsaw_core::register_map::{self, BLOCK_LEN};
use bandsaw_core::runner::Command;
use bandsaw_core::strategy::ExpertStrategy;
use bandsaw_core::{
    Dispatcher, HardwareLink, MachineSnapshot, PollLoop, StrategyKind, TickOutcome,
};
use bandsaw_hardware::{SimHandle, SimulatedBus};
use bandsaw_traits::ManualClock;
use crossbeam_channel as xch;

const BASE: u16 = 2000;

fn machine(current: f64, deflection: f64, descent: f64) -> [u16; BLOCK_LEN] {
    register_map::encode_block(&MachineSnapshot {
        band_current: Some(current),
        band_deflection: Some(deflection),
        head_height: Some(200.0),
        state_code: Some(3),
        cutting_speed: Some(80.0),
        descent_speed: Some(descent),
        ..MachineSnapshot::default()
    })
}

fn expert_loop(sink: MemorySink) -> (PollLoop<SimulatedBus>, SimHandle, ManualClock) {
    let clock = ManualClock::new();
    let bus = SimulatedBus::new();
    let sim = bus.handle();
    sim.lock().set_block(BASE, &machine(20.0, 0.1, 40.0));
    let link = Arc::new(HardwareLink::new(
        bus,
        LinkCfg::default(),
        Arc::new(clock.clone()),
    ));
    let dispatcher = Dispatcher::builder()
        .with_delay(DelayCfg {
            min_ms: 0,
            max_ms: 0,
            default_ms: 0,
            ..DelayCfg::default()
        })
        .with_gate(GateCfg::default())
        .with_strategy(Box::new(ExpertStrategy::new(
            ExpertCfg::default(),
            Box::new(sink),
        )))
        .with_active(Some(StrategyKind::Expert))
        .try_build()
        .unwrap();
    let pl = PollLoop::new(link, dispatcher, Arc::new(clock.clone()), 10);
    (pl, sim, clock)
}

#[test]
fn expert_end_to_end_writes_reduced_descent() {
    let sink = MemorySink::new();
    let (mut pl, sim, _clock) = expert_loop(sink.clone());

    // tick 1 starts the cut, tick 2 engages and runs
    assert!(matches!(pl.tick(), Some(TickOutcome::Skipped(_))));
    match pl.tick() {
        Some(TickOutcome::Ran { adjustment, .. }) => {
            assert_eq!(adjustment.diagnostic, Some(-1.5));
        }
        other => panic!("expected a run, got {other:?}"),
    }
    // 38.5 mm/min in hundredths
    assert_eq!(sim.writes(), vec![(2101, 3850)]);
    assert_eq!(sink.rows().len(), 1);
    assert_eq!(pl.report().last_applied.map(|p| p.descent_speed), Some(38.5));
}

#[test]
fn loop_runs_at_poll_rate_and_respects_rate_gate() {
    let (mut pl, sim, _clock) = expert_loop(MemorySink::new());
    let stop = AtomicBool::new(false);
    // 3 s at 10 Hz
    let summary = pl.run(&stop, Some(30));
    assert_eq!(summary.ticks, 30);
    assert_eq!(summary.missed_reads, 0);
    // First run on tick 2, then once per second; the machine keeps reporting
    // 40 mm/min so every run writes 38.5.
    let writes = sim.writes();
    assert_eq!(writes.len(), 3);
    assert!(writes.iter().all(|w| *w == (2101, 3850)));
}

#[test]
fn unreachable_machine_holds_setpoints() {
    let (mut pl, sim, _clock) = expert_loop(MemorySink::new());
    sim.lock().refuse_connect = true;
    let stop = AtomicBool::new(false);
    let summary = pl.run(&stop, Some(50));
    assert_eq!(summary.missed_reads, 50);
    assert!(sim.writes().is_empty());
    // one attempt every 2 s over 5 s of ticks
    assert_eq!(sim.lock().connect_attempts, 3);
}

#[test]
fn operator_commands_are_applied_between_ticks() {
    let (mut pl, sim, _clock) = expert_loop(MemorySink::new());
    let tx = pl.command_channel();

    let (reply_tx, reply_rx) = xch::bounded(1);
    tx.send(Command::SetActive {
        selection: Some(StrategyKind::Ml),
        reply: Some(reply_tx),
    })
    .unwrap();
    let (stats_tx, stats_rx) = xch::bounded(1);
    tx.send(Command::GetStats(stats_tx)).unwrap();
    pl.tick();
    assert!(reply_rx.recv_timeout(Duration::from_secs(1)).unwrap().is_err());
    let report = stats_rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(report.active, Some(StrategyKind::Expert));

    tx.send(Command::EmergencyStop).unwrap();
    pl.tick();
    assert_eq!(pl.dispatcher().active(), None);
    assert_eq!(sim.writes(), vec![(2101, 0), (2100, 0)]);
}
