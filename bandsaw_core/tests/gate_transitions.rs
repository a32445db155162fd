use std::time::{Duration, Instant};

use bandsaw_core::Dispatcher;
use bandsaw_core::gate::GatePhase;
use bandsaw_core::lifecycle::{LifecycleEvent, RecordingLifecycle};
use bandsaw_core::mocks::RecordingWriter;
use bandsaw_core::{MachineSnapshot, SkipReason, TickOutcome};
use rstest::rstest;

fn snap(code: u16) -> MachineSnapshot {
    MachineSnapshot {
        state_code: Some(code),
        descent_speed: Some(40.0),
        cutting_speed: Some(80.0),
        band_current: Some(17.0),
        ..MachineSnapshot::default()
    }
}

#[rstest]
#[case(&[0, 3, 3, 0])]
#[case(&[0, 3, 0])]
#[case(&[0, 3, 3, 3, 3, 3, 3, 3, 0, 0])]
#[case(&[2, 3, 2, 1])]
fn one_cut_gives_one_start_and_one_end(#[case] codes: &[u16]) {
    let probe = RecordingLifecycle::new();
    let mut d = Dispatcher::builder()
        .with_lifecycle(Box::new(probe.clone()))
        .try_build()
        .unwrap();
    let w = RecordingWriter::new();
    let t0 = Instant::now();
    for (i, code) in codes.iter().enumerate() {
        let s = snap(*code);
        d.tick(&s, s.setpoints(), t0 + Duration::from_secs(i as u64), &w);
    }
    assert_eq!(
        probe.events(),
        vec![LifecycleEvent::Start("none".into()), LifecycleEvent::End]
    );
}

#[test]
fn two_cuts_notify_twice() {
    let probe = RecordingLifecycle::new();
    let mut d = Dispatcher::builder()
        .with_lifecycle(Box::new(probe.clone()))
        .try_build()
        .unwrap();
    let w = RecordingWriter::new();
    let t0 = Instant::now();
    for (i, code) in [3u16, 4, 3, 0].into_iter().enumerate() {
        let s = snap(code);
        d.tick(&s, s.setpoints(), t0 + Duration::from_secs(i as u64), &w);
    }
    assert_eq!(probe.events().len(), 4);
}

#[test]
fn engaging_blocks_until_delay_then_opens() {
    let mut d = Dispatcher::builder()
        .with_strategy(Box::new(bandsaw_core::strategy::ExpertStrategy::new(
            Default::default(),
            Box::new(bandsaw_core::diagnostics::NullSink),
        )))
        .with_active(Some(bandsaw_core::StrategyKind::Expert))
        .try_build()
        .unwrap();
    let w = RecordingWriter::new();
    let t0 = Instant::now();
    let s = snap(3);

    // 20 mm at 40 mm/min is 30 s of engagement.
    let out = d.tick(&s, s.setpoints(), t0, &w);
    assert!(matches!(out, TickOutcome::Skipped(SkipReason::Engaging)));
    let out = d.tick(&s, s.setpoints(), t0 + Duration::from_secs(29), &w);
    assert!(matches!(out, TickOutcome::Skipped(SkipReason::Engaging)));
    let out = d.tick(&s, s.setpoints(), t0 + Duration::from_secs(30), &w);
    assert!(matches!(out, TickOutcome::Ran { .. }));
    assert!(matches!(d.gate_phase(), GatePhase::Active { .. }));
}
