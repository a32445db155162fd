use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bandsaw_core::config::{DelayCfg, GateCfg};
use bandsaw_core::error::{ControlError, StrategyError};
use bandsaw_core::mocks::RecordingWriter;
use bandsaw_core::strategy::{Adjustment, TickContext};
use bandsaw_core::{
    ControlStrategy, Dispatcher, MachineSnapshot, Setpoints, SkipReason, StrategyKind,
    TickOutcome,
};
use rstest::rstest;

/// Strategy whose behaviour is chosen per test.
struct Scripted {
    kind: StrategyKind,
    mode: Mode,
    calls: Arc<AtomicUsize>,
}

#[derive(Clone, Copy)]
enum Mode {
    Ok,
    Err,
    Panic,
}

impl ControlStrategy for Scripted {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn adjust(
        &mut self,
        _snapshot: &MachineSnapshot,
        current: Setpoints,
        _ctx: &TickContext<'_>,
    ) -> Result<Adjustment, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Ok => Ok(Adjustment {
                setpoints: Some(current),
                diagnostic: Some(1.0),
            }),
            Mode::Err => Err(StrategyError::NoData("test")),
            Mode::Panic => panic!("boom"),
        }
    }
}

fn scripted(kind: StrategyKind, mode: Mode) -> (Box<dyn ControlStrategy>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (
        Box::new(Scripted {
            kind,
            mode,
            calls: calls.clone(),
        }),
        calls,
    )
}

/// Dispatcher with zero engagement delay and a 1 s rate gate.
fn dispatcher(strategies: Vec<Box<dyn ControlStrategy>>) -> Dispatcher {
    let mut b = Dispatcher::builder()
        .with_delay(DelayCfg {
            target_distance_mm: 20.0,
            min_ms: 0,
            max_ms: 0,
            default_ms: 0,
        })
        .with_gate(GateCfg {
            min_update: Duration::from_secs(1),
            ..GateCfg::default()
        });
    for s in strategies {
        b = b.with_strategy(s);
    }
    b.try_build().unwrap()
}

fn cutting(descent: f64) -> MachineSnapshot {
    MachineSnapshot {
        state_code: Some(3),
        descent_speed: Some(descent),
        cutting_speed: Some(80.0),
        ..MachineSnapshot::default()
    }
}

/// First tick starts the cut; second engages (zero delay).
fn engage(d: &mut Dispatcher, w: &RecordingWriter, t0: Instant) {
    let s = cutting(40.0);
    d.tick(&s, s.setpoints(), t0, w);
}

#[rstest]
#[case(Mode::Err)]
#[case(Mode::Panic)]
fn faults_are_counted_and_contained(#[case] mode: Mode) {
    let (s, calls) = scripted(StrategyKind::Expert, mode);
    let mut d = dispatcher(vec![s]);
    d.set_active(Some(StrategyKind::Expert)).unwrap();
    let w = RecordingWriter::new();
    let t0 = Instant::now();
    engage(&mut d, &w, t0);

    let s = cutting(40.0);
    for i in 1..=3u64 {
        let out = d.tick(&s, s.setpoints(), t0 + Duration::from_secs(i), &w);
        assert!(matches!(
            out,
            TickOutcome::Faulted(ControlError::StrategyFault {
                strategy: "expert",
                ..
            })
        ));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let stats = d.stats();
    assert_eq!(stats[&StrategyKind::Expert].errors, 3);
    assert_eq!(stats[&StrategyKind::Expert].runs, 3);
    assert!(w.take().is_empty());
}

#[test]
fn nothing_runs_without_selection_or_with_head_stopped() {
    let (s, calls) = scripted(StrategyKind::Fuzzy, Mode::Ok);
    let mut d = dispatcher(vec![s]);
    let w = RecordingWriter::new();
    let t0 = Instant::now();
    engage(&mut d, &w, t0);
    let snap = cutting(40.0);
    let out = d.tick(&snap, snap.setpoints(), t0 + Duration::from_secs(1), &w);
    assert!(matches!(out, TickOutcome::Skipped(SkipReason::NoSelection)));

    d.set_active(Some(StrategyKind::Fuzzy)).unwrap();
    let stopped = cutting(0.0);
    let out = d.tick(&stopped, stopped.setpoints(), t0 + Duration::from_secs(2), &w);
    assert!(matches!(out, TickOutcome::Skipped(SkipReason::HeadStopped)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn rate_gate_caps_successful_runs() {
    let (s, calls) = scripted(StrategyKind::Linear, Mode::Ok);
    let mut d = dispatcher(vec![s]);
    d.set_active(Some(StrategyKind::Linear)).unwrap();
    let w = RecordingWriter::new();
    let t0 = Instant::now();
    engage(&mut d, &w, t0);
    let snap = cutting(40.0);
    // 10 Hz for 2 s
    for i in 1..=20u64 {
        d.tick(&snap, snap.setpoints(), t0 + Duration::from_millis(i * 100), &w);
    }
    // runs at 0.1 s, 1.1 s
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn unknown_selection_leaves_state_untouched() {
    let (s, _) = scripted(StrategyKind::Expert, Mode::Ok);
    let mut d = dispatcher(vec![s]);
    d.set_active(Some(StrategyKind::Expert)).unwrap();
    let err = d.set_active(Some(StrategyKind::Ml)).unwrap_err();
    assert!(matches!(err, ControlError::ConfigurationFault(_)));
    assert_eq!(d.active(), Some(StrategyKind::Expert));
    assert!(d.select("bogus").is_err());
    assert_eq!(d.active(), Some(StrategyKind::Expert));
    d.select("none").unwrap();
    assert_eq!(d.active(), None);
}

#[test]
fn emergency_stop_clears_selection() {
    let (s, _) = scripted(StrategyKind::Ml, Mode::Ok);
    let mut d = dispatcher(vec![s]);
    d.set_active(Some(StrategyKind::Ml)).unwrap();
    d.emergency_stop();
    assert_eq!(d.active(), None);
}
