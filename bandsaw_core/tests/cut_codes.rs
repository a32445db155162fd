//! Which state codes count as "still cutting" differs per strategy: Fuzzy
//! rides through a brief drop to band-running (2), the others start over.

use std::time::{Duration, Instant};

use bandsaw_config::RegressionArtifact;
use bandsaw_core::config::{ExpertCfg, FuzzyCfg, MlCfg};
use bandsaw_core::diagnostics::NullSink;
use bandsaw_core::mocks::RecordingWriter;
use bandsaw_core::strategy::{
    Adjustment, ExpertStrategy, FuzzyStrategy, MlStrategy, TickContext,
};
use bandsaw_core::{ControlStrategy, MachineSnapshot, SpeedLimits};

fn snap(code: u16, current: f64) -> MachineSnapshot {
    MachineSnapshot {
        state_code: Some(code),
        band_current: Some(current),
        head_height: Some(150.0),
        torque_pct: Some(20.0),
        cutting_speed: Some(80.0),
        descent_speed: Some(40.0),
        ..MachineSnapshot::default()
    }
}

struct Ticker {
    t0: Instant,
    tick: u64,
    writer: RecordingWriter,
}

impl Ticker {
    fn new() -> Self {
        Self {
            t0: Instant::now(),
            tick: 0,
            writer: RecordingWriter::new(),
        }
    }

    fn observe(&mut self, s: &mut dyn ControlStrategy, snap: &MachineSnapshot) -> Instant {
        self.tick += 1;
        let now = self.t0 + Duration::from_secs(self.tick);
        s.observe(snap, now);
        now
    }

    fn step(&mut self, s: &mut dyn ControlStrategy, snap: &MachineSnapshot) -> Adjustment {
        let now = self.observe(s, snap);
        let ctx = TickContext {
            now,
            limits: SpeedLimits::default(),
            multiplier: 1.0,
            writer: &self.writer,
        };
        s.adjust(snap, snap.setpoints(), &ctx).unwrap()
    }
}

#[test]
fn fuzzy_keeps_carry_through_band_running() {
    let mut s = FuzzyStrategy::new(
        FuzzyCfg {
            cutting_flush: 1_000.0,
            ..FuzzyCfg::default()
        },
        Box::new(NullSink),
    );
    let mut t = Ticker::new();
    t.step(&mut s, &snap(3, 30.0));
    let pending = s.pending_cutting();
    assert!(pending < 0.0);

    t.observe(&mut s, &snap(2, 30.0));
    t.observe(&mut s, &snap(3, 30.0));
    assert_eq!(s.pending_cutting(), pending);

    t.observe(&mut s, &snap(0, 30.0));
    assert_eq!(s.pending_cutting(), 0.0);
}

#[test]
fn ml_resets_carry_on_band_running() {
    let model = RegressionArtifact {
        intercept: 0.3,
        coefficients: [0.0; 4],
        means: [0.0; 4],
        scales: [1.0; 4],
    };
    let mut s = MlStrategy::with_model(MlCfg::default(), model, Box::new(NullSink));
    let mut t = Ticker::new();
    t.step(&mut s, &snap(3, 0.0));
    assert!(s.pending().0 > 0.0);
    assert!(!s.guard().history().is_empty());

    t.observe(&mut s, &snap(2, 0.0));
    assert_eq!(s.pending(), (0.0, 0.0));
    assert!(s.guard().history().is_empty());
}

#[test]
fn expert_starts_a_fresh_average_after_band_running() {
    let mut s = ExpertStrategy::new(ExpertCfg::default(), Box::new(NullSink));
    let mut t = Ticker::new();
    let adj = t.step(&mut s, &snap(3, 30.0));
    assert!(adj.setpoints.is_some());

    // Back at the ideal current after a drop to code 2: the 30 A sample is
    // gone, so there is nothing to correct.
    t.observe(&mut s, &snap(2, 17.0));
    let adj = t.step(&mut s, &snap(3, 17.0));
    assert_eq!(adj.diagnostic, Some(0.0));
    assert!(adj.setpoints.is_none());
}
