//! Control strategies and their shared contract.
//!
//! A strategy maps a snapshot to new setpoints. It owns its smoothing buffers,
//! carry buffers and diagnostic sink, writes through the `SetpointWriter` it
//! is handed, and reports faults as `StrategyError` instead of panicking.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use tracing::warn;

use crate::diagnostics::{DiagnosticRecord, DiagnosticSink};
use crate::error::{ControlError, StrategyError};
use crate::snapshot::{MachineSnapshot, Setpoints, SpeedLimits};

pub mod expert;
pub mod fuzzy;
pub mod linear;
pub mod ml;
pub mod torque_guard;

pub use expert::ExpertStrategy;
pub use fuzzy::{FuzzyEngine, FuzzyStrategy};
pub use linear::LinearStrategy;
pub use ml::MlStrategy;
pub use torque_guard::{GuardVerdict, HeightTorqueSample, TorqueGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StrategyKind {
    Expert,
    Fuzzy,
    Linear,
    Ml,
}

impl StrategyKind {
    pub const ALL: [Self; 4] = [Self::Expert, Self::Fuzzy, Self::Linear, Self::Ml];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Expert => "expert",
            Self::Fuzzy => "fuzzy",
            Self::Linear => "linear",
            Self::Ml => "ml",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == lower)
            .ok_or_else(|| ControlError::ConfigurationFault(format!("unknown strategy '{s}'")))
    }
}

/// Parse an operator selection where `none` clears the active strategy.
pub fn parse_selection(s: &str) -> Result<Option<StrategyKind>, ControlError> {
    if s.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    s.parse().map(Some)
}

/// Setpoint output port. Implementations apply their own throttling and
/// return `false` when a write did not reach the machine.
pub trait SetpointWriter {
    fn write_cutting_speed(&self, v: f64) -> bool;
    fn write_descent_speed(&self, v: f64) -> bool;
}

/// Per-tick inputs besides the snapshot.
pub struct TickContext<'a> {
    pub now: Instant,
    pub limits: SpeedLimits,
    /// Global coefficient multiplier.
    pub multiplier: f64,
    pub writer: &'a dyn SetpointWriter,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Adjustment {
    /// New setpoints when the strategy changed something.
    pub setpoints: Option<Setpoints>,
    pub diagnostic: Option<f64>,
}

impl Adjustment {
    pub const UNCHANGED: Self = Self {
        setpoints: None,
        diagnostic: None,
    };
}

pub trait ControlStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Called every tick with the raw machine state, before any gating, so
    /// the strategy can track cut boundaries with its own notion of cutting.
    fn observe(&mut self, _snapshot: &MachineSnapshot, _now: Instant) {}

    fn adjust(
        &mut self,
        snapshot: &MachineSnapshot,
        current: Setpoints,
        ctx: &TickContext<'_>,
    ) -> Result<Adjustment, StrategyError>;
}

/// Accumulates fractional deltas until their magnitude reaches a threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarryBuffer {
    value: f64,
    threshold: f64,
}

impl CarryBuffer {
    pub fn new(threshold: f64) -> Self {
        Self {
            value: 0.0,
            threshold,
        }
    }

    pub fn add(&mut self, delta: f64) {
        if delta.is_finite() {
            self.value += delta;
        }
    }

    pub fn ready(&self) -> bool {
        self.value.abs() >= self.threshold
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// Cutting-speed delta matching a descent delta as a share of the span left
/// in the direction of travel.
pub fn proportional_cutting_delta(
    descent_delta: f64,
    current: Setpoints,
    limits: &SpeedLimits,
) -> f64 {
    let d = descent_delta;
    let span = if d > 0.0 {
        limits.descent_max - current.descent_speed
    } else {
        current.descent_speed - limits.descent_min
    };
    if span <= 0.0 || !span.is_finite() || d == 0.0 {
        return 0.0;
    }
    let pct = d / span;
    if pct > 0.0 {
        pct * (limits.cutting_max - current.cutting_speed)
    } else {
        pct * (current.cutting_speed - limits.cutting_min)
    }
}

pub(crate) fn finite(v: f64, what: &'static str) -> Result<f64, StrategyError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(StrategyError::NonFinite(what))
    }
}

/// Record a diagnostic row; sink failures are logged, never fatal.
pub(crate) fn emit(sink: &mut dyn DiagnosticSink, rec: &DiagnosticRecord) {
    if let Err(e) = sink.record(rec) {
        warn!(strategy = rec.strategy, error = %e, "diagnostic write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("expert", Some(StrategyKind::Expert))]
    #[case(" Fuzzy ", Some(StrategyKind::Fuzzy))]
    #[case("ML", Some(StrategyKind::Ml))]
    #[case("none", None)]
    fn selection_parses(#[case] s: &str, #[case] want: Option<StrategyKind>) {
        assert_eq!(parse_selection(s).unwrap(), want);
    }

    #[test]
    fn unknown_selection_is_configuration_fault() {
        assert!(matches!(
            parse_selection("pid"),
            Err(ControlError::ConfigurationFault(_))
        ));
    }

    #[test]
    fn carry_flushes_at_threshold() {
        let mut c = CarryBuffer::new(0.9);
        c.add(0.5);
        assert!(!c.ready());
        c.add(-1.5);
        assert!(c.ready());
        c.reset();
        assert_eq!(c.value(), 0.0);
    }

    #[rstest]
    // halfway up the descent span maps to halfway up the cutting span
    #[case(10.0, 40.0, 80.0, 10.0 / 20.0 * 30.0)]
    // downward: share of span above min
    #[case(-10.0, 40.0, 80.0, -10.0 / 20.0 * 15.0)]
    // at max already
    #[case(5.0, 60.0, 80.0, 0.0)]
    #[case(0.0, 40.0, 80.0, 0.0)]
    fn proportional_span(
        #[case] d: f64,
        #[case] descent: f64,
        #[case] cutting: f64,
        #[case] want: f64,
    ) {
        let limits = SpeedLimits::default();
        let cur = Setpoints {
            cutting_speed: cutting,
            descent_speed: descent,
        };
        let got = proportional_cutting_delta(d, cur, &limits);
        assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
    }
}
