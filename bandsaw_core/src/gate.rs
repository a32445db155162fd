//! Cut-state gating.
//!
//! `CutGate` is the dispatcher's top-level machine: IDLE -> ENGAGING -> ACTIVE
//! -> IDLE, driven by the machine state code and the engagement delay.
//! `RateGate` caps how often adjustments may succeed. `CutTracker` is the
//! lighter per-strategy view used to reset per-cut state; each strategy picks
//! which state codes it treats as cutting.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{DelayCfg, GateCfg};
use crate::delay::DelayCalculator;
use crate::snapshot::MachineState;

pub const CUTTING_CODE: u16 = MachineState::Cutting.code();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    Engaging { since: Instant, delay: Duration },
    Active { since: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    None,
    CutStarted { delay_ms: u64 },
    Engaged,
    CutEnded,
}

#[derive(Debug)]
pub struct CutGate {
    phase: GatePhase,
    delay: DelayCalculator,
    countdown_every: Duration,
    last_countdown: Option<Instant>,
}

impl CutGate {
    pub fn new(delay: DelayCfg, gate: &GateCfg) -> Self {
        Self {
            phase: GatePhase::Idle,
            delay: DelayCalculator::new(delay),
            countdown_every: gate.countdown_log,
            last_countdown: None,
        }
    }

    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    /// Strategy execution is permitted only once fully engaged.
    pub fn is_open(&self) -> bool {
        matches!(self.phase, GatePhase::Active { .. })
    }

    /// Advance the machine with this tick's state code.
    pub fn observe(&mut self, state_code: u16, descent_speed: f64, now: Instant) -> GateEvent {
        let cutting = state_code == CUTTING_CODE;
        match (self.phase, cutting) {
            (GatePhase::Idle, true) => {
                let delay_ms = self.delay.on_cut_start(descent_speed);
                self.phase = GatePhase::Engaging {
                    since: now,
                    delay: Duration::from_millis(delay_ms),
                };
                self.last_countdown = Some(now);
                info!(delay_ms, descent_speed, "cut started; engaging");
                GateEvent::CutStarted { delay_ms }
            }
            (GatePhase::Idle, false) => GateEvent::None,
            (GatePhase::Engaging { since, delay }, true) => {
                let elapsed = now.saturating_duration_since(since);
                if elapsed >= delay {
                    self.phase = GatePhase::Active { since: now };
                    info!(after_ms = elapsed.as_millis(), "control engaged");
                    return GateEvent::Engaged;
                }
                let due = self
                    .last_countdown
                    .is_none_or(|t| now.saturating_duration_since(t) >= self.countdown_every);
                if due {
                    self.last_countdown = Some(now);
                    let remaining = delay.saturating_sub(elapsed);
                    info!(remaining_s = remaining.as_secs(), "engaging; waiting for cut to settle");
                }
                GateEvent::None
            }
            (GatePhase::Active { .. }, true) => GateEvent::None,
            (GatePhase::Engaging { .. } | GatePhase::Active { .. }, false) => {
                self.phase = GatePhase::Idle;
                self.delay.reset();
                self.last_countdown = None;
                info!(state_code, "cut ended");
                GateEvent::CutEnded
            }
        }
    }

    /// Drop back to idle without emitting an event.
    pub fn reset(&mut self) {
        self.phase = GatePhase::Idle;
        self.delay.reset();
        self.last_countdown = None;
    }
}

/// Minimum interval between successful adjustments.
#[derive(Debug, Clone)]
pub struct RateGate {
    min_interval: Duration,
    last_success: Option<Instant>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_success: None,
        }
    }

    pub fn is_open(&self, now: Instant) -> bool {
        self.last_success
            .is_none_or(|t| now.saturating_duration_since(t) >= self.min_interval)
    }

    pub fn record(&mut self, now: Instant) {
        self.last_success = Some(now);
    }

    pub fn last_success(&self) -> Option<Instant> {
        self.last_success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    Unchanged,
    Started,
    Ended,
}

/// Per-strategy cut flag over a strategy-chosen set of state codes.
#[derive(Debug, Clone)]
pub struct CutTracker {
    accepted: &'static [u16],
    active: bool,
    cut_start: Option<Instant>,
}

impl CutTracker {
    pub const CUTTING_ONLY: &'static [u16] = &[CUTTING_CODE];

    pub fn new(accepted: &'static [u16]) -> Self {
        Self {
            accepted,
            active: false,
            cut_start: None,
        }
    }

    pub fn observe(&mut self, state_code: u16, now: Instant) -> TrackerEvent {
        let cutting = self.accepted.contains(&state_code);
        match (self.active, cutting) {
            (false, true) => {
                self.active = true;
                self.cut_start = Some(now);
                TrackerEvent::Started
            }
            (true, false) => {
                if let Some(start) = self.cut_start.take() {
                    debug!(
                        cut_ms = now.saturating_duration_since(start).as_millis(),
                        "strategy cut tracker reset"
                    );
                }
                self.active = false;
                TrackerEvent::Ended
            }
            _ => TrackerEvent::Unchanged,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn cut_start(&self) -> Option<Instant> {
        self.cut_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(delay_ms: u64) -> CutGate {
        CutGate::new(
            DelayCfg {
                target_distance_mm: 20.0,
                min_ms: delay_ms,
                max_ms: delay_ms,
                default_ms: delay_ms,
            },
            &GateCfg::default(),
        )
    }

    #[test]
    fn engaging_holds_until_delay_elapses() {
        let t0 = Instant::now();
        let mut g = gate(3_000);
        assert_eq!(
            g.observe(3, 40.0, t0),
            GateEvent::CutStarted { delay_ms: 3_000 }
        );
        assert!(!g.is_open());
        assert_eq!(g.observe(3, 40.0, t0 + Duration::from_millis(2_999)), GateEvent::None);
        assert!(!g.is_open());
        assert_eq!(g.observe(3, 40.0, t0 + Duration::from_millis(3_000)), GateEvent::Engaged);
        assert!(g.is_open());
    }

    #[test]
    fn leaving_cutting_from_engaging_ends_cut() {
        let t0 = Instant::now();
        let mut g = gate(3_000);
        g.observe(3, 40.0, t0);
        assert_eq!(g.observe(4, 40.0, t0), GateEvent::CutEnded);
        assert_eq!(g.phase(), GatePhase::Idle);
    }

    #[test]
    fn band_running_is_not_cutting_for_the_top_gate() {
        let mut g = gate(3_000);
        assert_eq!(g.observe(2, 40.0, Instant::now()), GateEvent::None);
    }

    #[test]
    fn rate_gate_spacing() {
        let t0 = Instant::now();
        let mut r = RateGate::new(Duration::from_secs(1));
        assert!(r.is_open(t0));
        r.record(t0);
        assert!(!r.is_open(t0 + Duration::from_millis(999)));
        assert!(r.is_open(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn tracker_with_wider_code_set() {
        let t0 = Instant::now();
        let mut t = CutTracker::new(&[2, 3]);
        assert_eq!(t.observe(2, t0), TrackerEvent::Started);
        assert_eq!(t.observe(3, t0), TrackerEvent::Unchanged);
        assert_eq!(t.observe(2, t0), TrackerEvent::Unchanged);
        assert_eq!(t.observe(0, t0), TrackerEvent::Ended);
        assert!(!t.is_active());
    }
}
