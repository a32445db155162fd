//! Strategy selection, gating and fault containment.
//!
//! Every tick the dispatcher advances the cut gate and lets every registered
//! strategy observe the machine state. It then invokes the selected strategy
//! only when a selection exists, the head is moving, the gate is fully
//! engaged and the rate gate is open. Strategy errors and panics are counted
//! and never escape `tick`.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{ControlError, StrategyError};
use crate::gate::{CutGate, GateEvent, GatePhase, RateGate};
use crate::lifecycle::CutLifecycle;
use crate::snapshot::{MachineSnapshot, Setpoints, SpeedLimits};
use crate::strategy::{
    Adjustment, ControlStrategy, SetpointWriter, StrategyKind, TickContext, parse_selection,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyStats {
    pub runs: u64,
    pub errors: u64,
    /// Wall time spent inside `adjust`.
    pub total_time: Duration,
    pub last_run: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSelection,
    /// Descent speed reads exactly zero.
    HeadStopped,
    NotCutting,
    Engaging,
    RateLimited,
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Ran {
        strategy: StrategyKind,
        adjustment: Adjustment,
    },
    Faulted(ControlError),
}

impl TickOutcome {
    /// Setpoints applied this tick, if any.
    pub fn applied(&self) -> Option<Setpoints> {
        match self {
            Self::Ran { adjustment, .. } => adjustment.setpoints,
            _ => None,
        }
    }
}

pub struct Dispatcher {
    pub(crate) strategies: BTreeMap<StrategyKind, Box<dyn ControlStrategy>>,
    pub(crate) active: Option<StrategyKind>,
    pub(crate) stats: BTreeMap<StrategyKind, StrategyStats>,
    pub(crate) gate: CutGate,
    pub(crate) rate: RateGate,
    pub(crate) lifecycle: Box<dyn CutLifecycle>,
    pub(crate) limits: SpeedLimits,
    pub(crate) multiplier: f64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registered", &self.strategies.keys().collect::<Vec<_>>())
            .field("active", &self.active)
            .field("phase", &self.gate.phase())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

impl Dispatcher {
    pub fn builder() -> crate::builder::DispatcherBuilder {
        crate::builder::DispatcherBuilder::default()
    }

    pub fn active(&self) -> Option<StrategyKind> {
        self.active
    }

    pub fn registered(&self) -> impl Iterator<Item = StrategyKind> + '_ {
        self.strategies.keys().copied()
    }

    pub fn limits(&self) -> SpeedLimits {
        self.limits
    }

    pub fn gate_phase(&self) -> GatePhase {
        self.gate.phase()
    }

    /// Change the active strategy. Unregistered kinds are rejected without
    /// touching any state; other strategies keep their internal state.
    pub fn set_active(&mut self, selection: Option<StrategyKind>) -> Result<(), ControlError> {
        if let Some(kind) = selection {
            if !self.strategies.contains_key(&kind) {
                return Err(ControlError::ConfigurationFault(format!(
                    "strategy '{kind}' is not registered"
                )));
            }
        }
        if self.active != selection {
            info!(
                from = self.active.map_or("none", StrategyKind::name),
                to = selection.map_or("none", StrategyKind::name),
                "active strategy changed"
            );
        }
        self.active = selection;
        Ok(())
    }

    /// `set_active` from an operator string (`none` clears).
    pub fn select(&mut self, name: &str) -> Result<(), ControlError> {
        let selection = parse_selection(name)?;
        self.set_active(selection)
    }

    pub fn stats(&self) -> BTreeMap<StrategyKind, StrategyStats> {
        self.stats.clone()
    }

    /// Clear the selection. Zeroing the setpoints is up to the caller that
    /// owns the link.
    pub fn emergency_stop(&mut self) {
        warn!(
            was = self.active.map_or("none", StrategyKind::name),
            "emergency stop: selection cleared"
        );
        self.active = None;
    }

    pub fn tick(
        &mut self,
        snapshot: &MachineSnapshot,
        current: Setpoints,
        now: Instant,
        writer: &dyn SetpointWriter,
    ) -> TickOutcome {
        for s in self.strategies.values_mut() {
            s.observe(snapshot, now);
        }
        match self
            .gate
            .observe(snapshot.state_code(), snapshot.descent_speed(), now)
        {
            GateEvent::CutStarted { .. } => self
                .lifecycle
                .start_cutting(self.active.map_or("none", StrategyKind::name)),
            GateEvent::CutEnded => self.lifecycle.end_cutting(),
            GateEvent::Engaged | GateEvent::None => {}
        }

        let Some(kind) = self.active else {
            return TickOutcome::Skipped(SkipReason::NoSelection);
        };
        if current.descent_speed == 0.0 {
            return TickOutcome::Skipped(SkipReason::HeadStopped);
        }
        match self.gate.phase() {
            GatePhase::Idle => return TickOutcome::Skipped(SkipReason::NotCutting),
            GatePhase::Engaging { .. } => return TickOutcome::Skipped(SkipReason::Engaging),
            GatePhase::Active { .. } => {}
        }
        if !self.rate.is_open(now) {
            return TickOutcome::Skipped(SkipReason::RateLimited);
        }
        let Some(strategy) = self.strategies.get_mut(&kind) else {
            return TickOutcome::Skipped(SkipReason::NoSelection);
        };

        let ctx = TickContext {
            now,
            limits: self.limits,
            multiplier: self.multiplier,
            writer,
        };
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| {
            strategy.adjust(snapshot, current, &ctx)
        }));
        let elapsed = started.elapsed();

        let stats = self.stats.entry(kind).or_default();
        stats.runs += 1;
        stats.total_time += elapsed;
        stats.last_run = Some(now);

        let fault = match result {
            Ok(Ok(adjustment)) => {
                self.rate.record(now);
                if let Some(p) = adjustment.setpoints {
                    debug!(
                        strategy = kind.name(),
                        cutting = p.cutting_speed,
                        descent = p.descent_speed,
                        "setpoints applied"
                    );
                }
                return TickOutcome::Ran {
                    strategy: kind,
                    adjustment,
                };
            }
            Ok(Err(e)) => e,
            Err(payload) => StrategyError::Panicked(panic_message(payload.as_ref())),
        };
        stats.errors += 1;
        let err = ControlError::StrategyFault {
            strategy: kind.name(),
            source: fault,
        };
        warn!(error = %err, errors = stats.errors, "strategy fault contained");
        TickOutcome::Faulted(err)
    }
}
