//! Regression-driven strategy with the torque-rise interlock.
//!
//! The model artifact is loaded lazily on the first adjustment and retried on
//! later ticks while missing. History and the torque guard keep running while
//! it is missing. Both axes accumulate in carry buffers. A guard
//! trip overrides the model for that tick and writes both axes at once.

use std::time::Instant;

use bandsaw_config::RegressionArtifact;
use tracing::{info, warn};

use super::{
    Adjustment, CarryBuffer, ControlStrategy, StrategyKind, TickContext, emit, finite,
    proportional_cutting_delta,
};
use crate::buffer::SensorBuffer;
use crate::config::MlCfg;
use crate::diagnostics::{DiagnosticRecord, DiagnosticSink};
use crate::error::StrategyError;
use crate::gate::{CutTracker, TrackerEvent};
use crate::snapshot::{MachineSnapshot, Setpoints};
use crate::strategy::torque_guard::{GuardVerdict, TorqueGuard};

/// Band current estimated from motor torque percentage.
pub fn torque_to_current(torque_pct: f64) -> f64 {
    0.0021 * torque_pct * torque_pct + 0.189 * torque_pct + 3.2
}

/// Standardized linear model output, clamped to `[-1, 1]`.
pub fn predict(model: &RegressionArtifact, features: [f64; 4]) -> f64 {
    let z: f64 = features
        .iter()
        .zip(model.coefficients)
        .zip(model.means.iter().zip(model.scales))
        .map(|((x, c), (m, s))| c * (x - m) / s)
        .sum();
    (model.intercept + z).clamp(-1.0, 1.0)
}

pub struct MlStrategy {
    cfg: MlCfg,
    model: Option<RegressionArtifact>,
    current: SensorBuffer,
    deflection: SensorBuffer,
    torque: SensorBuffer,
    descent_carry: CarryBuffer,
    cutting_carry: CarryBuffer,
    guard: TorqueGuard,
    tracker: CutTracker,
    sink: Box<dyn DiagnosticSink>,
}

impl MlStrategy {
    pub fn new(cfg: MlCfg, sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            current: SensorBuffer::windowed(cfg.window),
            deflection: SensorBuffer::windowed(cfg.window),
            torque: SensorBuffer::windowed(cfg.window),
            descent_carry: CarryBuffer::new(cfg.descent_flush),
            cutting_carry: CarryBuffer::new(cfg.cutting_flush),
            guard: TorqueGuard::new(cfg.guard),
            tracker: CutTracker::new(CutTracker::CUTTING_ONLY),
            model: None,
            cfg,
            sink,
        }
    }

    /// Start with an already-loaded model.
    pub fn with_model(cfg: MlCfg, model: RegressionArtifact, sink: Box<dyn DiagnosticSink>) -> Self {
        let mut s = Self::new(cfg, sink);
        s.model = Some(model);
        s
    }

    pub fn guard(&self) -> &TorqueGuard {
        &self.guard
    }

    pub fn pending(&self) -> (f64, f64) {
        (self.descent_carry.value(), self.cutting_carry.value())
    }

    fn model(&mut self) -> Result<&RegressionArtifact, StrategyError> {
        if self.model.is_none() {
            let path = self
                .cfg
                .model
                .as_deref()
                .ok_or_else(|| StrategyError::ModelUnavailable("no model configured".into()))?;
            let model = bandsaw_config::load_model(path)
                .map_err(|e| StrategyError::ModelUnavailable(e.to_string()))?;
            info!(path = %path.display(), "regression model loaded");
            self.model = Some(model);
        }
        self.model
            .as_ref()
            .ok_or_else(|| StrategyError::ModelUnavailable("model not loaded".into()))
    }

    fn reset_cut_state(&mut self) {
        self.current.clear();
        self.deflection.clear();
        self.torque.clear();
        self.descent_carry.reset();
        self.cutting_carry.reset();
    }

    fn override_for_guard(
        &mut self,
        current: Setpoints,
        ctx: &TickContext<'_>,
    ) -> Setpoints {
        let factor = 1.0 - self.cfg.guard.reduction_pct / 100.0;
        let new_descent = ctx.limits.clamp_descent(current.descent_speed * factor);
        let descent_delta = new_descent - current.descent_speed;
        let cutting_delta = proportional_cutting_delta(descent_delta, current, &ctx.limits);
        let new_cutting = ctx.limits.clamp_cutting(current.cutting_speed + cutting_delta);
        self.descent_carry.reset();
        self.cutting_carry.reset();

        let mut applied = current;
        if ctx.writer.write_descent_speed(new_descent) {
            applied.descent_speed = new_descent;
        }
        if ctx.writer.write_cutting_speed(new_cutting) {
            applied.cutting_speed = new_cutting;
        }
        applied
    }
}

impl ControlStrategy for MlStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ml
    }

    fn observe(&mut self, snapshot: &MachineSnapshot, now: Instant) {
        match self.tracker.observe(snapshot.state_code(), now) {
            TrackerEvent::Started => {
                self.reset_cut_state();
                self.guard.start(snapshot.height());
            }
            TrackerEvent::Ended => {
                self.reset_cut_state();
                self.guard.clear();
            }
            TrackerEvent::Unchanged => {}
        }
    }

    fn adjust(
        &mut self,
        snapshot: &MachineSnapshot,
        current: Setpoints,
        ctx: &TickContext<'_>,
    ) -> Result<Adjustment, StrategyError> {
        let torque = snapshot.torque();
        let height = snapshot.height();
        self.current.append(ctx.now, torque_to_current(torque));
        self.deflection.append(ctx.now, snapshot.deflection());
        self.torque.append(ctx.now, torque);
        let avg_current = self
            .current
            .average()
            .ok_or(StrategyError::NoData("torque"))?;
        let avg_deflection = self.deflection.average().unwrap_or(0.0);
        let avg_torque = self.torque.average().unwrap_or(torque);
        self.guard.record(height, avg_torque);

        let verdict = self.guard.check(height, avg_torque);
        if let GuardVerdict::Tripped {
            increase_pct,
            reference_pct,
            ..
        } = verdict
        {
            warn!(
                height,
                torque_pct = avg_torque,
                reference_pct,
                increase_pct,
                "torque rise; forcing speed reduction"
            );
            let applied = self.override_for_guard(current, ctx);
            let rec = DiagnosticRecord::new(StrategyKind::Ml.name(), ctx.multiplier)
                .input("current", avg_current)
                .input("deflection", avg_deflection)
                .input("cutting_speed", current.cutting_speed)
                .input("descent_speed", current.descent_speed)
                .input("torque", avg_torque)
                .output("coefficient", 0.0)
                .output("new_cutting_speed", applied.cutting_speed)
                .output("new_descent_speed", applied.descent_speed);
            emit(self.sink.as_mut(), &rec);
            return Ok(Adjustment {
                setpoints: (applied != current).then_some(applied),
                diagnostic: Some(0.0),
            });
        }

        // The guard runs with or without a model.
        let model = self.model()?.clone();
        let coeff = finite(
            predict(
                &model,
                [
                    avg_current,
                    avg_deflection,
                    current.cutting_speed,
                    current.descent_speed,
                ],
            ),
            "model output",
        )?;
        let descent_delta = coeff * ctx.multiplier;
        self.descent_carry.add(descent_delta);
        self.cutting_carry
            .add(proportional_cutting_delta(descent_delta, current, &ctx.limits));

        let mut applied = current;
        let mut wrote = false;
        if self.descent_carry.ready() {
            let v = ctx
                .limits
                .clamp_descent(current.descent_speed + self.descent_carry.value());
            if ctx.writer.write_descent_speed(v) {
                applied.descent_speed = v;
                self.descent_carry.reset();
                wrote = true;
            }
        }
        if self.cutting_carry.ready() {
            let v = ctx
                .limits
                .clamp_cutting(current.cutting_speed + self.cutting_carry.value());
            if ctx.writer.write_cutting_speed(v) {
                applied.cutting_speed = v;
                self.cutting_carry.reset();
                wrote = true;
            }
        }

        if wrote {
            let rec = DiagnosticRecord::new(StrategyKind::Ml.name(), ctx.multiplier)
                .input("current", avg_current)
                .input("deflection", avg_deflection)
                .input("cutting_speed", current.cutting_speed)
                .input("descent_speed", current.descent_speed)
                .input("torque", avg_torque)
                .output("coefficient", coeff)
                .output("new_cutting_speed", applied.cutting_speed)
                .output("new_descent_speed", applied.descent_speed);
            emit(self.sink.as_mut(), &rec);
        }

        Ok(Adjustment {
            setpoints: wrote.then_some(applied),
            diagnostic: Some(coeff),
        })
    }
}
