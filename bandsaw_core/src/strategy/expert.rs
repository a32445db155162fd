//! Rule-based proportional law on descent speed.
//!
//! `delta = -gain * (avg_current - ideal_current)`, applied to descent speed
//! only. Deflection is watched but never corrected.

use std::time::Instant;

use tracing::{debug, warn};

use super::{Adjustment, ControlStrategy, StrategyKind, TickContext, emit, finite};
use crate::buffer::SensorBuffer;
use crate::config::ExpertCfg;
use crate::diagnostics::{DiagnosticRecord, DiagnosticSink};
use crate::error::StrategyError;
use crate::gate::{CutTracker, TrackerEvent};
use crate::snapshot::{MachineSnapshot, Setpoints};

pub struct ExpertStrategy {
    cfg: ExpertCfg,
    current: SensorBuffer,
    deflection: SensorBuffer,
    tracker: CutTracker,
    sink: Box<dyn DiagnosticSink>,
}

impl ExpertStrategy {
    pub fn new(cfg: ExpertCfg, sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            current: SensorBuffer::windowed(cfg.window),
            deflection: SensorBuffer::windowed(cfg.window),
            tracker: CutTracker::new(CutTracker::CUTTING_ONLY),
            cfg,
            sink,
        }
    }

    /// Descent-speed delta for a smoothed current.
    pub fn delta_for(&self, avg_current: f64) -> f64 {
        -self.cfg.gain * (avg_current - self.cfg.ideal_current)
    }
}

impl ControlStrategy for ExpertStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Expert
    }

    fn observe(&mut self, snapshot: &MachineSnapshot, now: Instant) {
        if self.tracker.observe(snapshot.state_code(), now) != TrackerEvent::Unchanged {
            self.current.clear();
            self.deflection.clear();
        }
    }

    fn adjust(
        &mut self,
        snapshot: &MachineSnapshot,
        current: Setpoints,
        ctx: &TickContext<'_>,
    ) -> Result<Adjustment, StrategyError> {
        self.current.append(ctx.now, snapshot.current());
        self.deflection.append(ctx.now, snapshot.deflection());
        let avg_current = self
            .current
            .average()
            .ok_or(StrategyError::NoData("band_current"))?;
        let avg_deflection = self.deflection.average().unwrap_or(0.0);

        let error = avg_current - self.cfg.ideal_current;
        let delta = finite(self.delta_for(avg_current), "expert delta")?;
        if avg_deflection.abs() > self.cfg.deflection_warn_mm && error != 0.0 {
            warn!(
                deflection_mm = avg_deflection,
                current_error = error,
                "band deflection high"
            );
        }

        let target = ctx.limits.clamp_descent(current.descent_speed + delta);
        let change = target - current.descent_speed;
        if change.abs() < self.cfg.min_change {
            debug!(change, "expert: change below threshold");
            return Ok(Adjustment {
                setpoints: None,
                diagnostic: Some(delta),
            });
        }
        if !ctx.writer.write_descent_speed(target) {
            return Ok(Adjustment {
                setpoints: None,
                diagnostic: Some(delta),
            });
        }

        let rec = DiagnosticRecord::new(StrategyKind::Expert.name(), ctx.multiplier)
            .input("current", avg_current)
            .input("deflection", avg_deflection)
            .input("descent_speed", current.descent_speed)
            .output("delta", delta)
            .output("new_descent_speed", target);
        emit(self.sink.as_mut(), &rec);

        Ok(Adjustment {
            setpoints: Some(Setpoints {
                cutting_speed: current.cutting_speed,
                descent_speed: target,
            }),
            diagnostic: Some(delta),
        })
    }
}
