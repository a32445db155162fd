//! Mamdani fuzzy controller over smoothed current, deflection and vibration
//! frequency.
//!
//! Descent speed takes the coefficient eagerly every tick. The matching
//! cutting-speed delta is batched in a carry buffer and only written once its
//! magnitude reaches the flush threshold.

use std::time::Instant;

use tracing::trace;

use super::{
    Adjustment, CarryBuffer, ControlStrategy, StrategyKind, TickContext, emit, finite,
    proportional_cutting_delta,
};
use crate::buffer::SensorBuffer;
use crate::config::FuzzyCfg;
use crate::diagnostics::{DiagnosticRecord, DiagnosticSink};
use crate::error::StrategyError;
use crate::gate::{CutTracker, TrackerEvent};
use crate::snapshot::{MachineSnapshot, Setpoints};

/// Band running and cutting both count as "in a cut" here, so the buffers
/// survive a brief drop out of the cutting state.
const FUZZY_CUT_CODES: &[u16] = &[2, 3];

/// Centroid resolution over the output universe `[-1, 1]`.
const CENTROID_POINTS: usize = 201;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trapezoid {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Trapezoid {
    pub const fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self { a, b, c, d }
    }

    /// Membership degree in `[0, 1]`. Shoulders (`a == b` or `c == d`) are
    /// flat up to the edge.
    pub fn mu(&self, x: f64) -> f64 {
        if x.is_nan() || x < self.a || x > self.d {
            0.0
        } else if x < self.b {
            (x - self.a) / (self.b - self.a)
        } else if x <= self.c {
            1.0
        } else {
            (self.d - x) / (self.d - self.c)
        }
    }
}

mod sets {
    use super::Trapezoid as T;

    pub const CUR_VERY_LOW: T = T::new(0.0, 0.0, 8.0, 11.0);
    pub const CUR_LOW: T = T::new(8.0, 11.0, 13.0, 15.0);
    pub const CUR_NORMAL: T = T::new(13.0, 15.0, 18.0, 20.0);
    pub const CUR_HIGH: T = T::new(18.0, 20.0, 22.0, 24.0);
    pub const CUR_VERY_HIGH: T = T::new(22.0, 24.0, 1000.0, 1000.0);

    pub const DEFL_LOW: T = T::new(0.0, 0.0, 0.1, 0.2);
    pub const DEFL_NORMAL: T = T::new(0.1, 0.2, 0.35, 0.45);
    pub const DEFL_HIGH: T = T::new(0.35, 0.45, 100.0, 100.0);

    pub const VIB_HIGH: T = T::new(40.0, 60.0, 1e5, 1e5);

    pub const OUT_BIG_DECREASE: T = T::new(-1.0, -1.0, -0.8, -0.5);
    pub const OUT_DECREASE: T = T::new(-0.8, -0.5, -0.3, 0.0);
    pub const OUT_KEEP: T = T::new(-0.2, -0.05, 0.05, 0.2);
    pub const OUT_INCREASE: T = T::new(0.0, 0.3, 0.5, 0.8);
    pub const OUT_BIG_INCREASE: T = T::new(0.5, 0.8, 1.0, 1.0);
}

/// Stateless inference engine with the fixed rule base.
#[derive(Debug, Default, Clone, Copy)]
pub struct FuzzyEngine;

impl FuzzyEngine {
    /// Rule firing strengths paired with their output set.
    fn fire(current: f64, deflection: f64, vibration: f64) -> [(f64, Trapezoid); 11] {
        use sets::*;
        let vl = CUR_VERY_LOW.mu(current);
        let l = CUR_LOW.mu(current);
        let n = CUR_NORMAL.mu(current);
        let h = CUR_HIGH.mu(current);
        let vh = CUR_VERY_HIGH.mu(current);
        let dl = DEFL_LOW.mu(deflection);
        let dn = DEFL_NORMAL.mu(deflection);
        let dh = DEFL_HIGH.mu(deflection);
        let vib = VIB_HIGH.mu(vibration);
        [
            (vl.min(dl), OUT_BIG_INCREASE),
            (vl.min(dn), OUT_INCREASE),
            (l.min(dl), OUT_INCREASE),
            (l.min(dn), OUT_KEEP),
            (l.min(dh), OUT_DECREASE),
            (n.min(dl), OUT_KEEP),
            (n.min(dn), OUT_KEEP),
            (n.min(dh), OUT_DECREASE),
            (h, OUT_DECREASE),
            (vh, OUT_BIG_DECREASE),
            (vib, OUT_BIG_DECREASE),
        ]
    }

    /// Crisp coefficient in `[-1, 1]`; 0 when no rule fires.
    pub fn infer(&self, current: f64, deflection_abs: f64, vibration_freq: f64) -> f64 {
        let rules = Self::fire(current, deflection_abs.abs(), vibration_freq);
        let mut num = 0.0;
        let mut den = 0.0;
        #[allow(clippy::cast_precision_loss)]
        let step = 2.0 / (CENTROID_POINTS - 1) as f64;
        for i in 0..CENTROID_POINTS {
            #[allow(clippy::cast_precision_loss)]
            let x = -1.0 + step * i as f64;
            let agg = rules
                .iter()
                .map(|(w, set)| w.min(set.mu(x)))
                .fold(0.0, f64::max);
            num += x * agg;
            den += agg;
        }
        if den <= 0.0 { 0.0 } else { num / den }
    }
}

pub struct FuzzyStrategy {
    cfg: FuzzyCfg,
    engine: FuzzyEngine,
    current: SensorBuffer,
    deflection: SensorBuffer,
    vibration: SensorBuffer,
    cutting_carry: CarryBuffer,
    tracker: CutTracker,
    sink: Box<dyn DiagnosticSink>,
}

impl FuzzyStrategy {
    pub fn new(cfg: FuzzyCfg, sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            current: SensorBuffer::with_capacity(cfg.window),
            deflection: SensorBuffer::with_capacity(cfg.window),
            vibration: SensorBuffer::with_capacity(cfg.window),
            cutting_carry: CarryBuffer::new(cfg.cutting_flush),
            engine: FuzzyEngine,
            tracker: CutTracker::new(FUZZY_CUT_CODES),
            cfg,
            sink,
        }
    }

    pub fn pending_cutting(&self) -> f64 {
        self.cutting_carry.value()
    }

    fn reset_cut_state(&mut self) {
        self.current.clear();
        self.deflection.clear();
        self.vibration.clear();
        self.cutting_carry.reset();
    }
}

impl ControlStrategy for FuzzyStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fuzzy
    }

    fn observe(&mut self, snapshot: &MachineSnapshot, now: Instant) {
        if self.tracker.observe(snapshot.state_code(), now) != TrackerEvent::Unchanged {
            self.reset_cut_state();
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
        self.vibration.append(ctx.now, snapshot.max_vibration_freq());
        let avg_current = self
            .current
            .average()
            .ok_or(StrategyError::NoData("band_current"))?;
        let avg_deflection = self.deflection.average().unwrap_or(0.0);
        let avg_vibration = self.vibration.average().unwrap_or(0.0);

        let coeff = finite(
            self.engine
                .infer(avg_current, avg_deflection.abs(), avg_vibration),
            "fuzzy coefficient",
        )?;
        let scaled = coeff * ctx.multiplier;
        if scaled.abs() <= self.cfg.epsilon {
            trace!(coeff, "fuzzy: coefficient below epsilon");
            return Ok(Adjustment {
                setpoints: None,
                diagnostic: Some(coeff),
            });
        }

        let new_descent = ctx.limits.clamp_descent(current.descent_speed + scaled);
        let descent_delta = new_descent - current.descent_speed;
        self.cutting_carry
            .add(proportional_cutting_delta(descent_delta, current, &ctx.limits));

        let mut applied = current;
        let mut wrote = false;
        if descent_delta != 0.0 && ctx.writer.write_descent_speed(new_descent) {
            applied.descent_speed = new_descent;
            wrote = true;
        }
        if self.cutting_carry.ready() {
            let new_cutting = ctx
                .limits
                .clamp_cutting(current.cutting_speed + self.cutting_carry.value());
            if ctx.writer.write_cutting_speed(new_cutting) {
                applied.cutting_speed = new_cutting;
                self.cutting_carry.reset();
                wrote = true;
            }
        }
        if !wrote {
            return Ok(Adjustment {
                setpoints: None,
                diagnostic: Some(coeff),
            });
        }

        let rec = DiagnosticRecord::new(StrategyKind::Fuzzy.name(), ctx.multiplier)
            .input("current", avg_current)
            .input("deflection", avg_deflection)
            .input("vibration_freq", avg_vibration)
            .input("cutting_speed", current.cutting_speed)
            .input("descent_speed", current.descent_speed)
            .output("coefficient", coeff)
            .output("new_cutting_speed", applied.cutting_speed)
            .output("new_descent_speed", applied.descent_speed);
        emit(self.sink.as_mut(), &rec);

        Ok(Adjustment {
            setpoints: Some(applied),
            diagnostic: Some(coeff),
        })
    }
}
