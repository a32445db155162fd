//! Height-indexed lookup: interpolate cutting and descent speed from a table
//! sorted by descending head height, saturating outside its range.

use bandsaw_config::SpeedRow;

use super::{Adjustment, ControlStrategy, StrategyKind, TickContext, emit};
use crate::config::LinearCfg;
use crate::diagnostics::{DiagnosticRecord, DiagnosticSink};
use crate::error::{ControlError, StrategyError};
use crate::snapshot::{MachineSnapshot, Setpoints};

pub struct LinearStrategy {
    table: Vec<SpeedRow>,
    multiplier: f64,
    sink: Box<dyn DiagnosticSink>,
}

impl std::fmt::Debug for LinearStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearStrategy")
            .field("rows", &self.table.len())
            .field("multiplier", &self.multiplier)
            .finish_non_exhaustive()
    }
}

impl LinearStrategy {
    /// Rejects empty, non-finite or non-descending tables.
    pub fn new(cfg: LinearCfg, sink: Box<dyn DiagnosticSink>) -> Result<Self, ControlError> {
        bandsaw_config::validate_speed_table(&cfg.table)
            .map_err(|e| ControlError::ConfigurationFault(e.to_string()))?;
        if !cfg.multiplier.is_finite() || cfg.multiplier <= 0.0 {
            return Err(ControlError::ConfigurationFault(
                "linear multiplier must be > 0".into(),
            ));
        }
        Ok(Self {
            table: cfg.table,
            multiplier: cfg.multiplier,
            sink,
        })
    }

    /// Interpolated `(cutting, descent)` for a head height.
    pub fn interpolate(&self, height: f64) -> Setpoints {
        interpolate(&self.table, height)
    }
}

fn row_speeds(r: &SpeedRow) -> Setpoints {
    Setpoints {
        cutting_speed: r.cutting_speed,
        descent_speed: r.descent_speed,
    }
}

/// `rows` must be non-empty and strictly descending in height.
pub fn interpolate(rows: &[SpeedRow], height: f64) -> Setpoints {
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return Setpoints::default();
    };
    if height.is_nan() || height >= first.height_mm {
        return row_speeds(first);
    }
    if height <= last.height_mm {
        return row_speeds(last);
    }
    for pair in rows.windows(2) {
        let (hi, lo) = (&pair[0], &pair[1]);
        if height <= hi.height_mm && height >= lo.height_mm {
            let t = (hi.height_mm - height) / (hi.height_mm - lo.height_mm);
            return Setpoints {
                cutting_speed: hi.cutting_speed + t * (lo.cutting_speed - hi.cutting_speed),
                descent_speed: hi.descent_speed + t * (lo.descent_speed - hi.descent_speed),
            };
        }
    }
    row_speeds(last)
}

impl ControlStrategy for LinearStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Linear
    }

    fn adjust(
        &mut self,
        snapshot: &MachineSnapshot,
        current: Setpoints,
        ctx: &TickContext<'_>,
    ) -> Result<Adjustment, StrategyError> {
        let height = snapshot.height();
        let base = self.interpolate(height);
        let target = ctx.limits.clamp(Setpoints {
            cutting_speed: base.cutting_speed * self.multiplier,
            descent_speed: base.descent_speed * self.multiplier,
        });

        let mut applied = current;
        let mut wrote = false;
        if ctx.writer.write_cutting_speed(target.cutting_speed) {
            applied.cutting_speed = target.cutting_speed;
            wrote = true;
        }
        if ctx.writer.write_descent_speed(target.descent_speed) {
            applied.descent_speed = target.descent_speed;
            wrote = true;
        }

        let rec = DiagnosticRecord::new(StrategyKind::Linear.name(), ctx.multiplier)
            .input("height", height)
            .input("cutting_speed", current.cutting_speed)
            .input("descent_speed", current.descent_speed)
            .output("new_cutting_speed", applied.cutting_speed)
            .output("new_descent_speed", applied.descent_speed);
        if wrote {
            emit(self.sink.as_mut(), &rec);
        }

        Ok(Adjustment {
            setpoints: wrote.then_some(applied),
            diagnostic: Some(height),
        })
    }
}
