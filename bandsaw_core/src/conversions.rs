//! `From`/`TryFrom` implementations bridging `bandsaw_config` types to the
//! runtime configuration in this crate.

use std::time::Duration;

use crate::config::{
    DelayCfg, ExpertCfg, FuzzyCfg, GateCfg, GuardCfg, LinearCfg, LinkCfg, MlCfg,
    default_speed_table,
};
use crate::error::ControlError;
use crate::snapshot::SpeedLimits;

// ── LinkCfg ──────────────────────────────────────────────────────────────────

impl From<&bandsaw_config::Config> for LinkCfg {
    fn from(c: &bandsaw_config::Config) -> Self {
        Self {
            connect_cooldown: Duration::from_millis(c.link.connect_cooldown_ms),
            settle: Duration::from_millis(c.link.settle_ms),
            write_cooldown: Duration::from_millis(c.link.write_cooldown_ms),
            read_base: c.registers.read_base,
            read_count: c.registers.read_count,
            cutting_speed_reg: c.registers.cutting_speed,
            descent_speed_reg: c.registers.descent_speed,
            limits: Some(SpeedLimits {
                cutting_min: c.limits.cutting_min,
                cutting_max: c.limits.cutting_max,
                descent_min: c.limits.descent_min,
                descent_max: c.limits.descent_max,
            }),
        }
    }
}

// ── GateCfg ──────────────────────────────────────────────────────────────────

impl From<&bandsaw_config::ControlCfg> for GateCfg {
    fn from(c: &bandsaw_config::ControlCfg) -> Self {
        Self {
            min_update: Duration::from_millis(c.min_update_ms),
            ..Self::default()
        }
    }
}

// ── SpeedLimits ──────────────────────────────────────────────────────────────

impl TryFrom<&bandsaw_config::LimitsCfg> for SpeedLimits {
    type Error = ControlError;

    fn try_from(c: &bandsaw_config::LimitsCfg) -> Result<Self, Self::Error> {
        Self::new(c.cutting_min, c.cutting_max, c.descent_min, c.descent_max)
    }
}

// ── Strategies ───────────────────────────────────────────────────────────────

impl From<&bandsaw_config::DelayCfg> for DelayCfg {
    fn from(c: &bandsaw_config::DelayCfg) -> Self {
        Self {
            target_distance_mm: c.target_distance_mm,
            min_ms: c.min_ms,
            max_ms: c.max_ms,
            default_ms: c.default_ms,
        }
    }
}

impl From<&bandsaw_config::ExpertCfg> for ExpertCfg {
    fn from(c: &bandsaw_config::ExpertCfg) -> Self {
        Self {
            ideal_current: c.ideal_current,
            gain: c.gain,
            deflection_warn_mm: c.deflection_warn_mm,
            window: Duration::from_millis(c.window_ms),
            min_change: c.min_change,
        }
    }
}

impl From<&bandsaw_config::FuzzyCfg> for FuzzyCfg {
    fn from(c: &bandsaw_config::FuzzyCfg) -> Self {
        Self {
            window: c.window,
            epsilon: c.epsilon,
            cutting_flush: c.cutting_flush,
        }
    }
}

/// Loads the CSV table when one is configured, otherwise the built-in table.
impl TryFrom<&bandsaw_config::LinearCfg> for LinearCfg {
    type Error = eyre::Report;

    fn try_from(c: &bandsaw_config::LinearCfg) -> Result<Self, Self::Error> {
        let table = match &c.table_csv {
            Some(path) => bandsaw_config::load_speed_table_csv(path)?,
            None => default_speed_table(),
        };
        Ok(Self {
            table,
            multiplier: c.multiplier,
        })
    }
}

impl From<&bandsaw_config::MlCfg> for MlCfg {
    fn from(c: &bandsaw_config::MlCfg) -> Self {
        Self {
            model: c.model.clone(),
            window: Duration::from_millis(c.window_ms),
            descent_flush: c.descent_flush,
            cutting_flush: c.cutting_flush,
            guard: GuardCfg {
                ignore_mm: c.ignore_mm,
                lookback_mm: c.lookback_mm,
                alarm_pct: c.alarm_pct,
                reduction_pct: c.reduction_pct,
            },
        }
    }
}
