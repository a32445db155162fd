//! Runtime configuration for the control core.
//!
//! These are separate from the TOML-deserialized schema in `bandsaw_config`;
//! `conversions` bridges the two.

use std::time::Duration;

use bandsaw_config::SpeedRow;

use crate::snapshot::SpeedLimits;

/// Hardware link timing and register addresses.
#[derive(Debug, Clone)]
pub struct LinkCfg {
    /// Minimum spacing between connection attempts.
    pub connect_cooldown: Duration,
    /// Pause after a successful connect.
    pub settle: Duration,
    /// Minimum spacing between writes to the same register.
    pub write_cooldown: Duration,
    pub read_base: u16,
    pub read_count: u16,
    pub cutting_speed_reg: u16,
    pub descent_speed_reg: u16,
    /// When set, setpoint writes round to the register step inside these
    /// bounds instead of to the nearest step.
    pub limits: Option<SpeedLimits>,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            connect_cooldown: Duration::from_millis(2_000),
            settle: Duration::from_millis(50),
            write_cooldown: Duration::from_millis(100),
            read_base: 2000,
            read_count: 42,
            cutting_speed_reg: 2100,
            descent_speed_reg: 2101,
            limits: None,
        }
    }
}

/// Top-level dispatch gate.
#[derive(Debug, Clone)]
pub struct GateCfg {
    /// Minimum time between successful adjustments.
    pub min_update: Duration,
    /// Interval of the operator countdown log while engaging.
    pub countdown_log: Duration,
}

impl Default for GateCfg {
    fn default() -> Self {
        Self {
            min_update: Duration::from_millis(1_000),
            countdown_log: Duration::from_secs(5),
        }
    }
}

/// Engagement delay bounds.
#[derive(Debug, Clone, Copy)]
pub struct DelayCfg {
    pub target_distance_mm: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub default_ms: u64,
}

impl Default for DelayCfg {
    fn default() -> Self {
        Self {
            target_distance_mm: 20.0,
            min_ms: 3_000,
            max_ms: 60_000,
            default_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpertCfg {
    pub ideal_current: f64,
    pub gain: f64,
    pub deflection_warn_mm: f64,
    pub window: Duration,
    /// Changes smaller than this are not written.
    pub min_change: f64,
}

impl Default for ExpertCfg {
    fn default() -> Self {
        Self {
            ideal_current: 17.0,
            gain: 0.5,
            deflection_warn_mm: 0.3,
            window: Duration::from_millis(3_000),
            min_change: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuzzyCfg {
    /// Moving average window in samples.
    pub window: usize,
    pub epsilon: f64,
    pub cutting_flush: f64,
}

impl Default for FuzzyCfg {
    fn default() -> Self {
        Self {
            window: 10,
            epsilon: 0.01,
            cutting_flush: 0.9,
        }
    }
}

/// Height-indexed speed table, strictly descending in height.
#[derive(Debug, Clone)]
pub struct LinearCfg {
    pub table: Vec<SpeedRow>,
    pub multiplier: f64,
}

/// Built-in table used when no CSV is configured.
pub fn default_speed_table() -> Vec<SpeedRow> {
    [
        (350.0, 80.0, 30.0),
        (300.0, 82.0, 34.0),
        (250.0, 85.0, 38.0),
        (200.0, 88.0, 42.0),
        (150.0, 90.0, 45.0),
        (100.0, 92.0, 48.0),
        (50.0, 95.0, 50.0),
        (0.0, 95.0, 50.0),
    ]
    .into_iter()
    .map(|(height_mm, cutting_speed, descent_speed)| SpeedRow {
        height_mm,
        cutting_speed,
        descent_speed,
    })
    .collect()
}

impl Default for LinearCfg {
    fn default() -> Self {
        Self {
            table: default_speed_table(),
            multiplier: 1.0,
        }
    }
}

/// Torque-rise interlock thresholds.
#[derive(Debug, Clone, Copy)]
pub struct GuardCfg {
    pub ignore_mm: f64,
    pub lookback_mm: f64,
    pub alarm_pct: f64,
    pub reduction_pct: f64,
}

impl Default for GuardCfg {
    fn default() -> Self {
        Self {
            ignore_mm: 3.0,
            lookback_mm: 3.0,
            alarm_pct: 50.0,
            reduction_pct: 25.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MlCfg {
    pub model: Option<std::path::PathBuf>,
    pub window: Duration,
    pub descent_flush: f64,
    pub cutting_flush: f64,
    pub guard: GuardCfg,
}

impl Default for MlCfg {
    fn default() -> Self {
        Self {
            model: None,
            window: Duration::from_millis(2_000),
            descent_flush: 1.0,
            cutting_flush: 0.9,
            guard: GuardCfg::default(),
        }
    }
}
