#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and file loaders for the band-saw controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The height/speed table CSV loader enforces headers and ordering.
//! - The regression artifact loader checks shape and scaler sanity.
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    #[default]
    Tcp,
    Sim,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LinkCfg {
    pub mode: LinkMode,
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// Per-transaction socket timeout
    pub timeout_ms: u64,
    /// Minimum spacing between connection attempts
    pub connect_cooldown_ms: u64,
    /// Pause after a successful connect before the first transaction
    pub settle_ms: u64,
    /// Minimum spacing between register writes; writes inside it are rejected
    pub write_cooldown_ms: u64,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            mode: LinkMode::Tcp,
            host: "192.168.2.147".into(),
            port: 502,
            unit_id: 1,
            timeout_ms: 100,
            connect_cooldown_ms: 2000,
            settle_ms: 50,
            write_cooldown_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RegistersCfg {
    pub read_base: u16,
    pub read_count: u16,
    pub cutting_speed: u16,
    pub descent_speed: u16,
}

impl Default for RegistersCfg {
    fn default() -> Self {
        Self {
            read_base: 2000,
            read_count: 42,
            cutting_speed: 2100,
            descent_speed: 2101,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LimitsCfg {
    pub cutting_min: f64,
    pub cutting_max: f64,
    pub descent_min: f64,
    pub descent_max: f64,
}

impl Default for LimitsCfg {
    fn default() -> Self {
        Self {
            cutting_min: 65.0,
            cutting_max: 110.0,
            descent_min: 20.0,
            descent_max: 60.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    pub poll_hz: u32,
    /// Minimum time between successful adjustments
    pub min_update_ms: u64,
    /// Strategy active at startup: none | expert | fuzzy | linear | ml
    pub strategy: String,
    /// Global multiplier applied to strategy coefficients
    pub multiplier: f64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            poll_hz: 10,
            min_update_ms: 1000,
            strategy: "none".into(),
            multiplier: 1.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExpertCfg {
    pub ideal_current: f64,
    pub gain: f64,
    pub deflection_warn_mm: f64,
    pub window_ms: u64,
    pub min_change: f64,
}

impl Default for ExpertCfg {
    fn default() -> Self {
        Self {
            ideal_current: 17.0,
            gain: 0.5,
            deflection_warn_mm: 0.3,
            window_ms: 3_000,
            min_change: 0.1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FuzzyCfg {
    /// Moving-average window in samples
    pub window: usize,
    /// Coefficients with magnitude at or below this are ignored
    pub epsilon: f64,
    /// Carry threshold for batched cutting-speed writes
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LinearCfg {
    /// Optional CSV with headers `height_mm,cutting_speed,descent_speed`
    pub table_csv: Option<PathBuf>,
    pub multiplier: f64,
}

impl Default for LinearCfg {
    fn default() -> Self {
        Self {
            table_csv: None,
            multiplier: 1.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MlCfg {
    /// Path to the regression artifact (TOML)
    pub model: Option<PathBuf>,
    pub window_ms: u64,
    pub descent_flush: f64,
    pub cutting_flush: f64,
    /// Travel after cut start during which the torque guard stays quiet
    pub ignore_mm: f64,
    /// How far back (in head travel) the guard compares torque
    pub lookback_mm: f64,
    /// Torque rise in percent that trips the guard
    pub alarm_pct: f64,
    /// Descent-speed cut in percent applied when the guard trips
    pub reduction_pct: f64,
}

impl Default for MlCfg {
    fn default() -> Self {
        Self {
            model: None,
            window_ms: 2_000,
            descent_flush: 1.0,
            cutting_flush: 0.9,
            ignore_mm: 3.0,
            lookback_mm: 3.0,
            alarm_pct: 50.0,
            reduction_pct: 25.0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DiagnosticsCfg {
    /// Directory for per-strategy CSV diagnostic files; disabled when absent
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub link: LinkCfg,
    #[serde(default)]
    pub registers: RegistersCfg,
    #[serde(default)]
    pub limits: LimitsCfg,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub delay: DelayCfg,
    #[serde(default)]
    pub expert: ExpertCfg,
    #[serde(default)]
    pub fuzzy: FuzzyCfg,
    #[serde(default)]
    pub linear: LinearCfg,
    #[serde(default)]
    pub ml: MlCfg,
    #[serde(default)]
    pub diagnostics: DiagnosticsCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub const STRATEGY_NAMES: [&str; 5] = ["none", "expert", "fuzzy", "linear", "ml"];

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Link
        if self.link.host.trim().is_empty() && self.link.mode == LinkMode::Tcp {
            eyre::bail!("link.host must not be empty");
        }
        if self.link.timeout_ms == 0 || self.link.timeout_ms > 5_000 {
            eyre::bail!("link.timeout_ms must be in [1, 5000]");
        }
        if self.link.write_cooldown_ms > 10_000 {
            eyre::bail!("link.write_cooldown_ms is unreasonably large (>10s)");
        }

        // Registers
        if self.registers.read_count != 42 {
            eyre::bail!("registers.read_count must be 42");
        }
        if self.registers.cutting_speed == self.registers.descent_speed {
            eyre::bail!("registers.cutting_speed and registers.descent_speed must differ");
        }

        // Limits
        let l = &self.limits;
        for (name, v) in [
            ("cutting_min", l.cutting_min),
            ("cutting_max", l.cutting_max),
            ("descent_min", l.descent_min),
            ("descent_max", l.descent_max),
        ] {
            if !v.is_finite() || v < 0.0 {
                eyre::bail!("limits.{name} must be finite and >= 0");
            }
        }
        if l.cutting_min > l.cutting_max {
            eyre::bail!("limits.cutting_min must be <= limits.cutting_max");
        }
        if l.descent_min > l.descent_max {
            eyre::bail!("limits.descent_min must be <= limits.descent_max");
        }
        // Registers hold whole m/min and hundredths of mm/min.
        if l.cutting_min.ceil() > l.cutting_max.floor() {
            eyre::bail!("limits.cutting range must contain a whole m/min value");
        }
        if (l.descent_min * 100.0).ceil() > (l.descent_max * 100.0).floor() {
            eyre::bail!("limits.descent range must contain a 0.01 mm/min step");
        }

        // Control
        if self.control.poll_hz == 0 || self.control.poll_hz > 100 {
            eyre::bail!("control.poll_hz must be in [1, 100]");
        }
        if !STRATEGY_NAMES.contains(&self.control.strategy.to_ascii_lowercase().as_str()) {
            eyre::bail!(
                "control.strategy must be one of {}",
                STRATEGY_NAMES.join("|")
            );
        }
        if !self.control.multiplier.is_finite() || self.control.multiplier <= 0.0 {
            eyre::bail!("control.multiplier must be > 0");
        }

        // Delay
        if self.delay.target_distance_mm <= 0.0 || !self.delay.target_distance_mm.is_finite() {
            eyre::bail!("delay.target_distance_mm must be > 0");
        }
        if self.delay.min_ms > self.delay.max_ms {
            eyre::bail!("delay.min_ms must be <= delay.max_ms");
        }
        if !(self.delay.min_ms..=self.delay.max_ms).contains(&self.delay.default_ms) {
            eyre::bail!("delay.default_ms must lie in [delay.min_ms, delay.max_ms]");
        }

        // Strategies
        if self.expert.ideal_current <= 0.0 {
            eyre::bail!("expert.ideal_current must be > 0");
        }
        if self.expert.min_change < 0.0 {
            eyre::bail!("expert.min_change must be >= 0");
        }
        if self.fuzzy.window == 0 {
            eyre::bail!("fuzzy.window must be >= 1");
        }
        if self.fuzzy.epsilon < 0.0 || self.fuzzy.cutting_flush <= 0.0 {
            eyre::bail!("fuzzy.epsilon must be >= 0 and fuzzy.cutting_flush > 0");
        }
        if self.linear.multiplier <= 0.0 || !self.linear.multiplier.is_finite() {
            eyre::bail!("linear.multiplier must be > 0");
        }
        if self.ml.descent_flush <= 0.0 || self.ml.cutting_flush <= 0.0 {
            eyre::bail!("ml.descent_flush and ml.cutting_flush must be > 0");
        }
        if self.ml.alarm_pct <= 0.0 {
            eyre::bail!("ml.alarm_pct must be > 0");
        }
        if !(0.0..100.0).contains(&self.ml.reduction_pct) {
            eyre::bail!("ml.reduction_pct must be in [0, 100)");
        }
        if self.ml.lookback_mm <= 0.0 || self.ml.ignore_mm < 0.0 {
            eyre::bail!("ml.lookback_mm must be > 0 and ml.ignore_mm >= 0");
        }

        Ok(())
    }
}

/// One row of the height-indexed speed table.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct SpeedRow {
    pub height_mm: f64,
    pub cutting_speed: f64,
    pub descent_speed: f64,
}

/// Check table shape: non-empty, finite, strictly descending height.
pub fn validate_speed_table(rows: &[SpeedRow]) -> eyre::Result<()> {
    if rows.is_empty() {
        eyre::bail!("speed table must contain at least one row");
    }
    for (i, r) in rows.iter().enumerate() {
        if !(r.height_mm.is_finite() && r.cutting_speed.is_finite() && r.descent_speed.is_finite())
        {
            eyre::bail!("speed table row {} has a non-finite value", i + 1);
        }
    }
    for i in 1..rows.len() {
        if rows[i].height_mm >= rows[i - 1].height_mm {
            eyre::bail!(
                "speed table heights must be strictly descending (rows {} and {})",
                i,
                i + 1
            );
        }
    }
    Ok(())
}

pub fn load_speed_table_csv(path: &Path) -> eyre::Result<Vec<SpeedRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open speed table CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["height_mm", "cutting_speed", "descent_speed"];
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "speed table CSV must have headers 'height_mm,cutting_speed,descent_speed', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<SpeedRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    validate_speed_table(&rows)?;
    Ok(rows)
}

/// Pre-trained regression artifact: standardized linear model over
/// `[current, deflection, cutting_speed, descent_speed]`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RegressionArtifact {
    pub intercept: f64,
    pub coefficients: [f64; 4],
    #[serde(default)]
    pub means: [f64; 4],
    #[serde(default = "unit_scales")]
    pub scales: [f64; 4],
}

fn unit_scales() -> [f64; 4] {
    [1.0; 4]
}

impl RegressionArtifact {
    pub fn validate(&self) -> eyre::Result<()> {
        let all = std::iter::once(self.intercept)
            .chain(self.coefficients)
            .chain(self.means)
            .chain(self.scales);
        if all.into_iter().any(|v| !v.is_finite()) {
            eyre::bail!("model artifact contains non-finite values");
        }
        if self.scales.iter().any(|s| *s == 0.0) {
            eyre::bail!("model artifact scales must be non-zero");
        }
        Ok(())
    }
}

pub fn load_model(path: &Path) -> eyre::Result<RegressionArtifact> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read model artifact {:?}: {}", path, e))?;
    let model: RegressionArtifact =
        toml::from_str(&text).map_err(|e| eyre::eyre!("parse model artifact {:?}: {}", path, e))?;
    model.validate()?;
    Ok(model)
}
