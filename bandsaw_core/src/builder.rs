//! Builder for `Dispatcher` and assembly from a loaded `Config`.

use std::collections::BTreeMap;

use eyre::WrapErr;

use crate::config::{DelayCfg, ExpertCfg, FuzzyCfg, GateCfg, LinearCfg, MlCfg};
use crate::diagnostics::{CsvDiagnosticSink, DiagnosticSink, NullSink};
use crate::dispatcher::Dispatcher;
use crate::error::{BuildError, Result};
use crate::gate::{CutGate, RateGate};
use crate::lifecycle::{CutLifecycle, LoggingLifecycle};
use crate::snapshot::SpeedLimits;
use crate::strategy::{
    ControlStrategy, ExpertStrategy, FuzzyStrategy, LinearStrategy, MlStrategy, StrategyKind,
    parse_selection,
};

/// Builder for `Dispatcher`. Everything is validated on `try_build()`.
pub struct DispatcherBuilder {
    strategies: Vec<Box<dyn ControlStrategy>>,
    limits: SpeedLimits,
    gate: GateCfg,
    delay: DelayCfg,
    multiplier: f64,
    lifecycle: Option<Box<dyn CutLifecycle>>,
    active: Option<StrategyKind>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
            limits: SpeedLimits::default(),
            gate: GateCfg::default(),
            delay: DelayCfg::default(),
            multiplier: 1.0,
            lifecycle: None,
            active: None,
        }
    }
}

impl DispatcherBuilder {
    pub fn with_strategy(mut self, s: Box<dyn ControlStrategy>) -> Self {
        self.strategies.push(s);
        self
    }

    pub fn with_limits(mut self, limits: SpeedLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_gate(mut self, gate: GateCfg) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_delay(mut self, delay: DelayCfg) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_multiplier(mut self, m: f64) -> Self {
        self.multiplier = m;
        self
    }

    pub fn with_lifecycle(mut self, lc: Box<dyn CutLifecycle>) -> Self {
        self.lifecycle = Some(lc);
        self
    }

    pub fn with_active(mut self, kind: Option<StrategyKind>) -> Self {
        self.active = kind;
        self
    }

    pub fn try_build(self) -> Result<Dispatcher> {
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "multiplier must be > 0",
            )));
        }
        if self.delay.min_ms > self.delay.max_ms {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "delay min must be <= max",
            )));
        }
        let mut strategies = BTreeMap::new();
        for s in self.strategies {
            let kind = s.kind();
            if strategies.insert(kind, s).is_some() {
                return Err(eyre::Report::new(BuildError::DuplicateStrategy(kind.name())));
            }
        }
        if let Some(kind) = self.active {
            if !strategies.contains_key(&kind) {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "initial strategy is not registered",
                )));
            }
        }
        Ok(Dispatcher {
            strategies,
            active: self.active,
            stats: BTreeMap::new(),
            gate: CutGate::new(self.delay, &self.gate),
            rate: RateGate::new(self.gate.min_update),
            lifecycle: self
                .lifecycle
                .unwrap_or_else(|| Box::new(LoggingLifecycle::new())),
            limits: self.limits,
            multiplier: self.multiplier,
        })
    }
}

fn sink_for(cfg: &bandsaw_config::Config, kind: StrategyKind) -> Box<dyn DiagnosticSink> {
    match &cfg.diagnostics.dir {
        Some(dir) => Box::new(CsvDiagnosticSink::in_dir(dir, kind.name())),
        None => Box::new(NullSink),
    }
}

/// Assemble a dispatcher with all four strategies from a validated config.
pub fn dispatcher_from_config(cfg: &bandsaw_config::Config) -> Result<Dispatcher> {
    let limits = SpeedLimits::try_from(&cfg.limits)?;
    let linear_cfg = LinearCfg::try_from(&cfg.linear).wrap_err("load linear speed table")?;
    let linear = LinearStrategy::new(linear_cfg, sink_for(cfg, StrategyKind::Linear))?;
    let active = parse_selection(&cfg.control.strategy)?;

    Dispatcher::builder()
        .with_limits(limits)
        .with_gate(GateCfg::from(&cfg.control))
        .with_delay(DelayCfg::from(&cfg.delay))
        .with_multiplier(cfg.control.multiplier)
        .with_strategy(Box::new(ExpertStrategy::new(
            ExpertCfg::from(&cfg.expert),
            sink_for(cfg, StrategyKind::Expert),
        )))
        .with_strategy(Box::new(FuzzyStrategy::new(
            FuzzyCfg::from(&cfg.fuzzy),
            sink_for(cfg, StrategyKind::Fuzzy),
        )))
        .with_strategy(Box::new(linear))
        .with_strategy(Box::new(MlStrategy::new(
            MlCfg::from(&cfg.ml),
            sink_for(cfg, StrategyKind::Ml),
        )))
        .with_active(active)
        .try_build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullSink;

    #[test]
    fn duplicate_strategy_is_rejected() {
        let err = Dispatcher::builder()
            .with_strategy(Box::new(ExpertStrategy::new(
                ExpertCfg::default(),
                Box::new(NullSink),
            )))
            .with_strategy(Box::new(ExpertStrategy::new(
                ExpertCfg::default(),
                Box::new(NullSink),
            )))
            .try_build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::DuplicateStrategy("expert"))
        ));
    }

    #[test]
    fn initial_selection_must_be_registered() {
        let err = Dispatcher::builder()
            .with_active(Some(StrategyKind::Ml))
            .try_build()
            .unwrap_err();
        assert!(err.downcast_ref::<BuildError>().is_some());
    }

    #[test]
    fn config_assembly_registers_all_four() {
        let cfg = bandsaw_config::load_toml(
            "[link]\nmode = \"sim\"\n[control]\nstrategy = \"Fuzzy\"\n",
        )
        .unwrap();
        let d = dispatcher_from_config(&cfg).unwrap();
        assert_eq!(d.registered().count(), 4);
        assert_eq!(d.active(), Some(StrategyKind::Fuzzy));
    }
}
