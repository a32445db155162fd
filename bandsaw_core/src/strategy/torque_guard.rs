//! Torque-rise interlock.
//!
//! Keeps `(height, averaged torque)` history for the current cut and compares
//! the torque now with the torque interpolated a fixed travel distance
//! earlier (higher up). A rise at or above the alarm threshold trips the
//! guard.
//!
//! History is kept highest first and only as deep as the lookback needs, so
//! a long cut does not grow it.

use std::collections::VecDeque;

use crate::config::GuardCfg;

/// Travel kept below the lookback reference before old samples are dropped.
const HISTORY_MARGIN_MM: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightTorqueSample {
    pub height_mm: f64,
    pub torque_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuardVerdict {
    /// Still inside the initial travel where the guard stays quiet.
    Ignoring { descended_mm: f64 },
    /// No usable earlier torque to compare against.
    NoReference,
    Normal { increase_pct: f64 },
    Tripped {
        increase_pct: f64,
        reference_pct: f64,
        torque_pct: f64,
    },
}

impl GuardVerdict {
    pub fn is_tripped(&self) -> bool {
        matches!(self, Self::Tripped { .. })
    }
}

#[derive(Debug, Clone)]
pub struct TorqueGuard {
    cfg: GuardCfg,
    history: VecDeque<HeightTorqueSample>,
    start_height: Option<f64>,
}

impl TorqueGuard {
    pub fn new(cfg: GuardCfg) -> Self {
        Self {
            cfg,
            history: VecDeque::new(),
            start_height: None,
        }
    }

    pub fn cfg(&self) -> &GuardCfg {
        &self.cfg
    }

    /// Begin a new cut at `height`.
    pub fn start(&mut self, height: f64) {
        self.history.clear();
        self.start_height = height.is_finite().then_some(height);
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.start_height = None;
    }

    pub fn record(&mut self, height: f64, torque_pct: f64) {
        if !(height.is_finite() && torque_pct.is_finite()) {
            return;
        }
        if self.start_height.is_none() {
            self.start_height = Some(height);
        }
        // Heights normally fall, so this is almost always a push_back.
        let at = self.history.partition_point(|s| s.height_mm >= height);
        self.history.insert(
            at,
            HeightTorqueSample {
                height_mm: height,
                torque_pct,
            },
        );
        self.prune();
    }

    /// Drop samples above the deepest one still needed to bracket the
    /// lookback reference.
    fn prune(&mut self) {
        let Some(lowest) = self.history.back().map(|s| s.height_mm) else {
            return;
        };
        let keep_below = lowest + self.cfg.lookback_mm + HISTORY_MARGIN_MM;
        while self.history.len() > 1 && self.history[1].height_mm > keep_below {
            self.history.pop_front();
        }
    }

    /// Samples for the current cut, highest first.
    pub fn history(&self) -> &VecDeque<HeightTorqueSample> {
        &self.history
    }

    /// Torque at `height` from history: linear between the bracketing
    /// samples, nearest sample outside the recorded range.
    pub fn torque_at(&self, height: f64) -> Option<f64> {
        let (top, bottom) = (self.history.front()?, self.history.back()?);
        if height >= top.height_mm {
            return Some(top.torque_pct);
        }
        if height <= bottom.height_mm {
            return Some(bottom.torque_pct);
        }
        // First sample at or below `height`; the one before it is above.
        let i = self.history.partition_point(|s| s.height_mm > height);
        let (hi, lo) = (self.history[i - 1], self.history[i]);
        let t = (height - lo.height_mm) / (hi.height_mm - lo.height_mm);
        Some(lo.torque_pct + t * (hi.torque_pct - lo.torque_pct))
    }

    /// Judge the torque at `height` against the torque `lookback_mm` earlier.
    pub fn check(&self, height: f64, torque_pct: f64) -> GuardVerdict {
        let start = self.start_height.unwrap_or(height);
        let descended_mm = start - height;
        if descended_mm <= self.cfg.ignore_mm {
            return GuardVerdict::Ignoring { descended_mm };
        }
        let Some(reference_pct) = self.torque_at(height + self.cfg.lookback_mm) else {
            return GuardVerdict::NoReference;
        };
        if reference_pct <= 0.0 || !torque_pct.is_finite() {
            return GuardVerdict::NoReference;
        }
        let increase_pct = (torque_pct - reference_pct) / reference_pct * 100.0;
        if increase_pct >= self.cfg.alarm_pct {
            GuardVerdict::Tripped {
                increase_pct,
                reference_pct,
                torque_pct,
            }
        } else {
            GuardVerdict::Normal { increase_pct }
        }
    }
}
