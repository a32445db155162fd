//! Engagement delay after a cut begins.
//!
//! Control stays dormant for the time the head needs to travel a fixed
//! distance at the descent speed seen at cut start.

use crate::config::DelayCfg;

/// Unclamped delay in ms to travel `target_mm` at `descent_mm_per_min`.
/// `None` when the speed is not positive or not finite.
pub fn raw_delay_ms(target_mm: f64, descent_mm_per_min: f64) -> Option<f64> {
    if !descent_mm_per_min.is_finite() || descent_mm_per_min <= 0.0 {
        return None;
    }
    let mm_per_sec = descent_mm_per_min / 60.0;
    let ms = target_mm / mm_per_sec * 1_000.0;
    ms.is_finite().then_some(ms)
}

#[derive(Debug, Clone)]
pub struct DelayCalculator {
    cfg: DelayCfg,
    cached_ms: Option<u64>,
}

impl DelayCalculator {
    pub fn new(cfg: DelayCfg) -> Self {
        Self {
            cfg,
            cached_ms: None,
        }
    }

    /// Clamped delay for the given descent speed; the default when the speed
    /// is unusable.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn compute(&self, descent_mm_per_min: f64) -> u64 {
        match raw_delay_ms(self.cfg.target_distance_mm, descent_mm_per_min) {
            Some(ms) => {
                let lo = self.cfg.min_ms as f64;
                let hi = self.cfg.max_ms as f64;
                ms.clamp(lo, hi).round() as u64
            }
            None => self.cfg.default_ms.clamp(self.cfg.min_ms, self.cfg.max_ms),
        }
    }

    /// Compute and cache the delay for a new cut.
    pub fn on_cut_start(&mut self, descent_mm_per_min: f64) -> u64 {
        let ms = self.compute(descent_mm_per_min);
        self.cached_ms = Some(ms);
        ms
    }

    pub fn cached(&self) -> Option<u64> {
        self.cached_ms
    }

    pub fn reset(&mut self) {
        self.cached_ms = None;
    }
}

impl Default for DelayCalculator {
    fn default() -> Self {
        Self::new(DelayCfg::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_mm_at_sixty_per_minute_is_twenty_seconds() {
        assert_eq!(raw_delay_ms(20.0, 60.0), Some(20_000.0));
        assert_eq!(DelayCalculator::default().compute(60.0), 20_000);
    }

    #[test]
    fn non_positive_speed_uses_default() {
        let d = DelayCalculator::default();
        assert_eq!(d.compute(0.0), 15_000);
        assert_eq!(d.compute(-3.0), 15_000);
        assert_eq!(d.compute(f64::NAN), 15_000);
    }

    #[test]
    fn cache_is_replaced_on_next_cut() {
        let mut d = DelayCalculator::default();
        assert_eq!(d.on_cut_start(60.0), 20_000);
        assert_eq!(d.cached(), Some(20_000));
        d.reset();
        assert_eq!(d.cached(), None);
        assert_eq!(d.on_cut_start(40.0), 30_000);
    }
}
