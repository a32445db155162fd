//! Windowed moving average over one sensor channel.
//!
//! Each buffer is owned by exactly one strategy. Eviction is either by age
//! (relative to the newest sample) or by count.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample {
    pub at: Instant,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep samples no older than this relative to the newest one.
    Window(Duration),
    /// Keep at most this many samples (minimum 1).
    Capacity(usize),
}

#[derive(Debug, Clone)]
pub struct SensorBuffer {
    samples: VecDeque<TimedSample>,
    retention: Retention,
}

impl SensorBuffer {
    pub fn new(retention: Retention) -> Self {
        let retention = match retention {
            Retention::Capacity(0) => Retention::Capacity(1),
            r => r,
        };
        Self {
            samples: VecDeque::new(),
            retention,
        }
    }

    pub fn windowed(window: Duration) -> Self {
        Self::new(Retention::Window(window))
    }

    pub fn with_capacity(n: usize) -> Self {
        Self::new(Retention::Capacity(n))
    }

    /// Append one sample. Non-finite values are dropped.
    pub fn append(&mut self, at: Instant, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.samples.push_back(TimedSample { at, value });
        self.evict();
    }

    fn evict(&mut self) {
        match self.retention {
            Retention::Capacity(n) => {
                while self.samples.len() > n {
                    self.samples.pop_front();
                }
            }
            Retention::Window(w) => {
                let Some(newest) = self.samples.back().map(|s| s.at) else {
                    return;
                };
                while let Some(front) = self.samples.front() {
                    if newest.saturating_duration_since(front.at) > w {
                        self.samples.pop_front();
                    } else {
                        break;
                    }
                }
            }
        }
    }

    /// Arithmetic mean of the retained samples; `None` when empty.
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|s| s.value).sum();
        Some(sum / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }
}
