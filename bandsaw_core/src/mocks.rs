//! Test and helper doubles for bandsaw_core

use std::sync::Mutex;

use crate::strategy::SetpointWriter;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Written {
    Cutting(f64),
    Descent(f64),
}

/// Setpoint writer that records every accepted write. `reject` makes every
/// write fail, as a link in cooldown or down would.
#[derive(Debug, Default)]
pub struct RecordingWriter {
    pub writes: Mutex<Vec<Written>>,
    pub reject: bool,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn take(&self) -> Vec<Written> {
        std::mem::take(
            &mut *self
                .writes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    fn push(&self, w: Written) -> bool {
        if self.reject {
            return false;
        }
        self.writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(w);
        true
    }
}

impl SetpointWriter for RecordingWriter {
    fn write_cutting_speed(&self, v: f64) -> bool {
        self.push(Written::Cutting(v))
    }

    fn write_descent_speed(&self, v: f64) -> bool {
        self.push(Written::Descent(v))
    }
}
