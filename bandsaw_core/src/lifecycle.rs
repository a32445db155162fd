//! Cut lifecycle collaborator notified by the dispatcher gate.
//!
//! Both calls are idempotent: starting while started, or ending while idle,
//! does nothing.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::info;

pub trait CutLifecycle: Send {
    fn start_cutting(&mut self, strategy: &str);
    fn end_cutting(&mut self);
}

/// Logs cut boundaries with the cut duration.
#[derive(Debug, Default)]
pub struct LoggingLifecycle {
    started: Option<(Instant, String)>,
}

impl LoggingLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cutting(&self) -> bool {
        self.started.is_some()
    }
}

impl CutLifecycle for LoggingLifecycle {
    fn start_cutting(&mut self, strategy: &str) {
        if self.started.is_some() {
            return;
        }
        info!(strategy, "cut lifecycle: start");
        self.started = Some((Instant::now(), strategy.to_owned()));
    }

    fn end_cutting(&mut self) {
        if let Some((at, strategy)) = self.started.take() {
            info!(
                strategy = %strategy,
                duration_ms = at.elapsed().as_millis(),
                "cut lifecycle: end"
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Start(String),
    End,
}

/// Records effective transitions; clones share the log.
#[derive(Debug, Default, Clone)]
pub struct RecordingLifecycle {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
    cutting: bool,
}

impl RecordingLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn push(&self, e: LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(e);
    }
}

impl CutLifecycle for RecordingLifecycle {
    fn start_cutting(&mut self, strategy: &str) {
        if !self.cutting {
            self.cutting = true;
            self.push(LifecycleEvent::Start(strategy.to_owned()));
        }
    }

    fn end_cutting(&mut self) {
        if self.cutting {
            self.cutting = false;
            self.push(LifecycleEvent::End);
        }
    }
}
