//! Fixed-period poll loop: the only driver of link reads and dispatch, and the
//! only writer of live setpoints.
//!
//! Operator commands arrive over a `crossbeam_channel` and are drained at the
//! top of every tick, so they never race a strategy's writes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bandsaw_traits::{Clock, RegisterBus};
use crossbeam_channel as xch;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Dispatcher, StrategyStats, TickOutcome};
use crate::error::ControlError;
use crate::gate::GatePhase;
use crate::link::HardwareLink;
use crate::register_map;
use crate::snapshot::Setpoints;
use crate::strategy::StrategyKind;

pub enum Command {
    SetActive {
        selection: Option<StrategyKind>,
        reply: Option<xch::Sender<Result<(), ControlError>>>,
    },
    GetStats(xch::Sender<StatsReport>),
    EmergencyStop,
}

#[derive(Debug, Clone)]
pub struct StatsReport {
    pub active: Option<StrategyKind>,
    pub phase: GatePhase,
    pub link_up: bool,
    pub ticks: u64,
    pub last_applied: Option<Setpoints>,
    pub strategies: BTreeMap<StrategyKind, StrategyStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    /// Ticks with no snapshot (link down or decode fault).
    pub missed_reads: u64,
    pub adjustments: u64,
    pub faults: u64,
}

/// Zero both setpoints, descent first, waiting out the write cooldown.
pub fn emergency_stop<B: RegisterBus>(link: &HardwareLink<B>) -> bool {
    let cfg = link.cfg();
    let descent = link.write_register_when_ready(
        cfg.descent_speed_reg,
        register_map::encode_descent_speed(0.0),
    );
    let cutting = link.write_register_when_ready(
        cfg.cutting_speed_reg,
        register_map::encode_cutting_speed(0.0),
    );
    if descent && cutting {
        warn!("emergency stop: setpoints zeroed");
    } else {
        error!(descent, cutting, "emergency stop: setpoint write failed");
    }
    descent && cutting
}

pub struct PollLoop<B: RegisterBus> {
    link: Arc<HardwareLink<B>>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock + Send + Sync>,
    period: Duration,
    commands: Option<xch::Receiver<Command>>,
    ticks: u64,
    last_applied: Option<Setpoints>,
    summary: RunSummary,
}

impl<B: RegisterBus> PollLoop<B> {
    pub fn new(
        link: Arc<HardwareLink<B>>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock + Send + Sync>,
        poll_hz: u32,
    ) -> Self {
        Self {
            link,
            dispatcher,
            clock,
            period: Duration::from_micros(crate::util::period_us(poll_hz)),
            commands: None,
            ticks: 0,
            last_applied: None,
            summary: RunSummary::default(),
        }
    }

    /// Attach an operator command channel; returns the sending half.
    pub fn command_channel(&mut self) -> xch::Sender<Command> {
        let (tx, rx) = xch::unbounded();
        self.commands = Some(rx);
        tx
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn link(&self) -> &Arc<HardwareLink<B>> {
        &self.link
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn report(&self) -> StatsReport {
        StatsReport {
            active: self.dispatcher.active(),
            phase: self.dispatcher.gate_phase(),
            link_up: self.link.is_connected(),
            ticks: self.ticks,
            last_applied: self.last_applied,
            strategies: self.dispatcher.stats(),
        }
    }

    /// Clear the selection and zero both setpoints.
    pub fn emergency_stop(&mut self) -> bool {
        self.dispatcher.emergency_stop();
        emergency_stop(&*self.link)
    }

    fn drain_commands(&mut self) {
        let Some(rx) = self.commands.clone() else {
            return;
        };
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                Command::SetActive { selection, reply } => {
                    let res = self.dispatcher.set_active(selection);
                    if let Err(e) = &res {
                        warn!(error = %e, "set_active rejected");
                    }
                    if let Some(tx) = reply {
                        let _ = tx.send(res);
                    }
                }
                Command::GetStats(tx) => {
                    let _ = tx.send(self.report());
                }
                Command::EmergencyStop => {
                    self.emergency_stop();
                }
            }
        }
    }

    /// One poll: commands, read, dispatch. `None` when no snapshot was read.
    pub fn tick(&mut self) -> Option<TickOutcome> {
        self.drain_commands();
        self.ticks += 1;
        self.summary.ticks += 1;
        let Some(snapshot) = self.link.read_all() else {
            self.summary.missed_reads += 1;
            debug!(tick = self.ticks, "no snapshot; holding setpoints");
            return None;
        };
        let now = self.clock.now();
        let outcome = self.dispatcher.tick(
            &snapshot,
            snapshot.setpoints(),
            now,
            &*self.link,
        );
        match &outcome {
            TickOutcome::Ran { .. } => {
                if let Some(p) = outcome.applied() {
                    self.last_applied = Some(p);
                    self.summary.adjustments += 1;
                }
            }
            TickOutcome::Faulted(_) => self.summary.faults += 1,
            TickOutcome::Skipped(_) => {}
        }
        Some(outcome)
    }

    /// Run until `shutdown` is set or `max_ticks` polls have happened.
    pub fn run(&mut self, shutdown: &AtomicBool, max_ticks: Option<u64>) -> RunSummary {
        info!(
            period_ms = self.period.as_millis(),
            active = self.dispatcher.active().map_or("none", StrategyKind::name),
            "poll loop start"
        );
        let mut remaining = max_ticks;
        while !shutdown.load(Ordering::Relaxed) {
            if remaining == Some(0) {
                break;
            }
            let started = self.clock.now();
            self.tick();
            if let Some(n) = remaining.as_mut() {
                *n -= 1;
            }
            let spent = self.clock.now().saturating_duration_since(started);
            self.clock.sleep(self.period.saturating_sub(spent));
        }
        info!(
            ticks = self.summary.ticks,
            adjustments = self.summary.adjustments,
            faults = self.summary.faults,
            missed_reads = self.summary.missed_reads,
            "poll loop stop"
        );
        self.summary
    }
}
