//! Hardware link: sole owner of register I/O.
//!
//! Every transport or decoding fault is logged, marks the link unhealthy and
//! degrades to `None`/`false`. The next read goes through reconnect, which is
//! rate-limited by the connect cooldown. Writes are throttled per register:
//! a write inside the cooldown is rejected, never queued. The cooldown check
//! and the bus call happen under one lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bandsaw_traits::{Clock, RegisterBus};
use tracing::{debug, info, warn};

use crate::config::LinkCfg;
use crate::error::ControlError;
use crate::hw_error::map_hw_error;
use crate::register_map;
use crate::snapshot::MachineSnapshot;
use crate::strategy::SetpointWriter;

/// Attempts made by `write_register_when_ready` before giving up.
const READY_WRITE_ATTEMPTS: usize = 3;

struct LinkInner<B> {
    bus: B,
    last_connect_attempt: Option<Instant>,
    last_write: HashMap<u16, Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Written,
    Cooldown(Duration),
    NotConnected,
    Failed,
}

pub struct HardwareLink<B> {
    inner: Mutex<LinkInner<B>>,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: LinkCfg,
    healthy: AtomicBool,
}

impl<B> std::fmt::Debug for HardwareLink<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareLink")
            .field("cfg", &self.cfg)
            .field("healthy", &self.healthy.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<B: RegisterBus> HardwareLink<B> {
    pub fn new(bus: B, cfg: LinkCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            inner: Mutex::new(LinkInner {
                bus,
                last_connect_attempt: None,
                last_write: HashMap::new(),
            }),
            clock,
            cfg,
            healthy: AtomicBool::new(false),
        }
    }

    pub fn cfg(&self) -> &LinkCfg {
        &self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, LinkInner<B>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Cheap, non-blocking health check.
    pub fn is_connected(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Connect if not already connected. Attempts inside the connect cooldown
    /// are refused and return `false`.
    pub fn connect(&self) -> bool {
        let mut inner = self.lock();
        self.connect_locked(&mut inner)
    }

    fn connect_locked(&self, inner: &mut LinkInner<B>) -> bool {
        if self.is_connected() && inner.bus.is_connected() {
            return true;
        }
        let now = self.clock.now();
        if let Some(last) = inner.last_connect_attempt {
            let since = now.saturating_duration_since(last);
            if since < self.cfg.connect_cooldown {
                debug!(
                    retry_in_ms = (self.cfg.connect_cooldown - since).as_millis(),
                    "connect refused: cooldown"
                );
                return false;
            }
        }
        inner.last_connect_attempt = Some(now);
        match inner.bus.connect() {
            Ok(()) => {
                self.clock.sleep(self.cfg.settle);
                self.healthy.store(true, Ordering::Release);
                info!("hardware link connected");
                true
            }
            Err(e) => {
                let err = map_hw_error(e.as_ref());
                warn!(error = %err, "hardware link connect failed");
                self.healthy.store(false, Ordering::Release);
                false
            }
        }
    }

    pub fn disconnect(&self) {
        let mut inner = self.lock();
        inner.bus.disconnect();
        self.healthy.store(false, Ordering::Release);
    }

    fn fault(&self, inner: &mut LinkInner<B>, err: &ControlError) {
        warn!(error = %err, "hardware link fault; marking unhealthy");
        self.healthy.store(false, Ordering::Release);
        inner.bus.disconnect();
    }

    fn read_locked(&self, inner: &mut LinkInner<B>, addr: u16, count: u16) -> Option<Vec<u16>> {
        if !self.connect_locked(inner) {
            return None;
        }
        match inner.bus.read_holding_registers(addr, count) {
            Ok(words) if words.len() == usize::from(count) => Some(words),
            Ok(words) => {
                let err = ControlError::DecodingFault(format!(
                    "short read at {addr}: {} of {count} words",
                    words.len()
                ));
                self.fault(inner, &err);
                None
            }
            Err(e) => {
                let err = map_hw_error(e.as_ref());
                self.fault(inner, &err);
                None
            }
        }
    }

    /// Raw register read; `None` on any fault.
    pub fn read_registers(&self, addr: u16, count: u16) -> Option<Vec<u16>> {
        let mut inner = self.lock();
        self.read_locked(&mut inner, addr, count)
    }

    /// Read and decode the full sensor block; `None` on any fault.
    pub fn read_all(&self) -> Option<MachineSnapshot> {
        let mut inner = self.lock();
        let words = self.read_locked(&mut inner, self.cfg.read_base, self.cfg.read_count)?;
        match register_map::decode(&words) {
            Ok(snap) => Some(snap),
            Err(err) => {
                self.fault(&mut inner, &err);
                None
            }
        }
    }

    fn try_write(&self, addr: u16, value: u16) -> WriteOutcome {
        let mut inner = self.lock();
        if !self.is_connected() {
            return WriteOutcome::NotConnected;
        }
        let now = self.clock.now();
        if let Some(last) = inner.last_write.get(&addr) {
            let since = now.saturating_duration_since(*last);
            if since < self.cfg.write_cooldown {
                return WriteOutcome::Cooldown(self.cfg.write_cooldown - since);
            }
        }
        inner.last_write.insert(addr, now);
        match inner.bus.write_single_register(addr, value) {
            Ok(()) => WriteOutcome::Written,
            Err(e) => {
                let err = map_hw_error(e.as_ref());
                self.fault(&mut inner, &err);
                WriteOutcome::Failed
            }
        }
    }

    /// Single-register write. Returns `false` when rejected by the write
    /// cooldown, when disconnected, or on a transport fault.
    ///
    /// The cooldown is tracked per register: writes to different registers
    /// are not throttled against each other, so one tick may write both
    /// setpoints back to back.
    pub fn write_register(&self, addr: u16, value: u16) -> bool {
        match self.try_write(addr, value) {
            WriteOutcome::Written => true,
            WriteOutcome::Cooldown(left) => {
                debug!(addr, value, retry_in_ms = left.as_millis(), "write rejected: cooldown");
                false
            }
            WriteOutcome::NotConnected => {
                debug!(addr, value, "write skipped: link down");
                false
            }
            WriteOutcome::Failed => false,
        }
    }

    /// Write once the cooldown for `addr` has passed, reconnecting if needed.
    /// Used by emergency stop; waits but never bypasses the cooldown.
    pub fn write_register_when_ready(&self, addr: u16, value: u16) -> bool {
        for _ in 0..READY_WRITE_ATTEMPTS {
            match self.try_write(addr, value) {
                WriteOutcome::Written => return true,
                WriteOutcome::Cooldown(left) => self.clock.sleep(left),
                WriteOutcome::NotConnected | WriteOutcome::Failed => {
                    if !self.connect() {
                        self.clock.sleep(self.cfg.connect_cooldown);
                    }
                }
            }
        }
        warn!(addr, value, "write did not complete");
        false
    }
}

impl<B: RegisterBus> HardwareLink<B> {
    fn write_setpoint(&self, addr: u16, v: f64, raw: Option<u16>) -> bool {
        match raw {
            Some(value) => self.write_register(addr, value),
            None => {
                warn!(addr, value = v, "no register value inside limits; write skipped");
                false
            }
        }
    }
}

impl<B: RegisterBus> SetpointWriter for HardwareLink<B> {
    fn write_cutting_speed(&self, v: f64) -> bool {
        let raw = match self.cfg.limits {
            Some(l) => register_map::encode_cutting_speed_within(v, l.cutting_min, l.cutting_max),
            None => Some(register_map::encode_cutting_speed(v)),
        };
        self.write_setpoint(self.cfg.cutting_speed_reg, v, raw)
    }

    fn write_descent_speed(&self, v: f64) -> bool {
        let raw = match self.cfg.limits {
            Some(l) => register_map::encode_descent_speed_within(v, l.descent_min, l.descent_max),
            None => Some(register_map::encode_descent_speed(v)),
        };
        self.write_setpoint(self.cfg.descent_speed_reg, v, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandsaw_hardware::SimulatedBus;
    use bandsaw_traits::ManualClock;

    fn link(bus: SimulatedBus, clock: &ManualClock) -> HardwareLink<SimulatedBus> {
        HardwareLink::new(bus, LinkCfg::default(), Arc::new(clock.clone()))
    }

    #[test]
    fn connect_is_idempotent_and_settles() {
        let clock = ManualClock::new();
        let bus = SimulatedBus::new();
        let sim = bus.handle();
        let l = link(bus, &clock);
        let t0 = clock.now();
        assert!(l.connect());
        assert_eq!(clock.now() - t0, Duration::from_millis(50));
        assert!(l.connect());
        assert_eq!(sim.lock().connect_attempts, 1);
    }

    #[test]
    fn raw_read_connects_on_demand() {
        let clock = ManualClock::new();
        let bus = SimulatedBus::new();
        let sim = bus.handle();
        sim.lock().set_block(2100, &[80, 4000]);
        let l = link(bus, &clock);
        assert!(!l.is_connected());
        assert_eq!(l.read_registers(2100, 2), Some(vec![80, 4000]));
        assert!(l.is_connected());
        l.disconnect();
        assert!(!l.is_connected());
    }

    #[test]
    fn reconnect_respects_cooldown() {
        let clock = ManualClock::new();
        let bus = SimulatedBus::new();
        let sim = bus.handle();
        sim.lock().refuse_connect = true;
        let l = link(bus, &clock);
        assert!(!l.connect());
        assert!(!l.connect());
        assert_eq!(sim.lock().connect_attempts, 1);
        clock.advance_ms(2_000);
        sim.lock().refuse_connect = false;
        assert!(l.connect());
        assert_eq!(sim.lock().connect_attempts, 2);
    }

    #[test]
    fn short_block_marks_link_unhealthy() {
        let clock = ManualClock::new();
        let bus = SimulatedBus::new();
        bus.handle().lock().short_reads = true;
        let l = link(bus, &clock);
        assert!(l.read_all().is_none());
        assert!(!l.is_connected());
    }
}
