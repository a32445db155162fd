//! In-memory register file standing in for the saw controller.
//!
//! The bus and any number of `SimHandle`s share one `SimState`, so a test (or
//! the CLI's machine model) can poke registers and inspect writes while the
//! control loop owns the bus.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bandsaw_traits::{BoxError, RegisterBus};
use tracing::trace;

use crate::error::HwError;

#[derive(Debug, Default)]
pub struct SimState {
    pub registers: BTreeMap<u16, u16>,
    /// Every accepted write, in order.
    pub writes: Vec<(u16, u16)>,
    pub connected: bool,
    pub connect_attempts: u32,
    pub refuse_connect: bool,
    /// Number of upcoming reads that fail with a timeout.
    pub fail_reads: u32,
    /// Return one word fewer than requested.
    pub short_reads: bool,
}

impl SimState {
    pub fn get(&self, addr: u16) -> u16 {
        self.registers.get(&addr).copied().unwrap_or(0)
    }

    pub fn set(&mut self, addr: u16, value: u16) {
        self.registers.insert(addr, value);
    }

    pub fn set_block(&mut self, base: u16, words: &[u16]) {
        for (i, w) in words.iter().enumerate() {
            let Ok(off) = u16::try_from(i) else { break };
            self.set(base.wrapping_add(off), *w);
        }
    }
}

type ReadHook = Box<dyn FnMut(&mut SimState) + Send>;

pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
    on_read: Option<ReadHook>,
}

/// Shared view of a simulated bus.
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    pub fn lock(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }

    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.lock().writes.clone()
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            on_read: None,
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Install a hook that runs against the register file before every read.
    pub fn with_read_hook(mut self, hook: impl FnMut(&mut SimState) + Send + 'static) -> Self {
        self.on_read = Some(Box::new(hook));
        self
    }
}

impl RegisterBus for SimulatedBus {
    fn connect(&mut self) -> Result<(), BoxError> {
        let mut st = lock(&self.state);
        st.connect_attempts += 1;
        if st.refuse_connect {
            st.connected = false;
            return Err(HwError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "simulated refusal",
            ))
            .into());
        }
        st.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        lock(&self.state).connected = false;
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn read_holding_registers(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, BoxError> {
        let mut st = lock(&self.state);
        if !st.connected {
            return Err(HwError::NotConnected.into());
        }
        if st.fail_reads > 0 {
            st.fail_reads -= 1;
            st.connected = false;
            return Err(HwError::Timeout.into());
        }
        if let Some(hook) = self.on_read.as_mut() {
            hook(&mut st);
        }
        let n = if st.short_reads {
            count.saturating_sub(1)
        } else {
            count
        };
        let words = (0..n).map(|i| st.get(addr.wrapping_add(i))).collect();
        trace!(addr, count = n, "sim read");
        Ok(words)
    }

    fn write_single_register(&mut self, addr: u16, value: u16) -> Result<(), BoxError> {
        let mut st = lock(&self.state);
        if !st.connected {
            return Err(HwError::NotConnected.into());
        }
        st.set(addr, value);
        st.writes.push((addr, value));
        trace!(addr, value, "sim write");
        Ok(())
    }
}
