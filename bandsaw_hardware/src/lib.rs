//! Field-bus transports for the saw controller.
//!
//! - `ModbusTcpBus`: real master over TCP (holding-register read, single write)
//! - `SimulatedBus`: in-memory register file with fault injection and a per-read hook
pub mod error;
pub mod modbus;
pub mod sim;

pub use error::HwError;
pub use modbus::ModbusTcpBus;
pub use sim::{SimHandle, SimState, SimulatedBus};
