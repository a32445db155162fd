//! Seams between the control core and the outside world.
//!
//! Everything that touches time or the field-bus goes through these traits so
//! the control logic can be driven deterministically in tests.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Register-level field-bus master transport.
///
/// Implementations only need the two function patterns the saw controller
/// uses: a bulk holding-register read and a single-register write. Every call
/// must return within the transport's own timeout.
pub trait RegisterBus {
    /// Open the underlying connection. Calling this while connected is allowed
    /// and should re-open the transport.
    fn connect(&mut self) -> Result<(), BoxError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn read_holding_registers(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, BoxError>;
    fn write_single_register(&mut self, addr: u16, value: u16) -> Result<(), BoxError>;
}

impl<B: RegisterBus + ?Sized> RegisterBus for Box<B> {
    fn connect(&mut self) -> Result<(), BoxError> {
        (**self).connect()
    }
    fn disconnect(&mut self) {
        (**self).disconnect();
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn read_holding_registers(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, BoxError> {
        (**self).read_holding_registers(addr, count)
    }
    fn write_single_register(&mut self, addr: u16, value: u16) -> Result<(), BoxError> {
        (**self).write_single_register(addr, value)
    }
}
