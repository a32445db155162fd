use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("field-bus timeout")]
    Timeout,
    #[error("not connected")]
    NotConnected,
    #[error("device exception: function 0x{function:02x} code {code}")]
    Exception { function: u8, code: u8 },
    #[error("protocol: {0}")]
    Protocol(String),
}

impl HwError {
    /// Classify an io error, folding the platform's timeout kinds into `Timeout`.
    pub fn from_io(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => HwError::Timeout,
            _ => HwError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
