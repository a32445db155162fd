//! Maps `Box<dyn Error>` from the bus trait boundary to a typed `ControlError`.
//!
//! `bandsaw_traits::RegisterBus` returns boxed errors so transports stay
//! decoupled; this module recovers the fault class, with an optional
//! feature-gated path for `bandsaw_hardware::HwError` downcasting.

use crate::error::ControlError;

/// Map a trait-boundary error to a typed `ControlError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ControlError {
    #[cfg(feature = "hardware-errors")]
    {
        use bandsaw_hardware::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Protocol(msg) => ControlError::DecodingFault(msg.clone()),
                other => ControlError::TransportFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("short read") || lower.contains("protocol") {
        ControlError::DecodingFault(s)
    } else {
        ControlError::TransportFault(s)
    }
}
