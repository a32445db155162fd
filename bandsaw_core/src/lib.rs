#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Adaptive band-saw control (hardware-agnostic).
//!
//! All register I/O goes through `bandsaw_traits::RegisterBus`; all time
//! goes through `bandsaw_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Register map**: fixed 42-word read block and two write registers (`register_map`)
//! - **Hardware link**: reconnect with cooldown, throttled writes, never raises (`link`)
//! - **Smoothing**: time- or count-windowed moving averages (`buffer`)
//! - **Gating**: engagement delay and cut-state machine (`delay`, `gate`)
//! - **Strategies**: expert, fuzzy, linear and ML with the torque guard (`strategy`)
//! - **Dispatch**: selection, stats and fault containment (`dispatcher`)
//! - **Loop**: fixed-period polling with an operator command channel (`runner`)

pub mod buffer;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod delay;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod hw_error;
pub mod lifecycle;
pub mod link;
pub mod mocks;
pub mod register_map;
pub mod runner;
pub mod snapshot;
pub mod strategy;
pub mod util;

pub use builder::{DispatcherBuilder, dispatcher_from_config};
pub use dispatcher::{Dispatcher, SkipReason, StrategyStats, TickOutcome};
pub use error::{BuildError, ControlError, Result, StrategyError};
pub use link::HardwareLink;
pub use runner::{Command, PollLoop, RunSummary, StatsReport};
pub use snapshot::{MachineSnapshot, MachineState, Setpoints, SpeedLimits};
pub use strategy::{ControlStrategy, SetpointWriter, StrategyKind};
