//! Wake-cycle orchestration for a solar camera trap
//!
//! Wires the modem, broker, power controller and capture pipeline from
//! `camtrap-connectors` into a single cycle. The `camtrap` binary opens
//! the devices named in [`NodeConfig`], runs one [`WakeCycle`] and exits
//! with [`CycleError::exit_code`].

pub mod capture;
pub mod config;
pub mod cycle;
pub mod error;

pub use capture::{CaptureError, CapturePipeline, ShellCapture};
pub use config::NodeConfig;
pub use cycle::{reconcile, CycleReport, ScheduleSource, WakeCycle};
pub use error::{CycleError, EXIT_OK};
