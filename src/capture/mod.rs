//! Image capture from the device monitor.
//!
//! [`MonitorCapture`] composes the [`supervisor`] (bounded-time process
//! ownership) with the [`protocol`] reader (sentinel framing) behind the
//! [`CaptureSource`] seam the orchestrator depends on.

pub mod codec;
pub mod process_tree;
pub mod protocol;
pub mod supervisor;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::config::GlobalConfig;
use crate::Result;

use self::supervisor::{run_capture, MonitorCommand};

/// Source of base64-encoded image payloads.
pub trait CaptureSource: Send + Sync {
    /// Capture one frame and return its base64 payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CaptureTimeout`, `AppError::CaptureProcess`, or
    /// `AppError::NoPayload`; all are recoverable per iteration.
    fn capture(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// Captures frames by running the device monitor once per call.
#[derive(Debug, Clone)]
pub struct MonitorCapture {
    command: MonitorCommand,
    timeout: Duration,
}

impl MonitorCapture {
    /// Create a capture source for `command` with a per-attempt deadline.
    #[must_use]
    pub fn new(command: MonitorCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// Build from the `[monitor]` section and its capture deadline.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(MonitorCommand::from(&config.monitor), config.capture_timeout())
    }
}

impl CaptureSource for MonitorCapture {
    fn capture(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            let lines = run_capture(&self.command, self.timeout).await?;
            protocol::extract_payload(&lines)
        })
    }
}
