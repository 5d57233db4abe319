// src/types.rs
use std::fmt;

use serde::{Deserialize, Serialize};

/// A test row on a sheet; `index` counts test rows only, from zero.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TestId {
    pub sheet: String,
    pub index: usize,
}
impl TestId {
    pub fn new(sheet: impl Into<String>, index: usize) -> Self {
        Self {
            sheet: sheet.into(),
            index,
        }
    }
}
impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} T{}", self.sheet, self.index + 1)
    }
}

// Driver engine state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Transmitting(TestId),
    Verifying,
}

// Front-end -> engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverCommand {
    Run(TestId),
    Stop,
    StartVerify,
    StopVerify,
    Shutdown,
}

// Engine -> front-end
#[derive(Clone, Debug, PartialEq)]
pub enum DriverMessage {
    Log(String),
    State(DriverState),
    Status(String),      // line read back while verifying
    WriteFailed(String), // recovery advice
    Error(String),
}

/// Zero-point removal applied before calibration gain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroMode {
    Off,
    /// Device at rest: the first sample defines zero.
    Still,
    /// Device vibrating: the burst mean defines zero.
    #[default]
    Shaking,
}
