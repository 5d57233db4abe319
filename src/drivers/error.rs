use thiserror::Error;
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no serial device answered ({attempted} port(s) tried)")]
    Connection { attempted: usize },
    #[error("sheet `{sheet}` row {row}: {reason}")]
    MalformedRow {
        sheet: String,
        row: usize,
        reason: String,
    },
    #[error("cannot write to the controller: {0}")]
    Write(#[source] std::io::Error),
    #[error("acquisition aborted after {received} of {expected} samples: {reason}")]
    Acquisition {
        received: usize,
        expected: usize,
        reason: String,
    },
    #[error("serial link is disconnected")]
    Disconnected,
    #[error("no test {index} on sheet `{sheet}`")]
    UnknownTest { sheet: String, index: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serial(#[from] serialport::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}
impl DriverError {
    pub(crate) fn malformed(sheet: &str, row: usize, reason: impl Into<String>) -> Self {
        DriverError::MalformedRow {
            sheet: sheet.to_string(),
            row,
            reason: reason.into(),
        }
    }
    /// True for a read that simply saw no data before the port timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Io(err) if err.kind() == std::io::ErrorKind::TimedOut)
    }
}
