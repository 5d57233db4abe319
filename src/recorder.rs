use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use crate::drivers::{ConditionedSample, DriverError};

pub const EXPORT_HEADERS: [&str; 4] = ["Time (s)", "X (m/s^2)", "Y (m/s^2)", "Z (m/s^2)"];

/// Writes a conditioned series as CSV, one row per sample.
pub fn write_series<W: Write>(writer: W, samples: &[ConditionedSample]) -> Result<(), DriverError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(EXPORT_HEADERS)?;
    for s in samples {
        csv.write_record([s.t, s.x, s.y, s.z].map(|v| v.to_string()))?;
    }
    csv.flush()?;
    Ok(())
}

/// Saves each acquisition to `<dir>/<prefix>_<unix-seconds>.csv`.
pub struct BurstRecorder {
    dir: PathBuf,
    prefix: String,
}
impl BurstRecorder {
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.into(),
        }
    }
    pub fn file_path(&self, unix_secs: u64) -> PathBuf {
        self.dir.join(format!("{}_{unix_secs}.csv", self.prefix))
    }
    pub fn export(&self, samples: &[ConditionedSample]) -> Result<PathBuf, DriverError> {
        fs::create_dir_all(&self.dir)?;
        // a clock before 1970 only affects the file name
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let path = self.file_path(timestamp);
        let file = File::create(&path)?;
        write_series(BufWriter::new(file), samples)?;
        info!("acceleration data saved to {}", path.display());
        Ok(path)
    }
}
