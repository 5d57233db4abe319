use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;

use crate::drivers::DriverError;

/// First-column marker of an annotation row.
pub const NOTE_MARKER: &str = "Note:";
/// Value standing in for an empty spreadsheet cell.
pub const MISSING: &str = "-1";
pub const ROW_FIELDS: usize = 25;

/// Column layout of a test-plan row.
pub mod column {
    pub const LABEL: usize = 0;
    pub const CHANNEL: usize = 1;
    pub const DURATION: usize = 2;
    pub const VOLTAGE: usize = 3;
    pub const BIAS_VOLTAGE: usize = 4;
    pub const PULSE_RATE: usize = 5;
    pub const PULSE_DUTY: usize = 6;
    pub const PULSE_ON_TIME: usize = 7;
    pub const PULSE_OFF_TIME: usize = 8;
    pub const SWEEP_MODE: usize = 9;
    pub const SWEEP_START: usize = 10;
    pub const SWEEP_END: usize = 11;
    pub const SWEEP_STEP: usize = 12;
    pub const SWEEP_PERIOD: usize = 13;
    pub const SWEEP_AMP_START: usize = 14;
    pub const SWEEP_AMP_END: usize = 15;
    pub const WAVE_INDEX: usize = 16;
    pub const MODULATION_MODE: usize = 17;
    pub const FM_DEPTH: usize = 18;
    pub const FM_RATE: usize = 19;
    pub const WAVE_SWEEP_PERIOD: usize = 20;
    pub const AMP_SWEEP_PERIOD: usize = 21;
    pub const AMP_SWEEP_LEVEL: usize = 22;
    pub const PLAYBACK_FILE: usize = 23;
    pub const PLAYBACK_INDEX: usize = 24;

    pub const NAMES: [&str; super::ROW_FIELDS] = [
        "label",
        "channel",
        "duration",
        "voltage",
        "bias voltage",
        "pulse rate",
        "pulse duty",
        "pulse on",
        "pulse off",
        "sweep mode",
        "sweep start",
        "sweep end",
        "sweep step",
        "sweep period",
        "sweep amplitude start",
        "sweep amplitude end",
        "wave index",
        "modulation mode",
        "fm depth",
        "fm rate",
        "wave sweep period",
        "amplitude sweep period",
        "amplitude sweep level",
        "playback file",
        "playback index",
    ];
}

/// One spreadsheet row. Empty cells are stored as [`MISSING`] and short rows
/// are padded to [`ROW_FIELDS`].
#[derive(Clone, Debug, PartialEq)]
pub struct TestPlanRow {
    /// 1-based row number in the source sheet, for diagnostics.
    pub line: usize,
    fields: Vec<String>,
}
impl TestPlanRow {
    pub fn new<I, S>(line: usize, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut fields: Vec<String> = fields
            .into_iter()
            .map(|f| {
                let f = f.as_ref().trim();
                if f.is_empty() {
                    MISSING.to_string()
                } else {
                    f.to_string()
                }
            })
            .collect();
        if fields.len() < ROW_FIELDS {
            fields.resize(ROW_FIELDS, MISSING.to_string());
        }
        Self { line, fields }
    }
    pub fn field(&self, column: usize) -> &str {
        self.fields.get(column).map_or(MISSING, String::as_str)
    }
    pub fn is_note(&self) -> bool {
        self.field(column::LABEL) == NOTE_MARKER
    }
    pub fn note_text(&self) -> &str {
        match self.field(1) {
            MISSING => "",
            text => text,
        }
    }
}
/// A named tab of the test plan.
#[derive(Clone, Debug, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<TestPlanRow>,
}
impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<TestPlanRow>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }
    /// Reads a sheet exported as CSV, skipping `header_rows` leading rows.
    pub fn from_reader<R: Read>(
        name: impl Into<String>,
        reader: R,
        header_rows: usize,
    ) -> Result<Self, DriverError> {
        let mut csv = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut rows = Vec::new();
        for (index, record) in csv.records().enumerate() {
            let record = record?;
            if index < header_rows {
                continue;
            }
            rows.push(TestPlanRow::new(index + 1, record.iter()));
        }
        Ok(Self::new(name, rows))
    }
    pub fn from_path(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        header_rows: usize,
    ) -> Result<Self, DriverError> {
        let file = File::open(path)?;
        Self::from_reader(name, file, header_rows)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn rows_are_padded_and_blanks_become_missing() {
        let row = TestPlanRow::new(4, ["T1", "0", "", " 500 "]);
        assert_eq!(row.field(column::CHANNEL), "0");
        assert_eq!(row.field(column::DURATION), MISSING);
        assert_eq!(row.field(column::VOLTAGE), "500");
        assert_eq!(row.field(column::PLAYBACK_INDEX), MISSING);
        assert_eq!(row.field(99), MISSING);
    }
    #[test]
    fn note_rows_are_recognised() {
        let row = TestPlanRow::new(5, ["Note:", "warm up first"]);
        assert!(row.is_note());
        assert_eq!(row.note_text(), "warm up first");
        assert_eq!(TestPlanRow::new(6, ["Note:"]).note_text(), "");
        assert!(!TestPlanRow::new(7, ["note", "x"]).is_note());
    }
    #[test]
    fn csv_sheet_skips_header_rows_and_keeps_line_numbers() {
        let text = "Test,Ch,Dur\nunits,,ms\nT1,0,500\nT2,1\n";
        let sheet = Sheet::from_reader("Main", text.as_bytes(), 2).unwrap();
        assert_eq!(sheet.name, "Main");
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].line, 3);
        assert_eq!(sheet.rows[0].field(column::DURATION), "500");
        assert_eq!(sheet.rows[1].field(column::DURATION), MISSING);
    }
}
