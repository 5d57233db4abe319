use std::collections::HashMap;
use std::fmt;

use log::{debug, info};

use crate::drivers::DriverError;
use crate::waveform::plan::{column, Sheet, TestPlanRow, MISSING};
use crate::waveform::segment::*;

/// Converts a voltage column into a fraction of the amplifier's full scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoltageScaling {
    pub scaler_base: f64,
    pub max_voltage: f64,
    pub dual_actuator_scaler: f64,
}
impl Default for VoltageScaling {
    fn default() -> Self {
        Self {
            scaler_base: 120.0,
            max_voltage: 0.8,
            dual_actuator_scaler: 1.0,
        }
    }
}
impl VoltageScaling {
    /// Channel 0 drives one actuator; channel 1 drives two and is derated.
    pub fn scaler_for(&self, channel: i64) -> Option<f64> {
        match channel {
            0 => Some(self.scaler_base / self.max_voltage),
            1 => Some(self.scaler_base / (self.max_voltage * self.dual_actuator_scaler)),
            _ => None,
        }
    }
}
/// A note and the half-open range of test indices it applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteRange {
    pub text: String,
    pub start: usize,
    pub end: usize,
}
impl NoteRange {
    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }
    /// `T1-T3: text`, or `T4: text` for a single test.
    pub fn label(&self) -> String {
        let mut label = format!("T{}", self.start + 1);
        if self.start + 1 != self.end {
            label.push_str(&format!("-T{}", self.end));
        }
        format!("{label}: {}", self.text)
    }
}
impl fmt::Display for NoteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
/// Encoded command strings and notes per sheet. Built once, read-only after.
#[derive(Clone, Debug, Default)]
pub struct WaveformTable {
    sheet_order: Vec<String>,
    waveforms: HashMap<String, Vec<String>>,
    notes: HashMap<String, Vec<NoteRange>>,
}
impl WaveformTable {
    /// The first sheet carries the global messages.
    pub fn main_sheet(&self) -> Option<&str> {
        self.sheet_order.first().map(String::as_str)
    }
    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheet_order.iter().map(String::as_str)
    }
    pub fn has_sheet(&self, sheet: &str) -> bool {
        self.waveforms.contains_key(sheet)
    }
    pub fn waveforms(&self, sheet: &str) -> &[String] {
        self.waveforms.get(sheet).map_or(&[], Vec::as_slice)
    }
    pub fn waveform(&self, sheet: &str, index: usize) -> Option<&str> {
        self.waveforms(sheet).get(index).map(String::as_str)
    }
    pub fn notes(&self, sheet: &str) -> &[NoteRange] {
        self.notes.get(sheet).map_or(&[], Vec::as_slice)
    }
    /// The note covering a test, if any.
    pub fn note_for(&self, sheet: &str, index: usize) -> Option<&NoteRange> {
        self.notes(sheet).iter().find(|note| note.contains(index))
    }
    pub fn test_count(&self, sheet: &str) -> usize {
        self.waveforms(sheet).len()
    }
    fn insert(&mut self, sheet: &str, waveforms: Vec<String>, notes: Vec<NoteRange>) {
        if !self.waveforms.contains_key(sheet) {
            self.sheet_order.push(sheet.to_string());
        }
        self.waveforms.insert(sheet.to_string(), waveforms);
        self.notes.insert(sheet.to_string(), notes);
    }
}
/// Encodes every sheet. The first malformed row aborts with a diagnostic
/// naming its sheet, row and column.
pub fn encode(sheets: &[Sheet], scaling: &VoltageScaling) -> Result<WaveformTable, DriverError> {
    let mut table = WaveformTable::default();
    for sheet in sheets {
        let (waveforms, notes) = encode_sheet(sheet, scaling)?;
        info!(
            "sheet `{}`: {} test(s), {} note(s)",
            sheet.name,
            waveforms.len(),
            notes.len()
        );
        table.insert(&sheet.name, waveforms, notes);
    }
    Ok(table)
}
/// Encodes one sheet. A negative channel ends the sheet early; annotation
/// rows are collected as notes keyed by the count of tests before them.
pub fn encode_sheet(
    sheet: &Sheet,
    scaling: &VoltageScaling,
) -> Result<(Vec<String>, Vec<NoteRange>), DriverError> {
    let mut waveforms = Vec::new();
    let mut note_starts = Vec::new();
    let mut note_texts = Vec::new();
    for row in &sheet.rows {
        if row.is_note() {
            note_starts.push(waveforms.len());
            note_texts.push(row.note_text().to_string());
            continue;
        }
        let cursor = RowCursor {
            sheet: &sheet.name,
            row,
        };
        if cursor.mode(column::CHANNEL)? < 0 {
            debug!("sheet `{}` ends at row {}", sheet.name, row.line);
            break;
        }
        waveforms.push(encode_row(&cursor, scaling)?);
    }
    if let Some(first) = note_starts.first_mut() {
        *first = 0;
    }
    note_starts.push(waveforms.len());
    let notes = note_texts
        .into_iter()
        .zip(note_starts.windows(2))
        .map(|(text, bounds)| NoteRange {
            text,
            start: bounds[0],
            end: bounds[1],
        })
        .collect();
    Ok((waveforms, notes))
}
struct RowCursor<'a> {
    sheet: &'a str,
    row: &'a TestPlanRow,
}
impl RowCursor<'_> {
    fn malformed(&self, col: usize, reason: impl fmt::Display) -> DriverError {
        DriverError::malformed(
            self.sheet,
            self.row.line,
            format!("column {} ({}): {reason}", col + 1, column::NAMES[col]),
        )
    }
    fn number(&self, col: usize) -> Result<f64, DriverError> {
        let raw = self.row.field(col);
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.malformed(col, format!("`{raw}` is not a number")))
    }
    /// Governing fields select a branch; fractions truncate toward zero.
    fn mode(&self, col: usize) -> Result<i64, DriverError> {
        Ok(self.number(col)?.trunc() as i64)
    }
    fn whole(&self, col: usize) -> Result<i64, DriverError> {
        let value = self.number(col)?;
        if value.fract() != 0.0 {
            return Err(self.malformed(col, format!("{value} is not a whole number")));
        }
        Ok(value as i64)
    }
    fn is_disabled_text(&self, col: usize) -> bool {
        let raw = self.row.field(col);
        raw == MISSING || raw.parse::<f64>() == Ok(-1.0)
    }
    fn digits(&self, frame: &mut FrameBuilder, col: usize, width: usize) -> Result<(), DriverError> {
        let value = self.whole(col)?;
        frame
            .digits(value, width)
            .map_err(|e| self.malformed(col, e))?;
        Ok(())
    }
    fn percent(&self, frame: &mut FrameBuilder, col: usize, scaler: f64) -> Result<(), DriverError> {
        let value = self.number(col)?;
        frame
            .percent(value, scaler)
            .map_err(|e| self.malformed(col, e))?;
        Ok(())
    }
}
fn encode_row(row: &RowCursor<'_>, scaling: &VoltageScaling) -> Result<String, DriverError> {
    use column::*;
    let channel = row.whole(CHANNEL)?;
    let scaler = scaling
        .scaler_for(channel)
        .ok_or_else(|| row.malformed(CHANNEL, format!("channel {channel} is not 0 or 1")))?;
    let mut frame = FrameBuilder::new(MODE_RUN);

    frame.literal(CARRIER_TAG);
    row.digits(&mut frame, CHANNEL, 1)?;
    row.digits(&mut frame, DURATION, 3)?;
    row.percent(&mut frame, VOLTAGE, scaler)?;
    row.percent(&mut frame, BIAS_VOLTAGE, scaler)?;

    frame.literal(PULSE_TAG);
    if row.mode(PULSE_RATE)? < 0 {
        frame.literal(PULSE_OFF);
    } else {
        frame.flag(true);
        row.digits(&mut frame, PULSE_RATE, 1)?;
        let duty = row.number(PULSE_DUTY)?;
        frame
            .duty(duty)
            .map_err(|e| row.malformed(PULSE_DUTY, e))?;
        row.digits(&mut frame, PULSE_ON_TIME, 2)?;
        row.digits(&mut frame, PULSE_OFF_TIME, 2)?;
    }

    // sweep mode: 1 = frequency, 2 = amplitude, 3 = both
    let sweep = row.mode(SWEEP_MODE)?;
    frame.literal(FREQ_SWEEP_TAG);
    if sweep < 0 {
        frame.literal(FREQ_SWEEP_OFF);
    } else {
        frame.flag(matches!(sweep, 1 | 3));
        row.digits(&mut frame, SWEEP_START, 3)?;
        row.digits(&mut frame, SWEEP_END, 3)?;
        row.digits(&mut frame, SWEEP_STEP, 2)?;
        row.digits(&mut frame, SWEEP_PERIOD, 4)?;
    }
    frame.literal(AMP_SWEEP_TAG);
    if sweep < 0 {
        frame.literal(AMP_SWEEP_OFF);
    } else {
        frame.flag(matches!(sweep, 2 | 3));
        row.percent(&mut frame, SWEEP_AMP_START, scaler)?;
        row.percent(&mut frame, SWEEP_AMP_END, scaler)?;
    }

    frame.literal(WAVE_INDEX_TAG);
    if row.mode(WAVE_INDEX)? < 0 {
        frame.literal(WAVE_INDEX_OFF);
    } else {
        row.digits(&mut frame, WAVE_INDEX, 4)?;
    }

    // modulation mode: 1 fm, 2 am, 3 fm+am, 4 fm+wave sweep, 5 all three
    let modulation = row.mode(MODULATION_MODE)?;
    frame.literal(FREQ_MOD_TAG);
    if matches!(modulation, 1 | 3 | 4 | 5) {
        frame.flag(true);
        row.digits(&mut frame, FM_DEPTH, 2)?;
        row.digits(&mut frame, FM_RATE, 3)?;
    } else {
        frame.literal(FREQ_MOD_OFF);
    }
    frame.literal(WAVE_SWEEP_TAG);
    if matches!(modulation, 4 | 5) {
        frame.flag(true);
        row.digits(&mut frame, WAVE_SWEEP_PERIOD, 4)?;
    } else {
        frame.literal(WAVE_SWEEP_OFF);
    }
    frame.literal(AMP_SWEEP2_TAG);
    if matches!(modulation, 2 | 3 | 5) {
        frame.flag(true);
        row.digits(&mut frame, AMP_SWEEP_PERIOD, 3)?;
        row.percent(&mut frame, AMP_SWEEP_LEVEL, scaler)?;
    } else {
        frame.literal(AMP_SWEEP2_OFF);
    }

    // the filename goes last: it is the only variable-length field
    frame.literal(PLAYBACK_TAG);
    let playback = !row.is_disabled_text(PLAYBACK_FILE);
    frame.flag(playback);
    frame
        .seal()
        .map_err(|e| row.malformed(PLAYBACK_FILE, e))?;
    if playback {
        row.digits(&mut frame, PLAYBACK_INDEX, 4)?;
        frame.literal(&row.row.field(PLAYBACK_FILE).trim().to_uppercase());
    }
    frame.finish().map_err(|e| row.malformed(PLAYBACK_FILE, e))
}
