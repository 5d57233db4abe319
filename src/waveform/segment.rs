//! Fixed-width frame assembly for the controller's waveform command.
//!
//! The firmware parses commands by byte offset, so every field is written
//! through [`FrameBuilder`], which refuses values that would not fit their
//! slot. Everything up to and including the playback flag is
//! [`FIXED_FRAME_LEN`] characters; only the playback filename tail varies.
use std::fmt;

use once_cell::sync::Lazy;

pub const MODE_STOP: char = '0';
pub const MODE_RUN: char = '1';
pub const MODE_CONNECT: char = '2';

pub const CARRIER_TAG: &str = "c";
pub const PULSE_TAG: &str = "p";
pub const FREQ_SWEEP_TAG: &str = "f";
pub const AMP_SWEEP_TAG: &str = "a";
pub const WAVE_INDEX_TAG: &str = "w";
pub const FREQ_MOD_TAG: &str = "ff";
pub const WAVE_SWEEP_TAG: &str = "ww";
pub const AMP_SWEEP2_TAG: &str = "aa";
pub const PLAYBACK_TAG: &str = "wav";

// disabled fillers, each exactly as wide as the enabled segment body
pub const PULSE_OFF: &str = "010.505050";
pub const FREQ_SWEEP_OFF: &str = "0050050050000";
pub const AMP_SWEEP_OFF: &str = "00.000.00";
pub const WAVE_INDEX_OFF: &str = "0000";
pub const FREQ_MOD_OFF: &str = "050000";
pub const WAVE_SWEEP_OFF: &str = "00.00";
pub const AMP_SWEEP2_OFF: &str = "05000.50";
pub const PLAYBACK_OFF: &str = "0";

pub const FIXED_FRAME_LEN: usize = 83;
/// Length of mode + carrier segment.
pub const CARRIER_FRAME_END: usize = 14;

/// Stops output: channel 0, 500 ms, every optional feature disabled.
///
/// Each filler is as wide as its enabled segment and the frame ends in
/// `wav0`; the firmware must parse this widened layout, not the older
/// shorter stop frame.
pub const EMPTY_WAVEFORM: &str =
    "0c05000.500.50p010.505050f0050050050000a00.000.00w0000ff050000ww00.00aa05000.50wav0";
/// Fixed 180 ms carrier used to check the actuator wiring.
pub static VERIFY_WAVEFORM: Lazy<String> =
    Lazy::new(|| format!("{MODE_RUN}c01800.50{}", &EMPTY_WAVEFORM[10..]));
/// Handshake frame; the controller echoes it and then confirms.
pub static CONNECT_WAVEFORM: Lazy<String> =
    Lazy::new(|| format!("{MODE_CONNECT}{}", &EMPTY_WAVEFORM[1..]));

/// Every optional segment in its disabled form, `p` through `wav0`.
pub fn disabled_segments() -> &'static str {
    &EMPTY_WAVEFORM[CARRIER_FRAME_END..]
}
/// A value that does not fit its slot.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldError(pub String);
impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
pub struct FrameBuilder {
    buf: String,
    sealed: bool,
}
impl FrameBuilder {
    pub fn new(mode: char) -> Self {
        let mut buf = String::with_capacity(FIXED_FRAME_LEN + 16);
        buf.push(mode);
        Self { buf, sealed: false }
    }
    /// Segment tags and disabled fillers.
    pub fn literal(&mut self, text: &str) -> &mut Self {
        self.buf.push_str(text);
        self
    }
    pub fn flag(&mut self, on: bool) -> &mut Self {
        self.buf.push(if on { '1' } else { '0' });
        self
    }
    /// Non-negative integer, zero-padded to exactly `width` digits.
    pub fn digits(&mut self, value: i64, width: usize) -> Result<&mut Self, FieldError> {
        if value < 0 {
            return Err(FieldError(format!("{value} is negative")));
        }
        let text = format!("{value:0width$}");
        if text.len() != width {
            return Err(FieldError(format!("{value} does not fit in {width} digit(s)")));
        }
        self.buf.push_str(&text);
        Ok(self)
    }
    /// `floor(value / scaler * 100)` written as `0.NN`.
    pub fn percent(&mut self, value: f64, scaler: f64) -> Result<&mut Self, FieldError> {
        let pct = (value / scaler * 100.0).floor();
        if !pct.is_finite() || !(0.0..100.0).contains(&pct) {
            return Err(FieldError(format!(
                "{value} is {pct}% of full scale, outside 0..99%"
            )));
        }
        self.buf.push_str(&format!("0.{:02}", pct as i64));
        Ok(self)
    }
    /// Value rounded to two decimals and written as `N.NN`. Halfway values
    /// round on their exact binary value, ties to even.
    pub fn duty(&mut self, value: f64) -> Result<&mut Self, FieldError> {
        let text = format!("{value:.2}");
        if !value.is_finite() || text.starts_with('-') || text.len() != 4 {
            return Err(FieldError(format!("{value} is outside 0.00..9.99")));
        }
        self.buf.push_str(&text);
        Ok(self)
    }
    /// Checks the fixed part of the frame is complete; only the variable
    /// tail may follow.
    pub fn seal(&mut self) -> Result<&mut Self, FieldError> {
        if self.buf.len() != FIXED_FRAME_LEN {
            return Err(FieldError(format!(
                "frame is {} characters, expected {FIXED_FRAME_LEN}",
                self.buf.len()
            )));
        }
        self.sealed = true;
        Ok(self)
    }
    pub fn finish(mut self) -> Result<String, FieldError> {
        if !self.sealed {
            self.seal()?;
        }
        Ok(self.buf)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn disabled_frame(mode: char) -> FrameBuilder {
        let mut frame = FrameBuilder::new(mode);
        frame
            .literal(CARRIER_TAG)
            .digits(0, 1)
            .unwrap()
            .digits(500, 3)
            .unwrap()
            .percent(75.0, 150.0)
            .unwrap()
            .percent(75.0, 150.0)
            .unwrap();
        frame
            .literal(PULSE_TAG)
            .literal(PULSE_OFF)
            .literal(FREQ_SWEEP_TAG)
            .literal(FREQ_SWEEP_OFF)
            .literal(AMP_SWEEP_TAG)
            .literal(AMP_SWEEP_OFF)
            .literal(WAVE_INDEX_TAG)
            .literal(WAVE_INDEX_OFF)
            .literal(FREQ_MOD_TAG)
            .literal(FREQ_MOD_OFF)
            .literal(WAVE_SWEEP_TAG)
            .literal(WAVE_SWEEP_OFF)
            .literal(AMP_SWEEP2_TAG)
            .literal(AMP_SWEEP2_OFF)
            .literal(PLAYBACK_TAG)
            .literal(PLAYBACK_OFF);
        frame
    }
    #[test]
    fn empty_waveform_is_the_builder_output() {
        let frame = disabled_frame(MODE_STOP).finish().unwrap();
        assert_eq!(frame, EMPTY_WAVEFORM);
        assert_eq!(EMPTY_WAVEFORM.len(), FIXED_FRAME_LEN);
    }
    #[test]
    fn derived_frames_keep_the_width() {
        assert_eq!(VERIFY_WAVEFORM.len(), FIXED_FRAME_LEN);
        assert!(VERIFY_WAVEFORM.starts_with("1c01800.500.50p"));
        assert_eq!(CONNECT_WAVEFORM.len(), FIXED_FRAME_LEN);
        assert!(CONNECT_WAVEFORM.starts_with("2c0500"));
        assert!(disabled_segments().starts_with("p010.505050f"));
        assert!(disabled_segments().ends_with("wav0"));
    }
    #[test]
    fn digits_pad_and_refuse_overflow() {
        let mut frame = FrameBuilder::new(MODE_RUN);
        frame.digits(7, 3).unwrap();
        assert!(frame.digits(1000, 3).is_err());
        assert!(frame.digits(-1, 2).is_err());
        assert_eq!(frame.buf, "1007");
    }
    #[test]
    fn percent_floors_and_refuses_full_scale() {
        let mut frame = FrameBuilder::new(MODE_RUN);
        frame.percent(100.0, 150.0).unwrap(); // 66.67 -> 66
        frame.percent(1.0, 150.0).unwrap(); // 0.67 -> 0
        assert!(frame.percent(150.0, 150.0).is_err());
        assert!(frame.percent(-1.0, 150.0).is_err());
        assert_eq!(frame.buf, "10.660.00");
    }
    #[test]
    fn duty_keeps_two_decimals() {
        let mut frame = FrameBuilder::new(MODE_RUN);
        frame.duty(0.5).unwrap();
        frame.duty(0.254).unwrap();
        frame.duty(1.0).unwrap();
        assert!(frame.duty(10.0).is_err());
        assert!(frame.duty(9.996).is_err());
        assert!(frame.duty(-0.001).is_err());
        assert_eq!(frame.buf, "10.500.251.00");
    }
    #[test]
    fn duty_ties_round_to_even() {
        let mut frame = FrameBuilder::new(MODE_RUN);
        frame.duty(0.125).unwrap();
        frame.duty(0.625).unwrap();
        frame.duty(9.994).unwrap();
        assert_eq!(frame.buf, "10.120.629.99");
    }
    #[test]
    fn seal_rejects_short_frames() {
        let mut frame = FrameBuilder::new(MODE_RUN);
        frame.literal("c0");
        assert!(frame.seal().is_err());
        assert!(frame.finish().is_err());
    }
}
