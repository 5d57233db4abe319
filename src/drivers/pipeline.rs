use serde::{Deserialize, Serialize};

use crate::drivers::buffer::{ConditionedSample, SampleBurst};
use crate::drivers::DriverError;
use crate::types::ZeroMode;

pub const STANDARD_GRAVITY: f64 = 9.81;

/// Offset and inverse gain for one accelerometer axis.
///
/// The values come from reading the ADC at +1 g and -1 g: half the
/// difference is the offset, half the sum of magnitudes the inverse gain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub offset: f64,
    pub inverse_gain: f64,
}
impl CalibrationProfile {
    pub const fn new(offset: f64, inverse_gain: f64) -> Self {
        Self {
            offset,
            inverse_gain,
        }
    }
    /// m/s^2 per raw count.
    pub fn coefficient(&self) -> f64 {
        STANDARD_GRAVITY / self.inverse_gain
    }
}
/// Turns a raw burst into calibrated, noise-gated samples.
#[derive(Clone, Debug)]
pub struct SignalConditioner {
    calibration: [CalibrationProfile; 3],
    zero_mode: ZeroMode,
    noise_margin: Option<f64>,
}
impl SignalConditioner {
    pub fn new(
        calibration: [CalibrationProfile; 3],
        zero_mode: ZeroMode,
        noise_margin: Option<f64>,
    ) -> Self {
        Self {
            calibration,
            zero_mode,
            noise_margin,
        }
    }
    /// Raw-count shift per axis that brings the zero reference to 0.
    pub fn zero_offsets(&self, burst: &SampleBurst) -> [f64; 3] {
        let axes = [&burst.x, &burst.y, &burst.z];
        std::array::from_fn(|i| zero_offset(axes[i], &self.calibration[i], self.zero_mode))
    }
    pub fn condition(&self, burst: SampleBurst) -> Result<Vec<ConditionedSample>, DriverError> {
        burst.validate()?;
        let zero = self.zero_offsets(&burst);
        let t = burst.time_axis();
        let SampleBurst { x, y, z, .. } = burst;
        let mut axes = [x, y, z];
        for (i, axis) in axes.iter_mut().enumerate() {
            let calib = &self.calibration[i];
            let coefficient = calib.coefficient();
            for value in axis.iter_mut() {
                *value = (*value + calib.offset + zero[i]) * coefficient;
            }
            if let Some(margin) = self.noise_margin {
                apply_deadband(axis, margin);
            }
        }
        let [x, y, z] = axes;
        Ok(t.into_iter()
            .zip(x)
            .zip(y)
            .zip(z)
            .map(|(((t, x), y), z)| ConditionedSample { t, x, y, z })
            .collect())
    }
}
pub fn condition(
    burst: SampleBurst,
    calibration: [CalibrationProfile; 3],
    zero_mode: ZeroMode,
    noise_margin: Option<f64>,
) -> Result<Vec<ConditionedSample>, DriverError> {
    SignalConditioner::new(calibration, zero_mode, noise_margin).condition(burst)
}
fn zero_offset(samples: &[f64], calib: &CalibrationProfile, mode: ZeroMode) -> f64 {
    let reference = match mode {
        ZeroMode::Off => return 0.0,
        ZeroMode::Still => samples.first().copied(),
        ZeroMode::Shaking => {
            (!samples.is_empty()).then(|| samples.iter().sum::<f64>() / samples.len() as f64)
        }
    };
    reference.map_or(0.0, |r| -(r + calib.offset))
}
/// Holds the previous value whenever a sample moves by no more than
/// `margin`. Comparison is against the already-held value, so slow drift is
/// frozen while a single large jump passes straight through.
fn apply_deadband(values: &mut [f64], margin: f64) {
    for i in 1..values.len() {
        if (values[i] - values[i - 1]).abs() <= margin {
            values[i] = values[i - 1];
        }
    }
}
