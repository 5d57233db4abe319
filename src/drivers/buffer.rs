use crate::drivers::DriverError;
/// Number of samples in a burst: `int(rate * duration)`.
pub fn sample_count(sample_rate_hz: f64, duration_s: f64) -> usize {
    (sample_rate_hz * duration_s).max(0.0) as usize
}
/// Raw tri-axis readings for one acquisition, in arrival order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBurst {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub duration_s: f64,
}
impl SampleBurst {
    pub fn with_capacity(capacity: usize, duration_s: f64) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            duration_s,
        }
    }
    pub fn from_axes(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>, duration_s: f64) -> Self {
        Self { x, y, z, duration_s }
    }
    pub fn push(&mut self, [x, y, z]: [f64; 3]) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }
    pub fn len(&self) -> usize {
        self.x.len()
    }
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
    pub fn validate(&self) -> Result<(), DriverError> {
        let n = self.x.len();
        if self.y.len() != n || self.z.len() != n {
            return Err(DriverError::Acquisition {
                received: n.min(self.y.len()).min(self.z.len()),
                expected: n.max(self.y.len()).max(self.z.len()),
                reason: "axis sequences differ in length".into(),
            });
        }
        Ok(())
    }
    pub fn time_axis(&self) -> Vec<f64> {
        time_axis(self.len(), self.duration_s)
    }
}
/// `t[i] = round(i / n * duration, 4)`, with the last entry pinned to
/// exactly `duration` so rounding drift never shortens the series.
pub fn time_axis(n: usize, duration_s: f64) -> Vec<f64> {
    let mut t: Vec<f64> = (0..n)
        .map(|i| round_to(i as f64 / n as f64 * duration_s, 4))
        .collect();
    if let Some(last) = t.last_mut() {
        *last = duration_s;
    }
    t
}
/// Rounds the exact binary value, so halfway cases go to even.
fn round_to(value: f64, decimals: usize) -> f64 {
    format!("{value:.decimals$}").parse().unwrap_or(value)
}
/// One calibrated sample in m/s^2.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConditionedSample {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
/// Per-axis averages of a conditioned burst, reported for calibration work.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BurstSummary {
    pub mean: [f64; 3],
    pub magnitude: f64,
}
impl BurstSummary {
    pub fn from_samples(samples: &[ConditionedSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let sum = samples.iter().fold([0.0; 3], |acc, s| {
            [acc[0] + s.x, acc[1] + s.y, acc[2] + s.z]
        });
        let mean = sum.map(|v| v / n);
        let magnitude = mean.iter().map(|v| v * v).sum::<f64>().sqrt();
        Some(Self { mean, magnitude })
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn time_axis_rounds_and_pins_the_tail() {
        let t = time_axis(3, 1.0);
        assert_eq!(t, vec![0.0, 0.3333, 1.0]);
        let t = time_axis(6400, 2.0);
        assert_eq!(t.len(), 6400);
        assert_eq!(t[1], 0.0003);
        assert_eq!(t[6399], 2.0);
    }
    #[test]
    fn time_axis_ties_round_to_even() {
        let t = time_axis(6400, 2.0);
        assert_eq!(t[12], 0.0037);
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
    }
    #[test]
    fn empty_time_axis() {
        assert!(time_axis(0, 2.0).is_empty());
    }
    #[test]
    fn burst_length_follows_rate_times_duration() {
        assert_eq!(sample_count(3200.0, 2.0), 6400);
        assert_eq!(sample_count(10.0, 0.25), 2);
    }
    #[test]
    fn ragged_burst_is_rejected() {
        let burst = SampleBurst::from_axes(vec![1.0, 2.0], vec![1.0], vec![1.0, 2.0], 1.0);
        assert!(matches!(
            burst.validate(),
            Err(DriverError::Acquisition { received: 1, expected: 2, .. })
        ));
    }
    #[test]
    fn summary_reports_mean_and_magnitude() {
        let samples = [
            ConditionedSample { t: 0.0, x: 3.0, y: 0.0, z: 4.0 },
            ConditionedSample { t: 0.5, x: 3.0, y: 0.0, z: 4.0 },
        ];
        let summary = BurstSummary::from_samples(&samples).unwrap();
        assert_eq!(summary.mean, [3.0, 0.0, 4.0]);
        assert_eq!(summary.magnitude, 5.0);
        assert!(BurstSummary::from_samples(&[]).is_none());
    }
}
