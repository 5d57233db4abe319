use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::drivers::buffer::SampleBurst;
use crate::drivers::link::ConnectedLink;
use crate::drivers::pipeline::CalibrationProfile;
use crate::drivers::DriverError;

/// Something that can deliver a fixed-length burst of raw tri-axis samples.
pub trait SampleSource {
    fn acquire(&mut self, sample_count: usize, duration_s: f64) -> Result<SampleBurst, DriverError>;
}
/// Parses one device line of the form `<x>y<y>z<z>`.
pub fn parse_sample_line(line: &str) -> Result<[f64; 3], String> {
    let line = line.trim();
    let (x, rest) = line
        .split_once('y')
        .ok_or_else(|| format!("missing `y` separator in `{line}`"))?;
    let (y, z) = rest
        .split_once('z')
        .ok_or_else(|| format!("missing `z` separator in `{line}`"))?;
    let parse = |field: &str| {
        field
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("`{field}` is not a number in `{line}`"))
    };
    Ok([parse(x)?, parse(y)?, parse(z)?])
}
/// Reads a burst line by line from the controller, blocking for its whole
/// duration. Any read or parse failure aborts the burst.
pub struct LinkSource<'a> {
    link: &'a mut ConnectedLink,
}
impl<'a> LinkSource<'a> {
    pub fn new(link: &'a mut ConnectedLink) -> Self {
        Self { link }
    }
}
impl SampleSource for LinkSource<'_> {
    fn acquire(&mut self, sample_count: usize, duration_s: f64) -> Result<SampleBurst, DriverError> {
        let abort = |received: usize, reason: String| DriverError::Acquisition {
            received,
            expected: sample_count,
            reason,
        };
        // the first line is usually cut mid-sample; resynchronize on it
        self.link
            .read_line()
            .map_err(|err| abort(0, format!("device disconnected: {err}")))?;
        let mut burst = SampleBurst::with_capacity(sample_count, duration_s);
        for received in 0..sample_count {
            let line = self
                .link
                .read_line()
                .map_err(|err| abort(received, format!("device disconnected: {err}")))?;
            let sample = parse_sample_line(&line).map_err(|reason| abort(received, reason))?;
            burst.push(sample);
        }
        Ok(burst)
    }
}
/// Synthetic accelerometer at rest with z pointing up, in raw counts
/// matching the given calibration, plus uniform noise.
pub struct SimulatedSource {
    calibration: [CalibrationProfile; 3],
    noise_counts: f64,
    rng: StdRng,
}
impl SimulatedSource {
    pub fn new(calibration: [CalibrationProfile; 3], noise_counts: f64) -> Self {
        Self {
            calibration,
            noise_counts,
            rng: StdRng::from_entropy(),
        }
    }
    pub fn seeded(calibration: [CalibrationProfile; 3], noise_counts: f64, seed: u64) -> Self {
        Self {
            calibration,
            noise_counts,
            rng: StdRng::seed_from_u64(seed),
        }
    }
    fn reading(&mut self, axis: usize, g: f64) -> f64 {
        let calib = &self.calibration[axis];
        let noise = if self.noise_counts > 0.0 {
            self.rng.gen_range(-self.noise_counts..self.noise_counts)
        } else {
            0.0
        };
        g * calib.inverse_gain - calib.offset + noise
    }
}
impl SampleSource for SimulatedSource {
    fn acquire(&mut self, sample_count: usize, duration_s: f64) -> Result<SampleBurst, DriverError> {
        let mut burst = SampleBurst::with_capacity(sample_count, duration_s);
        for _ in 0..sample_count {
            let sample = [self.reading(0, 0.0), self.reading(1, 0.0), self.reading(2, 1.0)];
            burst.push(sample);
        }
        Ok(burst)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::link::testing::ScriptedPort;
    use crate::drivers::pipeline::SignalConditioner;
    use crate::types::ZeroMode;
    fn link(script: &str) -> ConnectedLink {
        let (port, _) = ScriptedPort::new(script);
        ConnectedLink::new("COM3", 921_600, Box::new(port.closing()))
    }
    #[test]
    fn parses_device_line_format() {
        assert_eq!(parse_sample_line("1.5y-2z31.25\r").unwrap(), [1.5, -2.0, 31.25]);
        assert!(parse_sample_line("1.5z2y3").is_err());
        assert!(parse_sample_line("1.5y2").is_err());
        assert!(parse_sample_line("ay2z3").is_err());
    }
    #[test]
    fn first_line_is_discarded() {
        let mut link = link("5z1\n1y2z3\n4y5z6\n");
        let burst = LinkSource::new(&mut link).acquire(2, 0.5).unwrap();
        assert_eq!(burst.x, vec![1.0, 4.0]);
        assert_eq!(burst.y, vec![2.0, 5.0]);
        assert_eq!(burst.z, vec![3.0, 6.0]);
        assert_eq!(burst.duration_s, 0.5);
    }
    #[test]
    fn disconnect_mid_burst_aborts() {
        let mut link = link("junk\n1y2z3\n");
        match LinkSource::new(&mut link).acquire(3, 1.0) {
            Err(DriverError::Acquisition {
                received, expected, ..
            }) => {
                assert_eq!(received, 1);
                assert_eq!(expected, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    #[test]
    fn garbled_line_aborts() {
        let mut link = link("junk\n1y2z3\nnoise\n");
        assert!(matches!(
            LinkSource::new(&mut link).acquire(2, 1.0),
            Err(DriverError::Acquisition { received: 1, .. })
        ));
    }
    #[test]
    fn simulated_rest_conditions_to_one_g() {
        let calib = [
            CalibrationProfile::new(-1.25, 31.5),
            CalibrationProfile::new(-0.5, 31.75),
            CalibrationProfile::new(0.125, 31.0),
        ];
        let burst = SimulatedSource::seeded(calib, 0.0, 7).acquire(8, 1.0).unwrap();
        assert_eq!(burst.len(), 8);
        let out = SignalConditioner::new(calib, ZeroMode::Off, None)
            .condition(burst)
            .unwrap();
        for s in out {
            assert!(s.x.abs() < 1e-9);
            assert!(s.y.abs() < 1e-9);
            assert!((s.z - 9.81).abs() < 1e-9);
        }
    }
    #[test]
    fn simulated_noise_stays_bounded() {
        let calib = [CalibrationProfile::new(0.0, 1.0); 3];
        let burst = SimulatedSource::seeded(calib, 0.5, 1).acquire(100, 1.0).unwrap();
        assert!(burst.x.iter().all(|v| v.abs() < 0.5));
        assert!(burst.z.iter().all(|v| (v - 1.0).abs() < 0.5));
    }
}
