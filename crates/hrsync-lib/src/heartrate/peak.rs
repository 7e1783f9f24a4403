use super::RateEstimator;
use crate::error::{Error, Result};
use crate::signal::Signal;

/// Beat counting on local maxima.
///
/// A sample is a beat candidate when it is a local maximum above the window
/// mean. Candidates closer than the refractory period implied by `max_bpm`
/// collapse to the taller one.
#[derive(Debug, Clone, Copy)]
pub struct PeakRateEstimator {
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for PeakRateEstimator {
    fn default() -> Self {
        Self {
            min_bpm: 40.0,
            max_bpm: 220.0,
        }
    }
}

impl PeakRateEstimator {
    pub fn new(min_bpm: f64, max_bpm: f64) -> Self {
        Self { min_bpm, max_bpm }
    }

    /// Beat indices within `signal`.
    pub fn peaks(&self, signal: &Signal) -> Vec<usize> {
        let data = signal.samples();
        let Some(mean) = signal.mean() else {
            return Vec::new();
        };
        if data.len() < 3 {
            return Vec::new();
        }
        let refractory = ((60.0 / self.max_bpm) * signal.fs()).max(1.0) as usize;

        let mut peaks: Vec<usize> = Vec::new();
        for i in 1..data.len() - 1 {
            let y = data[i];
            if y <= mean || y <= data[i - 1] || y < data[i + 1] {
                continue;
            }
            match peaks.last_mut() {
                Some(last) if i - *last < refractory => {
                    if y > data[*last] {
                        *last = i;
                    }
                }
                _ => peaks.push(i),
            }
        }
        peaks
    }
}

impl RateEstimator for PeakRateEstimator {
    fn estimate(&self, signal: &Signal) -> Result<f64> {
        let peaks = self.peaks(signal);
        let (Some(&first), Some(&last)) = (peaks.first(), peaks.last()) else {
            return Err(Error::invalid("no beats found"));
        };
        if peaks.len() < 2 {
            return Err(Error::invalid("a single beat gives no interval"));
        }
        let mean_interval = (last - first) as f64 / (peaks.len() - 1) as f64 / signal.fs();
        let bpm = 60.0 / mean_interval;
        if bpm < self.min_bpm || bpm > self.max_bpm {
            return Err(Error::invalid(format!(
                "{:.1} bpm outside {}..{}",
                bpm, self.min_bpm, self.max_bpm
            )));
        }
        Ok(bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartrate::tests::pulse_wave;

    #[test]
    fn counts_regular_beats() {
        let s = pulse_wave(75.0, 100.0, 8.0);
        let est = PeakRateEstimator::default();
        assert_eq!(est.peaks(&s).len(), 10);
        let bpm = est.estimate(&s).unwrap();
        assert!((bpm - 75.0).abs() < 1.0, "got {:.2}", bpm);
    }

    #[test]
    fn ripple_inside_refractory_collapses_to_one_beat() {
        let fs = 50.0;
        let mut data = vec![0.0; 200];
        for beat in [20, 70, 120, 170] {
            data[beat] = 1.0;
            data[beat + 3] = 0.6;
        }
        let s = Signal::new(data, fs).unwrap();
        let est = PeakRateEstimator::default();
        assert_eq!(est.peaks(&s), vec![20, 70, 120, 170]);
        assert!((est.estimate(&s).unwrap() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_flat_and_out_of_band() {
        let est = PeakRateEstimator::default();
        let flat = Signal::new(vec![1.0; 500], 50.0).unwrap();
        assert!(est.estimate(&flat).is_err());
        let slow = pulse_wave(20.0, 50.0, 20.0);
        assert!(matches!(est.estimate(&slow), Err(Error::InvalidSignal(_))));
    }
}
