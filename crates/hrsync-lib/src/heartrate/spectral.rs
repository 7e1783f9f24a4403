use super::RateEstimator;
use crate::error::{Error, Result};
use crate::signal::Signal;
use realfft::RealFftPlanner;

/// Dominant frequency of the window within the heart-rate band.
///
/// The window is mean-removed and zero-padded to at least four times its
/// length before the transform; the peak bin is refined with a parabolic
/// fit over its neighbours.
#[derive(Debug, Clone, Copy)]
pub struct SpectralRateEstimator {
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for SpectralRateEstimator {
    fn default() -> Self {
        Self {
            min_bpm: 40.0,
            max_bpm: 220.0,
        }
    }
}

impl SpectralRateEstimator {
    pub fn new(min_bpm: f64, max_bpm: f64) -> Self {
        Self { min_bpm, max_bpm }
    }
}

impl RateEstimator for SpectralRateEstimator {
    fn estimate(&self, signal: &Signal) -> Result<f64> {
        let mean = signal
            .mean()
            .ok_or_else(|| Error::invalid("empty window"))?;
        let n = signal.len();
        let padded = (4 * n).next_power_of_two().max(16);
        let mut frame = vec![0.0; padded];
        for (slot, x) in frame.iter_mut().zip(signal.samples()) {
            *slot = x - mean;
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(padded);
        let mut spectrum = r2c.make_output_vec();
        r2c.process(&mut frame, &mut spectrum)
            .map_err(|e| Error::invalid(format!("fft failed: {}", e)))?;
        let power: Vec<f64> = spectrum.iter().map(|c| c.norm_sqr()).collect();

        let bin_hz = signal.fs() / padded as f64;
        let lo = ((self.min_bpm / 60.0) / bin_hz).ceil().max(1.0) as usize;
        let hi = (((self.max_bpm / 60.0) / bin_hz).floor() as usize).min(power.len() - 2);
        if lo > hi {
            return Err(Error::invalid("heart-rate band is outside the spectrum"));
        }
        let (k, peak) = power[lo..=hi]
            .iter()
            .enumerate()
            .fold((lo, 0.0_f64), |best, (i, &p)| {
                if p > best.1 {
                    (lo + i, p)
                } else {
                    best
                }
            });
        if peak <= f64::EPSILON {
            return Err(Error::invalid("no power in the heart-rate band"));
        }

        let (a, b, c) = (power[k - 1], power[k], power[k + 1]);
        let denom = a - 2.0 * b + c;
        let shift = if denom.abs() > f64::EPSILON {
            (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        Ok((k as f64 + shift) * bin_hz * 60.0)
    }
}
