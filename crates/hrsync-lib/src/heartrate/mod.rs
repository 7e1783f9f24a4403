//! Heart-rate estimation from PPG or ECG windows.

pub mod peak;
pub mod spectral;

pub use peak::PeakRateEstimator;
pub use spectral::SpectralRateEstimator;

use crate::error::{Error, Result};
use crate::signal::Signal;
use log::debug;

/// Converts a waveform window into a single heart rate in beats per minute.
pub trait RateEstimator {
    fn estimate(&self, signal: &Signal) -> Result<f64>;
}

/// One heart rate per second, each from the trailing `window_s` seconds.
///
/// The first `window_s` entries have no full window behind them and repeat
/// the first successful estimate. A window the estimator rejects carries
/// the previous value forward.
pub fn heart_rate_trace<E: RateEstimator + ?Sized>(
    signal: &Signal,
    estimator: &E,
    window_s: f64,
) -> Result<Signal> {
    if !window_s.is_finite() || window_s <= 0.0 {
        return Err(Error::config(format!(
            "trace window must be positive, got {}",
            window_s
        )));
    }
    let seconds = signal.duration().floor() as usize;
    let lead = window_s.ceil() as usize;
    if seconds <= lead {
        return Err(Error::invalid(format!(
            "{:.1} s signal is too short for a {} s trace window",
            signal.duration(),
            window_s
        )));
    }

    let fs = signal.fs();
    let mut trace = vec![f64::NAN; seconds];
    let mut last: Option<f64> = None;
    let mut failures = 0usize;
    for (i, slot) in trace.iter_mut().enumerate().skip(lead) {
        let end = (fs * i as f64) as usize;
        let start = (fs * (i as f64 - window_s)) as usize;
        match estimator.estimate(&signal.slice(start, end)) {
            Ok(bpm) => {
                *slot = bpm;
                last = Some(bpm);
            }
            Err(_) => {
                failures += 1;
                if let Some(prev) = last {
                    *slot = prev;
                }
            }
        }
    }
    let first = trace
        .iter()
        .copied()
        .find(|v| !v.is_nan())
        .ok_or_else(|| Error::invalid("no window produced a heart rate"))?;
    for v in trace.iter_mut().filter(|v| v.is_nan()) {
        *v = first;
    }
    debug!(
        "heart-rate trace: {} s, {} s window, {} rejected windows",
        seconds, window_s, failures
    );
    Signal::new(trace, 1.0)
}
