//! Accuracy of heart-rate streams against an ECG-derived reference.

use crate::config::{MotionFilterConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::filters::adaptive::cancel_motion;
use crate::filters::bandpass::BandFilter;
use crate::heartrate::RateEstimator;
use crate::signal::Signal;
use crate::sync::AlignedSession;
use log::debug;
use serde::Serialize;

/// Distribution of `estimate - reference` over compared samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub n: usize,
    pub mean: f64,
    pub mean_abs: f64,
    pub rmse: f64,
    pub abs_p50: f64,
    pub abs_p90: f64,
}

impl ErrorSummary {
    /// `None` for an empty error set.
    pub fn from_errors(errors: &[f64]) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        let n = errors.len() as f64;
        let mut abs: Vec<f64> = errors.iter().map(|e| e.abs()).collect();
        abs.sort_by(|a, b| a.total_cmp(b));
        Some(Self {
            n: errors.len(),
            mean: errors.iter().sum::<f64>() / n,
            mean_abs: abs.iter().sum::<f64>() / n,
            rmse: (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt(),
            abs_p50: percentile(&abs, 0.5),
            abs_p90: percentile(&abs, 0.9),
        })
    }
}

// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Compare two traces sample by sample after dropping `skip_s` seconds.
///
/// Seconds where `estimate` is zero carry no reading and are left out.
pub fn compare_traces(estimate: &Signal, reference: &Signal, skip_s: f64) -> Result<ErrorSummary> {
    if (estimate.fs() - reference.fs()).abs() > 1e-9 {
        return Err(Error::invalid(format!(
            "traces must share a rate: {} Hz vs {} Hz",
            estimate.fs(),
            reference.fs()
        )));
    }
    let len = estimate.len().min(reference.len());
    let skip = estimate.samples_for(skip_s);
    let errors: Vec<f64> = estimate.samples()[..len]
        .iter()
        .zip(&reference.samples()[..len])
        .skip(skip)
        .filter(|(e, _)| **e != 0.0)
        .map(|(e, r)| e - r)
        .collect();
    ErrorSummary::from_errors(&errors).ok_or_else(|| {
        Error::invalid(format!(
            "nothing to compare after skipping {} of {} samples",
            skip, len
        ))
    })
}

/// Paired fixed-length windows of the synced watch and ECG streams.
#[derive(Debug, Clone)]
pub struct SegmentWindow {
    pub index: usize,
    pub ppg: Signal,
    pub ecg: Signal,
    pub accel: [Signal; 3],
}

/// Cut the session into `seconds`-long windows while every stream still
/// fills one.
pub fn split_session(session: &AlignedSession, seconds: f64) -> Result<Vec<SegmentWindow>> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(Error::config(format!(
            "segment length must be positive, got {}",
            seconds
        )));
    }
    let [x, y, z] = &session.accel;
    let windows = session
        .ppg
        .segments(seconds)
        .into_iter()
        .zip(session.ecg.segments(seconds))
        .zip(x.segments(seconds))
        .zip(y.segments(seconds))
        .zip(z.segments(seconds))
        .enumerate()
        .map(|(index, ((((ppg, ecg), ax), ay), az))| SegmentWindow {
            index,
            ppg,
            ecg,
            accel: [ax, ay, az],
        })
        .collect();
    Ok(windows)
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentResult {
    pub index: usize,
    pub ecg_bpm: f64,
    /// Band-limited PPG without motion cancellation.
    pub raw_bpm: Option<f64>,
    pub filtered_bpm: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub segments: Vec<SegmentResult>,
    pub raw: Option<ErrorSummary>,
    pub filtered: Option<ErrorSummary>,
}

fn band_limit(band: &dyn BandFilter, signal: &Signal, cfg: &MotionFilterConfig) -> Result<Signal> {
    band.apply(signal, cfg.band_low_hz, cfg.band_high_hz, cfg.band_order)
}

/// Score the PPG rate of every window against its ECG rate, with and
/// without motion cancellation. Windows whose ECG yields no rate are
/// skipped.
pub fn evaluate_segments(
    segments: &[SegmentWindow],
    cfg: &SessionConfig,
    band: &dyn BandFilter,
    ppg_estimator: &dyn RateEstimator,
    ecg_estimator: &dyn RateEstimator,
) -> Result<SegmentReport> {
    cfg.validate()?;
    let motion = &cfg.motion;
    let mut results = Vec::with_capacity(segments.len());
    for window in segments {
        let ecg_bpm = match ecg_estimator.estimate(&window.ecg) {
            Ok(bpm) => bpm,
            Err(e) => {
                debug!("segment {}: no ECG rate ({})", window.index, e);
                continue;
            }
        };
        let ppg = band_limit(band, &window.ppg, motion)?;
        let raw_bpm = ppg_estimator.estimate(&ppg).ok();

        let references = motion
            .axes
            .iter()
            .map(|axis| band_limit(band, &window.accel[axis.index()], motion))
            .collect::<Result<Vec<_>>>()?;
        let filtered_bpm = match cancel_motion(&ppg, &references, motion) {
            Ok(clean) => ppg_estimator.estimate(&clean).ok(),
            Err(Error::InvalidSignal(e)) => {
                debug!("segment {}: motion filter skipped ({})", window.index, e);
                None
            }
            Err(e) => return Err(e),
        };
        debug!(
            "segment {}: ecg {:.1}, raw {:?}, filtered {:?}",
            window.index, ecg_bpm, raw_bpm, filtered_bpm
        );
        results.push(SegmentResult {
            index: window.index,
            ecg_bpm,
            raw_bpm,
            filtered_bpm,
        });
    }

    let errors = |pick: fn(&SegmentResult) -> Option<f64>| -> Vec<f64> {
        results
            .iter()
            .filter_map(|r| pick(r).map(|bpm| bpm - r.ecg_bpm))
            .collect()
    };
    let raw = ErrorSummary::from_errors(&errors(|r| r.raw_bpm));
    let filtered = ErrorSummary::from_errors(&errors(|r| r.filtered_bpm));
    Ok(SegmentReport {
        segments: results,
        raw,
        filtered,
    })
}
