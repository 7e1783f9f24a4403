//! LMS-family adaptive FIR filtering for motion-artifact cancellation.
//!
//! The filter predicts the part of a PPG that is linearly explained by an
//! accelerometer reference and emits the prediction error, so whatever the
//! reference cannot explain (the heartbeat) passes through.

use crate::config::MotionFilterConfig;
use crate::error::{Error, Result};
use crate::signal::Signal;
use log::debug;
use serde::Deserialize;
use std::str::FromStr;

/// Weight update rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum AdaptiveMethod {
    /// `w += μ·e·x`
    Lms,
    /// `w += μ·e·x / (‖x‖² + ε)`
    Nlms,
}

impl AdaptiveMethod {
    pub fn is_normalized(self) -> bool {
        matches!(self, AdaptiveMethod::Nlms)
    }
}

impl FromStr for AdaptiveMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lms" => Ok(AdaptiveMethod::Lms),
            "nlms" => Ok(AdaptiveMethod::Nlms),
            other => Err(Error::config(format!(
                "unknown adaptive filter method '{}' (expected lms or nlms)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for AdaptiveMethod {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Filtered PPG together with the taps the pass ended on.
#[derive(Debug, Clone)]
pub struct AdaptiveOutput {
    pub signal: Signal,
    pub taps: Vec<f64>,
}

/// Remove the component of `ppg` predictable from `reference`.
///
/// The reference is resampled to the PPG rate and cropped or zero-padded to
/// its length. The output has `len(ppg) - tap_count` samples; the first
/// `tap_count` samples prime the filter.
pub fn adaptive_filter(
    ppg: &Signal,
    reference: &Signal,
    step_size: f64,
    use_normalized: bool,
    tap_count: usize,
) -> Result<Signal> {
    let method = if use_normalized {
        AdaptiveMethod::Nlms
    } else {
        AdaptiveMethod::Lms
    };
    adaptive_filter_with_taps(ppg, reference, method, step_size, tap_count, 0.001)
        .map(|out| out.signal)
}

/// As [`adaptive_filter`], also returning the final tap vector.
pub fn adaptive_filter_with_taps(
    ppg: &Signal,
    reference: &Signal,
    method: AdaptiveMethod,
    step_size: f64,
    tap_count: usize,
    epsilon: f64,
) -> Result<AdaptiveOutput> {
    if tap_count == 0 {
        return Err(Error::config("tap count must be at least 1"));
    }
    if !step_size.is_finite() || step_size <= 0.0 {
        return Err(Error::config(format!(
            "step size must be positive, got {}",
            step_size
        )));
    }
    let n = ppg.len();
    if n <= tap_count {
        return Err(Error::invalid(format!(
            "PPG has {} samples, need more than {} taps",
            n, tap_count
        )));
    }
    let reference = reference.resample(ppg.fs())?.fit_to(n);
    let x_all = reference.samples();
    let d = ppg.samples();

    let mut w = vec![0.0; tap_count];
    let mut x = vec![0.0; tap_count];
    let mut out = Vec::with_capacity(n - tap_count);
    for i in 0..n - tap_count {
        // Most recent sample first.
        for (slot, &v) in x.iter_mut().zip(x_all[i + 1..=i + tap_count].iter().rev()) {
            *slot = v;
        }
        let y: f64 = w.iter().zip(&x).map(|(wi, xi)| wi * xi).sum();
        let e = d[i + tap_count] - y;
        let gain = match method {
            AdaptiveMethod::Lms => step_size * e,
            AdaptiveMethod::Nlms => {
                let power: f64 = x.iter().map(|v| v * v).sum();
                step_size * e / (power + epsilon)
            }
        };
        for (wi, xi) in w.iter_mut().zip(&x) {
            *wi += gain * xi;
        }
        out.push(e);
    }
    debug!(
        "{:?} pass over {} samples with {} taps",
        method,
        out.len(),
        tap_count
    );
    Ok(AdaptiveOutput {
        signal: Signal::new(out, ppg.fs())?,
        taps: w,
    })
}

/// Run one adaptive pass per reference, each on the previous pass's output.
///
/// Every pass drops `taps` leading samples, so later references skip the
/// same span (converted to their own rate) to stay aligned with the
/// shrinking output.
pub fn cancel_motion(
    ppg: &Signal,
    references: &[Signal],
    cfg: &MotionFilterConfig,
) -> Result<Signal> {
    cfg.validate()?;
    let mut current = ppg.clone();
    let mut consumed_s = 0.0;
    for reference in references {
        let aligned = reference.skip(reference.samples_for(consumed_s));
        current = adaptive_filter_with_taps(
            &current,
            &aligned,
            cfg.method,
            cfg.step_size,
            cfg.taps,
            cfg.epsilon,
        )?
        .signal;
        consumed_s += cfg.taps as f64 / ppg.fs();
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::f64::consts::PI;

    fn white(n: usize, amplitude: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(-amplitude..amplitude)).collect()
    }

    fn pearson(a: &[f64], b: &[f64]) -> f64 {
        let n = a.len().min(b.len()) as f64;
        let ma = a.iter().sum::<f64>() / n;
        let mb = b.iter().sum::<f64>() / n;
        let mut cov = 0.0;
        let mut va = 0.0;
        let mut vb = 0.0;
        for (x, y) in a.iter().zip(b) {
            cov += (x - ma) * (y - mb);
            va += (x - ma).powi(2);
            vb += (y - mb).powi(2);
        }
        cov / (va.sqrt() * vb.sqrt())
    }

    fn heartbeat(n: usize, fs: f64) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * 1.2 * i as f64 / fs).sin())
            .collect()
    }

    fn correlation_drop(n: usize, seed: u64) -> (f64, f64) {
        let fs = 100.0;
        let m = 20;
        let accel = white(n, 1.0, seed);
        let ppg: Vec<f64> = heartbeat(n, fs)
            .iter()
            .zip(&accel)
            .map(|(h, a)| h + 0.5 * a)
            .collect();
        let before = pearson(&ppg[m..], &accel[m..]).abs();
        let out = adaptive_filter(
            &Signal::new(ppg, fs).unwrap(),
            &Signal::new(accel.clone(), fs).unwrap(),
            1.0,
            true,
            m,
        )
        .unwrap();
        assert_eq!(out.len(), n - m);
        (before, pearson(out.samples(), &accel[m..]).abs())
    }

    #[test]
    fn nlms_removes_motion_correlation_within_ten_seconds() {
        let (before, after) = correlation_drop(1000, 42);
        assert!(
            after <= 0.2 * before,
            "correlation only fell from {:.3} to {:.3}",
            before,
            after
        );
    }

    #[test]
    fn nlms_removes_motion_correlation() {
        let (before, after) = correlation_drop(3000, 42);
        assert!(after <= 0.2 * before, "{:.3} -> {:.3}", before, after);
    }

    #[test]
    fn error_energy_falls_as_taps_converge() {
        let fs = 100.0;
        let n = 1000;
        let accel = white(n, 1.0, 9);
        let ppg: Vec<f64> = heartbeat(n, fs)
            .iter()
            .zip(&accel)
            .map(|(h, a)| 0.2 * h + 2.0 * a)
            .collect();
        let out = adaptive_filter(
            &Signal::new(ppg, fs).unwrap(),
            &Signal::new(accel, fs).unwrap(),
            0.5,
            true,
            20,
        )
        .unwrap();
        let energy = |s: &[f64]| s.iter().map(|e| e * e).sum::<f64>() / s.len() as f64;
        let early = energy(&out.samples()[..50]);
        let late = energy(&out.samples()[300..400]);
        assert!(late < 0.25 * early, "early {:.4}, late {:.4}", early, late);
    }

    #[test]
    fn lms_diverges_where_nlms_stays_bounded() {
        let fs = 100.0;
        let n = 600;
        let accel = white(n, 17.0, 5);
        let ppg: Vec<f64> = heartbeat(n, fs)
            .iter()
            .zip(&accel)
            .map(|(h, a)| h + 0.5 * a)
            .collect();
        let ppg = Signal::new(ppg, fs).unwrap();
        let accel = Signal::new(accel, fs).unwrap();
        let peak = |s: &Signal| s.samples().iter().fold(0.0_f64, |m, v| m.max(v.abs()));

        let nlms = adaptive_filter(&ppg, &accel, 1.0, true, 20).unwrap();
        assert!(peak(&nlms) < 30.0);
        let lms = adaptive_filter(&ppg, &accel, 1.0, false, 20).unwrap();
        let lms_peak = peak(&lms);
        assert!(!lms_peak.is_finite() || lms_peak > 1e6);
    }

    #[test]
    fn reference_is_resampled_and_padded() {
        let ppg = Signal::new(heartbeat(500, 50.0), 50.0).unwrap();
        let short_reference = Signal::new(white(400, 1.0, 1), 100.0).unwrap();
        let out = adaptive_filter(&ppg, &short_reference, 0.5, true, 10).unwrap();
        assert_eq!(out.len(), 490);
    }

    #[test]
    fn taps_start_fresh_on_every_call() {
        let fs = 100.0;
        let accel = Signal::new(white(800, 1.0, 3), fs).unwrap();
        let ppg = Signal::new(
            accel.samples().iter().map(|a| 0.7 * a).collect(),
            fs,
        )
        .unwrap();
        let first =
            adaptive_filter_with_taps(&ppg, &accel, AdaptiveMethod::Nlms, 0.5, 8, 0.001).unwrap();
        let second =
            adaptive_filter_with_taps(&ppg, &accel, AdaptiveMethod::Nlms, 0.5, 8, 0.001).unwrap();
        assert_eq!(first.taps, second.taps);
        assert_eq!(first.taps.len(), 8);
    }

    #[test]
    fn rejects_bad_parameters() {
        let ppg = Signal::new(vec![0.0; 100], 10.0).unwrap();
        let reference = ppg.clone();
        assert!(matches!(
            adaptive_filter(&ppg, &reference, 1.0, true, 0),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            adaptive_filter(&ppg, &reference, 0.0, true, 4),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            adaptive_filter(&ppg, &reference, 1.0, true, 100),
            Err(Error::InvalidSignal(_))
        ));
        assert!("rls".parse::<AdaptiveMethod>().is_err());
        assert_eq!("NLMS".parse::<AdaptiveMethod>().unwrap(), AdaptiveMethod::Nlms);
    }

    #[test]
    fn chained_axes_shrink_by_taps_each() {
        let fs = 50.0;
        let n = 6000;
        let axes: Vec<Signal> = (0..3)
            .map(|k| Signal::new(white(n, 1.0, 100 + k), fs).unwrap())
            .collect();
        let ppg: Vec<f64> = heartbeat(n, fs)
            .iter()
            .enumerate()
            .map(|(i, h)| h + 0.4 * axes[0].samples()[i] + 0.3 * axes[2].samples()[i])
            .collect();
        let ppg = Signal::new(ppg, fs).unwrap();
        let cfg = MotionFilterConfig {
            taps: 10,
            step_size: 0.1,
            ..MotionFilterConfig::default()
        };
        let out = cancel_motion(&ppg, &axes, &cfg).unwrap();
        assert_eq!(out.len(), n - 30);
        let residual = pearson(out.samples(), &axes[2].samples()[30..]).abs();
        assert!(residual < 0.08, "residual correlation {:.3}", residual);
    }
}
