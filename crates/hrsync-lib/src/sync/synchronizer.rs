use super::correlate::{correlate, fast_correlate, CorrelationPeak};
use crate::config::{CorrelationStrategy, SyncConfig};
use crate::error::{Error, Result};
use crate::signal::Signal;
use log::{debug, info, warn};
use serde::Serialize;

/// Time offset between the reference device (the watch) and a comparison
/// device.
///
/// A positive `delta_seconds` means the reference device started recording
/// earlier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlignmentOffset {
    pub delta_seconds: f64,
    pub reference_earlier: bool,
    /// Winning lag at `working_fs`.
    pub lag_samples: usize,
    pub working_fs: f64,
    /// Peak-to-competitor ratio of the winning surface, `None` when unbounded.
    pub confidence: Option<f64>,
}

impl AlignmentOffset {
    /// Offset of zero, for recordings already known to be aligned.
    pub fn zero(working_fs: f64) -> Self {
        Self {
            delta_seconds: 0.0,
            reference_earlier: true,
            lag_samples: 0,
            working_fs,
            confidence: None,
        }
    }
}

/// Which side of the device pair a companion signal was recorded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Reference,
    Comparison,
}

/// Align two recordings of the same "up" acceleration using default
/// tunables apart from the search window.
pub fn synchronize(
    reference_accel: &Signal,
    other_accel: &Signal,
    time_limit_s: f64,
) -> Result<AlignmentOffset> {
    let cfg = SyncConfig {
        time_limit_s,
        ..SyncConfig::default()
    };
    synchronize_with_config(reference_accel, other_accel, &cfg)
}

/// Try both start-order hypotheses and keep the one whose `|c|` peak is
/// larger.
pub fn synchronize_with_config(
    reference_accel: &Signal,
    other_accel: &Signal,
    cfg: &SyncConfig,
) -> Result<AlignmentOffset> {
    cfg.validate()?;
    if reference_accel.is_empty() || other_accel.is_empty() {
        return Err(Error::invalid("accelerometer signal is empty"));
    }
    let working_fs = reference_accel.fs().max(other_accel.fs());
    let reference = reference_accel.resample(working_fs)?.normalize()?;
    let other = other_accel.resample(working_fs)?.normalize()?;
    let n = reference.samples_for(cfg.time_limit_s);
    debug!(
        "correlating at {:.3} Hz: {} sample template, {} sample search window",
        working_fs,
        n,
        2 * n
    );

    let reference_first = search(&reference.crop(2 * n), &other.crop(n), working_fs, cfg)?;
    let other_first = search(&other.crop(2 * n), &reference.crop(n), working_fs, cfg)?;
    debug!(
        "reference-first peak |c|={:.4} at {}, comparison-first peak |c|={:.4} at {}",
        reference_first.magnitude(),
        reference_first.lag,
        other_first.magnitude(),
        other_first.lag
    );

    let (peak, reference_earlier) = if reference_first.magnitude() > other_first.magnitude() {
        (reference_first, true)
    } else {
        (other_first, false)
    };
    if let Some(ratio) = peak.confidence {
        if ratio <= cfg.min_peak_ratio {
            return Err(Error::sync_impossible(format!(
                "correlation peak is not dominant (ratio {:.3} <= {:.3})",
                ratio, cfg.min_peak_ratio
            )));
        }
        if ratio < 1.5 {
            warn!("weak synchronization peak, confidence ratio {:.3}", ratio);
        }
    }

    let magnitude = peak.lag as f64 / working_fs;
    let delta_seconds = if reference_earlier { magnitude } else { -magnitude };
    info!(
        "{} device started earlier, offset {:.3} s",
        if reference_earlier { "reference" } else { "comparison" },
        delta_seconds
    );
    Ok(AlignmentOffset {
        delta_seconds,
        reference_earlier,
        lag_samples: peak.lag,
        working_fs,
        confidence: peak.confidence,
    })
}

fn search(long: &Signal, short: &Signal, fs: f64, cfg: &SyncConfig) -> Result<CorrelationPeak> {
    if long.len() <= short.len() {
        return Err(Error::invalid(format!(
            "search window ({} samples) must be longer than the template ({} samples)",
            long.len(),
            short.len()
        )));
    }
    match cfg.strategy {
        CorrelationStrategy::Exact => correlate(
            long.samples(),
            short.samples(),
            short.samples_for(cfg.search_bound_s),
        ),
        CorrelationStrategy::Fast => fast_correlate(
            long.samples(),
            short.samples(),
            fs,
            cfg.init_gap_s,
            cfg.search_bound_s,
        ),
    }
}

/// Drop the leading `|delta|` seconds from `signal` when it belongs to the
/// device that started earlier; otherwise return it unchanged.
pub fn apply_sync(signal: &Signal, offset: &AlignmentOffset, is_reference_device: bool) -> Signal {
    if offset.reference_earlier == is_reference_device {
        signal.skip(signal.samples_for(offset.delta_seconds.abs()))
    } else {
        signal.clone()
    }
}

/// A discovered offset plus the crop applied to every companion signal.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    offset: AlignmentOffset,
    start_crop_s: f64,
    end_crop_s: f64,
}

impl Synchronizer {
    pub fn new(reference_accel: &Signal, other_accel: &Signal, cfg: &SyncConfig) -> Result<Self> {
        let offset = synchronize_with_config(reference_accel, other_accel, cfg)?;
        Ok(Self::from_offset(offset, cfg))
    }

    pub fn from_offset(offset: AlignmentOffset, cfg: &SyncConfig) -> Self {
        Self {
            offset,
            start_crop_s: cfg.start_crop_s,
            end_crop_s: cfg.end_crop_s,
        }
    }

    pub fn offset(&self) -> &AlignmentOffset {
        &self.offset
    }

    /// Offset correction alone, for callers that crop further before
    /// trimming the edges.
    pub fn align(&self, signal: &Signal, role: DeviceRole) -> Signal {
        apply_sync(signal, &self.offset, role == DeviceRole::Reference)
    }

    /// Remove the configured head and tail.
    pub fn trim(&self, signal: &Signal) -> Signal {
        signal.trim_seconds(self.start_crop_s, self.end_crop_s)
    }

    /// Offset-corrected companion signal with the recording edges removed.
    pub fn synced(&self, signal: &Signal, role: DeviceRole) -> Signal {
        self.trim(&self.align(signal, role))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Three jumps starting at `event_s`, in low-amplitude noise.
    pub(crate) fn jumps(fs: f64, seconds: f64, event_s: f64, sign: f64, seed: u64) -> Signal {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = (fs * seconds) as usize;
        let data = (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                let mut v = rng.gen_range(-0.01..0.01);
                for j in 0..3 {
                    let centre = event_s + 0.8 * j as f64;
                    v += sign * (-0.5 * ((t - centre) / 0.15).powi(2)).exp();
                }
                v
            })
            .collect();
        Signal::new(data, fs).unwrap()
    }

    fn cfg(strategy: CorrelationStrategy) -> SyncConfig {
        SyncConfig {
            time_limit_s: 30.0,
            strategy,
            ..SyncConfig::default()
        }
    }

    #[test]
    fn recovers_reference_first_offset() {
        let watch = jumps(100.0, 80.0, 32.37, 1.0, 1);
        let ecg = jumps(100.0, 80.0, 25.0, 1.0, 2);
        let offset =
            synchronize_with_config(&watch, &ecg, &cfg(CorrelationStrategy::Exact)).unwrap();
        assert!(offset.reference_earlier);
        assert_eq!(offset.lag_samples, 737);
        assert!((offset.delta_seconds - 7.37).abs() <= 0.01 + 1e-9);
    }

    #[test]
    fn recovers_comparison_first_offset_despite_inversion() {
        let watch = jumps(100.0, 80.0, 25.0, 1.0, 3);
        let ecg = jumps(100.0, 80.0, 32.37, -1.0, 4);
        let offset =
            synchronize_with_config(&watch, &ecg, &cfg(CorrelationStrategy::Exact)).unwrap();
        assert!(!offset.reference_earlier);
        assert!((offset.delta_seconds + 7.37).abs() <= 0.01 + 1e-9);
    }

    #[test]
    fn mixed_rates_use_the_faster_device() {
        let watch = jumps(50.0, 80.0, 29.0, -1.0, 5);
        let ecg = jumps(200.0, 80.0, 25.0, 1.0, 6);
        let offset =
            synchronize_with_config(&watch, &ecg, &cfg(CorrelationStrategy::Exact)).unwrap();
        assert_eq!(offset.working_fs, 200.0);
        assert!(offset.reference_earlier);
        assert!((offset.delta_seconds - 4.0).abs() <= 1.0 / 200.0 + 1e-9);
    }

    #[test]
    fn fast_and_exact_strategies_agree() {
        let watch = jumps(100.0, 80.0, 27.5, 1.0, 7);
        let ecg = jumps(100.0, 80.0, 21.0, 1.0, 8);
        let exact =
            synchronize_with_config(&watch, &ecg, &cfg(CorrelationStrategy::Exact)).unwrap();
        let fast =
            synchronize_with_config(&watch, &ecg, &cfg(CorrelationStrategy::Fast)).unwrap();
        assert_eq!(exact.lag_samples, fast.lag_samples);
        assert_eq!(exact.delta_seconds, fast.delta_seconds);
        assert!((exact.delta_seconds - 6.5).abs() <= 0.01 + 1e-9);
    }

    #[test]
    fn constant_accelerometer_is_invalid() {
        let watch = jumps(100.0, 80.0, 27.5, 1.0, 9);
        let still = Signal::new(vec![9.81; 8000], 100.0).unwrap();
        let err = synchronize(&watch, &still, 30.0).unwrap_err();
        assert!(matches!(err, Error::InvalidSignal(_)));
    }

    #[test]
    fn periodic_motion_is_not_trusted() {
        let data: Vec<f64> = (0..8000).map(|i| (i as f64 * 0.05).sin()).collect();
        let a = Signal::new(data.clone(), 100.0).unwrap();
        let b = Signal::new(data, 100.0).unwrap();
        let strict = SyncConfig {
            min_peak_ratio: 1.2,
            ..cfg(CorrelationStrategy::Exact)
        };
        let err = synchronize_with_config(&a, &b, &strict).unwrap_err();
        assert!(matches!(err, Error::SyncImpossible(_)));
    }

    #[test]
    fn apply_sync_trims_only_the_earlier_device() {
        let offset = AlignmentOffset {
            delta_seconds: 2.0,
            reference_earlier: true,
            lag_samples: 200,
            working_fs: 100.0,
            confidence: None,
        };
        let ppg = Signal::new(vec![0.0; 250], 25.0).unwrap();
        let ecg = Signal::new(vec![0.0; 1000], 100.0).unwrap();
        assert_eq!(apply_sync(&ppg, &offset, true).len(), 200);
        assert_eq!(apply_sync(&ecg, &offset, false).len(), 1000);

        let flipped = AlignmentOffset {
            delta_seconds: -2.0,
            reference_earlier: false,
            ..offset
        };
        assert_eq!(apply_sync(&ppg, &flipped, true).len(), 250);
        assert_eq!(apply_sync(&ecg, &flipped, false).len(), 800);
    }

    #[test]
    fn synced_applies_offset_then_edge_crop() {
        let offset = AlignmentOffset {
            delta_seconds: 1.0,
            reference_earlier: true,
            lag_samples: 10,
            working_fs: 10.0,
            confidence: None,
        };
        let cfg = SyncConfig {
            start_crop_s: 2.0,
            end_crop_s: 3.0,
            ..SyncConfig::default()
        };
        let sync = Synchronizer::from_offset(offset, &cfg);
        let sig = Signal::new((0..100).map(|i| i as f64).collect(), 10.0).unwrap();
        let synced = sync.synced(&sig, DeviceRole::Reference);
        assert_eq!(synced.len(), 100 - 10 - 20 - 30);
        assert_eq!(synced.samples()[0], 30.0);
        let other = sync.synced(&sig, DeviceRole::Comparison);
        assert_eq!(other.samples()[0], 20.0);
        assert_eq!(sync.align(&sig, DeviceRole::Reference).len(), 90);
        assert_eq!(sync.align(&sig, DeviceRole::Comparison).len(), 100);
        assert_eq!(sync.trim(&sync.align(&sig, DeviceRole::Reference)), synced);
    }

    #[test]
    fn offset_serializes_for_reports() {
        let offset = AlignmentOffset {
            delta_seconds: -2.5,
            reference_earlier: false,
            lag_samples: 250,
            working_fs: 100.0,
            confidence: Some(4.0),
        };
        let json = serde_json::to_value(offset).unwrap();
        assert_eq!(json["delta_seconds"], -2.5);
        assert_eq!(json["lag_samples"], 250);
        assert_eq!(json["confidence"], 4.0);
        let unbounded = serde_json::to_value(AlignmentOffset::zero(50.0)).unwrap();
        assert!(unbounded["confidence"].is_null());
    }
}
