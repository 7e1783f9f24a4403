//! Two-stage alignment of the ECG rig, the watch and the earbuds.
//!
//! The watch is aligned to the ECG rig by accelerometer correlation; the
//! earbuds are then aligned to the watch through the host-clock timestamps
//! both of them record.

use super::synchronizer::{AlignmentOffset, DeviceRole, Synchronizer};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::filters::kalman::fuse_kalman;
use crate::signal::Signal;
use log::{debug, info};
use serde::Serialize;

/// Clinical recorder channels used by the session.
#[derive(Debug, Clone)]
pub struct EcgRecording {
    pub ecg: Signal,
    /// Acceleration along the recorder's "up" axis.
    pub accel_up: Signal,
}

/// Watch export. Timestamps are epoch milliseconds, one per sample.
#[derive(Debug, Clone)]
pub struct WatchRecording {
    pub ppg: Signal,
    pub ppg_timestamps: Vec<i64>,
    pub accel: [Signal; 3],
    pub hr: Signal,
    pub hr_timestamps: Vec<i64>,
}

/// Earbud heart rate at 1 Hz plus its epoch-millisecond timestamps.
#[derive(Debug, Clone)]
pub struct EarbudRecording {
    pub hr: Signal,
    pub timestamps: Vec<i64>,
}

/// Every stream of a session after both alignment stages and the edge crop.
#[derive(Debug, Clone, Serialize)]
pub struct AlignedSession {
    pub offset: AlignmentOffset,
    /// PPG samples removed by the timestamp stage (earbuds started later).
    pub watch_crop_samples: usize,
    /// Earbud samples removed by the timestamp stage (watch started later).
    pub ear_crop_samples: usize,
    pub ecg: Signal,
    pub ppg: Signal,
    pub accel: [Signal; 3],
    pub watch_hr: Signal,
    pub ear_hr: Option<Signal>,
}

/// Index into `earlier` whose timestamp is closest to `later_start`.
///
/// `earlier` is ascending. Ties go to the later sample, and a series that
/// never reaches `later_start` does not overlap at all.
pub fn align_by_timestamps(earlier: &[i64], later_start: i64) -> Result<usize> {
    let first = earlier
        .iter()
        .position(|&t| t >= later_start)
        .ok_or_else(|| {
            Error::sync_impossible(format!(
                "recordings do not overlap: no timestamp reaches {}",
                later_start
            ))
        })?;
    match first.checked_sub(1) {
        Some(prev) if later_start - earlier[prev] < earlier[first] - later_start => Ok(prev),
        _ => Ok(first),
    }
}

/// Crop points `(reference, other)` that make two timestamped streams start
/// together. At most one of them is nonzero.
pub fn timestamp_crop(reference: &[i64], other: &[i64]) -> Result<(usize, usize)> {
    let (Some(&reference_start), Some(&other_start)) = (reference.first(), other.first()) else {
        return Err(Error::invalid("timestamp series is empty"));
    };
    if other_start >= reference_start {
        Ok((align_by_timestamps(reference, other_start)?, 0))
    } else {
        Ok((0, align_by_timestamps(other, reference_start)?))
    }
}

/// Convert a crop of `samples` at `from_fs` into the equivalent count at
/// `to_fs`.
pub fn scale_crop(samples: usize, from_fs: f64, to_fs: f64) -> usize {
    (samples as f64 * to_fs / from_fs) as usize
}

fn check_timestamps(stream: &str, signal: &Signal, timestamps: &[i64]) -> Result<()> {
    if timestamps.len() != signal.len() {
        return Err(Error::invalid(format!(
            "watch has {} {} samples but {} timestamps",
            signal.len(),
            stream,
            timestamps.len()
        )));
    }
    Ok(())
}

/// Run both alignment stages and trim the recording edges.
///
/// The watch heart-rate stream is cropped by its own timestamps; the ECG and
/// accelerometer streams follow the PPG crop converted to their rates.
pub fn align_session(
    ecg: &EcgRecording,
    watch: &WatchRecording,
    ear: Option<&EarbudRecording>,
    cfg: &SessionConfig,
) -> Result<AlignedSession> {
    cfg.validate()?;
    check_timestamps("PPG", &watch.ppg, &watch.ppg_timestamps)?;
    check_timestamps("heart-rate", &watch.hr, &watch.hr_timestamps)?;
    let up = &watch.accel[cfg.sync.watch_up_axis.index()];
    let sync = Synchronizer::new(up, &ecg.accel_up, &cfg.sync)?;

    let mut ecg_signal = sync.align(&ecg.ecg, DeviceRole::Comparison);
    let mut ppg = sync.align(&watch.ppg, DeviceRole::Reference);
    let ppg_timestamps = &watch.ppg_timestamps[watch.ppg.len() - ppg.len()..];
    let mut accel = watch
        .accel
        .clone()
        .map(|axis| sync.align(&axis, DeviceRole::Reference));
    let mut watch_hr = sync.align(&watch.hr, DeviceRole::Reference);
    let hr_timestamps = &watch.hr_timestamps[watch.hr.len() - watch_hr.len()..];

    let mut watch_crop_samples = 0;
    let mut ear_crop_samples = 0;
    let mut ear_hr = None;
    if let Some(ear) = ear {
        let (watch_crop, ear_crop) = timestamp_crop(ppg_timestamps, &ear.timestamps)?;
        let (hr_crop, _) = timestamp_crop(hr_timestamps, &ear.timestamps)?;
        info!(
            "timestamp alignment removed {} PPG, {} watch HR and {} earbud samples",
            watch_crop, hr_crop, ear_crop
        );
        let ppg_fs = ppg.fs();
        ecg_signal = ecg_signal.skip(scale_crop(watch_crop, ppg_fs, ecg_signal.fs()));
        accel = accel.map(|axis| {
            let n = scale_crop(watch_crop, ppg_fs, axis.fs());
            axis.skip(n)
        });
        watch_hr = watch_hr.skip(hr_crop);
        ppg = ppg.skip(watch_crop);
        watch_crop_samples = watch_crop;
        ear_crop_samples = ear_crop;
        ear_hr = Some(ear.hr.skip(ear_crop));
    }

    debug!(
        "trimming {} s head and {} s tail from every stream",
        cfg.sync.start_crop_s, cfg.sync.end_crop_s
    );
    Ok(AlignedSession {
        offset: *sync.offset(),
        watch_crop_samples,
        ear_crop_samples,
        ecg: sync.trim(&ecg_signal),
        ppg: sync.trim(&ppg),
        accel: accel.map(|axis| sync.trim(&axis)),
        watch_hr: sync.trim(&watch_hr),
        ear_hr: ear_hr.map(|hr| sync.trim(&hr)),
    })
}

/// Kalman-fuse the aligned earbud and watch heart-rate streams.
pub fn fuse(session: &AlignedSession, cfg: &SessionConfig) -> Result<Signal> {
    let ear = session
        .ear_hr
        .as_ref()
        .ok_or_else(|| Error::invalid("session has no earbud stream to fuse"))?;
    fuse_kalman(
        ear,
        &session.watch_hr,
        cfg.kalman.predict_noise,
        cfg.kalman.ear_noise,
    )
}
