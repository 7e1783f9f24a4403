//! Readers for the recordings a session is built from.

pub mod channels;
pub mod earbuds;
pub mod edf;
pub mod watch;

pub use channels::ChannelCsv;
pub use earbuds::EarbudDirectory;
pub use edf::EdfRecording;
pub use watch::WatchDirectory;

use crate::config::Axis;
use crate::signal::Signal;
use crate::sync::{EarbudRecording, EcgRecording};
use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use std::path::Path;

/// ECG channel label on the clinical recorder.
pub const ECG_CHANNEL: &str = "ECG";

/// Recorder accelerometer label for `axis`, e.g. `Accelerometer_X`.
pub fn accelerometer_channel(axis: Axis) -> String {
    format!("Accelerometer_{}", axis.as_str().to_ascii_uppercase())
}

/// A recording whose channels are addressed by name.
pub trait SignalSource {
    fn read_channel(&self, name: &str) -> Result<Signal>;
}

/// A device reporting heart rate with wall-clock timestamps.
pub trait EarbudSource {
    /// 1 Hz heart rate and the epoch-millisecond time of its first sample.
    fn read_heart_rate_series(&self) -> Result<(Signal, i64)>;
    fn timestamps(&self) -> Result<Vec<i64>>;
}

/// ECG and the up-axis accelerometer channel from a clinical recording.
pub fn load_ecg_recording(source: &dyn SignalSource, up_axis: Axis) -> Result<EcgRecording> {
    let ecg = source.read_channel(ECG_CHANNEL)?;
    let accel_up = source.read_channel(&accelerometer_channel(up_axis))?;
    Ok(EcgRecording { ecg, accel_up })
}

pub fn load_earbud_recording(source: &dyn EarbudSource) -> Result<EarbudRecording> {
    let (hr, _) = source.read_heart_rate_series()?;
    let timestamps = source.timestamps()?;
    Ok(EarbudRecording { hr, timestamps })
}

/// Mean rate implied by millisecond timestamps: `n / span_seconds`.
pub(crate) fn rate_from_timestamps(times: &[i64]) -> Result<f64> {
    let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
        bail!("no samples to derive a rate from");
    };
    if last <= first {
        bail!(
            "timestamps do not advance ({} samples from {} to {})",
            times.len(),
            first,
            last
        );
    }
    Ok(times.len() as f64 / ((last - first) as f64 / 1000.0))
}

/// Deserialize every row of a headed CSV file.
pub(crate) fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, row) in reader.deserialize().enumerate() {
        let row: T = row.with_context(|| format!("reading row {} of {}", i + 1, path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}
