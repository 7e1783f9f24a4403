use crate::error::{Error, Result};
use serde::Serialize;

/// Uniformly sampled signal.
///
/// Transforms never mutate in place; each returns a new `Signal`. Slicing
/// follows array-slicing semantics: ranges past the end truncate instead of
/// failing, which windowing and segment splitting rely on at stream end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    /// Sampling frequency in Hz, always finite and positive.
    fs: f64,
    /// Samples
    data: Vec<f64>,
}

impl Signal {
    pub fn new(data: Vec<f64>, fs: f64) -> Result<Self> {
        if !fs.is_finite() || fs <= 0.0 {
            return Err(Error::invalid(format!(
                "sample rate must be positive, got {}",
                fs
            )));
        }
        Ok(Self { fs, data })
    }

    /// Build a signal at the same rate as `self`.
    fn with_data(&self, data: Vec<f64>) -> Self {
        Self { fs: self.fs, data }
    }

    pub fn fs(&self) -> f64 {
        self.fs
    }

    pub fn samples(&self) -> &[f64] {
        &self.data
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }

    pub fn mean(&self) -> Option<f64> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.data.iter().sum::<f64>() / self.data.len() as f64)
    }

    /// Number of samples spanning `seconds` at this signal's rate (floored).
    pub fn samples_for(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.fs) as usize
    }

    /// Zero mean, unit peak magnitude.
    pub fn normalize(&self) -> Result<Signal> {
        let mean = self
            .mean()
            .ok_or_else(|| Error::invalid("cannot normalize an empty signal"))?;
        let centred: Vec<f64> = self.data.iter().map(|x| x - mean).collect();
        let amplitude = centred.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
        if amplitude == 0.0 || !amplitude.is_finite() {
            return Err(Error::invalid(
                "cannot normalize a constant signal (zero amplitude)",
            ));
        }
        Ok(self.with_data(centred.into_iter().map(|x| x / amplitude).collect()))
    }

    /// Piecewise-linear resampling to `target_fs`.
    ///
    /// Output positions are `k * fs / target_fs` in input-sample units for
    /// every position below the input length; positions past the last sample
    /// hold its value.
    pub fn resample(&self, target_fs: f64) -> Result<Signal> {
        if !target_fs.is_finite() || target_fs <= 0.0 {
            return Err(Error::invalid(format!(
                "target sample rate must be positive, got {}",
                target_fs
            )));
        }
        if target_fs == self.fs || self.data.is_empty() {
            return Ok(Signal {
                fs: target_fs,
                data: self.data.clone(),
            });
        }
        let n = self.data.len();
        let step = self.fs / target_fs;
        let count = (n as f64 / step).ceil() as usize;
        let last = self.data[n - 1];
        let mut out = Vec::with_capacity(count);
        for k in 0..count {
            let pos = k as f64 * step;
            let idx = pos.floor() as usize;
            if idx + 1 >= n {
                out.push(last);
                continue;
            }
            let frac = pos - idx as f64;
            out.push(self.data[idx] + frac * (self.data[idx + 1] - self.data[idx]));
        }
        Ok(Signal {
            fs: target_fs,
            data: out,
        })
    }

    /// First `length` samples; shorter signals are returned whole.
    pub fn crop(&self, length: usize) -> Signal {
        self.slice(0, length)
    }

    /// Samples `start..end`, both clamped to the signal length.
    pub fn slice(&self, start: usize, end: usize) -> Signal {
        let end = end.min(self.data.len());
        let start = start.min(end);
        self.with_data(self.data[start..end].to_vec())
    }

    /// Drop the first `n` samples.
    pub fn skip(&self, n: usize) -> Signal {
        self.slice(n, self.data.len())
    }

    /// Remove `head_s` seconds from the start and `tail_s` seconds from the end.
    pub fn trim_seconds(&self, head_s: f64, tail_s: f64) -> Signal {
        let head = self.samples_for(head_s);
        let tail = self.samples_for(tail_s);
        let end = self.data.len().saturating_sub(tail);
        self.slice(head, end)
    }

    /// Zero-pad or truncate to exactly `length` samples.
    pub fn fit_to(&self, length: usize) -> Signal {
        let mut data = self.data.clone();
        data.resize(length, 0.0);
        self.with_data(data)
    }

    /// Consecutive non-overlapping segments of `seconds` each; a partial
    /// trailing segment is dropped.
    pub fn segments(&self, seconds: f64) -> Vec<Signal> {
        let size = self.samples_for(seconds);
        if size == 0 {
            return Vec::new();
        }
        self.data
            .chunks_exact(size)
            .map(|chunk| self.with_data(chunk.to_vec()))
            .collect()
    }
}
