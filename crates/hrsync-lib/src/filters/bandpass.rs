use crate::error::{Error, Result};
use crate::signal::Signal;

/// Band-limiting stage applied ahead of motion cancellation.
pub trait BandFilter {
    fn apply(&self, signal: &Signal, low_hz: f64, high_hz: f64, order: usize) -> Result<Signal>;
}

/// Cascaded first-order RC high-pass and low-pass sections, `order` times.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinglePoleBandpass;

impl BandFilter for SinglePoleBandpass {
    fn apply(&self, signal: &Signal, low_hz: f64, high_hz: f64, order: usize) -> Result<Signal> {
        let fs = signal.fs();
        if !(low_hz >= 0.0 && high_hz > low_hz) {
            return Err(Error::config(format!(
                "invalid pass band {}..{} Hz",
                low_hz, high_hz
            )));
        }
        let mut data = signal.samples().to_vec();
        for _ in 0..order.max(1) {
            if low_hz > 0.0 {
                data = highpass(&data, fs, low_hz);
            }
            // A corner at or above Nyquist leaves nothing to remove.
            if high_hz < fs * 0.5 {
                data = lowpass(&data, fs, high_hz);
            }
        }
        Signal::new(data, fs)
    }
}

fn rc_constants(fs: f64, cutoff: f64) -> (f64, f64) {
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    (dt, rc)
}

fn highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let (dt, rc) = rc_constants(fs, cutoff);
    let alpha = rc / (rc + dt);
    let mut prev_y = 0.0;
    let mut prev_x = first;
    data.iter()
        .map(|&x| {
            let y = alpha * (prev_y + x - prev_x);
            prev_y = y;
            prev_x = x;
            y
        })
        .collect()
}

fn lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let (dt, rc) = rc_constants(fs, cutoff);
    let alpha = dt / (rc + dt);
    let mut prev = first;
    data.iter()
        .map(|&x| {
            prev += alpha * (x - prev);
            prev
        })
        .collect()
}
