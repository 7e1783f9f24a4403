//! Scalar Kalman fusion of two 1 Hz heart-rate streams.
//!
//! The watch stream drives the prediction through its second-to-second
//! change; the in-ear stream corrects the estimate whenever it reports a
//! reading. A zero ear sample means "no reading this second".
//!
//! Watch glitches feed straight into the prediction: a dropped reading that
//! produces a large jump in the watch stream moves the estimate by the same
//! amount until the next ear correction pulls it back.

use crate::config::KalmanConfig;
use crate::error::{Error, Result};
use crate::signal::Signal;
use log::debug;
use serde::Serialize;

/// Fused estimate after one time step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KalmanState {
    /// Heart rate (bpm).
    pub estimate: f64,
    /// Uncertainty of `estimate`, never negative.
    pub variance: f64,
    /// Index of this step in the input streams (one per second). The first
    /// state sits at the first ear reading, so `time - states[0].time` is
    /// the number of seconds since fusion started.
    pub time: usize,
}

/// One-dimensional predict/correct stepper.
#[derive(Debug, Clone)]
pub struct KalmanFusion {
    state: KalmanState,
    predict_noise: f64,
    ear_noise: f64,
}

impl KalmanFusion {
    /// Start from a first in-ear reading at `time`.
    pub fn new(initial: f64, time: usize, cfg: &KalmanConfig) -> Self {
        Self {
            state: KalmanState {
                estimate: initial,
                variance: cfg.ear_noise,
                time,
            },
            predict_noise: cfg.predict_noise,
            ear_noise: cfg.ear_noise,
        }
    }

    pub fn state(&self) -> KalmanState {
        self.state
    }

    /// Advance one second, moving the estimate by the watch's change `diff`.
    pub fn predict(&mut self, diff: f64) {
        self.state.estimate += diff;
        self.state.variance += self.predict_noise;
        self.state.time += 1;
    }

    /// Blend in an ear reading; returns the gain used.
    pub fn correct(&mut self, measurement: f64) -> f64 {
        let p = self.state.variance;
        let denom = p + self.ear_noise;
        let k = if denom > 0.0 { p / denom } else { 0.0 };
        self.state.estimate += k * (measurement - self.state.estimate);
        self.state.variance = ((1.0 - k) * p).max(0.0);
        k
    }
}

fn check_streams(ear: &Signal, watch: &Signal) -> Result<usize> {
    if (ear.fs() - watch.fs()).abs() > 1e-9 {
        return Err(Error::invalid(format!(
            "heart-rate streams must share a rate: ear {} Hz, watch {} Hz",
            ear.fs(),
            watch.fs()
        )));
    }
    let len = ear.len().min(watch.len());
    ear.samples()[..len]
        .iter()
        .position(|&v| v != 0.0)
        .ok_or_else(|| Error::invalid("ear stream has no reading to start from"))
}

/// Per-step states from the first ear reading to the end of the shorter
/// stream.
pub fn fuse_kalman_states(
    ear: &Signal,
    watch: &Signal,
    cfg: &KalmanConfig,
) -> Result<Vec<KalmanState>> {
    cfg.validate()?;
    let t_min = check_streams(ear, watch)?;
    let len = ear.len().min(watch.len());
    let (e, w) = (ear.samples(), watch.samples());

    let mut filter = KalmanFusion::new(e[t_min], t_min, cfg);
    let mut states = Vec::with_capacity(len - t_min);
    states.push(filter.state());
    let mut corrections = 0usize;
    for t in t_min + 1..len {
        filter.predict(w[t] - w[t - 1]);
        if e[t] != 0.0 {
            filter.correct(e[t]);
            corrections += 1;
        }
        states.push(filter.state());
    }
    debug!(
        "kalman fusion from t={} over {} steps, {} corrections",
        t_min,
        len - t_min,
        corrections
    );
    Ok(states)
}

/// One fused heart rate per second. Seconds before the first ear reading
/// are left at zero.
pub fn fuse_kalman(
    ear: &Signal,
    watch: &Signal,
    predict_noise: f64,
    ear_noise: f64,
) -> Result<Signal> {
    let cfg = KalmanConfig {
        predict_noise,
        ear_noise,
    };
    let states = fuse_kalman_states(ear, watch, &cfg)?;
    let len = ear.len().min(watch.len());
    let mut out = vec![0.0; len];
    for s in &states {
        out[s.time] = s.estimate;
    }
    Signal::new(out, ear.fs())
}
