use crate::error::{Error, Result};
use crate::filters::adaptive::AdaptiveMethod;
use anyhow::Context;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Accelerometer axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }

    /// Parse a compact axis list such as `"xyz"` or `"zx"`.
    pub fn parse_list(s: &str) -> Result<Vec<Axis>> {
        s.chars().map(|c| c.to_string().parse()).collect()
    }
}

impl FromStr for Axis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(Error::config(format!("unknown axis '{}'", other))),
        }
    }
}

impl TryFrom<String> for Axis {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which cross-correlation search the synchronizer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum CorrelationStrategy {
    /// Every lag in the window.
    Exact,
    /// Coarse stride, then a bounded fine scan around the coarse peak.
    Fast,
}

impl FromStr for CorrelationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(CorrelationStrategy::Exact),
            "fast" => Ok(CorrelationStrategy::Fast),
            other => Err(Error::config(format!(
                "unknown correlation strategy '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for CorrelationStrategy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Tunables for accelerometer-based synchronization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Window (seconds) expected to contain the shared motion event.
    pub time_limit_s: f64,
    /// Head discarded after the offset is applied (seconds).
    pub start_crop_s: f64,
    /// Tail discarded after the offset is applied (seconds).
    pub end_crop_s: f64,
    pub strategy: CorrelationStrategy,
    /// Coarse-scan stride for the fast strategy (seconds).
    pub init_gap_s: f64,
    /// Half-width of the fine scan around the coarse peak (seconds).
    pub search_bound_s: f64,
    /// The correlation peak must exceed the best competing local maximum by
    /// more than this ratio.
    pub min_peak_ratio: f64,
    pub watch_up_axis: Axis,
    pub ecg_up_axis: Axis,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            time_limit_s: 120.0,
            start_crop_s: 120.0,
            end_crop_s: 30.0,
            strategy: CorrelationStrategy::Fast,
            init_gap_s: 1.0,
            search_bound_s: 3.0,
            min_peak_ratio: 1.0,
            watch_up_axis: Axis::Y,
            ecg_up_axis: Axis::X,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        positive("sync.time_limit_s", self.time_limit_s)?;
        positive("sync.init_gap_s", self.init_gap_s)?;
        positive("sync.search_bound_s", self.search_bound_s)?;
        non_negative("sync.start_crop_s", self.start_crop_s)?;
        non_negative("sync.end_crop_s", self.end_crop_s)?;
        non_negative("sync.min_peak_ratio", self.min_peak_ratio)?;
        Ok(())
    }
}

/// Tunables for adaptive motion cancellation and the band-limiting pass
/// that precedes it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MotionFilterConfig {
    pub method: AdaptiveMethod,
    pub taps: usize,
    pub step_size: f64,
    /// Regulariser added to the reference energy by NLMS.
    pub epsilon: f64,
    /// Accelerometer axes used as references, in application order.
    pub axes: Vec<Axis>,
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    pub band_order: usize,
}

impl Default for MotionFilterConfig {
    fn default() -> Self {
        Self {
            method: AdaptiveMethod::Nlms,
            taps: 20,
            step_size: 1.0,
            epsilon: 0.001,
            axes: Axis::ALL.to_vec(),
            band_low_hz: 0.4,
            band_high_hz: 4.0,
            band_order: 1,
        }
    }
}

impl MotionFilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.taps == 0 {
            return Err(Error::config("motion.taps must be at least 1"));
        }
        positive("motion.step_size", self.step_size)?;
        positive("motion.epsilon", self.epsilon)?;
        non_negative("motion.band_low_hz", self.band_low_hz)?;
        positive("motion.band_high_hz", self.band_high_hz)?;
        if self.band_low_hz >= self.band_high_hz {
            return Err(Error::config(format!(
                "motion band is empty: {} Hz >= {} Hz",
                self.band_low_hz, self.band_high_hz
            )));
        }
        Ok(())
    }
}

/// Noise constants for the heart-rate fusion filter.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    /// Variance added per predict step (trust in the watch trend).
    pub predict_noise: f64,
    /// Variance of an in-ear measurement.
    pub ear_noise: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            predict_noise: 2.0,
            ear_noise: 3.0,
        }
    }
}

impl KalmanConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative("kalman.predict_noise", self.predict_noise)?;
        non_negative("kalman.ear_noise", self.ear_noise)?;
        Ok(())
    }
}

/// Windows used to turn waveforms into per-second heart-rate traces.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeartRateConfig {
    pub ecg_window_s: f64,
    pub ppg_window_s: f64,
    /// Leading seconds excluded when comparing traces.
    pub warmup_s: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for HeartRateConfig {
    fn default() -> Self {
        Self {
            ecg_window_s: 30.0,
            ppg_window_s: 15.0,
            warmup_s: 20.0,
            min_bpm: 40.0,
            max_bpm: 220.0,
        }
    }
}

impl HeartRateConfig {
    pub fn validate(&self) -> Result<()> {
        positive("heart_rate.ecg_window_s", self.ecg_window_s)?;
        positive("heart_rate.ppg_window_s", self.ppg_window_s)?;
        non_negative("heart_rate.warmup_s", self.warmup_s)?;
        positive("heart_rate.min_bpm", self.min_bpm)?;
        if self.max_bpm <= self.min_bpm {
            return Err(Error::config("heart_rate.max_bpm must exceed min_bpm"));
        }
        Ok(())
    }
}

/// Every tunable for one recording session.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sync: SyncConfig,
    pub motion: MotionFilterConfig,
    pub kalman: KalmanConfig,
    pub heart_rate: HeartRateConfig,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        self.motion.validate()?;
        self.kalman.validate()?;
        self.heart_rate.validate()?;
        Ok(())
    }

    /// Parse and validate a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: SessionConfig = toml::from_str(contents).context("parsing session config")?;
        cfg.validate()?;
        Ok(cfg)
    }
}

pub fn read_session_config(path: &Path) -> anyhow::Result<SessionConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    SessionConfig::from_toml_str(&contents)
        .with_context(|| format!("loading config {}", path.display()))
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!("{} must be positive, got {}", name, value)))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{} must be non-negative, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SessionConfig::default().validate().unwrap();
        let sync = SyncConfig::default();
        assert_eq!(sync.time_limit_s, 120.0);
        assert_eq!(sync.strategy, CorrelationStrategy::Fast);
        assert_eq!(MotionFilterConfig::default().taps, 20);
    }

    #[test]
    fn partial_toml_overrides_only_named_keys() {
        let cfg = SessionConfig::from_toml_str(
            r#"
            [sync]
            time_limit_s = 60.0
            strategy = "exact"
            watch_up_axis = "z"

            [motion]
            method = "lms"
            axes = ["x", "z"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sync.time_limit_s, 60.0);
        assert_eq!(cfg.sync.strategy, CorrelationStrategy::Exact);
        assert_eq!(cfg.sync.watch_up_axis, Axis::Z);
        assert_eq!(cfg.sync.start_crop_s, 120.0);
        assert_eq!(cfg.motion.method, AdaptiveMethod::Lms);
        assert_eq!(cfg.motion.axes, vec![Axis::X, Axis::Z]);
        assert_eq!(cfg.kalman, KalmanConfig::default());
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = SessionConfig::from_toml_str("[motion]\nmethod = \"rls\"\n").unwrap_err();
        assert!(format!("{:#}", err).contains("unknown adaptive filter method"));
    }

    #[test]
    fn out_of_range_tunables_are_configuration_errors() {
        let mut motion = MotionFilterConfig::default();
        motion.taps = 0;
        assert!(matches!(motion.validate(), Err(Error::Configuration(_))));

        let mut motion = MotionFilterConfig::default();
        motion.step_size = -0.5;
        assert!(matches!(motion.validate(), Err(Error::Configuration(_))));

        let mut sync = SyncConfig::default();
        sync.search_bound_s = 0.0;
        assert!(matches!(sync.validate(), Err(Error::Configuration(_))));

        let kalman = KalmanConfig {
            predict_noise: -1.0,
            ear_noise: 3.0,
        };
        assert!(kalman.validate().is_err());
    }

    #[test]
    fn axis_lists_parse() {
        assert_eq!(
            Axis::parse_list("zyx").unwrap(),
            vec![Axis::Z, Axis::Y, Axis::X]
        );
        assert!(Axis::parse_list("xw").is_err());
    }
}
