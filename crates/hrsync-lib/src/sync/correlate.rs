//! Valid-mode cross-correlation, `c[k] = Σ_n f[n+k]·g[n]`.

use crate::error::{Error, Result};
use log::debug;
use serde::Serialize;

/// Best lag of a correlation surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorrelationPeak {
    /// Offset into `f` at which `g` matches best.
    pub lag: usize,
    /// Signed correlation at `lag`; its magnitude is the largest on the surface.
    pub value: f64,
    /// Ratio of `|value|` to the strongest competing local maximum of `|c|`.
    /// `None` when nothing competes.
    pub confidence: Option<f64>,
}

impl CorrelationPeak {
    pub fn magnitude(&self) -> f64 {
        self.value.abs()
    }
}

fn check_lengths(f: &[f64], g: &[f64]) -> Result<usize> {
    if g.is_empty() {
        return Err(Error::invalid("cannot correlate against an empty template"));
    }
    if f.len() < g.len() {
        return Err(Error::invalid(format!(
            "search signal ({} samples) is shorter than template ({} samples)",
            f.len(),
            g.len()
        )));
    }
    Ok(f.len() - g.len() + 1)
}

fn dot_at(f: &[f64], g: &[f64], k: usize) -> f64 {
    f[k..k + g.len()].iter().zip(g).map(|(a, b)| a * b).sum()
}

/// Full valid-mode surface, `len(f) - len(g) + 1` lags.
pub fn cross_correlation(f: &[f64], g: &[f64]) -> Result<Vec<f64>> {
    let lags = check_lengths(f, g)?;
    Ok((0..lags).map(|k| dot_at(f, g, k)).collect())
}

/// Lag maximising `|c|` over every lag.
///
/// Competing maxima closer than `exclusion` lags to the peak belong to the
/// same lobe and are ignored by the confidence ratio.
pub fn correlate(f: &[f64], g: &[f64], exclusion: usize) -> Result<CorrelationPeak> {
    let surface = cross_correlation(f, g)?;
    peak_of(&surface, exclusion)
}

/// Two-pass search: lags at a stride of `init_gap_s` seconds, then every lag
/// within `search_bound_s` seconds of the coarse peak.
pub fn fast_correlate(
    f: &[f64],
    g: &[f64],
    fs: f64,
    init_gap_s: f64,
    search_bound_s: f64,
) -> Result<CorrelationPeak> {
    let lags = check_lengths(f, g)?;
    let gap = ((init_gap_s * fs) as usize).max(1);
    let bound = (search_bound_s * fs) as usize;

    // Lags never evaluated stay at zero; they cannot win over a real peak.
    let mut surface = vec![0.0; lags];
    for k in (0..lags).step_by(gap) {
        surface[k] = dot_at(f, g, k);
    }
    let coarse = argmax_abs(&surface);
    let lower = coarse.saturating_sub(bound);
    let upper = (coarse + bound).min(lags - 1);
    debug!(
        "coarse peak at lag {} (stride {}), refining over {}..={}",
        coarse, gap, lower, upper
    );
    for k in lower..=upper {
        surface[k] = dot_at(f, g, k);
    }
    peak_of(&surface, bound)
}

fn argmax_abs(surface: &[f64]) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (k, v) in surface.iter().enumerate() {
        if v.abs() > best_val {
            best_val = v.abs();
            best = k;
        }
    }
    best
}

fn peak_of(surface: &[f64], exclusion: usize) -> Result<CorrelationPeak> {
    let lag = argmax_abs(surface);
    let value = surface[lag];
    if value == 0.0 || !value.is_finite() {
        return Err(Error::sync_impossible(
            "correlation surface is flat, no shared motion found",
        ));
    }
    let competitor = local_maxima(surface)
        .into_iter()
        .filter(|&k| k.abs_diff(lag) > exclusion)
        .map(|k| surface[k].abs())
        .fold(0.0_f64, f64::max);
    let confidence = (competitor > 0.0).then(|| value.abs() / competitor);
    Ok(CorrelationPeak {
        lag,
        value,
        confidence,
    })
}

/// Indices where `|c|` rises from the left and does not fall on the right.
fn local_maxima(surface: &[f64]) -> Vec<usize> {
    let n = surface.len();
    let mut out = Vec::new();
    for k in 0..n {
        let here = surface[k].abs();
        let left = if k > 0 { surface[k - 1].abs() } else { f64::NEG_INFINITY };
        let right = if k + 1 < n {
            surface[k + 1].abs()
        } else {
            f64::NEG_INFINITY
        };
        if here > left && here >= right {
            out.push(k);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn pulse_in_noise(seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..1000)
            .map(|i| {
                let noise = rng.gen_range(-0.05..0.05);
                if (300..400).contains(&i) {
                    let t = (i - 300) as f64 / 100.0;
                    let envelope = (std::f64::consts::PI * t).sin();
                    noise + envelope * (6.0 * std::f64::consts::PI * t).cos()
                } else {
                    noise
                }
            })
            .collect()
    }

    #[test]
    fn surface_has_valid_mode_length() {
        let c = cross_correlation(&[1.0, 2.0, 3.0, 4.0], &[1.0, 1.0]).unwrap();
        assert_eq!(c, vec![3.0, 5.0, 7.0]);
    }

    #[test]
    fn finds_embedded_window() {
        let f = pulse_in_noise(7);
        let g = f[300..400].to_vec();
        let peak = correlate(&f, &g, 0).unwrap();
        assert_eq!(peak.lag, 300);
        assert!(peak.value > 0.0);
    }

    #[test]
    fn inverted_template_still_found() {
        let f = pulse_in_noise(11);
        let g: Vec<f64> = f[300..400].iter().map(|x| -x).collect();
        let peak = correlate(&f, &g, 0).unwrap();
        assert_eq!(peak.lag, 300);
        assert!(peak.value < 0.0);
    }

    #[test]
    fn fast_search_agrees_with_exact() {
        let f = pulse_in_noise(3);
        let g = f[250..450].to_vec();
        let exact = correlate(&f, &g, 300).unwrap();
        let fast = fast_correlate(&f, &g, 100.0, 0.25, 3.0).unwrap();
        assert_eq!(exact.lag, 250);
        assert_eq!(fast.lag, exact.lag);
        assert_eq!(fast.value, exact.value);
    }

    #[test]
    fn isolated_peak_is_confident() {
        let f = pulse_in_noise(5);
        let g = f[300..400].to_vec();
        let peak = correlate(&f, &g, 100).unwrap();
        let ratio = peak.confidence.unwrap_or(f64::INFINITY);
        assert!(ratio > 3.0, "ratio {}", ratio);
    }

    #[test]
    fn periodic_surface_has_unit_confidence() {
        let f: Vec<f64> = (0..600).map(|i| (i as f64 * 0.2).sin()).collect();
        let g = f[..200].to_vec();
        let peak = correlate(&f, &g, 10).unwrap();
        let ratio = peak.confidence.unwrap();
        assert!(ratio < 1.1, "ratio {}", ratio);
    }

    #[test]
    fn flat_surface_is_sync_impossible() {
        let err = correlate(&[0.0; 20], &[1.0, -1.0, 1.0], 0).unwrap_err();
        assert!(matches!(err, Error::SyncImpossible(_)));
    }

    #[test]
    fn short_search_signal_is_invalid() {
        let err = correlate(&[1.0, 2.0], &[1.0, 2.0, 3.0], 0).unwrap_err();
        assert!(matches!(err, Error::InvalidSignal(_)));
        assert!(cross_correlation(&[1.0], &[]).is_err());
    }
}
