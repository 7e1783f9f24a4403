use super::{rate_from_timestamps, read_rows, EarbudSource};
use crate::error::Error;
use crate::signal::Signal;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct HrRow {
    time: i64,
    value: f64,
}

/// In-ear heart-rate export: `hr.csv` with `time,value` rows, one a second.
///
/// The rate implied by the timestamps (`n / span`) has to sit within
/// 0.01 Hz of 1 Hz, which also rules out recordings shorter than about
/// a hundred seconds.
#[derive(Debug, Clone)]
pub struct EarbudDirectory {
    dir: PathBuf,
}

impl EarbudDirectory {
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            bail!("earbud directory {} does not exist", dir.display());
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn rows(&self) -> Result<Vec<HrRow>> {
        read_rows(&self.dir.join("hr.csv"))
    }
}

impl EarbudSource for EarbudDirectory {
    fn read_heart_rate_series(&self) -> Result<(Signal, i64)> {
        let rows = self.rows()?;
        let times: Vec<i64> = rows.iter().map(|r| r.time).collect();
        let fs = rate_from_timestamps(&times).context("rate of earbud hr.csv")?;
        if (fs - 1.0).abs() >= 0.01 {
            return Err(Error::invalid(format!(
                "earbud heart rate must be reported at 1 Hz, timestamps imply {:.4} Hz",
                fs
            ))
            .into());
        }
        let hr = Signal::new(rows.iter().map(|r| r.value).collect(), 1.0)?;
        Ok((hr, times[0]))
    }

    fn timestamps(&self) -> Result<Vec<i64>> {
        Ok(self.rows()?.iter().map(|r| r.time).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::load_earbud_recording;
    use std::fs;

    const T0: i64 = 1_586_000_010_000;

    fn write_hr(dir: &Path, n: i64, step_ms: i64) {
        let mut csv = String::from("time,value\n");
        for i in 0..n {
            csv.push_str(&format!("{},{}\n", T0 + i * step_ms, 60 + i % 5));
        }
        fs::write(dir.join("hr.csv"), csv).unwrap();
    }

    #[test]
    fn reads_one_hertz_series() {
        let tmp = tempfile::tempdir().unwrap();
        write_hr(tmp.path(), 150, 1000);
        let ear = EarbudDirectory::open(tmp.path()).unwrap();
        let (hr, start) = ear.read_heart_rate_series().unwrap();
        assert_eq!(start, T0);
        assert_eq!(hr.len(), 150);
        assert_eq!(hr.fs(), 1.0);
        assert_eq!(hr.samples()[6], 61.0);
        let rec = load_earbud_recording(&ear).unwrap();
        assert_eq!(rec.timestamps.len(), 150);
        assert_eq!(rec.timestamps[149], T0 + 149_000);
    }

    #[test]
    fn rejects_other_rates() {
        let tmp = tempfile::tempdir().unwrap();
        write_hr(tmp.path(), 150, 500);
        let ear = EarbudDirectory::open(tmp.path()).unwrap();
        let err = ear.read_heart_rate_series().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidSignal(_))
        ));
    }
}
