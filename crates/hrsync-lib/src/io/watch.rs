//! Smartwatch export directory.
//!
//! Files: `ppg.csv` (`time,value[,value2]`), `accelerometer.csv` and
//! `rotation.csv` (`time,x,y,z`), `hr.csv` (`time,value,accuracy`).
//! Times are epoch milliseconds. Rates are derived from the timestamps
//! except the heart rate, which the watch reports once a second.

use super::{rate_from_timestamps, read_rows, SignalSource};
use crate::config::Axis;
use crate::signal::Signal;
use crate::sync::WatchRecording;
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct PpgRow {
    time: i64,
    value: f64,
    value2: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct XyzRow {
    time: i64,
    x: f64,
    y: f64,
    z: f64,
}

impl XyzRow {
    fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HrRow {
    time: i64,
    value: f64,
    accuracy: f64,
}

#[derive(Debug, Clone)]
pub struct WatchDirectory {
    dir: PathBuf,
}

impl WatchDirectory {
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            bail!("watch directory {} does not exist", dir.display());
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn ppg_rows(&self) -> Result<Vec<PpgRow>> {
        read_rows(&self.dir.join("ppg.csv"))
    }

    fn hr_rows(&self) -> Result<Vec<HrRow>> {
        read_rows(&self.dir.join("hr.csv"))
    }

    fn xyz_signal(&self, file: &str, axis: Axis) -> Result<Signal> {
        let rows: Vec<XyzRow> = read_rows(&self.dir.join(file))?;
        let times: Vec<i64> = rows.iter().map(|r| r.time).collect();
        let fs = rate_from_timestamps(&times).with_context(|| format!("rate of {}", file))?;
        Ok(Signal::new(rows.iter().map(|r| r.get(axis)).collect(), fs)?)
    }

    pub fn ppg_timestamps(&self) -> Result<Vec<i64>> {
        Ok(self.ppg_rows()?.iter().map(|r| r.time).collect())
    }

    pub fn hr_timestamps(&self) -> Result<Vec<i64>> {
        Ok(self.hr_rows()?.iter().map(|r| r.time).collect())
    }

    /// Everything a session needs from the watch.
    pub fn load(&self) -> Result<WatchRecording> {
        let rows = self.ppg_rows()?;
        let ppg_timestamps: Vec<i64> = rows.iter().map(|r| r.time).collect();
        let fs = rate_from_timestamps(&ppg_timestamps).context("rate of ppg.csv")?;
        let ppg = Signal::new(rows.iter().map(|r| r.value).collect(), fs)?;

        let motion: Vec<XyzRow> = read_rows(&self.dir.join("accelerometer.csv"))?;
        let times: Vec<i64> = motion.iter().map(|r| r.time).collect();
        let accel_fs = rate_from_timestamps(&times).context("rate of accelerometer.csv")?;
        let axis = |a: Axis| Signal::new(motion.iter().map(|r| r.get(a)).collect(), accel_fs);
        let accel = [axis(Axis::X)?, axis(Axis::Y)?, axis(Axis::Z)?];

        let hr_rows = self.hr_rows()?;
        let hr = Signal::new(hr_rows.iter().map(|r| r.value).collect(), 1.0)?;
        let hr_timestamps = hr_rows.iter().map(|r| r.time).collect();
        Ok(WatchRecording {
            ppg,
            ppg_timestamps,
            accel,
            hr,
            hr_timestamps,
        })
    }
}

impl SignalSource for WatchDirectory {
    fn read_channel(&self, name: &str) -> Result<Signal> {
        let name = name.trim().to_ascii_lowercase();
        if let Some(axis) = name.strip_prefix("accel_") {
            return self.xyz_signal("accelerometer.csv", axis.parse()?);
        }
        if let Some(axis) = name.strip_prefix("rotation_") {
            return self.xyz_signal("rotation.csv", axis.parse()?);
        }
        match name.as_str() {
            "ppg" | "ppg2" => {
                let rows = self.ppg_rows()?;
                let times: Vec<i64> = rows.iter().map(|r| r.time).collect();
                let fs = rate_from_timestamps(&times).context("rate of ppg.csv")?;
                let data = if name == "ppg" {
                    rows.iter().map(|r| r.value).collect()
                } else {
                    rows.iter()
                        .map(|r| {
                            r.value2.ok_or_else(|| {
                                anyhow!("ppg.csv has no value2 reading at {}", r.time)
                            })
                        })
                        .collect::<Result<Vec<_>>>()?
                };
                Ok(Signal::new(data, fs)?)
            }
            "hr" => Ok(Signal::new(
                self.hr_rows()?.iter().map(|r| r.value).collect(),
                1.0,
            )?),
            "hr_accuracy" => Ok(Signal::new(
                self.hr_rows()?.iter().map(|r| r.accuracy).collect(),
                1.0,
            )?),
            other => bail!("unknown watch channel '{}'", other),
        }
    }
}
