use super::SignalSource;
use crate::signal::Signal;
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, Trim};
use std::path::{Path, PathBuf};

/// Multi-channel CSV export of a recorder: one column per channel, named in
/// the header row, sampled at a known rate.
#[derive(Debug, Clone)]
pub struct ChannelCsv {
    path: PathBuf,
    fs: f64,
}

impl ChannelCsv {
    pub fn new(path: &Path, fs: f64) -> Self {
        Self {
            path: path.to_path_buf(),
            fs,
        }
    }
}

impl SignalSource for ChannelCsv {
    fn read_channel(&self, name: &str) -> Result<Signal> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let headers = reader.headers()?.clone();
        let column = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .with_context(|| format!("{} has no '{}' column", self.path.display(), name))?;
        let mut values = Vec::new();
        for record in reader.records() {
            let record = record.context("reading record")?;
            let field = record
                .get(column)
                .ok_or_else(|| anyhow!("short record at line {}", values.len() + 2))?;
            let value = field
                .parse::<f64>()
                .with_context(|| format!("parsing {} value '{}'", name, field))?;
            values.push(value);
        }
        Ok(Signal::new(values, self.fs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_named_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rig.csv");
        std::fs::write(
            &path,
            "ECG, Accelerometer_X\n0.1, 9.8\n0.4, 9.7\n-0.2, 9.9\n",
        )
        .unwrap();
        let source = ChannelCsv::new(&path, 200.0);
        let ecg = source.read_channel("ECG").unwrap();
        assert_eq!(ecg.samples(), &[0.1, 0.4, -0.2]);
        assert_eq!(ecg.fs(), 200.0);
        let accel = source.read_channel("accelerometer_x").unwrap();
        assert_eq!(accel.samples()[2], 9.9);
        assert!(source.read_channel("Accelerometer_Y").is_err());
    }

    #[test]
    fn rejects_unparsable_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rig.csv");
        std::fs::write(&path, "ECG\n0.1\nbad\n").unwrap();
        assert!(ChannelCsv::new(&path, 100.0).read_channel("ECG").is_err());
    }
}
