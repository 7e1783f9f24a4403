use super::SignalSource;
use crate::signal::Signal;
use anyhow::{anyhow, Context, Result};
use edf_reader::file_reader::SyncFileReader;
use edf_reader::sync_reader::SyncEDFReader;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Positional reads against an EDF file on disk.
struct DiskFileReader {
    path: PathBuf,
}

impl SyncFileReader for DiskFileReader {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, std::io::Error> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Clinical recorder EDF file, channels addressed by their header label.
#[derive(Debug, Clone)]
pub struct EdfRecording {
    path: PathBuf,
    labels: Vec<String>,
}

impl EdfRecording {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = Self::reader(path)?;
        let labels = reader
            .edf_header
            .channels
            .iter()
            .map(|c| c.label.trim().to_string())
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            labels,
        })
    }

    fn reader(path: &Path) -> Result<SyncEDFReader<DiskFileReader>> {
        SyncEDFReader::init_with_file_reader(DiskFileReader {
            path: path.to_path_buf(),
        })
        .with_context(|| format!("reading EDF header of {}", path.display()))
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Index of the channel labelled `name`, ignoring case and padding.
pub fn find_channel(labels: &[String], name: &str) -> Option<usize> {
    let name = name.trim();
    labels
        .iter()
        .position(|label| label.trim().eq_ignore_ascii_case(name))
}

impl SignalSource for EdfRecording {
    fn read_channel(&self, name: &str) -> Result<Signal> {
        let index = find_channel(&self.labels, name).ok_or_else(|| {
            anyhow!(
                "{} has no '{}' channel (labels: {})",
                self.path.display(),
                name,
                self.labels.join(", ")
            )
        })?;
        let reader = Self::reader(&self.path)?;
        let header = &reader.edf_header;
        let total_duration = header.block_duration * header.number_of_blocks;
        let window = reader
            .read_data_window(0, total_duration)
            .with_context(|| format!("reading EDF data of {}", self.path.display()))?;
        let data = window
            .get(index)
            .ok_or_else(|| anyhow!("missing data for channel '{}'", name))?;
        let fs = header.channels[index].number_of_samples_in_data_record as f64 * 1000.0
            / header.block_duration as f64;
        Ok(Signal::new(data.iter().map(|v| *v as f64).collect(), fs)?)
    }
}
