use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use hrsync_lib::{
    align_session, cancel_motion, compare_traces, evaluate_segments, fuse, fuse_kalman,
    heart_rate_trace,
    io::{
        load_earbud_recording, load_ecg_recording, ChannelCsv, EarbudDirectory, EdfRecording,
        SignalSource, WatchDirectory,
    },
    read_session_config, split_session, synchronize_with_config, timestamp_crop,
    AlignmentOffset, Axis, BandFilter, EcgRecording, Error, ErrorSummary, PeakRateEstimator,
    SegmentReport, SessionConfig, Signal, SinglePoleBandpass, SpectralRateEstimator,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "hrsync",
    version,
    about = "hrsync: align and fuse heart-rate recordings from wearables"
)]
struct Cli {
    /// Session tunables (TOML); absent keys keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Time offset between the ECG rig and the watch from their accelerometers
    Offset {
        #[arg(long)]
        ecg: PathBuf,
        /// Sampling rate of a CSV ECG export (ignored for EDF)
        #[arg(long)]
        ecg_fs: Option<f64>,
        #[arg(long)]
        watch: PathBuf,
    },
    /// Band-limit the watch PPG and cancel motion with the accelerometer axes
    MotionFilter {
        #[arg(long)]
        watch: PathBuf,
        /// Reference axes in filtering order, e.g. "xyz"
        #[arg(long)]
        axes: Option<String>,
    },
    /// Kalman-fuse earbud and watch heart rate aligned by timestamps
    Fuse {
        #[arg(long)]
        ear: PathBuf,
        #[arg(long)]
        watch: PathBuf,
    },
    /// Align all devices, fuse, and score against the ECG
    Session {
        #[arg(long)]
        ecg: PathBuf,
        #[arg(long)]
        ecg_fs: Option<f64>,
        #[arg(long)]
        watch: PathBuf,
        #[arg(long)]
        ear: Option<PathBuf>,
        /// Also score PPG against ECG in windows of this many seconds
        #[arg(long)]
        segment_s: Option<f64>,
    },
    /// Run `session` for every recording listed in a TOML manifest
    Batch {
        #[arg(long)]
        manifest: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(cli.log_level.as_str())).init();
    let cfg = match &cli.config {
        Some(path) => read_session_config(path)?,
        None => SessionConfig::default(),
    };
    match cli.command {
        Commands::Offset { ecg, ecg_fs, watch } => cmd_offset(&cfg, &ecg, ecg_fs, &watch)?,
        Commands::MotionFilter { watch, axes } => {
            cmd_motion_filter(&cfg, &watch, axes.as_deref())?
        }
        Commands::Fuse { ear, watch } => cmd_fuse(&cfg, &ear, &watch)?,
        Commands::Session {
            ecg,
            ecg_fs,
            watch,
            ear,
            segment_s,
        } => {
            let recording = Recording {
                name: None,
                ecg,
                ecg_fs,
                watch,
                ear,
            };
            let report = run_session(&cfg, &recording, segment_s)?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Commands::Batch { manifest } => cmd_batch(&cfg, &manifest)?,
    }
    Ok(())
}

fn open_ecg(path: &Path, fs: Option<f64>, up_axis: Axis) -> Result<EcgRecording> {
    let is_edf = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("edf"))
        .unwrap_or(false);
    let source: Box<dyn SignalSource> = if is_edf {
        Box::new(EdfRecording::open(path)?)
    } else {
        let fs = fs.with_context(|| {
            format!("--ecg-fs is required for CSV recording {}", path.display())
        })?;
        Box::new(ChannelCsv::new(path, fs))
    };
    load_ecg_recording(source.as_ref(), up_axis)
        .with_context(|| format!("loading ECG recording {}", path.display()))
}

fn cmd_offset(cfg: &SessionConfig, ecg: &Path, ecg_fs: Option<f64>, watch: &Path) -> Result<()> {
    let ecg = open_ecg(ecg, ecg_fs, cfg.sync.ecg_up_axis)?;
    let watch = WatchDirectory::open(watch)?.load()?;
    let up = &watch.accel[cfg.sync.watch_up_axis.index()];
    let offset = synchronize_with_config(up, &ecg.accel_up, &cfg.sync)?;
    println!("{}", serde_json::to_string(&offset)?);
    Ok(())
}

fn cmd_motion_filter(cfg: &SessionConfig, watch: &Path, axes: Option<&str>) -> Result<()> {
    let mut motion = cfg.motion.clone();
    if let Some(list) = axes {
        motion.axes = Axis::parse_list(list)?;
    }
    let watch = WatchDirectory::open(watch)?.load()?;
    let band = SinglePoleBandpass;
    let limit =
        |s: &Signal| band.apply(s, motion.band_low_hz, motion.band_high_hz, motion.band_order);
    let ppg = limit(&watch.ppg)?;
    let references = motion
        .axes
        .iter()
        .map(|axis| limit(&watch.accel[axis.index()]))
        .collect::<hrsync_lib::Result<Vec<_>>>()?;
    let clean = cancel_motion(&ppg, &references, &motion)?;
    println!("{}", serde_json::to_string(&clean)?);
    Ok(())
}

#[derive(Serialize)]
struct FuseReport {
    watch_crop_samples: usize,
    ear_crop_samples: usize,
    fused: Signal,
}

fn cmd_fuse(cfg: &SessionConfig, ear: &Path, watch: &Path) -> Result<()> {
    let ear = load_earbud_recording(&EarbudDirectory::open(ear)?)?;
    let watch = WatchDirectory::open(watch)?;
    let watch_hr = watch.read_channel("hr")?;
    let (watch_crop, ear_crop) = timestamp_crop(&watch.hr_timestamps()?, &ear.timestamps)?;
    info!("fusing after cropping watch {} s, earbuds {} s", watch_crop, ear_crop);
    let fused = fuse_kalman(
        &ear.hr.skip(ear_crop),
        &watch_hr.skip(watch_crop),
        cfg.kalman.predict_noise,
        cfg.kalman.ear_noise,
    )?;
    let report = FuseReport {
        watch_crop_samples: watch_crop,
        ear_crop_samples: ear_crop,
        fused,
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

/// One entry of a batch manifest. Relative paths resolve against the
/// manifest's directory.
#[derive(Debug, Clone, Deserialize)]
struct Recording {
    #[serde(default)]
    name: Option<String>,
    ecg: PathBuf,
    #[serde(default)]
    ecg_fs: Option<f64>,
    watch: PathBuf,
    #[serde(default)]
    ear: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    segment_s: Option<f64>,
    #[serde(default, rename = "recording")]
    recordings: Vec<Recording>,
}

#[derive(Serialize)]
struct FusedSummary {
    samples: usize,
    mean_bpm: Option<f64>,
    /// Fused trace against the ECG-derived heart rate.
    vs_ecg: Option<ErrorSummary>,
}

#[derive(Serialize)]
struct SessionReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    offset: AlignmentOffset,
    watch_crop_samples: usize,
    ear_crop_samples: usize,
    ecg_samples: usize,
    ppg_samples: usize,
    watch_hr_samples: usize,
    ear_hr_samples: Option<usize>,
    fused: Option<FusedSummary>,
    segments: Option<SegmentReport>,
}

fn run_session(
    cfg: &SessionConfig,
    recording: &Recording,
    segment_s: Option<f64>,
) -> Result<SessionReport> {
    let ecg = open_ecg(&recording.ecg, recording.ecg_fs, cfg.sync.ecg_up_axis)?;
    let watch = WatchDirectory::open(&recording.watch)?.load()?;
    let ear = match &recording.ear {
        Some(dir) => Some(load_earbud_recording(&EarbudDirectory::open(dir)?)?),
        None => None,
    };
    let session = align_session(&ecg, &watch, ear.as_ref(), cfg)?;

    let hr_cfg = &cfg.heart_rate;
    let fused = match session.ear_hr {
        Some(_) => {
            let trace = fuse(&session, cfg)?;
            let readings: Vec<f64> = trace
                .samples()
                .iter()
                .copied()
                .filter(|v| *v != 0.0)
                .collect();
            let mean_bpm = (!readings.is_empty())
                .then(|| readings.iter().sum::<f64>() / readings.len() as f64);
            let estimator = PeakRateEstimator::new(hr_cfg.min_bpm, hr_cfg.max_bpm);
            let vs_ecg = heart_rate_trace(&session.ecg, &estimator, hr_cfg.ecg_window_s)
                .and_then(|reference| compare_traces(&trace, &reference, hr_cfg.warmup_s));
            let vs_ecg = match vs_ecg {
                Ok(summary) => Some(summary),
                Err(Error::InvalidSignal(reason)) => {
                    warn!("fused trace not scored against ECG: {}", reason);
                    None
                }
                Err(e) => return Err(e.into()),
            };
            Some(FusedSummary {
                samples: trace.len(),
                mean_bpm,
                vs_ecg,
            })
        }
        None => None,
    };

    let segments = match segment_s {
        Some(seconds) => {
            let windows = split_session(&session, seconds)?;
            Some(evaluate_segments(
                &windows,
                cfg,
                &SinglePoleBandpass,
                &SpectralRateEstimator::new(hr_cfg.min_bpm, hr_cfg.max_bpm),
                &PeakRateEstimator::new(hr_cfg.min_bpm, hr_cfg.max_bpm),
            )?)
        }
        None => None,
    };

    Ok(SessionReport {
        name: recording.name.clone(),
        offset: session.offset,
        watch_crop_samples: session.watch_crop_samples,
        ear_crop_samples: session.ear_crop_samples,
        ecg_samples: session.ecg.len(),
        ppg_samples: session.ppg.len(),
        watch_hr_samples: session.watch_hr.len(),
        ear_hr_samples: session.ear_hr.as_ref().map(|s| s.len()),
        fused,
        segments,
    })
}

#[derive(Serialize)]
struct Skipped {
    name: String,
    reason: String,
}

#[derive(Serialize)]
struct BatchReport {
    sessions: Vec<SessionReport>,
    skipped: Vec<Skipped>,
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn cmd_batch(cfg: &SessionConfig, manifest_path: &Path) -> Result<()> {
    let contents = fs::read_to_string(manifest_path)
        .with_context(|| format!("failed to read manifest {}", manifest_path.display()))?;
    let manifest: Manifest = toml::from_str(&contents)
        .with_context(|| format!("parsing manifest {}", manifest_path.display()))?;
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let mut report = BatchReport {
        sessions: Vec::new(),
        skipped: Vec::new(),
    };
    for (i, entry) in manifest.recordings.iter().enumerate() {
        let name = entry
            .name
            .clone()
            .unwrap_or_else(|| format!("recording-{}", i + 1));
        let recording = Recording {
            name: Some(name.clone()),
            ecg: resolve(base, &entry.ecg),
            ecg_fs: entry.ecg_fs,
            watch: resolve(base, &entry.watch),
            ear: entry.ear.as_ref().map(|p| resolve(base, p)),
        };
        match run_session(cfg, &recording, manifest.segment_s) {
            Ok(session) => report.sessions.push(session),
            Err(err) => match err.downcast_ref::<Error>() {
                Some(Error::SyncImpossible(reason)) => {
                    warn!("skipping {}: {}", name, reason);
                    report.skipped.push(Skipped {
                        name,
                        reason: reason.clone(),
                    });
                }
                _ => return Err(err.context(format!("recording {}", name))),
            },
        }
    }
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
