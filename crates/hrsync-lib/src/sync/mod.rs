pub mod correlate;
pub mod orchestrator;
pub mod synchronizer;

pub use correlate::{correlate, cross_correlation, fast_correlate, CorrelationPeak};
pub use orchestrator::{
    align_by_timestamps, align_session, fuse, scale_crop, timestamp_crop, AlignedSession,
    EarbudRecording, EcgRecording, WatchRecording,
};
pub use synchronizer::{
    apply_sync, synchronize, synchronize_with_config, AlignmentOffset, DeviceRole, Synchronizer,
};
