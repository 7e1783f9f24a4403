pub mod adaptive;
pub mod bandpass;
pub mod kalman;

pub use adaptive::{
    adaptive_filter, adaptive_filter_with_taps, cancel_motion, AdaptiveMethod, AdaptiveOutput,
};
pub use bandpass::{BandFilter, SinglePoleBandpass};
pub use kalman::{fuse_kalman, fuse_kalman_states, KalmanFusion, KalmanState};
