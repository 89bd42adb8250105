//! Forward-head / slouch detection from 2-D body keypoints.
//!
//! A pose model's output is mapped onto generic keypoints by [`adapter::LandmarkAdapter`],
//! classified by [`posture::PostureClassifier`], and the most recent verdict is kept in a
//! [`latest::LatestResult`] for display or streaming consumers.

pub mod adapter;
pub mod config;
pub mod landmarks;
pub mod latest;
pub mod monitor;
pub mod posture;

pub use adapter::{LandmarkAdapter, RawKeypoint, Topology};
pub use config::{ClassifierConfig, Config, DetectionMode, ScoreThreshold};
pub use landmarks::{Keypoint, LandmarkPoint, LandmarkSet};
pub use latest::LatestResult;
pub use monitor::{FrameEvent, PostureMonitor, Status};
pub use posture::{PostureClassifier, PostureResult, Unavailable};
