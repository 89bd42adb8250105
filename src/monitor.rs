use std::time::Instant;

use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::adapter::{LandmarkAdapter, RawKeypoint};
use crate::config::Config;
use crate::landmarks::LandmarkSet;
use crate::latest::LatestResult;
use crate::posture::{PostureClassifier, PostureResult, Unavailable};

const FPS_WINDOW: u64 = 30;

/// Frame rate estimate refreshed every 30 frames.
#[derive(Debug)]
pub struct FpsCounter {
    frames: u64,
    window_start: Instant,
    fps: f64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            frames: 0,
            window_start: now,
            fps: 0.0,
        }
    }

    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f64 {
        self.frames += 1;
        if self.frames % FPS_WINDOW == 0 {
            let elapsed = now.duration_since(self.window_start).as_secs_f64();
            if elapsed > 0.0 {
                self.fps = FPS_WINDOW as f64 / elapsed;
            }
            self.window_start = now;
        }
        self.fps
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Status payload: the posture result fields plus the current frame rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(flatten)]
    pub result: PostureResult,
    pub fps: f64,
}

/// What a processed frame means for the user, given the previous verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    Slouched,
    Recovered,
    Unclassified,
    Upright,
}

impl FrameEvent {
    pub fn from_result(result: &PostureResult, was_slouched: bool) -> Self {
        if result.is_slouched {
            FrameEvent::Slouched
        } else if result.angle.is_none() {
            FrameEvent::Unclassified
        } else if was_slouched {
            FrameEvent::Recovered
        } else {
            FrameEvent::Upright
        }
    }
}

/// Drives classification for a stream of frames and keeps the latest result.
pub struct PostureMonitor {
    adapter: LandmarkAdapter,
    classifier: PostureClassifier,
    latest: LatestResult,
    fps: FpsCounter,
    log_every_n_frames: u64,
    was_slouched: bool,
}

impl PostureMonitor {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            adapter: LandmarkAdapter::new(&config.adapter),
            classifier: PostureClassifier::new(config.classifier.clone())?,
            latest: LatestResult::new(),
            fps: FpsCounter::new(),
            log_every_n_frames: config.log_every_n_frames,
            was_slouched: false,
        })
    }

    /// Handle for consumers that only read the latest result.
    pub fn latest(&self) -> LatestResult {
        self.latest.clone()
    }

    pub fn adapter(&self) -> &LandmarkAdapter {
        &self.adapter
    }

    pub fn process_rows(&mut self, rows: &[RawKeypoint]) -> PostureResult {
        let landmarks = self.adapter.adapt(rows);
        self.process(&landmarks)
    }

    pub fn process(&mut self, landmarks: &LandmarkSet) -> PostureResult {
        let result = self.classifier.classify(landmarks);
        let fps = self.fps.tick();

        // Every slouched frame is reported, not just the onset.
        match FrameEvent::from_result(&result, self.was_slouched) {
            FrameEvent::Slouched => warn!("{}", result.message),
            FrameEvent::Recovered => info!("Posture recovered: {}", result.message),
            FrameEvent::Unclassified => {
                debug!("Frame {} not classified: {}", self.fps.frames(), result.message)
            }
            FrameEvent::Upright => {}
        }
        self.was_slouched = result.is_slouched;

        if self.log_every_n_frames > 0 && self.fps.frames() % self.log_every_n_frames == 0 {
            info!(
                "frame={} fps={:.1} slouched={} confidence={:.2}",
                self.fps.frames(),
                fps,
                result.is_slouched,
                result.confidence
            );
        }

        self.latest.publish(result.clone());
        result
    }

    pub fn status(&self) -> Status {
        Status {
            result: self
                .latest
                .snapshot()
                .unwrap_or_else(|| PostureResult::unavailable(Unavailable::NoPose)),
            fps: self.fps.fps(),
        }
    }
}
