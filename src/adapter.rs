//! Maps a pose model's keypoint rows onto the generic [`Keypoint`] vocabulary.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::AdapterConfig;
use crate::landmarks::{Keypoint, LandmarkPoint, LandmarkSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// Single-pose COCO layout, rows of `[y, x, score]`.
    #[serde(rename = "movenet17")]
    MoveNet17,
    /// Full-body layout, rows of `[x, y, z, visibility, ...]`.
    #[serde(rename = "blazepose33")]
    BlazePose33,
}

impl Topology {
    pub fn keypoint_count(self) -> usize {
        match self {
            Topology::MoveNet17 => 17,
            Topology::BlazePose33 => 33,
        }
    }

    /// Values per row the model must emit at minimum.
    fn min_row_len(self) -> usize {
        match self {
            Topology::MoveNet17 => 3,
            Topology::BlazePose33 => 4,
        }
    }

    /// Row index of `keypoint` in this topology's output.
    pub fn index_of(self, keypoint: Keypoint) -> usize {
        match self {
            // COCO order matches the declaration order of `Keypoint`.
            Topology::MoveNet17 => keypoint as usize,
            Topology::BlazePose33 => match keypoint {
                Keypoint::Nose => 0,
                Keypoint::LeftEye => 2,
                Keypoint::RightEye => 5,
                Keypoint::LeftEar => 7,
                Keypoint::RightEar => 8,
                Keypoint::LeftShoulder => 11,
                Keypoint::RightShoulder => 12,
                Keypoint::LeftElbow => 13,
                Keypoint::RightElbow => 14,
                Keypoint::LeftWrist => 15,
                Keypoint::RightWrist => 16,
                Keypoint::LeftHip => 23,
                Keypoint::RightHip => 24,
                Keypoint::LeftKnee => 25,
                Keypoint::RightKnee => 26,
                Keypoint::LeftAnkle => 27,
                Keypoint::RightAnkle => 28,
            },
        }
    }
}

/// One keypoint row as emitted by a backend, already split into fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawKeypoint {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

pub struct LandmarkAdapter {
    topology: Topology,
    input_size: Option<(u32, u32)>,
}

impl LandmarkAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            topology: config.topology,
            input_size: config.input_size,
        }
    }

    /// Splits a flat model output of the given shape into rows. The last dimension is
    /// the per-keypoint stride; leading dimensions are flattened.
    pub fn decode(&self, data: &[f32], shape: &[usize]) -> Result<Vec<RawKeypoint>> {
        let stride = *shape
            .last()
            .ok_or_else(|| anyhow::anyhow!("Empty output shape"))?;
        if stride < self.topology.min_row_len() {
            anyhow::bail!(
                "{:?} rows need at least {} values, got {}",
                self.topology,
                self.topology.min_row_len(),
                stride
            );
        }

        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| anyhow::anyhow!("Output shape {:?} overflows usize", shape))?;
        if expected != data.len() {
            anyhow::bail!(
                "Output shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            );
        }

        let rows = data
            .chunks_exact(stride)
            .map(|row| match self.topology {
                Topology::MoveNet17 => RawKeypoint {
                    x: row[1],
                    y: row[0],
                    score: row[2],
                },
                Topology::BlazePose33 => RawKeypoint {
                    x: row[0],
                    y: row[1],
                    score: row[3],
                },
            })
            .collect();

        Ok(rows)
    }

    /// Rows past the topology's keypoint count are ignored; missing rows leave the
    /// corresponding keypoints absent.
    pub fn adapt(&self, rows: &[RawKeypoint]) -> LandmarkSet {
        let (sx, sy) = match self.input_size {
            Some((w, h)) => (f64::from(w), f64::from(h)),
            None => (1.0, 1.0),
        };
        if rows.len() < self.topology.keypoint_count() {
            log::debug!(
                "{:?} expects {} rows, got {}",
                self.topology,
                self.topology.keypoint_count(),
                rows.len()
            );
        }

        Keypoint::ALL
            .into_iter()
            .filter_map(|kp| {
                let row = rows.get(self.topology.index_of(kp))?;
                let score = f64::from(row.score);
                let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
                let point = LandmarkPoint::new(f64::from(row.x) / sx, f64::from(row.y) / sy, score);
                Some((kp, point))
            })
            .collect()
    }
}
