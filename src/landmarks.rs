use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nalgebra::Point2;
use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Backend-independent body keypoint identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keypoint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Keypoint {
    pub const ALL: [Keypoint; 17] = [
        Keypoint::Nose,
        Keypoint::LeftEye,
        Keypoint::RightEye,
        Keypoint::LeftEar,
        Keypoint::RightEar,
        Keypoint::LeftShoulder,
        Keypoint::RightShoulder,
        Keypoint::LeftElbow,
        Keypoint::RightElbow,
        Keypoint::LeftWrist,
        Keypoint::RightWrist,
        Keypoint::LeftHip,
        Keypoint::RightHip,
        Keypoint::LeftKnee,
        Keypoint::RightKnee,
        Keypoint::LeftAnkle,
        Keypoint::RightAnkle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Keypoint::Nose => "nose",
            Keypoint::LeftEye => "left_eye",
            Keypoint::RightEye => "right_eye",
            Keypoint::LeftEar => "left_ear",
            Keypoint::RightEar => "right_ear",
            Keypoint::LeftShoulder => "left_shoulder",
            Keypoint::RightShoulder => "right_shoulder",
            Keypoint::LeftElbow => "left_elbow",
            Keypoint::RightElbow => "right_elbow",
            Keypoint::LeftWrist => "left_wrist",
            Keypoint::RightWrist => "right_wrist",
            Keypoint::LeftHip => "left_hip",
            Keypoint::RightHip => "right_hip",
            Keypoint::LeftKnee => "left_knee",
            Keypoint::RightKnee => "right_knee",
            Keypoint::LeftAnkle => "left_ankle",
            Keypoint::RightAnkle => "right_ankle",
        }
    }
}

impl fmt::Display for Keypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Keypoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Keypoint::ALL
            .into_iter()
            .find(|kp| kp.name() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown keypoint: {s}"))
    }
}

/// One detected keypoint in normalized image coordinates (origin top-left, y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    #[serde(alias = "confidence", alias = "visibility")]
    pub score: f64,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64, score: f64) -> Self {
        Self { x, y, score }
    }

    /// Detected with enough confidence to be used. NaN scores or coordinates never are.
    pub fn is_reliable(&self, threshold: f64) -> bool {
        self.score >= threshold && self.x.is_finite() && self.y.is_finite()
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// Keypoints reported for one frame, keyed by generic identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    points: BTreeMap<Keypoint, LandmarkPoint>,
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keypoint: Keypoint, point: LandmarkPoint) -> Self {
        self.insert(keypoint, point);
        self
    }

    pub fn insert(&mut self, keypoint: Keypoint, point: LandmarkPoint) -> Option<LandmarkPoint> {
        self.points.insert(keypoint, point)
    }

    pub fn get(&self, keypoint: Keypoint) -> Option<&LandmarkPoint> {
        self.points.get(&keypoint)
    }

    /// The keypoint if present and reliable at `threshold`.
    pub fn reliable(&self, keypoint: Keypoint, threshold: f64) -> Option<&LandmarkPoint> {
        self.get(keypoint).filter(|p| p.is_reliable(threshold))
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

struct LandmarkSetVisitor;

impl<'de> Visitor<'de> for LandmarkSetVisitor {
    type Value = LandmarkSet;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of keypoint names to points")
    }

    // Values under names outside the generic vocabulary are skipped unparsed; a null
    // under a known name means the keypoint was not returned.
    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut set = LandmarkSet::new();
        while let Some(name) = map.next_key::<String>()? {
            match name.parse::<Keypoint>() {
                Ok(kp) => {
                    if let Some(point) = map.next_value::<Option<LandmarkPoint>>()? {
                        set.insert(kp, point);
                    }
                }
                Err(_) => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(set)
    }
}

impl<'de> Deserialize<'de> for LandmarkSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(LandmarkSetVisitor)
    }
}

impl FromIterator<(Keypoint, LandmarkPoint)> for LandmarkSet {
    fn from_iter<I: IntoIterator<Item = (Keypoint, LandmarkPoint)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl Serialize for LandmarkSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.points.iter().map(|(kp, p)| (kp.name(), p)))
    }
}
