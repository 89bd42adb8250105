use std::fmt;

use anyhow::Result;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::config::{ClassifierConfig, DetectionMode};
use crate::landmarks::{Keypoint, LandmarkSet};

/// Outcome of classifying one frame. Serialized field names are part of the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureResult {
    pub is_slouched: bool,
    pub confidence: f64,
    pub angle: Option<f64>,
    pub message: String,
}

impl PostureResult {
    pub fn unavailable(reason: Unavailable) -> Self {
        Self {
            is_slouched: false,
            confidence: 0.0,
            angle: None,
            message: reason.to_string(),
        }
    }
}

/// Why a frame could not be classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    NoPose,
    ShouldersMissing,
    LandmarksMissing(Vec<Keypoint>),
    AngleUndefined,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailable::NoPose => f.write_str("no pose detected"),
            Unavailable::ShouldersMissing => f.write_str("shoulders not detected"),
            Unavailable::LandmarksMissing(missing) => {
                let names: Vec<&str> = missing.iter().map(|kp| kp.name()).collect();
                write!(f, "required landmarks not detected: {}", names.join(", "))
            }
            Unavailable::AngleUndefined => f.write_str("angle not computable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub is_slouched: bool,
    pub confidence: f64,
}

const STRICT_REQUIRED: [Keypoint; 4] = [
    Keypoint::LeftShoulder,
    Keypoint::RightShoulder,
    Keypoint::LeftHip,
    Keypoint::RightHip,
];

/// Stateless slouch classifier. Safe to share between threads.
#[derive(Debug, Clone)]
pub struct PostureClassifier {
    config: ClassifierConfig,
}

impl PostureClassifier {
    /// Rejects configurations whose boundary or confidence windows are meaningless.
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn classify(&self, landmarks: &LandmarkSet) -> PostureResult {
        if landmarks.is_empty() {
            return PostureResult::unavailable(Unavailable::NoPose);
        }

        if self.config.mode == DetectionMode::Strict {
            let missing: Vec<Keypoint> = STRICT_REQUIRED
                .into_iter()
                .filter(|kp| landmarks.reliable(*kp, self.config.score_threshold).is_none())
                .collect();
            if !missing.is_empty() {
                return PostureResult::unavailable(Unavailable::LandmarksMissing(missing));
            }
        }

        let Some((left, right)) =
            self.reliable_pair(landmarks, Keypoint::LeftShoulder, Keypoint::RightShoulder)
        else {
            return PostureResult::unavailable(Unavailable::ShouldersMissing);
        };
        let shoulder_mid = nalgebra::center(&left, &right);
        let neck = self.estimate_neck(landmarks, &shoulder_mid);

        match self.reliable_pair(landmarks, Keypoint::LeftHip, Keypoint::RightHip) {
            Some((left, right)) => {
                self.classify_by_hips(&neck, &shoulder_mid, &nalgebra::center(&left, &right))
            }
            None => self.classify_by_shoulder_line(&neck, &shoulder_mid),
        }
    }

    /// Decision on an already measured neck-shoulder-hip angle.
    pub fn hip_angle_verdict(&self, angle: f64) -> Verdict {
        let boundary = self.config.slouch_boundary();
        let window = self.config.hip.confidence_window;

        // Exactly on the boundary is not a slouch.
        if angle < boundary {
            Verdict {
                is_slouched: true,
                confidence: unit((boundary - angle) / window),
            }
        } else {
            Verdict {
                is_slouched: false,
                confidence: unit((angle - boundary) / window),
            }
        }
    }

    /// Decision from the neck-shoulder line angle (degrees from horizontal) and the
    /// vertical neck offset `neck.y - shoulder_mid.y`.
    pub fn shoulder_line_verdict(&self, angle: f64, y_diff: f64) -> Verdict {
        let tuning = &self.config.shoulder;
        let raised = y_diff < -tuning.y_diff_threshold;
        let steep = angle > tuning.max_line_angle;

        if raised || steep {
            let by_offset = (y_diff.abs() / tuning.y_diff_scale).min(1.0);
            let by_angle = if steep {
                ((angle - tuning.max_line_angle) / tuning.line_angle_window).min(1.0)
            } else {
                0.0
            };
            Verdict {
                is_slouched: true,
                confidence: unit(by_offset.max(by_angle)),
            }
        } else {
            Verdict {
                is_slouched: false,
                confidence: unit((tuning.y_diff_threshold + y_diff) / tuning.ok_window),
            }
        }
    }

    fn reliable_pair(
        &self,
        landmarks: &LandmarkSet,
        a: Keypoint,
        b: Keypoint,
    ) -> Option<(Point2<f64>, Point2<f64>)> {
        let threshold = self.config.score_threshold;
        let a = landmarks.reliable(a, threshold)?;
        let b = landmarks.reliable(b, threshold)?;
        Some((a.position(), b.position()))
    }

    /// Halfway between nose and shoulders, or a fixed offset above the shoulders when
    /// the face is not visible.
    fn estimate_neck(&self, landmarks: &LandmarkSet, shoulder_mid: &Point2<f64>) -> Point2<f64> {
        match landmarks.reliable(Keypoint::Nose, self.config.score_threshold) {
            Some(nose) => nalgebra::center(&nose.position(), shoulder_mid),
            None => Point2::new(
                shoulder_mid.x,
                shoulder_mid.y - self.config.shoulder.neck_offset,
            ),
        }
    }

    fn classify_by_hips(
        &self,
        neck: &Point2<f64>,
        shoulder_mid: &Point2<f64>,
        hip_mid: &Point2<f64>,
    ) -> PostureResult {
        let Some(angle) = angle_at_vertex(neck, shoulder_mid, hip_mid) else {
            return PostureResult::unavailable(Unavailable::AngleUndefined);
        };

        let verdict = self.hip_angle_verdict(angle);
        let message = if verdict.is_slouched {
            format!("slouched, angle={angle:.1}°")
        } else {
            format!("posture OK, angle={angle:.1}°")
        };

        PostureResult {
            is_slouched: verdict.is_slouched,
            confidence: verdict.confidence,
            angle: Some(angle),
            message,
        }
    }

    fn classify_by_shoulder_line(
        &self,
        neck: &Point2<f64>,
        shoulder_mid: &Point2<f64>,
    ) -> PostureResult {
        let v = shoulder_mid - neck;
        let angle = if v.x == 0.0 {
            90.0
        } else {
            v.y.abs().atan2(v.x.abs()).to_degrees()
        };
        // Negative when the neck sits above the shoulder line.
        let y_diff = neck.y - shoulder_mid.y;

        let verdict = self.shoulder_line_verdict(angle, y_diff);
        let offset_pct = y_diff.abs() * 100.0;
        let message = if verdict.is_slouched {
            format!("slouched, neck-shoulder offset={offset_pct:.1}%")
        } else {
            format!("posture OK, neck-shoulder offset={offset_pct:.1}%")
        };

        PostureResult {
            is_slouched: verdict.is_slouched,
            confidence: verdict.confidence,
            angle: Some(angle),
            message,
        }
    }
}

/// Angle in degrees at `vertex` between the rays to `a` and `b`.
/// `None` when either ray has zero length.
pub fn angle_at_vertex(a: &Point2<f64>, vertex: &Point2<f64>, b: &Point2<f64>) -> Option<f64> {
    let va = a - vertex;
    let vb = b - vertex;
    let (na, nb) = (va.norm(), vb.norm());
    if na == 0.0 || nb == 0.0 {
        return None;
    }

    let cos = (va.dot(&vb) / (na * nb)).clamp(-1.0, 1.0);
    let angle = cos.acos().to_degrees();
    angle.is_finite().then_some(angle)
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LandmarkPoint;

    fn classifier(mode: DetectionMode) -> PostureClassifier {
        PostureClassifier::new(ClassifierConfig::default().with_mode(mode)).unwrap()
    }

    fn torso() -> LandmarkSet {
        LandmarkSet::new()
            .with(Keypoint::LeftShoulder, LandmarkPoint::new(0.4, 0.5, 0.9))
            .with(Keypoint::RightShoulder, LandmarkPoint::new(0.6, 0.5, 0.9))
            .with(Keypoint::LeftHip, LandmarkPoint::new(0.45, 0.8, 0.9))
            .with(Keypoint::RightHip, LandmarkPoint::new(0.55, 0.8, 0.9))
    }

    fn shoulders_only() -> LandmarkSet {
        LandmarkSet::new()
            .with(Keypoint::LeftShoulder, LandmarkPoint::new(0.4, 0.5, 0.9))
            .with(Keypoint::RightShoulder, LandmarkPoint::new(0.6, 0.5, 0.9))
    }

    #[test]
    fn empty_set_is_no_pose() {
        let result = classifier(DetectionMode::Adaptive).classify(&LandmarkSet::new());
        assert_eq!(result, PostureResult::unavailable(Unavailable::NoPose));
        assert_eq!(result.message, "no pose detected");
    }

    #[test]
    fn unreliable_shoulder_counts_as_missing() {
        let set = torso().with(Keypoint::RightShoulder, LandmarkPoint::new(0.6, 0.5, 0.29));
        let result = classifier(DetectionMode::Adaptive).classify(&set);
        assert!(!result.is_slouched);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.angle, None);
        assert_eq!(result.message, "shoulders not detected");
    }

    #[test]
    fn score_threshold_is_configurable() {
        let set = torso().with(Keypoint::LeftHip, LandmarkPoint::new(0.45, 0.8, 0.4));
        let lenient = PostureClassifier::new(ClassifierConfig::default()).unwrap();
        let strict = PostureClassifier::new(
            ClassifierConfig::default()
                .with_mode(DetectionMode::Strict)
                .with_score_threshold(0.5),
        )
        .unwrap();
        assert!(lenient.classify(&set).message.contains("angle="));
        assert_eq!(
            strict.classify(&set).message,
            "required landmarks not detected: left_hip"
        );
    }

    #[test]
    fn straight_spine_without_nose() {
        let result = classifier(DetectionMode::Adaptive).classify(&torso());
        let angle = result.angle.unwrap();
        assert!(angle > 179.99, "angle {angle}");
        assert!(!result.is_slouched);
        assert_eq!(result.confidence, 1.0);
        assert!(result.message.starts_with("posture OK"));
        assert!(result.message.contains("180.0"));
    }

    #[test]
    fn forward_head_at_130_degrees() {
        // Place the nose so the neck sits 130 degrees from the spine, 0.05 from the shoulders.
        let theta = 130f64.to_radians();
        let neck = (0.5 + 0.05 * theta.sin(), 0.5 + 0.05 * theta.cos());
        let nose = LandmarkPoint::new(2.0 * neck.0 - 0.5, 2.0 * neck.1 - 0.5, 0.9);

        let result = classifier(DetectionMode::Strict).classify(&torso().with(Keypoint::Nose, nose));
        let angle = result.angle.unwrap();
        assert!((angle - 130.0).abs() < 1e-6, "angle {angle}");
        assert!(result.is_slouched);
        assert!((result.confidence - 0.5).abs() < 1e-6);
        assert!(result.message.contains("130.0"));
    }

    #[test]
    fn hip_boundary_is_exclusive() {
        let c = classifier(DetectionMode::Adaptive);
        let on = c.hip_angle_verdict(145.0);
        assert!(!on.is_slouched);
        assert_eq!(on.confidence, 0.0);

        let below = c.hip_angle_verdict(144.9);
        assert!(below.is_slouched);
        assert!((below.confidence - 0.1 / 30.0).abs() < 1e-9);

        assert_eq!(c.hip_angle_verdict(90.0).confidence, 1.0);
        assert_eq!(c.hip_angle_verdict(175.0).confidence, 1.0);
    }

    #[test]
    fn threshold_angle_moves_boundary() {
        let mut config = ClassifierConfig::default();
        config.threshold_angle = 20.0;
        let c = PostureClassifier::new(config).unwrap();
        assert!(c.hip_angle_verdict(155.0).is_slouched);
        assert!(!c.hip_angle_verdict(160.0).is_slouched);
    }

    #[test]
    fn meaningless_configs_are_refused() {
        let mut config = ClassifierConfig::default();
        config.threshold_angle = 180.0;
        assert!(PostureClassifier::new(config).is_err());

        let mut config = ClassifierConfig::default();
        config.hip.confidence_window = 0.0;
        assert!(PostureClassifier::new(config).is_err());

        let mut config = ClassifierConfig::default();
        config.shoulder.ok_window = f64::INFINITY;
        assert!(PostureClassifier::new(config).is_err());

        assert!(PostureClassifier::new(ClassifierConfig::default().with_score_threshold(-0.1)).is_err());
    }

    #[test]
    fn neck_on_shoulder_midpoint_is_degenerate() {
        let set = torso().with(Keypoint::Nose, LandmarkPoint::new(0.5, 0.5, 0.9));
        let result = classifier(DetectionMode::Adaptive).classify(&set);
        assert_eq!(result.angle, None);
        assert!(!result.is_slouched);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.message, "angle not computable");
    }

    #[test]
    fn hips_on_shoulder_midpoint_is_degenerate() {
        let set = torso()
            .with(Keypoint::LeftHip, LandmarkPoint::new(0.4, 0.5, 0.9))
            .with(Keypoint::RightHip, LandmarkPoint::new(0.6, 0.5, 0.9));
        let result = classifier(DetectionMode::Strict).classify(&set);
        assert_eq!(result, PostureResult::unavailable(Unavailable::AngleUndefined));
    }

    #[test]
    fn strict_mode_names_missing_hips() {
        let set = shoulders_only().with(Keypoint::Nose, LandmarkPoint::new(0.5, 0.3, 0.9));
        let result = classifier(DetectionMode::Strict).classify(&set);
        assert!(!result.is_slouched);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.angle, None);
        assert_eq!(result.message, "required landmarks not detected: left_hip, right_hip");
    }

    #[test]
    fn strict_mode_lists_every_missing_landmark() {
        let set = LandmarkSet::new()
            .with(Keypoint::RightShoulder, LandmarkPoint::new(0.6, 0.5, 0.9))
            .with(Keypoint::LeftHip, LandmarkPoint::new(0.45, 0.8, 0.1));
        let result = classifier(DetectionMode::Strict).classify(&set);
        assert_eq!(
            result.message,
            "required landmarks not detected: left_shoulder, left_hip, right_hip"
        );
    }

    #[test]
    fn adaptive_mode_falls_back_to_shoulder_line() {
        let set = shoulders_only().with(Keypoint::Nose, LandmarkPoint::new(0.5, 0.3, 0.9));
        let result = classifier(DetectionMode::Adaptive).classify(&set);
        // neck (0.5, 0.4): straight above the shoulders, 10% offset
        assert_eq!(result.angle, Some(90.0));
        assert!(result.is_slouched);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.message, "slouched, neck-shoulder offset=10.0%");
    }

    #[test]
    fn shoulder_line_with_level_neck_is_ok() {
        let set = shoulders_only().with(Keypoint::Nose, LandmarkPoint::new(0.7, 0.5, 0.9));
        let result = classifier(DetectionMode::Adaptive).classify(&set);
        assert_eq!(result.angle, Some(0.0));
        assert!(!result.is_slouched);
        assert!((result.confidence - 0.5).abs() < 1e-12);
        assert!(result.message.starts_with("posture OK"));
    }

    #[test]
    fn shoulder_line_boundary_is_exclusive() {
        let c = classifier(DetectionMode::Adaptive);
        let on = c.shoulder_line_verdict(40.0, -0.015);
        assert!(!on.is_slouched);
        assert_eq!(on.confidence, 0.0);

        let past = c.shoulder_line_verdict(40.0, -0.0151);
        assert!(past.is_slouched);
        assert!((past.confidence - 0.0151 / 0.08).abs() < 1e-12);
    }

    #[test]
    fn steep_line_alone_triggers_and_stronger_signal_wins() {
        let c = classifier(DetectionMode::Adaptive);
        let steep = c.shoulder_line_verdict(82.5, 0.0);
        assert!(steep.is_slouched);
        assert!((steep.confidence - 0.5).abs() < 1e-12);

        let both = c.shoulder_line_verdict(76.5, -0.04);
        assert!((both.confidence - 0.5).abs() < 1e-12);

        let at_limit = c.shoulder_line_verdict(75.0, 0.0);
        assert!(!at_limit.is_slouched);
    }

    #[test]
    fn low_neck_saturates_ok_confidence() {
        let v = classifier(DetectionMode::Adaptive).shoulder_line_verdict(10.0, 0.05);
        assert!(!v.is_slouched);
        assert_eq!(v.confidence, 1.0);
    }

    #[test]
    fn non_finite_coordinates_never_escape() {
        let set = torso().with(Keypoint::Nose, LandmarkPoint::new(f64::NAN, 0.2, 0.9));
        let result = classifier(DetectionMode::Adaptive).classify(&set);
        assert!(result.angle.unwrap().is_finite());

        let set = shoulders_only().with(Keypoint::LeftShoulder, LandmarkPoint::new(0.4, f64::INFINITY, 0.9));
        let result = classifier(DetectionMode::Adaptive).classify(&set);
        assert_eq!(result.message, "shoulders not detected");
    }

    #[test]
    fn angle_at_vertex_handles_right_and_straight_angles() {
        let o = Point2::new(0.0, 0.0);
        let right = angle_at_vertex(&Point2::new(1.0, 0.0), &o, &Point2::new(0.0, 2.0)).unwrap();
        assert!((right - 90.0).abs() < 1e-12);
        let straight = angle_at_vertex(&Point2::new(-1.0, 0.0), &o, &Point2::new(3.0, 0.0)).unwrap();
        assert!((straight - 180.0).abs() < 1e-9);
        assert_eq!(angle_at_vertex(&o, &o, &Point2::new(1.0, 1.0)), None);
    }
}
