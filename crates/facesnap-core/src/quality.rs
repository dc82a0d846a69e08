//! Per-frame face quality gate.
//!
//! A face is acceptable for capture when both eyes are open, the detector
//! produced a determinate expression reading, the head is roughly facing
//! the camera, and the face fills enough of the frame. The check looks at a
//! single observation and carries no memory across frames.

use serde::{Deserialize, Serialize};

/// Detector value for "smiling probability could not be determined".
pub const SMILE_UNDETERMINED: f32 = -1.0;

/// Face bounding box size, normalized to the frame (0–1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBounds {
    pub width: f32,
    pub height: f32,
}

/// One detected face, in the shape the landmark detector reports it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceObservation {
    pub left_eye_open_probability: f32,
    pub right_eye_open_probability: f32,
    /// `SMILE_UNDETERMINED` when classification failed. Non-finite values
    /// are treated the same way.
    pub smiling_probability: f32,
    #[serde(default)]
    pub roll_angle: Option<f32>,
    #[serde(default)]
    pub yaw_angle: Option<f32>,
    #[serde(default)]
    pub pitch_angle: Option<f32>,
    pub bounds: FaceBounds,
}

/// Why an observation failed the gate. Only the first failed criterion is
/// reported, in the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    EyesClosed { left: f32, right: f32 },
    ExpressionUndetermined,
    HeadPose { roll: f32, yaw: f32, pitch: f32 },
    FaceTooSmall { width: f32, height: f32 },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::EyesClosed { left, right } => {
                write!(f, "eyes not open (left {left:.2}, right {right:.2})")
            }
            Rejection::ExpressionUndetermined => write!(f, "expression undetermined"),
            Rejection::HeadPose { roll, yaw, pitch } => write!(
                f,
                "head pose out of range (roll {roll:.1}, yaw {yaw:.1}, pitch {pitch:.1})"
            ),
            Rejection::FaceTooSmall { width, height } => {
                write!(f, "face too small ({width:.2}x{height:.2})")
            }
        }
    }
}

/// Acceptance limits. All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Each eye-open probability must exceed this.
    pub min_eye_open: f32,
    /// Absolute roll, yaw and pitch must each stay below this (degrees).
    pub max_angle_deg: f32,
    /// Normalized bounds width and height must each exceed this.
    pub min_face_extent: f32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_eye_open: 0.5,
            max_angle_deg: 20.0,
            min_face_extent: 0.3,
        }
    }
}

impl QualityThresholds {
    /// Check one observation, returning the first failed criterion.
    pub fn assess(&self, face: &FaceObservation) -> Result<(), Rejection> {
        let left = face.left_eye_open_probability;
        let right = face.right_eye_open_probability;
        if !(left > self.min_eye_open && right > self.min_eye_open) {
            return Err(Rejection::EyesClosed { left, right });
        }

        let smile = face.smiling_probability;
        if smile == SMILE_UNDETERMINED || !smile.is_finite() {
            return Err(Rejection::ExpressionUndetermined);
        }

        // Missing angles mean the detector did not estimate them.
        let roll = face.roll_angle.unwrap_or(0.0);
        let yaw = face.yaw_angle.unwrap_or(0.0);
        let pitch = face.pitch_angle.unwrap_or(0.0);
        let within = |a: f32| a.abs() < self.max_angle_deg;
        if !(within(roll) && within(yaw) && within(pitch)) {
            return Err(Rejection::HeadPose { roll, yaw, pitch });
        }

        let FaceBounds { width, height } = face.bounds;
        if !(width > self.min_face_extent && height > self.min_face_extent) {
            return Err(Rejection::FaceTooSmall { width, height });
        }

        Ok(())
    }

    pub fn evaluate(&self, face: &FaceObservation) -> bool {
        self.assess(face).is_ok()
    }
}

/// Evaluate an observation against the default thresholds.
pub fn evaluate(face: &FaceObservation) -> bool {
    QualityThresholds::default().evaluate(face)
}

/// Like [`evaluate`], but reports why a face was rejected.
pub fn assess(face: &FaceObservation) -> Result<(), Rejection> {
    QualityThresholds::default().assess(face)
}

#[cfg(test)]
pub(crate) fn good_face() -> FaceObservation {
    FaceObservation {
        left_eye_open_probability: 0.9,
        right_eye_open_probability: 0.9,
        smiling_probability: 0.8,
        roll_angle: Some(0.0),
        yaw_angle: Some(0.0),
        pitch_angle: Some(0.0),
        bounds: FaceBounds {
            width: 0.4,
            height: 0.4,
        },
    }
}
