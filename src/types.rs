use std::{fmt, time::Instant};

/// Number of points in the body pose topology returned by the pose model.
pub const POSE_LANDMARK_COUNT: usize = 33;
/// Number of points in the hand topology returned by the hand model.
pub const HAND_LANDMARK_COUNT: usize = 21;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }
}

/// A keypoint in normalised image space: `(0, 0)` is the top-left corner and
/// `(1, 1)` the bottom-right one.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub visibility: Option<f32>,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn to_pixels(self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// Named joints of the 33-point body topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoseJoint {
    Nose = 0,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PoseLandmarks {
    points: [LandmarkPoint; POSE_LANDMARK_COUNT],
}

impl PoseLandmarks {
    pub fn new(points: [LandmarkPoint; POSE_LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn joint(&self, joint: PoseJoint) -> LandmarkPoint {
        self.points[joint as usize]
    }

    pub fn set_joint(&mut self, joint: PoseJoint, point: LandmarkPoint) {
        self.points[joint as usize] = point;
    }

    pub fn points(&self) -> &[LandmarkPoint] {
        &self.points
    }
}

impl Default for PoseLandmarks {
    fn default() -> Self {
        Self {
            points: [LandmarkPoint::default(); POSE_LANDMARK_COUNT],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandLandmarks {
    points: [LandmarkPoint; HAND_LANDMARK_COUNT],
    pub score: f32,
}

impl HandLandmarks {
    pub fn new(points: [LandmarkPoint; HAND_LANDMARK_COUNT], score: f32) -> Self {
        Self { points, score }
    }

    pub fn point(&self, index: usize) -> LandmarkPoint {
        self.points[index]
    }

    pub fn points(&self) -> &[LandmarkPoint] {
        &self.points
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoseLabel {
    TPose,
    ArmsExtended,
    StandingUpright,
    Unknown,
}

impl PoseLabel {
    pub fn display_name(&self) -> &'static str {
        match self {
            PoseLabel::TPose => "T-pose",
            PoseLabel::ArmsExtended => "Arms Extended",
            PoseLabel::StandingUpright => "Standing Upright",
            PoseLabel::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PoseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureLabel {
    ThumbUp,
    AllFingersExtended,
    Victory,
    Unknown,
}

impl GestureLabel {
    pub fn display_name(&self) -> &'static str {
        match self {
            GestureLabel::ThumbUp => "Thumb Up",
            GestureLabel::AllFingersExtended => "All Fingers Extended",
            GestureLabel::Victory => "Victory",
            GestureLabel::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A frame ready for display, with skeletons drawn in and the labels for the
/// text overlay.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub pose: PoseLabel,
    pub gestures: Vec<GestureLabel>,
}

impl AnnotatedFrame {
    pub fn overlay_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.gestures.len() + 1);
        lines.push(format!("Pose: {}", self.pose));
        for (idx, gesture) in self.gestures.iter().enumerate() {
            lines.push(format!("Hand {}: {}", idx + 1, gesture));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotated(pose: PoseLabel, gestures: Vec<GestureLabel>) -> AnnotatedFrame {
        AnnotatedFrame {
            frame: Frame::new(vec![0; 4], 1, 1),
            pose,
            gestures,
        }
    }

    #[test]
    fn overlay_lists_pose_then_hands_in_detection_order() {
        let frame = annotated(
            PoseLabel::TPose,
            vec![GestureLabel::Victory, GestureLabel::ThumbUp],
        );
        assert_eq!(
            frame.overlay_lines(),
            vec![
                "Pose: T-pose".to_string(),
                "Hand 1: Victory".to_string(),
                "Hand 2: Thumb Up".to_string(),
            ]
        );
    }

    #[test]
    fn overlay_without_hands_has_only_the_pose_line() {
        let frame = annotated(PoseLabel::Unknown, Vec::new());
        assert_eq!(frame.overlay_lines(), vec!["Pose: Unknown".to_string()]);
    }

    #[test]
    fn pose_joints_map_onto_the_33_point_topology() {
        let mut pose = PoseLandmarks::default();
        pose.set_joint(PoseJoint::RightWrist, LandmarkPoint::new(0.25, 0.75));
        assert_eq!(pose.points()[16], LandmarkPoint::new(0.25, 0.75));
        assert_eq!(pose.joint(PoseJoint::RightWrist).y, 0.75);
    }
}
