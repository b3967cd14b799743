use crate::types::{GestureLabel, HandLandmarks, PoseJoint, PoseLabel, PoseLandmarks};

/// Maximum normalised y offset for two points to count as level.
const LEVEL_TOLERANCE: f32 = 0.1;

/// Fingertip indices in the hand topology, thumb first.
const FINGER_TIPS: [usize; 5] = [4, 8, 12, 16, 20];

pub fn classify_pose(pose: &PoseLandmarks) -> PoseLabel {
    let left_shoulder = pose.joint(PoseJoint::LeftShoulder);
    let right_shoulder = pose.joint(PoseJoint::RightShoulder);
    let left_wrist = pose.joint(PoseJoint::LeftWrist);
    let right_wrist = pose.joint(PoseJoint::RightWrist);

    if (left_shoulder.y - right_shoulder.y).abs() >= LEVEL_TOLERANCE {
        return PoseLabel::Unknown;
    }

    let wrists_at_shoulder_height = (left_wrist.y - left_shoulder.y).abs() < LEVEL_TOLERANCE
        && (right_wrist.y - right_shoulder.y).abs() < LEVEL_TOLERANCE;

    if wrists_at_shoulder_height {
        PoseLabel::TPose
    } else if left_wrist.x < left_shoulder.x && right_wrist.x > right_shoulder.x {
        PoseLabel::ArmsExtended
    } else {
        PoseLabel::StandingUpright
    }
}

/// Per-finger extension flags ordered thumb, index, middle, ring, pinky.
///
/// A finger counts as extended when its tip sits higher in the image than the
/// joint two positions closer to the wrist.
pub fn finger_extension(hand: &HandLandmarks) -> [bool; 5] {
    FINGER_TIPS.map(|tip| hand.point(tip).y < hand.point(tip - 2).y)
}

pub fn classify_hand_gesture(hand: &HandLandmarks) -> GestureLabel {
    match finger_extension(hand) {
        [true, false, false, false, false] => GestureLabel::ThumbUp,
        [true, true, true, true, true] => GestureLabel::AllFingersExtended,
        [false, true, true, false, false] => GestureLabel::Victory,
        _ => GestureLabel::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HAND_LANDMARK_COUNT, LandmarkPoint};

    fn pose(
        left_shoulder: (f32, f32),
        right_shoulder: (f32, f32),
        left_wrist: (f32, f32),
        right_wrist: (f32, f32),
    ) -> PoseLandmarks {
        let mut pose = PoseLandmarks::default();
        for (joint, (x, y)) in [
            (PoseJoint::LeftShoulder, left_shoulder),
            (PoseJoint::RightShoulder, right_shoulder),
            (PoseJoint::LeftWrist, left_wrist),
            (PoseJoint::RightWrist, right_wrist),
        ] {
            pose.set_joint(joint, LandmarkPoint::new(x, y));
        }
        pose
    }

    /// Builds a hand whose fingertips sit above (extended) or below their
    /// reference joints according to `flags`.
    fn hand(flags: [u8; 5]) -> HandLandmarks {
        let mut points = [LandmarkPoint::new(0.5, 0.5); HAND_LANDMARK_COUNT];
        for (finger, tip) in FINGER_TIPS.iter().enumerate() {
            let tip_y = if flags[finger] == 1 { 0.3 } else { 0.6 };
            points[*tip] = LandmarkPoint::new(0.5, tip_y);
        }
        HandLandmarks::new(points, 0.9)
    }

    #[test]
    fn level_shoulders_with_wrists_at_shoulder_height_is_t_pose() {
        let p = pose((0.3, 0.5), (0.7, 0.5), (0.1, 0.55), (0.9, 0.52));
        assert_eq!(classify_pose(&p), PoseLabel::TPose);
    }

    #[test]
    fn wrists_outside_shoulders_below_shoulder_height_is_arms_extended() {
        let p = pose((0.3, 0.5), (0.7, 0.5), (0.1, 0.8), (0.9, 0.8));
        assert_eq!(classify_pose(&p), PoseLabel::ArmsExtended);
    }

    #[test]
    fn wrists_inside_shoulders_is_standing_upright() {
        let p = pose((0.3, 0.5), (0.7, 0.5), (0.35, 0.9), (0.65, 0.9));
        assert_eq!(classify_pose(&p), PoseLabel::StandingUpright);
    }

    #[test]
    fn tilted_shoulders_are_unknown_whatever_the_wrists_do() {
        let wrists = [
            ((0.1, 0.55), (0.9, 0.52)),
            ((0.1, 0.8), (0.9, 0.8)),
            ((0.35, 0.9), (0.65, 0.9)),
        ];
        for (left_wrist, right_wrist) in wrists {
            let p = pose((0.3, 0.3), (0.7, 0.6), left_wrist, right_wrist);
            assert_eq!(classify_pose(&p), PoseLabel::Unknown);
        }
    }

    #[test]
    fn shoulder_offset_of_exactly_the_tolerance_is_unknown() {
        let p = pose((0.3, 0.5), (0.7, 0.6), (0.1, 0.55), (0.9, 0.55));
        assert_eq!(classify_pose(&p), PoseLabel::Unknown);
    }

    #[test]
    fn pose_classification_is_repeatable() {
        let p = pose((0.3, 0.5), (0.7, 0.5), (0.1, 0.8), (0.9, 0.8));
        let first = classify_pose(&p);
        for _ in 0..10 {
            assert_eq!(classify_pose(&p), first);
        }
    }

    #[test]
    fn extension_vector_follows_tip_versus_reference_joint() {
        assert_eq!(
            finger_extension(&hand([1, 0, 1, 0, 1])),
            [true, false, true, false, true]
        );
    }

    #[test]
    fn gesture_table() {
        assert_eq!(
            classify_hand_gesture(&hand([1, 0, 0, 0, 0])),
            GestureLabel::ThumbUp
        );
        assert_eq!(
            classify_hand_gesture(&hand([1, 1, 1, 1, 1])),
            GestureLabel::AllFingersExtended
        );
        assert_eq!(
            classify_hand_gesture(&hand([0, 1, 1, 0, 0])),
            GestureLabel::Victory
        );
        assert_eq!(
            classify_hand_gesture(&hand([0, 0, 0, 0, 0])),
            GestureLabel::Unknown
        );
    }

    #[test]
    fn near_misses_do_not_match_partially() {
        assert_eq!(
            classify_hand_gesture(&hand([1, 1, 0, 0, 0])),
            GestureLabel::Unknown
        );
        assert_eq!(
            classify_hand_gesture(&hand([0, 1, 1, 1, 0])),
            GestureLabel::Unknown
        );
    }

    #[test]
    fn tip_level_with_reference_joint_is_not_extended() {
        let points = [LandmarkPoint::new(0.5, 0.5); HAND_LANDMARK_COUNT];
        let flat = HandLandmarks::new(points, 1.0);
        assert_eq!(finger_extension(&flat), [false; 5]);
    }
}
