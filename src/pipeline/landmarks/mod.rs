mod common;
mod ort;
mod palm;

use anyhow::Result;

use crate::types::{Frame, HandLandmarks, PoseLandmarks};

pub use self::ort::OrtLandmarkProvider;

/// Extracts body and hand keypoints from a frame.
pub trait LandmarkProvider: Send + 'static {
    /// Returns the pose of the most prominent person, if any.
    fn detect_pose(&mut self, frame: &Frame) -> Result<Option<PoseLandmarks>>;

    /// Returns every detected hand, most confident first.
    fn detect_hands(&mut self, frame: &Frame) -> Result<Vec<HandLandmarks>>;
}
