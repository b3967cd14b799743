use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    LandmarkProvider,
    common::{self, sigmoid},
    palm::PalmDetector,
};
use crate::{
    config::{DetectionSettings, ModelSettings},
    types::{
        Frame, HAND_LANDMARK_COUNT, HandLandmarks, LandmarkPoint, POSE_LANDMARK_COUNT,
        PoseLandmarks,
    },
};

const HAND_INPUT_SIZE: u32 = 224;
const POSE_INPUT_SIZE: u32 = 256;
/// Values per pose keypoint in the model output: x, y, z, visibility, presence.
const POSE_VALUES_PER_POINT: usize = 5;

/// Landmark provider backed by the MediaPipe palm, hand and pose models
/// running on ONNX Runtime.
pub struct OrtLandmarkProvider {
    palm_detector: PalmDetector,
    hand_session: Session,
    pose_session: Session,
    detection: DetectionSettings,
}

fn load_session(path: &Path, what: &str) -> Result<Session> {
    Ok(Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(path)
        .with_context(|| format!("failed to load {what} model from {}", path.display()))?)
}

impl OrtLandmarkProvider {
    pub fn new(models: &ModelSettings, detection: DetectionSettings) -> Result<Self> {
        let palm_detector = PalmDetector::new(&models.palm_detector_path())?;
        let hand_session = load_session(&models.hand_landmarks_path(), "hand landmark")?;
        let pose_session = load_session(&models.pose_landmarks_path(), "pose landmark")?;

        log::info!(
            "landmark models ready from {} (max {} hands)",
            models.dir.display(),
            detection.max_hands
        );

        Ok(Self {
            palm_detector,
            hand_session,
            pose_session,
            detection,
        })
    }

    fn hand_in_region(
        &mut self,
        frame: &Frame,
        center: (f32, f32),
        side: f32,
        angle: f32,
    ) -> Result<Option<HandLandmarks>> {
        let (input, crop) =
            common::rotated_crop(frame, center, side, angle, HAND_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .hand_session
            .run(ort::inputs![tensor])
            .context("failed to run hand landmark model")?;

        if outputs.len() < 2 {
            return Err(anyhow!("hand landmark model returned too few outputs"));
        }

        let confidence = outputs[1]
            .try_extract_array::<f32>()?
            .iter()
            .next()
            .copied()
            .unwrap_or(0.0);
        if confidence < self.detection.min_hand_confidence {
            return Ok(None);
        }

        let coords: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        if coords.len() < HAND_LANDMARK_COUNT * 3 {
            return Err(anyhow!(
                "unexpected hand landmark length: got {}, need {}",
                coords.len(),
                HAND_LANDMARK_COUNT * 3
            ));
        }

        let points: [LandmarkPoint; HAND_LANDMARK_COUNT] = std::array::from_fn(|i| {
            let pixel = crop.unproject(coords[i * 3], coords[i * 3 + 1]);
            common::normalized_point(frame, pixel)
        });

        Ok(Some(HandLandmarks::new(points, confidence)))
    }
}

impl LandmarkProvider for OrtLandmarkProvider {
    fn detect_pose(&mut self, frame: &Frame) -> Result<Option<PoseLandmarks>> {
        let (input, mapping) = common::letterbox(frame, POSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .pose_session
            .run(ort::inputs![tensor])
            .context("failed to run pose landmark model")?;

        if outputs.len() < 2 {
            return Err(anyhow!("pose landmark model returned too few outputs"));
        }

        let confidence = outputs[1]
            .try_extract_array::<f32>()?
            .iter()
            .next()
            .copied()
            .unwrap_or(0.0);
        if confidence < self.detection.min_pose_confidence {
            return Ok(None);
        }

        let values: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        if values.len() < POSE_LANDMARK_COUNT * POSE_VALUES_PER_POINT {
            return Err(anyhow!(
                "unexpected pose landmark length: got {}, need {}",
                values.len(),
                POSE_LANDMARK_COUNT * POSE_VALUES_PER_POINT
            ));
        }

        let points: [LandmarkPoint; POSE_LANDMARK_COUNT] = std::array::from_fn(|i| {
            let row = &values[i * POSE_VALUES_PER_POINT..(i + 1) * POSE_VALUES_PER_POINT];
            let pixel = mapping.unproject(row[0], row[1]);
            common::normalized_point(frame, pixel).with_visibility(sigmoid(row[3]))
        });

        Ok(Some(PoseLandmarks::new(points)))
    }

    fn detect_hands(&mut self, frame: &Frame) -> Result<Vec<HandLandmarks>> {
        let palms = self.palm_detector.detect(frame)?;

        let mut hands = Vec::new();
        for palm in palms {
            if hands.len() >= self.detection.max_hands {
                break;
            }
            let (center, side, angle) = palm.hand_crop();
            match self.hand_in_region(frame, center, side, angle) {
                Ok(Some(hand)) => hands.push(hand),
                Ok(None) => {}
                Err(err) => log::warn!("hand landmark inference failed: {err:?}"),
            }
        }

        Ok(hands)
    }
}
