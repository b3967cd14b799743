use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::common::{Letterbox, letterbox, sigmoid};
use crate::types::Frame;

pub const PALM_INPUT_SIZE: u32 = 192;
const PALM_KEYPOINTS: usize = 7;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_THRESHOLD: f32 = 0.3;

/// A detected palm in frame pixels.
#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

impl PalmRegion {
    /// Square crop (center, side, rotation) that comfortably contains the whole
    /// hand, rotated so the fingers point up.
    pub fn hand_crop(&self) -> ((f32, f32), f32, f32) {
        let center = if self.keypoints.is_empty() {
            (
                (self.bbox[0] + self.bbox[2]) * 0.5,
                (self.bbox[1] + self.bbox[3]) * 0.5,
            )
        } else {
            let n = self.keypoints.len() as f32;
            let (sx, sy) = self
                .keypoints
                .iter()
                .fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
            (sx / n, sy / n)
        };

        let box_side = (self.bbox[2] - self.bbox[0])
            .abs()
            .max((self.bbox[3] - self.bbox[1]).abs());
        let side = box_side.max(80.0) * 2.4;

        (center, side, self.orientation())
    }

    // Keypoint 0 is the wrist and keypoint 2 the middle finger base.
    fn orientation(&self) -> f32 {
        match (self.keypoints.first(), self.keypoints.get(2)) {
            (Some(wrist), Some(middle)) => {
                let angle = (middle.1 - wrist.1).atan2(middle.0 - wrist.0);
                angle + PI * 0.5
            }
            _ => 0.0,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
}

impl PalmDetector {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: generate_anchors(),
        })
    }

    /// Returns palms ordered by descending score.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, mapping) = letterbox(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let feature_dim = *boxes
            .shape()
            .last()
            .ok_or_else(|| anyhow!("palm box output has no dimensions"))?;
        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();

        decode_palms(&boxes, feature_dim, &scores, &self.anchors, &mapping)
    }
}

/// SSD anchors for the 192px palm model: a 24x24 grid with two anchors per
/// cell followed by a 12x12 grid with six.
fn generate_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(2016);
    for (grid, per_cell) in [(24usize, 2usize), (12, 6)] {
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }
    anchors
}

fn decode_palms(
    boxes: &[f32],
    feature_dim: usize,
    scores: &[f32],
    anchors: &[[f32; 2]],
    mapping: &Letterbox,
) -> Result<Vec<PalmRegion>> {
    if feature_dim < 4 + PALM_KEYPOINTS * 2 {
        return Err(anyhow!("palm box feature dimension too small: {feature_dim}"));
    }

    let input = PALM_INPUT_SIZE as f32;
    let to_frame = |nx: f32, ny: f32| mapping.unproject(nx * input, ny * input);

    let mut candidates = Vec::new();
    for (idx, anchor) in anchors.iter().enumerate() {
        let Some(&raw_score) = scores.get(idx) else {
            break;
        };
        let score = sigmoid(raw_score);
        if score < SCORE_THRESHOLD {
            continue;
        }
        let Some(features) = boxes.get(idx * feature_dim..(idx + 1) * feature_dim) else {
            break;
        };

        let cx = features[0] / input + anchor[0];
        let cy = features[1] / input + anchor[1];
        let hw = features[2] / input / 2.0;
        let hh = features[3] / input / 2.0;
        if hw <= 0.0 || hh <= 0.0 {
            continue;
        }

        let (x1, y1) = to_frame(cx - hw, cy - hh);
        let (x2, y2) = to_frame(cx + hw, cy + hh);
        let max_x = mapping.source.0.saturating_sub(1) as f32;
        let max_y = mapping.source.1.saturating_sub(1) as f32;

        let keypoints = (0..PALM_KEYPOINTS)
            .map(|k| {
                let kx = features[4 + k * 2] / input + anchor[0];
                let ky = features[4 + k * 2 + 1] / input + anchor[1];
                to_frame(kx, ky)
            })
            .collect();

        candidates.push(PalmRegion {
            bbox: [
                x1.clamp(0.0, max_x),
                y1.clamp(0.0, max_y),
                x2.clamp(0.0, max_x),
                y2.clamp(0.0, max_y),
            ],
            keypoints,
            score,
        });
    }

    Ok(non_max_suppression(candidates, NMS_THRESHOLD))
}

fn non_max_suppression(mut candidates: Vec<PalmRegion>, threshold: f32) -> Vec<PalmRegion> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if kept
            .iter()
            .all(|k| iou(&k.bbox, &candidate.bbox) < threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}
