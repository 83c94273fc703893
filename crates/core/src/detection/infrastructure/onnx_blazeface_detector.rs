//! BlazeFace short-range face detector on ONNX Runtime via `ort`.
//!
//! Produces plain bounding boxes; keypoints in the regressor output are
//! ignored.
use std::path::Path;

use crate::detection::domain::backend_error::BackendError;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::execution_provider::preferred_execution_providers;
use crate::detection::infrastructure::math::bbox_iou;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output: box (4) + 6 keypoints (12).
const REGRESSOR_STRIDE: usize = 16;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    confidence: f64,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    /// Load a BlazeFace ONNX model. Detections scoring below `confidence`
    /// are dropped.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;
        Ok(Self {
            session,
            confidence,
            anchors: generate_anchors(),
        })
    }

    fn run(&mut self, frame: &Frame<'_>) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Err(format!(
                "cannot run on a {}x{} image",
                frame.width(),
                frame.height()
            )
            .into());
        }
        if frame.channels() != 3 {
            return Err(format!("expected 3 channels, got {}", frame.channels()).into());
        }

        let fw = frame.width();
        let fh = frame.height();

        let input_tensor = preprocess(frame, INPUT_SIZE);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut raw_dets = decode(
            reg_data,
            score_data,
            &self.anchors,
            self.confidence as f32,
            fw,
            fh,
        );
        let kept = nms(&mut raw_dets, NMS_IOU_THRESH);

        Ok(kept.iter().map(|d| to_bounding_box(d, fw, fh)).collect())
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame<'_>) -> Result<Vec<BoundingBox>, BackendError> {
        self.run(frame)
            .map_err(|e| BackendError::Inference(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame<'_>, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

// ---------------------------------------------------------------------------
// Anchor generation (BlazeFace short-range)
// ---------------------------------------------------------------------------

/// The short-range model uses two feature map sizes: 16×16 and 8×8,
/// with 2 and 6 anchors per cell respectively.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Corner-form detection in frame pixels: `[x1, y1, x2, y2]` plus score.
#[derive(Clone, Debug)]
struct RawDet {
    corners: [f64; 4],
    score: f64,
}

fn decode(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    confidence: f32,
    fw: u32,
    fh: u32,
) -> Vec<RawDet> {
    let mut raw_dets = Vec::new();
    let num_anchors = anchors.len().min(NUM_ANCHORS);

    for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
        let score = sigmoid(raw_score);
        if score < confidence {
            continue;
        }

        let anchor = &anchors[i];
        let reg_offset = i * REGRESSOR_STRIDE;
        if reg_offset + 4 > reg_data.len() {
            break;
        }

        let cx = anchor[0] + reg_data[reg_offset] / INPUT_SIZE as f32;
        let cy = anchor[1] + reg_data[reg_offset + 1] / INPUT_SIZE as f32;
        let w = reg_data[reg_offset + 2] / INPUT_SIZE as f32;
        let h = reg_data[reg_offset + 3] / INPUT_SIZE as f32;

        let x1 = ((cx - w / 2.0) * fw as f32).max(0.0);
        let y1 = ((cy - h / 2.0) * fh as f32).max(0.0);
        let x2 = ((cx + w / 2.0) * fw as f32).min(fw as f32);
        let y2 = ((cy + h / 2.0) * fh as f32).min(fh as f32);
        // Nothing left after clamping: the box lies outside the frame.
        if !(x2 > x1 && y2 > y1) {
            continue;
        }

        raw_dets.push(RawDet {
            corners: [x1 as f64, y1 as f64, x2 as f64, y2 as f64],
            score: score as f64,
        });
    }

    raw_dets
}

fn to_bounding_box(d: &RawDet, fw: u32, fh: u32) -> BoundingBox {
    // decode guarantees 0 <= x1 < x2 <= fw and 0 <= y1 < y2 <= fh
    let [x1, y1, x2, y2] = d.corners;
    let left = x1.floor() as i32;
    let top = y1.floor() as i32;
    let right = (x2.ceil() as i32).min(fw as i32);
    let bottom = (y2.ceil() as i32).min(fh as i32);
    BoundingBox::new(top, right, bottom, left)
}

fn nms(dets: &mut [RawDet], iou_thresh: f64) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && bbox_iou(&dets[i].corners, &dets[j].corners) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
