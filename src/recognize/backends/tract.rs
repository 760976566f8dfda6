#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::labels::{COLOR_LABELS, NATIONALITY_LABELS};
use crate::onnx::{self, Normalize, OnnxPlan};
use crate::recognize::stages::{ColorClassifier, NationalityClassifier, PlateCrop};

const COLOR_RESIZE: u32 = 256;
const COLOR_CROP: u32 = 224;
const NATIONALITY_INPUT: u32 = 640;

/// Body colour classifier: ImageNet-normalised 224x224 centre crop,
/// softmax over the colour labels.
pub struct TractColorClassifier {
    model: OnnxPlan,
}

impl TractColorClassifier {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Ok(Self {
            model: onnx::load_model(model_path.as_ref(), COLOR_CROP, COLOR_CROP)?,
        })
    }
}

impl ColorClassifier for TractColorClassifier {
    fn name(&self) -> &'static str {
        "tract-color"
    }

    fn classify(&self, screenshot: &Path) -> Result<String> {
        let image = onnx::open_image(screenshot)?;
        let input = onnx::resize_center_crop(&image, COLOR_RESIZE, COLOR_CROP);
        let output = onnx::run_first_output(
            &self.model,
            onnx::image_to_tensor(&input, Normalize::IMAGENET),
        )?;
        let logits: Vec<f32> = output.iter().copied().collect();
        if logits.len() != COLOR_LABELS.len() {
            return Err(anyhow!(
                "color model returned {} scores, expected {}",
                logits.len(),
                COLOR_LABELS.len()
            ));
        }
        Ok(onnx::softmax_top1(&logits)
            .map(|(idx, _)| COLOR_LABELS[idx].to_string())
            .unwrap_or_default())
    }
}

/// Plate nationality detector: YOLO over the plate crop, label of the most
/// confident box.
pub struct TractNationalityClassifier {
    model: OnnxPlan,
    confidence_threshold: f32,
}

impl TractNationalityClassifier {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Ok(Self {
            model: onnx::load_model(model_path.as_ref(), NATIONALITY_INPUT, NATIONALITY_INPUT)?,
            confidence_threshold: 0.25,
        })
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

impl NationalityClassifier for TractNationalityClassifier {
    fn name(&self) -> &'static str {
        "tract-nationality"
    }

    fn classify(&self, crop: PlateCrop<'_>) -> Result<Option<String>> {
        let image = onnx::open_image(crop.path)?;
        let input = onnx::resize(&image, NATIONALITY_INPUT, NATIONALITY_INPUT);
        let output = onnx::run_first_output(
            &self.model,
            onnx::image_to_tensor(&input, Normalize::NONE),
        )?;
        let best = onnx::decode_yolo(&output, self.confidence_threshold)?
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score));
        Ok(best.and_then(|b| NATIONALITY_LABELS.get(b.class_id).map(|l| l.to_string())))
    }
}
