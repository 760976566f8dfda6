//! Shared ONNX loading and tensor helpers for the tract backends.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::frame::Frame;

pub(crate) type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Channel normalisation applied after scaling pixels to `[0, 1]`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Normalize {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalize {
    pub(crate) const NONE: Normalize = Normalize {
        mean: [0.0; 3],
        std: [1.0; 3],
    };

    pub(crate) const IMAGENET: Normalize = Normalize {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };
}

/// Load an ONNX model with a fixed `1x3xHxW` f32 input.
pub(crate) fn load_model(model_path: &Path, width: u32, height: u32) -> Result<OnnxPlan> {
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, height as usize, width as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

pub(crate) fn frame_to_image(frame: &Frame) -> Result<RgbImage> {
    RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))
}

pub(crate) fn open_image(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .to_rgb8())
}

/// Stretch an image to exactly `width x height`.
pub(crate) fn resize(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    image::imageops::resize(image, width, height, FilterType::Triangle)
}

/// Resize so the shorter side is `short_side`, then take the centred
/// `crop x crop` square.
pub(crate) fn resize_center_crop(image: &RgbImage, short_side: u32, crop: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let scale = short_side as f32 / w.min(h).max(1) as f32;
    let rw = ((w as f32 * scale).round() as u32).max(crop);
    let rh = ((h as f32 * scale).round() as u32).max(crop);
    let resized = resize(image, rw, rh);
    let x = (rw - crop) / 2;
    let y = (rh - crop) / 2;
    image::imageops::crop_imm(&resized, x, y, crop, crop).to_image()
}

pub(crate) fn image_to_tensor(image: &RgbImage, norm: Normalize) -> Tensor {
    let (width, height) = image.dimensions();
    let input = tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| {
            let value = image.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0;
            (value - norm.mean[channel]) / norm.std[channel]
        },
    );
    input.into_tensor()
}

/// Run the plan and return the first output as an owned f32 array.
pub(crate) fn run_first_output(
    plan: &OnnxPlan,
    input: Tensor,
) -> Result<tract_ndarray::ArrayD<f32>> {
    let outputs = plan.run(tvec!(input.into())).context("ONNX inference failed")?;
    let output = outputs
        .first()
        .ok_or_else(|| anyhow!("model produced no outputs"))?;
    let view = output
        .to_array_view::<f32>()
        .context("model output tensor was not f32")?;
    Ok(view.to_owned())
}

/// One YOLO box: best class and its score, in model-input coordinates.
#[derive(Clone, Copy, Debug)]
pub(crate) struct YoloBox {
    pub class_id: usize,
    pub score: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

/// Decode a YOLOv8 head shaped `[1, 4 + classes, anchors]`, keeping anchors
/// whose best class score exceeds `threshold`.
pub(crate) fn decode_yolo(
    output: &tract_ndarray::ArrayD<f32>,
    threshold: f32,
) -> Result<Vec<YoloBox>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
    }
    let classes = shape[1] - 4;
    let anchors = shape[2];
    let mut boxes = Vec::new();
    for anchor in 0..anchors {
        let mut best = (0usize, f32::NEG_INFINITY);
        for class in 0..classes {
            let score = output[[0, 4 + class, anchor]];
            if score > best.1 {
                best = (class, score);
            }
        }
        if best.1 > threshold {
            boxes.push(YoloBox {
                class_id: best.0,
                score: best.1,
                cx: output[[0, 0, anchor]],
                cy: output[[0, 1, anchor]],
                w: output[[0, 2, anchor]],
                h: output[[0, 3, anchor]],
            });
        }
    }
    Ok(boxes)
}

/// Index of the largest logit after softmax, with its probability.
pub(crate) fn softmax_top1(logits: &[f32]) -> Option<(usize, f32)> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return None;
    }
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(idx, e)| (idx, e / sum))
}
