use std::path::Path;

use anyhow::Result;

/// A plate crop written to disk, with the text already read from it.
#[derive(Clone, Copy, Debug)]
pub struct PlateCrop<'a> {
    pub path: &'a Path,
    pub text: &'a str,
}

/// Reads registration text off a plate crop.
///
/// Text comes back in reading order and uppercased. An empty string is a
/// valid answer meaning nothing was legible.
pub trait PlateReader: Send + Sync {
    fn name(&self) -> &'static str;

    fn read(&self, crop: &Path) -> Result<String>;
}

/// Decides which country issued a plate.
///
/// `Ok(None)` means the model found nothing; the runner substitutes the
/// fallback label.
pub trait NationalityClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, crop: PlateCrop<'_>) -> Result<Option<String>>;
}

/// Classifies body colour from a full-frame screenshot.
///
/// An empty label is replaced by the default colour.
pub trait ColorClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, screenshot: &Path) -> Result<String>;
}
