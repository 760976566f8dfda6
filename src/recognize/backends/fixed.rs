use std::path::Path;

use anyhow::Result;

use crate::recognize::stages::{ColorClassifier, NationalityClassifier, PlateCrop, PlateReader};

/// Plate reader that always answers with the same text. For tests and
/// `--stub` runs.
#[derive(Clone, Debug)]
pub struct FixedPlateReader {
    text: String,
}

impl FixedPlateReader {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl PlateReader for FixedPlateReader {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn read(&self, _crop: &Path) -> Result<String> {
        Ok(self.text.clone())
    }
}

#[derive(Clone, Debug)]
pub struct FixedNationality {
    label: Option<String>,
}

impl FixedNationality {
    pub fn new(label: Option<&str>) -> Self {
        Self {
            label: label.map(str::to_string),
        }
    }
}

impl NationalityClassifier for FixedNationality {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn classify(&self, _crop: PlateCrop<'_>) -> Result<Option<String>> {
        Ok(self.label.clone())
    }
}

#[derive(Clone, Debug)]
pub struct FixedColor {
    label: String,
}

impl FixedColor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ColorClassifier for FixedColor {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn classify(&self, _screenshot: &Path) -> Result<String> {
        Ok(self.label.clone())
    }
}
