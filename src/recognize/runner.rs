use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tempfile::NamedTempFile;

use crate::error::{RecognitionError, Stage};
use crate::event::{assemble, VehicleEvent};
use crate::frame::Frame;
use crate::labels::{DEFAULT_COLOR, FALLBACK_COUNTRY};
use crate::recognize::stages::{ColorClassifier, NationalityClassifier, PlateCrop, PlateReader};
use crate::resolver::ResolvedClasses;

pub const DEFAULT_MIN_PLATE_CHARS: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecognitionSettings {
    /// Directory for temporary crops; the system temp dir when unset.
    pub crop_dir: Option<PathBuf>,
    /// Plates reading shorter than this are unreadable.
    pub min_plate_chars: usize,
    /// Run nationality and colour concurrently once the plate is read.
    pub parallel_stages: bool,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            crop_dir: None,
            min_plate_chars: DEFAULT_MIN_PLATE_CHARS,
            parallel_stages: true,
        }
    }
}

/// Joined output of the recognition stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recognition {
    pub plate_text: String,
    pub country: String,
    pub color: String,
}

/// Runs plate text, nationality and colour recognition on one captured frame.
///
/// Models are constructed once by the caller and shared; the runner holds
/// no per-vehicle state. Crops live in temporary files that are removed when
/// the call returns, whichever way it returns.
#[derive(Clone)]
pub struct RecognitionStageRunner {
    plate_reader: Arc<dyn PlateReader>,
    nationality: Arc<dyn NationalityClassifier>,
    color: Arc<dyn ColorClassifier>,
    settings: RecognitionSettings,
}

impl RecognitionStageRunner {
    pub fn new(
        plate_reader: Arc<dyn PlateReader>,
        nationality: Arc<dyn NationalityClassifier>,
        color: Arc<dyn ColorClassifier>,
        settings: RecognitionSettings,
    ) -> Self {
        Self {
            plate_reader,
            nationality,
            color,
            settings,
        }
    }

    pub fn settings(&self) -> &RecognitionSettings {
        &self.settings
    }

    /// Recognize and assemble the event for a fired frame.
    pub fn run(
        &self,
        frame: &Frame,
        resolved: &ResolvedClasses,
    ) -> Result<VehicleEvent, RecognitionError> {
        let recognition = self.recognize(frame, resolved)?;
        assemble(
            resolved,
            &recognition.plate_text,
            &recognition.country,
            &recognition.color,
        )
        .map_err(RecognitionError::from)
    }

    pub fn recognize(
        &self,
        frame: &Frame,
        resolved: &ResolvedClasses,
    ) -> Result<Recognition, RecognitionError> {
        let plate = frame
            .crop(resolved.plate_bbox)
            .map_err(RecognitionError::PlateRegionMissing)?;
        let plate_file = self.write_temp(&plate, "plate-")?;

        let plate_text = self
            .plate_reader
            .read(plate_file.path())
            .map_err(|err| RecognitionError::stage(Stage::PlateText, err))?
            .trim()
            .to_string();
        if plate_text.chars().count() < self.settings.min_plate_chars {
            return Err(RecognitionError::PlateUnreadable {
                text: plate_text,
                min_chars: self.settings.min_plate_chars,
            });
        }

        let screenshot = self.write_temp(frame, "frame-")?;
        let crop = PlateCrop {
            path: plate_file.path(),
            text: &plate_text,
        };

        let (country, color) = if self.settings.parallel_stages {
            std::thread::scope(|scope| {
                let nationality = scope.spawn(|| self.classify_nationality(crop));
                let color = self.classify_color(screenshot.path());
                let country = nationality.join().unwrap_or_else(|_| {
                    Err(RecognitionError::stage(
                        Stage::Nationality,
                        anyhow!("nationality stage panicked"),
                    ))
                });
                (country, color)
            })
        } else {
            (
                self.classify_nationality(crop),
                self.classify_color(screenshot.path()),
            )
        };

        Ok(Recognition {
            plate_text,
            country: country?,
            color: color?,
        })
    }

    fn classify_nationality(&self, crop: PlateCrop<'_>) -> Result<String, RecognitionError> {
        let label = self
            .nationality
            .classify(crop)
            .map_err(|err| RecognitionError::stage(Stage::Nationality, err))?;
        Ok(match label {
            Some(label) if !label.trim().is_empty() => label.trim().to_string(),
            _ => {
                log::debug!(
                    "{} found no plate origin, using {}",
                    self.nationality.name(),
                    FALLBACK_COUNTRY
                );
                FALLBACK_COUNTRY.to_string()
            }
        })
    }

    fn classify_color(&self, screenshot: &Path) -> Result<String, RecognitionError> {
        let label = self
            .color
            .classify(screenshot)
            .map_err(|err| RecognitionError::stage(Stage::Color, err))?;
        let label = label.trim();
        if label.is_empty() {
            return Ok(DEFAULT_COLOR.to_string());
        }
        Ok(label.to_string())
    }

    fn write_temp(&self, frame: &Frame, prefix: &str) -> Result<NamedTempFile, RecognitionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(".jpg");
        let mut file = match &self.settings.crop_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .context("create crop file")
        .map_err(RecognitionError::CropIo)?;

        frame
            .write_jpeg(file.as_file_mut())
            .map_err(RecognitionError::CropIo)?;
        file.as_file_mut()
            .flush()
            .context("flush crop file")
            .map_err(RecognitionError::CropIo)?;
        Ok(file)
    }
}
