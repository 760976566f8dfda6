//! Recognition stages run on a captured frame: plate text, plate
//! nationality and body colour.

pub mod backends;
mod runner;
mod stages;

pub use backends::{
    CommandPlateReader, FixedColor, FixedNationality, FixedPlateReader, PlateTextCountryIdentifier,
};
#[cfg(feature = "backend-tract")]
pub use backends::{TractColorClassifier, TractNationalityClassifier};
pub use runner::{
    Recognition, RecognitionSettings, RecognitionStageRunner, DEFAULT_MIN_PLATE_CHARS,
};
pub use stages::{ColorClassifier, NationalityClassifier, PlateCrop, PlateReader};
