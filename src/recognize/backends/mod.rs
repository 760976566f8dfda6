pub mod command;
pub mod fixed;
pub mod plate_country;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use command::CommandPlateReader;
pub use fixed::{FixedColor, FixedNationality, FixedPlateReader};
pub use plate_country::PlateTextCountryIdentifier;
#[cfg(feature = "backend-tract")]
pub use tract::{TractColorClassifier, TractNationalityClassifier};
