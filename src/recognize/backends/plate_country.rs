use anyhow::Result;

use crate::recognize::stages::{NationalityClassifier, PlateCrop};

/// Markers that tie plate text to one nationality label.
struct PlateMarkers {
    label: &'static str,
    /// Country names, matched case-insensitively anywhere in the text.
    names: &'static [&'static str],
    /// Country codes, matched only as whole alphanumeric tokens.
    codes: &'static [&'static str],
}

/// Searched in order; the first hit wins. Every label is one of
/// `labels::NATIONALITY_LABELS`.
const PLATE_MARKERS: &[PlateMarkers] = &[
    PlateMarkers {
        label: "tunisia",
        names: &["Tunisia", "Tunisie", "تونس"],
        codes: &["TN", "TUN"],
    },
    PlateMarkers {
        label: "qatar",
        names: &["Qatar", "قطر"],
        codes: &["QA", "QAT"],
    },
    PlateMarkers {
        label: "egypt",
        names: &["Egypt", "مصر"],
        codes: &["EG", "EGY"],
    },
    PlateMarkers {
        label: "UAE",
        names: &["United Arab Emirates", "Emirates", "Dubai", "Abu Dhabi", "الإمارات"],
        codes: &["UAE", "ARE"],
    },
    PlateMarkers {
        label: "libya",
        names: &["Libya", "ليبيا"],
        codes: &["LY", "LBY"],
    },
    PlateMarkers {
        label: "america",
        names: &["United States", "America", "New York"],
        codes: &["USA", "US"],
    },
    PlateMarkers {
        label: "europe",
        names: &[
            "Austria", "Österreich", "Belgium", "Belgique", "België", "Belgien", "Bulgaria",
            "България", "Croatia", "Hrvatska", "Cyprus", "Κύπρος", "Czech Republic",
            "Česká republika", "Estonia", "Eesti", "Finland", "Suomi", "France", "Germany",
            "Deutschland", "Greece", "Ελλάδα", "Hungary", "Magyarország", "Ireland", "Éire",
            "Italy", "Italia", "Lithuania", "Lietuva", "Luxembourg", "Lëtzebuerg",
            "Netherlands", "Nederland", "Portugal", "Romania", "România", "Slovakia",
            "Slovensko", "Spain", "España", "Sweden", "Sverige", "United Kingdom",
            "Great Britain", "England", "Scotland", "Wales",
        ],
        codes: &[
            "EU", "AT", "AUT", "BE", "BEL", "BG", "BGR", "HR", "HRV", "CY", "CYP", "CZ", "CZE",
            "EE", "EST", "FI", "FIN", "FR", "FRA", "DE", "DEU", "GR", "GRC", "HU", "HUN", "IE",
            "IRL", "IT", "ITA", "LT", "LTU", "LU", "LUX", "NL", "NLD", "PT", "PRT", "RO", "ROU",
            "SK", "SVK", "ES", "ESP", "SE", "SWE", "GB", "GBR", "UK",
        ],
    },
];

/// Nationality lookup from the plate text itself, for deployments without a
/// nationality model. Country names and codes found on the plate map onto
/// the same labels the model emits; plates with no recognisable marker
/// yield `None`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlateTextCountryIdentifier;

impl PlateTextCountryIdentifier {
    pub fn new() -> Self {
        Self
    }

    pub fn identify(&self, text: &str) -> Option<&'static str> {
        let lower = text.to_lowercase();
        let by_name = PLATE_MARKERS.iter().find(|markers| {
            markers
                .names
                .iter()
                .any(|name| lower.contains(&name.to_lowercase()))
        });
        if let Some(markers) = by_name {
            return Some(markers.label);
        }

        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_uppercase)
            .collect();
        PLATE_MARKERS
            .iter()
            .find(|markers| {
                markers
                    .codes
                    .iter()
                    .any(|code| tokens.iter().any(|token| token == code))
            })
            .map(|markers| markers.label)
    }
}

impl NationalityClassifier for PlateTextCountryIdentifier {
    fn name(&self) -> &'static str {
        "plate-text"
    }

    fn classify(&self, crop: PlateCrop<'_>) -> Result<Option<String>> {
        Ok(self.identify(crop.text).map(str::to_string))
    }
}
