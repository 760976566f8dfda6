//! Fixed label tables shared by the detector, the resolver and the
//! recognition stages.

/// Vehicle class ids.
pub const CLASS_CAR: u32 = 0;
pub const CLASS_TRUCK: u32 = 1;
/// License plate class id.
pub const CLASS_PLATE: u32 = 2;
/// Brand class ids are the inclusive range `BRAND_FIRST..=BRAND_LAST`.
pub const BRAND_FIRST: u32 = 3;
pub const BRAND_LAST: u32 = 35;

/// Detector catalog, index-addressed by class id.
pub const CLASS_LABELS: [&str; 36] = [
    "car",
    "truck",
    "LP",
    "Toyota",
    "Volkswagen",
    "Ford",
    "Honda",
    "Chevrolet",
    "Nissan",
    "BMW",
    "Mercedes",
    "Audi",
    "Tesla",
    "Hyundai",
    "Kia",
    "Mazda",
    "Fiat",
    "Jeep",
    "Porsche",
    "Volvo",
    "Land Rover",
    "Peugeot",
    "Renault",
    "Citroen",
    "Isuzu",
    "MAN",
    "Iveco",
    "Mitsubishi",
    "Opel",
    "Scoda",
    "Mini",
    "Ferrari",
    "Lamborghini",
    "Jaguar",
    "Suzuki",
    "Ibiza",
];

/// Nationality classifier output labels, index-addressed.
pub const NATIONALITY_LABELS: [&str; 7] =
    ["europe", "america", "qatar", "tunisia", "egypt", "UAE", "libya"];

/// Country reported when the nationality model finds no plate box.
pub const FALLBACK_COUNTRY: &str = "america";

/// Color classifier output labels, index-addressed.
pub const COLOR_LABELS: [&str; 9] = [
    "Black", "Blue", "Brown", "Green", "Orange", "Red", "Silver", "White", "Yellow",
];

/// Color reported when the color model yields an empty class.
pub const DEFAULT_COLOR: &str = "silver";

/// Semantic role of a detector class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClassRole {
    VehicleType,
    Plate,
    Brand,
}

impl ClassRole {
    /// Role of a catalog class id, `None` outside the catalog.
    pub fn of(class_id: u32) -> Option<Self> {
        match class_id {
            CLASS_CAR | CLASS_TRUCK => Some(ClassRole::VehicleType),
            CLASS_PLATE => Some(ClassRole::Plate),
            BRAND_FIRST..=BRAND_LAST => Some(ClassRole::Brand),
            _ => None,
        }
    }

    /// Confidence a surviving candidate must exceed to count for its role.
    pub fn confidence_floor(self) -> f32 {
        match self {
            ClassRole::VehicleType => 0.1,
            ClassRole::Plate | ClassRole::Brand => 0.5,
        }
    }
}

pub fn class_label(class_id: u32) -> Option<&'static str> {
    CLASS_LABELS.get(class_id as usize).copied()
}
