//! Vehicle event record and its published JSON form.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EventError;
use crate::resolver::ResolvedClasses;

pub const ACTIVITY: &str = "Monitoring";
pub const EVENT_CODE: &str = "1002";
pub const ORIGIN: &str = "camera LPM";
pub const MODEL_PLACEHOLDER: &str = "unable to identify model";
pub const FROM_ZONE: &str = "Public";
pub const TO_ZONE: &str = "Parc";

/// One recognized, stopped vehicle. Every field is non-empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VehicleEvent {
    vehicle_type: String,
    registration: String,
    brand: String,
    country: String,
    color: String,
    correlation_id: Uuid,
}

impl VehicleEvent {
    pub fn vehicle_type(&self) -> &str {
        &self.vehicle_type
    }

    pub fn registration(&self) -> &str {
        &self.registration
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    /// Serves as both vehicle id and passage id on the wire.
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn to_payload(&self) -> EventPayload {
        let uid = self.correlation_id.to_string();
        EventPayload {
            activity: ACTIVITY.to_string(),
            class: self.vehicle_type.clone(),
            classificators: vec![Classificator {
                brand: self.brand.clone(),
                class: self.vehicle_type.clone(),
                color: self.color.clone(),
                country: self.country.clone(),
                model: MODEL_PLACEHOLDER.to_string(),
                origin: ORIGIN.to_string(),
                registration: self.registration.clone(),
                uid: uid.clone(),
            }],
            code: EVENT_CODE.to_string(),
            from: FROM_ZONE.to_string(),
            registration: self.registration.clone(),
            to: TO_ZONE.to_string(),
            uidpassage: uid,
        }
    }

    /// Pretty JSON with 4-space indentation, as consumers of the topic expect.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.to_payload()
            .serialize(&mut ser)
            .context("serialize vehicle event")?;
        Ok(out)
    }
}

/// Wire shape of a published event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub activity: String,
    pub class: String,
    pub classificators: Vec<Classificator>,
    pub code: String,
    pub from: String,
    pub registration: String,
    pub to: String,
    pub uidpassage: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classificator {
    pub brand: String,
    pub class: String,
    pub color: String,
    pub country: String,
    pub model: String,
    pub origin: String,
    pub registration: String,
    pub uid: String,
}

/// Build the event for one capture with a fresh correlation id.
pub fn assemble(
    resolved: &ResolvedClasses,
    plate_text: &str,
    country: &str,
    color: &str,
) -> Result<VehicleEvent, EventError> {
    Ok(VehicleEvent {
        vehicle_type: required("vehicle_type", resolved.vehicle_label())?,
        registration: required("registration", plate_text)?,
        brand: required("brand", resolved.brand_label)?,
        country: required("country", country)?,
        color: required("color", color)?,
        correlation_id: Uuid::new_v4(),
    })
}

fn required(field: &'static str, value: &str) -> Result<String, EventError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EventError::MissingField(field));
    }
    Ok(value.to_string())
}
