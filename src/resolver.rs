//! Class resolver.
//!
//! Collapses one frame's noisy detector output into at most one decision per
//! semantic role (vehicle type, plate, brand). A frame only resolves when all
//! three roles are jointly present above their confidence floors; partial
//! frames resolve to `None` and are skipped by the pipeline.
//!
//! Pruning is a pure function over an immutable candidate map. Candidates are
//! ordered by ascending class id, and every tie on confidence is won by the
//! lower class id.

use std::collections::BTreeMap;

use crate::detect::DetectionFrame;
use crate::frame::Rect;
use crate::labels::{self, ClassRole, CLASS_CAR, CLASS_TRUCK};

/// Minimum confidence for a detection to enter the candidate map.
pub const ACCEPT_FLOOR: f32 = 0.3;

/// Number of semantic roles; a pruned map never holds more entries.
pub const ROLE_COUNT: usize = 3;

/// Best detection seen for one class within a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub confidence: f32,
    pub bbox: Rect,
}

/// Per-frame map from class id to its highest-confidence candidate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassCandidateMap {
    entries: BTreeMap<u32, Candidate>,
}

impl ClassCandidateMap {
    /// Keep, per catalog class, the maximum confidence above `ACCEPT_FLOOR`.
    ///
    /// Class ids outside the catalog are dropped. Equal confidences keep the
    /// first box encountered.
    pub fn from_frame(frame: &DetectionFrame) -> Self {
        let mut entries: BTreeMap<u32, Candidate> = BTreeMap::new();
        for det in &frame.detections {
            if !exceeds(det.confidence, ACCEPT_FLOOR) || ClassRole::of(det.class_id).is_none() {
                continue;
            }
            let candidate = Candidate {
                confidence: det.confidence,
                bbox: det.bbox,
            };
            entries
                .entry(det.class_id)
                .and_modify(|best| {
                    if candidate.confidence > best.confidence {
                        *best = candidate;
                    }
                })
                .or_insert(candidate);
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, class_id: u32) -> Option<&Candidate> {
        self.entries.get(&class_id)
    }

    /// Class ids in ascending order.
    pub fn class_ids(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    /// Reduce the map to at most `ROLE_COUNT` entries.
    ///
    /// Maps already within the limit are returned unchanged. Otherwise the
    /// losing vehicle type is dropped first when both car and truck are
    /// present, then the two highest class ids are compared repeatedly and the
    /// less confident one is dropped.
    pub fn pruned(&self) -> ClassCandidateMap {
        let mut ordered: Vec<(u32, Candidate)> =
            self.entries.iter().map(|(id, c)| (*id, *c)).collect();
        if ordered.len() <= ROLE_COUNT {
            return self.clone();
        }

        if let (Some(car), Some(truck)) = (self.get(CLASS_CAR), self.get(CLASS_TRUCK)) {
            let loser = if truck.confidence > car.confidence {
                CLASS_CAR
            } else {
                CLASS_TRUCK
            };
            ordered.retain(|(id, _)| *id != loser);
        }

        while ordered.len() > ROLE_COUNT {
            let last = ordered.len() - 1;
            let drop = if ordered[last].1.confidence > ordered[last - 1].1.confidence {
                last - 1
            } else {
                last
            };
            ordered.remove(drop);
        }

        ClassCandidateMap {
            entries: ordered.into_iter().collect(),
        }
    }
}

impl FromIterator<(u32, Candidate)> for ClassCandidateMap {
    fn from_iter<I: IntoIterator<Item = (u32, Candidate)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Strict comparison; NaN never exceeds a floor.
fn exceeds(confidence: f32, floor: f32) -> bool {
    confidence > floor
}

/// Committed vehicle type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VehicleKind {
    Car,
    Truck,
}

impl VehicleKind {
    pub fn label(self) -> &'static str {
        match self {
            VehicleKind::Car => "car",
            VehicleKind::Truck => "truck",
        }
    }
}

/// One frame's committed classification.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedClasses {
    pub vehicle: VehicleKind,
    pub plate_present: bool,
    pub brand_label: &'static str,
    /// Box of the plate candidate, used to crop the fired frame.
    pub plate_bbox: Rect,
}

impl ResolvedClasses {
    pub fn vehicle_label(&self) -> &'static str {
        self.vehicle.label()
    }
}

/// Resolve one detector frame. `None` means the frame lacks a confident
/// vehicle, plate and brand triple.
pub fn resolve(frame: &DetectionFrame) -> Option<ResolvedClasses> {
    resolve_candidates(&ClassCandidateMap::from_frame(frame))
}

/// Resolve an already-built candidate map (pruning it first).
pub fn resolve_candidates(map: &ClassCandidateMap) -> Option<ResolvedClasses> {
    let pruned = map.pruned();
    if pruned.len() < ROLE_COUNT {
        return None;
    }

    let mut vehicle = None;
    let mut plate = None;
    let mut brand = None;
    for (class_id, candidate) in &pruned.entries {
        let Some(role) = ClassRole::of(*class_id) else {
            continue;
        };
        if !exceeds(candidate.confidence, role.confidence_floor()) {
            continue;
        }
        match role {
            ClassRole::VehicleType => vehicle = Some(*class_id),
            ClassRole::Plate => plate = Some(candidate.bbox),
            ClassRole::Brand => brand = Some(*class_id),
        }
    }

    let (vehicle_id, plate_bbox, brand_id) = (vehicle?, plate?, brand?);
    let vehicle = if vehicle_id == CLASS_TRUCK {
        VehicleKind::Truck
    } else {
        VehicleKind::Car
    };
    Some(ResolvedClasses {
        vehicle,
        plate_present: true,
        brand_label: labels::class_label(brand_id)?,
        plate_bbox,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;

    const TOYOTA: u32 = 3;
    const BMW: u32 = 9;
    const AUDI: u32 = 11;

    fn rect() -> Rect {
        Rect::new(10.0, 10.0, 60.0, 30.0)
    }

    fn frame(dets: &[(u32, f32)]) -> DetectionFrame {
        DetectionFrame::new(
            1,
            dets.iter()
                .map(|(id, conf)| Detection::new(*id, *conf, rect()))
                .collect(),
        )
    }

    fn map(entries: &[(u32, f32)]) -> ClassCandidateMap {
        entries
            .iter()
            .map(|(id, conf)| {
                (
                    *id,
                    Candidate {
                        confidence: *conf,
                        bbox: rect(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn candidate_map_keeps_max_confidence_above_floor() {
        let m = ClassCandidateMap::from_frame(&frame(&[
            (0, 0.4),
            (0, 0.9),
            (0, 0.6),
            (2, 0.3),
            (5, 0.31),
            (40, 0.99),
        ]));
        assert_eq!(m.class_ids(), vec![0, 5]);
        assert_eq!(m.get(0).unwrap().confidence, 0.9);
    }

    #[test]
    fn candidate_map_keeps_box_of_best_detection() {
        let best = Rect::new(1.0, 2.0, 3.0, 4.0);
        let f = DetectionFrame::new(
            1,
            vec![
                Detection::new(2, 0.6, rect()),
                Detection::new(2, 0.8, best),
            ],
        );
        assert_eq!(ClassCandidateMap::from_frame(&f).get(2).unwrap().bbox, best);
    }

    #[test]
    fn empty_frame_is_absent() {
        assert_eq!(resolve(&frame(&[])), None);
    }

    #[test]
    fn complete_triple_resolves() {
        let resolved = resolve(&frame(&[(0, 0.9), (2, 0.7), (TOYOTA, 0.6)])).unwrap();
        assert_eq!(resolved.vehicle_label(), "car");
        assert!(resolved.plate_present);
        assert_eq!(resolved.brand_label, "Toyota");
        assert_eq!(resolved.plate_bbox, rect());
    }

    #[test]
    fn any_missing_role_is_absent() {
        // no vehicle
        assert_eq!(resolve(&frame(&[(2, 0.7), (TOYOTA, 0.6), (BMW, 0.7)])), None);
        // no plate
        assert_eq!(resolve(&frame(&[(0, 0.9), (TOYOTA, 0.6), (BMW, 0.7)])), None);
        // no brand
        assert_eq!(resolve(&frame(&[(0, 0.9), (1, 0.8), (2, 0.7)])), None);
        // only a car
        assert_eq!(resolve(&frame(&[(0, 0.9)])), None);
    }

    #[test]
    fn role_floors_apply_after_pruning() {
        // plate and brand enter the map (> 0.3) but miss their 0.5 floor
        assert_eq!(resolve(&frame(&[(0, 0.9), (2, 0.45), (TOYOTA, 0.6)])), None);
        assert_eq!(resolve(&frame(&[(0, 0.9), (2, 0.7), (TOYOTA, 0.5)])), None);
    }

    #[test]
    fn competing_car_and_truck_keep_the_more_confident() {
        let resolved =
            resolve(&frame(&[(0, 0.8), (1, 0.4), (2, 0.7), (TOYOTA, 0.6)])).unwrap();
        assert_eq!(resolved.vehicle, VehicleKind::Car);

        let resolved =
            resolve(&frame(&[(0, 0.4), (1, 0.8), (2, 0.7), (TOYOTA, 0.6)])).unwrap();
        assert_eq!(resolved.vehicle, VehicleKind::Truck);
    }

    #[test]
    fn car_truck_tie_keeps_car() {
        let pruned = map(&[(0, 0.7), (1, 0.7), (2, 0.7), (TOYOTA, 0.6)]).pruned();
        assert_eq!(pruned.class_ids(), vec![0, 2, TOYOTA]);
    }

    #[test]
    fn pruning_five_candidates_converges_on_truck_plate_brand() {
        // car 0.2 never enters the map
        let f = frame(&[(0, 0.2), (1, 0.9), (2, 0.55), (TOYOTA, 0.4), (BMW, 0.7)]);
        let m = ClassCandidateMap::from_frame(&f);
        assert_eq!(m.len(), 4);
        let pruned = m.pruned();
        assert_eq!(pruned.class_ids(), vec![1, 2, BMW]);

        let resolved = resolve(&f).unwrap();
        assert_eq!(resolved.vehicle, VehicleKind::Truck);
        assert_eq!(resolved.brand_label, "BMW");
    }

    #[test]
    fn pruning_keeps_best_of_many_brands() {
        let pruned = map(&[(0, 0.9), (2, 0.7), (TOYOTA, 0.6), (BMW, 0.95), (AUDI, 0.5)]).pruned();
        assert_eq!(pruned.class_ids(), vec![0, 2, BMW]);
    }

    #[test]
    fn brand_tie_keeps_lower_class_id() {
        let pruned = map(&[(0, 0.9), (2, 0.7), (TOYOTA, 0.6), (BMW, 0.6)]).pruned();
        assert_eq!(pruned.class_ids(), vec![0, 2, TOYOTA]);
    }

    #[test]
    fn pruning_does_not_touch_small_maps() {
        let m = map(&[(0, 0.9), (1, 0.8), (2, 0.7)]);
        assert_eq!(m.pruned(), m);
    }

    #[test]
    fn pruning_leaves_input_untouched() {
        let m = map(&[(0, 0.9), (1, 0.8), (2, 0.7), (TOYOTA, 0.6), (BMW, 0.65)]);
        let before = m.clone();
        let pruned = m.pruned();
        assert_eq!(m, before);
        assert_eq!(pruned.len(), ROLE_COUNT);
    }

    #[test]
    fn resolve_is_idempotent() {
        let f = frame(&[(0, 0.2), (1, 0.9), (2, 0.55), (TOYOTA, 0.4), (BMW, 0.7), (2, 0.6)]);
        let first = resolve(&f);
        for _ in 0..5 {
            assert_eq!(resolve(&f), first);
        }
    }

    #[test]
    fn every_brand_id_resolves_to_its_label() {
        for brand in labels::BRAND_FIRST..=labels::BRAND_LAST {
            let resolved = resolve(&frame(&[(1, 0.9), (2, 0.9), (brand, 0.9)])).unwrap();
            assert_eq!(Some(resolved.brand_label), labels::class_label(brand));
            assert_eq!(resolved.vehicle_label(), "truck");
        }
    }
}
