//! Capture trigger: decides when a tracked vehicle has come to rest.
//!
//! Every frame updates the stream's background model. While a resolved
//! vehicle is present the trigger is `Armed` and checks the largest
//! foreground region; once its bounding box covers more than
//! `area_threshold` square pixels the frame is captured and the trigger
//! fires. After firing it waits for a frame with no resolved vehicle before
//! it can arm again, so one passage yields one capture.

use crate::frame::Frame;
use crate::motion::{BackgroundModel, DEFAULT_HISTORY, DEFAULT_VAR_THRESHOLD};
use crate::resolver::ResolvedClasses;

pub const DEFAULT_AREA_THRESHOLD: u64 = 200;
pub const DEFAULT_BINARY_THRESHOLD: u8 = 120;

#[derive(Clone, Debug, PartialEq)]
pub struct TriggerSettings {
    /// Bounding-box area (square pixels) the largest region must exceed.
    pub area_threshold: u64,
    /// Mask values strictly above this count as foreground.
    pub binary_threshold: u8,
    /// Drop the learned background after every capture.
    pub reset_background_on_fire: bool,
    pub history: u32,
    pub var_threshold: f32,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            area_threshold: DEFAULT_AREA_THRESHOLD,
            binary_threshold: DEFAULT_BINARY_THRESHOLD,
            reset_background_on_fire: false,
            history: DEFAULT_HISTORY,
            var_threshold: DEFAULT_VAR_THRESHOLD,
        }
    }
}

/// Per-stream motion bookkeeping.
#[derive(Clone, Debug)]
pub struct MotionState {
    pub background: BackgroundModel,
    /// Bounding area of the largest region seen on the last armed frame.
    pub last_foreground_area: Option<u64>,
}

impl MotionState {
    fn new(settings: &TriggerSettings) -> Self {
        Self {
            background: BackgroundModel::new(settings.history, settings.var_threshold),
            last_foreground_area: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TriggerState {
    Idle,
    Armed {
        since_frame: u64,
        resolved: ResolvedClasses,
    },
    /// Fired; waiting for the vehicle to leave.
    AwaitingDeparture {
        fired_frame: u64,
    },
}

/// A frame captured at fire time together with what was resolved on it.
#[derive(Debug)]
pub struct CapturedFrame {
    pub frame: Frame,
    pub resolved: ResolvedClasses,
    pub foreground_area: u64,
}

#[derive(Debug)]
pub enum TriggerDecision {
    NotYet,
    Fired(CapturedFrame),
}

impl TriggerDecision {
    pub fn is_fired(&self) -> bool {
        matches!(self, TriggerDecision::Fired(_))
    }
}

pub struct CaptureTrigger {
    settings: TriggerSettings,
    state: TriggerState,
    motion: MotionState,
}

impl CaptureTrigger {
    pub fn new(settings: TriggerSettings) -> Self {
        let motion = MotionState::new(&settings);
        Self {
            settings,
            state: TriggerState::Idle,
            motion,
        }
    }

    pub fn state(&self) -> &TriggerState {
        &self.state
    }

    pub fn motion(&self) -> &MotionState {
        &self.motion
    }

    pub fn settings(&self) -> &TriggerSettings {
        &self.settings
    }

    /// Back to `Idle` with an empty background model.
    pub fn reset(&mut self) {
        self.state = TriggerState::Idle;
        self.motion = MotionState::new(&self.settings);
    }

    /// Feed one frame and the resolver's verdict for it.
    ///
    /// An absent verdict while `Armed` keeps the armed vehicle but skips the
    /// area check: a capture always pairs a frame with its own resolution.
    pub fn observe(&mut self, frame: Frame, resolved: Option<ResolvedClasses>) -> TriggerDecision {
        let luma = frame.luminance();
        let mask = self
            .motion
            .background
            .apply(&luma, frame.width, frame.height);

        let resolved = match (&self.state, resolved) {
            (TriggerState::AwaitingDeparture { fired_frame }, None) => {
                log::debug!(
                    "frame {}: vehicle from frame {} departed, trigger idle",
                    frame.index,
                    fired_frame
                );
                self.state = TriggerState::Idle;
                return TriggerDecision::NotYet;
            }
            (TriggerState::AwaitingDeparture { .. }, Some(_)) | (_, None) => {
                return TriggerDecision::NotYet;
            }
            (_, Some(resolved)) => resolved,
        };

        let since_frame = match &self.state {
            TriggerState::Armed { since_frame, .. } => *since_frame,
            _ => {
                log::debug!(
                    "frame {}: {} with plate resolved, trigger armed",
                    frame.index,
                    resolved.vehicle_label()
                );
                frame.index
            }
        };

        let area = mask
            .binarize(self.settings.binary_threshold)
            .largest_region()
            .map(|region| region.bounding_area())
            .unwrap_or(0);
        self.motion.last_foreground_area = Some(area);

        if area <= self.settings.area_threshold {
            self.state = TriggerState::Armed {
                since_frame,
                resolved,
            };
            return TriggerDecision::NotYet;
        }

        log::info!(
            "frame {}: foreground area {} > {}, capturing {} (armed since frame {})",
            frame.index,
            area,
            self.settings.area_threshold,
            resolved.vehicle_label(),
            since_frame
        );
        self.state = TriggerState::AwaitingDeparture {
            fired_frame: frame.index,
        };
        if self.settings.reset_background_on_fire {
            self.motion.background.reset();
        }
        TriggerDecision::Fired(CapturedFrame {
            frame,
            resolved,
            foreground_area: area,
        })
    }
}

impl Default for CaptureTrigger {
    fn default() -> Self {
        Self::new(TriggerSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rect;
    use crate::resolver::VehicleKind;

    const GREY: [u8; 3] = [128, 128, 128];
    const WHITE: [u8; 3] = [255, 255, 255];

    fn resolved() -> ResolvedClasses {
        ResolvedClasses {
            vehicle: VehicleKind::Car,
            plate_present: true,
            brand_label: "Toyota",
            plate_bbox: Rect::new(10.0, 10.0, 40.0, 20.0),
        }
    }

    fn frame_with_patch(index: u64, x: f32, y: f32, w: f32, h: f32) -> Frame {
        let mut frame = Frame::filled(index, 160, 120, GREY);
        frame.fill_rect(Rect::new(x, y, x + w, y + h), WHITE);
        frame
    }

    fn background(index: u64) -> Frame {
        Frame::filled(index, 160, 120, GREY)
    }

    #[test]
    fn absent_frames_keep_trigger_idle() {
        let mut trigger = CaptureTrigger::default();
        assert!(!trigger.observe(background(0), None).is_fired());
        assert!(!trigger.observe(frame_with_patch(1, 0.0, 0.0, 30.0, 30.0), None).is_fired());
        assert_eq!(trigger.state(), &TriggerState::Idle);
        assert_eq!(trigger.motion().background.frames_seen(), 2);
    }

    #[test]
    fn small_motion_arms_without_firing() {
        let mut trigger = CaptureTrigger::default();
        trigger.observe(background(0), None);
        let decision = trigger.observe(frame_with_patch(1, 5.0, 5.0, 10.0, 5.0), Some(resolved()));
        assert!(!decision.is_fired());
        assert!(matches!(
            trigger.state(),
            TriggerState::Armed { since_frame: 1, .. }
        ));
        assert_eq!(trigger.motion().last_foreground_area, Some(50));
    }

    #[test]
    fn large_motion_fires_with_captured_frame() {
        let mut trigger = CaptureTrigger::default();
        trigger.observe(background(0), None);
        trigger.observe(frame_with_patch(1, 5.0, 5.0, 10.0, 5.0), Some(resolved()));
        let decision = trigger.observe(frame_with_patch(2, 60.0, 40.0, 20.0, 25.0), Some(resolved()));

        match decision {
            TriggerDecision::Fired(captured) => {
                assert_eq!(captured.frame.index, 2);
                assert_eq!(captured.foreground_area, 500);
                assert_eq!(captured.resolved, resolved());
            }
            TriggerDecision::NotYet => panic!("expected trigger to fire"),
        }
        assert_eq!(
            trigger.state(),
            &TriggerState::AwaitingDeparture { fired_frame: 2 }
        );
    }

    #[test]
    fn area_equal_to_threshold_does_not_fire() {
        let mut trigger = CaptureTrigger::default();
        trigger.observe(background(0), None);
        // 20 x 10 = 200
        let decision = trigger.observe(frame_with_patch(1, 50.0, 50.0, 20.0, 10.0), Some(resolved()));
        assert!(!decision.is_fired());
        assert_eq!(trigger.motion().last_foreground_area, Some(200));
    }

    #[test]
    fn no_foreground_stays_armed() {
        let mut trigger = CaptureTrigger::default();
        trigger.observe(background(0), None);
        assert!(!trigger.observe(background(1), Some(resolved())).is_fired());
        assert!(matches!(trigger.state(), TriggerState::Armed { .. }));
        assert_eq!(trigger.motion().last_foreground_area, Some(0));
    }

    #[test]
    fn fires_once_per_passage_then_rearms_after_departure() {
        let mut trigger = CaptureTrigger::default();
        trigger.observe(background(0), None);

        let mut fired = 0;
        for i in 0..4u64 {
            let x = 5.0 + i as f32 * 35.0;
            let frame = frame_with_patch(i + 1, x, 10.0, 30.0, 30.0);
            if trigger.observe(frame, Some(resolved())).is_fired() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);

        assert!(!trigger.observe(background(5), None).is_fired());
        assert_eq!(trigger.state(), &TriggerState::Idle);

        let again = trigger.observe(frame_with_patch(6, 20.0, 70.0, 30.0, 30.0), Some(resolved()));
        assert!(again.is_fired());
    }

    #[test]
    fn absent_frame_while_armed_keeps_armed_vehicle() {
        let mut trigger = CaptureTrigger::default();
        trigger.observe(background(0), None);
        trigger.observe(background(1), Some(resolved()));
        let decision = trigger.observe(frame_with_patch(2, 50.0, 50.0, 30.0, 30.0), None);
        assert!(!decision.is_fired());
        assert!(matches!(
            trigger.state(),
            TriggerState::Armed { since_frame: 1, .. }
        ));
    }

    #[test]
    fn reset_background_on_fire_clears_model() {
        let mut trigger = CaptureTrigger::new(TriggerSettings {
            reset_background_on_fire: true,
            ..TriggerSettings::default()
        });
        trigger.observe(background(0), None);
        let decision = trigger.observe(frame_with_patch(1, 20.0, 20.0, 30.0, 30.0), Some(resolved()));
        assert!(decision.is_fired());
        assert_eq!(trigger.motion().background.frames_seen(), 0);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut trigger = CaptureTrigger::default();
        trigger.observe(background(0), None);
        trigger.observe(background(1), Some(resolved()));
        trigger.reset();
        assert_eq!(trigger.state(), &TriggerState::Idle);
        assert_eq!(trigger.motion().background.frames_seen(), 0);
        assert!(trigger.motion().last_foreground_area.is_none());
    }
}
