// THEORY:
// The vehicle's hardware collaborators are reached only through the capability
// traits in this module. Each trait has a simulation implementation here so the
// whole pipeline runs, and is tested, without a camera, a range finder or motors.
//
// Key architectural principles:
// 1.  **Narrow traits**: one method per thing the pipeline needs from a device.
// 2.  **Selected at construction**: the owner picks real or simulated devices once;
//     nothing downstream checks which it got.
// 3.  **Driver semantics preserved**: the range sensor reports the 400 cm sentinel
//     on timeout, and the motor controller clamps speed and latches emergency stop.

use crate::core_modules::dispatch::{MotorAction, MotorCommand, MotorStatus};
use crate::core_modules::environment::RANGE_TIMEOUT_SENTINEL_CM;
use crate::error::{NavError, NavResult};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;

/// Produces one frame per call.
pub trait FrameSource {
    fn capture(&mut self) -> NavResult<RgbImage>;

    /// Whether the device is open and delivering.
    fn is_active(&self) -> bool;
}

/// Single-point range finder.
pub trait RangeSensor {
    /// Distance in cm; [`RANGE_TIMEOUT_SENTINEL_CM`] when no echo returned in time.
    fn read_distance_cm(&mut self) -> f64;
}

/// Motor controller.
pub trait Actuator {
    fn execute(&mut self, command: &MotorCommand) -> NavResult<MotorStatus>;

    fn status(&self) -> MotorStatus;

    /// Stops immediately and latches until `reset_emergency_stop`.
    fn emergency_stop(&mut self) -> MotorStatus;

    fn reset_emergency_stop(&mut self);
}

/// Renders a grey floor with a white lane band drifting left and right.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_index: u64,
    drift_px: f64,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_index: 0,
            drift_px: 0.0,
        }
    }

    /// Peak horizontal swing of the lane centre.
    pub fn with_drift(mut self, drift_px: f64) -> Self {
        self.drift_px = drift_px;
        self
    }

    fn lane_center(&self) -> f64 {
        self.width as f64 / 2.0 + self.drift_px * (self.frame_index as f64 * 0.05).sin()
    }
}

impl FrameSource for SyntheticCamera {
    fn capture(&mut self) -> NavResult<RgbImage> {
        let center = self.lane_center();
        let half_band = self.width as f64 / 10.0;
        let lane_top = self.height / 2;
        let frame = RgbImage::from_fn(self.width, self.height, |x, y| {
            if y >= lane_top && (x as f64 - center).abs() <= half_band {
                Rgb([245, 245, 245])
            } else {
                Rgb([110, 110, 110])
            }
        });
        self.frame_index += 1;
        Ok(frame)
    }

    fn is_active(&self) -> bool {
        true
    }
}

/// Replays a fixed list of readings, then reports `fallback_cm` forever.
pub struct ScriptedRanger {
    readings: VecDeque<f64>,
    fallback_cm: f64,
}

impl ScriptedRanger {
    pub fn new(readings: impl IntoIterator<Item = f64>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            fallback_cm: RANGE_TIMEOUT_SENTINEL_CM,
        }
    }

    /// A ranger that never sees anything.
    pub fn clear() -> Self {
        Self::new([])
    }

    pub fn with_fallback(mut self, fallback_cm: f64) -> Self {
        self.fallback_cm = fallback_cm;
        self
    }
}

impl RangeSensor for ScriptedRanger {
    fn read_distance_cm(&mut self) -> f64 {
        match self.readings.pop_front() {
            Some(d) if d.is_finite() && d >= 0.0 => d.min(RANGE_TIMEOUT_SENTINEL_CM),
            Some(_) => RANGE_TIMEOUT_SENTINEL_CM,
            None => self.fallback_cm,
        }
    }
}

/// In-memory motor controller with the same limits as the drive board.
#[derive(Debug, Clone)]
pub struct SimulatedMotorController {
    min_speed: u8,
    max_speed: u8,
    status: MotorStatus,
}

impl SimulatedMotorController {
    pub fn new(min_speed: u8, max_speed: u8) -> Self {
        Self {
            min_speed,
            max_speed: max_speed.max(min_speed),
            status: MotorStatus::default(),
        }
    }

    fn halt(&mut self, action: MotorAction) {
        self.status.current_action = action;
        self.status.target_speed = 0;
        self.status.actual_speed = 0;
    }
}

impl Actuator for SimulatedMotorController {
    fn execute(&mut self, command: &MotorCommand) -> NavResult<MotorStatus> {
        match command.action {
            MotorAction::EmergencyStop => return Ok(self.emergency_stop()),
            MotorAction::Stop => self.halt(MotorAction::Stop),
            moving => {
                if self.status.emergency_stop_active {
                    return Err(NavError::actuator("emergency stop active"));
                }
                let speed = command.speed.clamp(self.min_speed, self.max_speed);
                self.status.current_action = moving;
                self.status.target_speed = speed;
                self.status.actual_speed = speed;
            }
        }
        self.status.total_commands += 1;
        Ok(self.status)
    }

    fn status(&self) -> MotorStatus {
        self.status
    }

    fn emergency_stop(&mut self) -> MotorStatus {
        self.halt(MotorAction::EmergencyStop);
        self.status.emergency_stop_active = true;
        self.status.total_commands += 1;
        self.status
    }

    fn reset_emergency_stop(&mut self) {
        self.status.emergency_stop_active = false;
        self.halt(MotorAction::Stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::dispatch::{CommandSource, TurnType};

    fn cmd(action: MotorAction, speed: u8) -> MotorCommand {
        MotorCommand {
            action,
            speed,
            turn_type: TurnType::Normal,
            source: CommandSource::Manual,
        }
    }

    #[test]
    fn speed_is_clamped() {
        let mut motors = SimulatedMotorController::new(20, 100);
        assert_eq!(motors.execute(&cmd(MotorAction::Forward, 5)).unwrap().actual_speed, 20);
        assert_eq!(motors.execute(&cmd(MotorAction::Left, 180)).unwrap().actual_speed, 100);
        assert_eq!(motors.status().total_commands, 2);
    }

    #[test]
    fn emergency_latch_blocks_motion_until_reset() {
        let mut motors = SimulatedMotorController::new(20, 100);
        motors.execute(&cmd(MotorAction::EmergencyStop, 0)).unwrap();
        assert!(motors.execute(&cmd(MotorAction::Forward, 50)).is_err());
        assert!(motors.execute(&cmd(MotorAction::Stop, 0)).is_ok());

        motors.reset_emergency_stop();
        let status = motors.execute(&cmd(MotorAction::Backward, 40)).unwrap();
        assert_eq!(status.current_action, MotorAction::Backward);
        assert!(!status.emergency_stop_active);
    }

    #[test]
    fn ranger_replays_then_falls_back() {
        let mut ranger = ScriptedRanger::new([12.0, f64::NAN, 900.0]);
        assert_eq!(ranger.read_distance_cm(), 12.0);
        assert_eq!(ranger.read_distance_cm(), RANGE_TIMEOUT_SENTINEL_CM);
        assert_eq!(ranger.read_distance_cm(), RANGE_TIMEOUT_SENTINEL_CM);
        assert_eq!(ranger.read_distance_cm(), RANGE_TIMEOUT_SENTINEL_CM);
        let mut near = ScriptedRanger::clear().with_fallback(25.0);
        assert_eq!(near.read_distance_cm(), 25.0);
    }

    #[test]
    fn synthetic_camera_draws_lane_in_lower_half() {
        let mut camera = SyntheticCamera::new(160, 120);
        let frame = camera.capture().unwrap();
        assert_eq!(frame.dimensions(), (160, 120));
        assert_eq!(frame.get_pixel(80, 100), &Rgb([245, 245, 245]));
        assert_eq!(frame.get_pixel(80, 10), &Rgb([110, 110, 110]));
        assert_eq!(frame.get_pixel(5, 100), &Rgb([110, 110, 110]));
    }
}
