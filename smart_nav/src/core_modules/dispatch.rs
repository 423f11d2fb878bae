// THEORY:
// The `dispatch` module is the boundary between the decision layer and the outside
// world. It translates a `Decision` into the motor controller's command vocabulary,
// hands it to the `Actuator`, and reports what happened through a `TelemetrySink`.
//
// Key architectural principles:
// 1.  **Fixed capabilities**: the adapter owns one `Actuator` and one
//     `TelemetrySink`, chosen at construction (hardware or simulation).
// 2.  **Failures are reported, not fatal**: an actuator or transport error is logged
//     and returned in the `DispatchReport`; the next cycle proceeds regardless.

use crate::core_modules::environment::LaneDirection;
use crate::core_modules::hardware::Actuator;
use crate::core_modules::navigation::{Action, Decision};
use crate::error::NavResult;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Motor controller action keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorAction {
    Forward,
    Backward,
    Left,
    Right,
    #[default]
    Stop,
    EmergencyStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnType {
    #[default]
    Normal,
    Sharp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    Autonomous,
    Manual,
}

/// One command for the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorCommand {
    pub action: MotorAction,
    /// 0..=100; the actuator clamps to its own limits.
    pub speed: u8,
    pub turn_type: TurnType,
    pub source: CommandSource,
}

/// What the motor controller reports after a command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotorStatus {
    pub current_action: MotorAction,
    pub target_speed: u8,
    pub actual_speed: u8,
    pub emergency_stop_active: bool,
    pub total_commands: u64,
}

/// Navigation-side telemetry for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NavigationTelemetry {
    pub lane_direction: LaneDirection,
    pub lane_confidence: f64,
    pub obstacle_detected: bool,
    /// 0 when no obstacle is on the path.
    pub obstacle_distance_pixels: u32,
    pub path_clear: bool,
    pub fps: f64,
    pub camera_active: bool,
}

/// Summary of a dispatched decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationUpdate {
    pub action: Action,
    pub target_speed: u8,
    pub reason: String,
    pub filtered: bool,
    pub emergency_stop: bool,
}

/// Outbound side of the transport collaborator.
///
/// # Contract
///
/// * Calls must not block the caller's cycle; a sink that cannot deliver returns
///   an error instead of waiting.
/// * No listener is not an error.
pub trait TelemetrySink {
    fn send_navigation_update(&mut self, update: &NavigationUpdate) -> NavResult<()>;

    fn send_telemetry(&mut self, telemetry: &NavigationTelemetry) -> NavResult<()>;

    fn send_motor_status(&mut self, status: &MotorStatus) -> NavResult<()>;
}

/// Maps a decision onto the motor vocabulary.
pub fn command_for(decision: &Decision) -> MotorCommand {
    let (action, turn_type) = match decision.action {
        Action::MoveForward => (MotorAction::Forward, TurnType::Normal),
        Action::TurnLeft => (MotorAction::Left, TurnType::Normal),
        Action::SharpLeft => (MotorAction::Left, TurnType::Sharp),
        Action::TurnRight => (MotorAction::Right, TurnType::Normal),
        Action::SharpRight => (MotorAction::Right, TurnType::Sharp),
        Action::EmergencyStop => (MotorAction::EmergencyStop, TurnType::Normal),
        Action::TrafficStop | Action::StopSignStop | Action::Stop => (MotorAction::Stop, TurnType::Normal),
    };
    MotorCommand {
        action,
        speed: decision.target_speed.min(100),
        turn_type,
        source: CommandSource::Autonomous,
    }
}

/// Result of `DispatchAdapter::dispatch`.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub command: MotorCommand,
    pub motor_status: Option<MotorStatus>,
    pub actuator_error: Option<String>,
    pub transport_error: Option<String>,
}

impl DispatchReport {
    pub fn is_ok(&self) -> bool {
        self.actuator_error.is_none() && self.transport_error.is_none()
    }
}

pub struct DispatchAdapter<A, S> {
    actuator: A,
    sink: S,
}

impl<A: Actuator, S: TelemetrySink> DispatchAdapter<A, S> {
    pub fn new(actuator: A, sink: S) -> Self {
        Self { actuator, sink }
    }

    /// Sends the decision to the actuator and a navigation update to the sink.
    pub fn dispatch(&mut self, decision: &Decision) -> DispatchReport {
        let command = command_for(decision);

        let (motor_status, actuator_error) = match self.actuator.execute(&command) {
            Ok(status) => (Some(status), None),
            Err(e) => {
                warn!(error = %e, action = ?command.action, "actuator rejected command");
                (None, Some(e.to_string()))
            }
        };

        let update = NavigationUpdate {
            action: decision.action,
            target_speed: decision.target_speed,
            reason: decision.reason.clone(),
            filtered: decision.filtered,
            emergency_stop: decision.action == Action::EmergencyStop,
        };
        let transport_error = self.sink.send_navigation_update(&update).err().map(|e| {
            warn!(error = %e, "navigation update not delivered");
            e.to_string()
        });

        DispatchReport {
            command,
            motor_status,
            actuator_error,
            transport_error,
        }
    }

    /// Forwards telemetry; returns whether it was delivered.
    pub fn publish_telemetry(&mut self, telemetry: &NavigationTelemetry) -> bool {
        match self.sink.send_telemetry(telemetry) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "telemetry not delivered");
                false
            }
        }
    }

    /// Forwards the actuator's current status; returns whether it was delivered.
    pub fn publish_motor_status(&mut self) -> bool {
        let status = self.actuator.status();
        match self.sink.send_motor_status(&status) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "motor status not delivered");
                false
            }
        }
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::hardware::SimulatedMotorController;
    use crate::error::NavError;

    #[derive(Default)]
    struct RecordingSink {
        updates: Vec<NavigationUpdate>,
        telemetry: Vec<NavigationTelemetry>,
        fail: bool,
    }

    impl TelemetrySink for RecordingSink {
        fn send_navigation_update(&mut self, update: &NavigationUpdate) -> NavResult<()> {
            if self.fail {
                return Err(NavError::transport("link down"));
            }
            self.updates.push(update.clone());
            Ok(())
        }

        fn send_telemetry(&mut self, telemetry: &NavigationTelemetry) -> NavResult<()> {
            if self.fail {
                return Err(NavError::transport("link down"));
            }
            self.telemetry.push(*telemetry);
            Ok(())
        }

        fn send_motor_status(&mut self, _status: &MotorStatus) -> NavResult<()> {
            Ok(())
        }
    }

    fn decision(action: Action, speed: u8) -> Decision {
        Decision {
            action,
            target_speed: speed,
            reason: "test".into(),
            filtered: false,
        }
    }

    #[test]
    fn maps_every_action() {
        let cases = [
            (Action::MoveForward, MotorAction::Forward, TurnType::Normal),
            (Action::TurnLeft, MotorAction::Left, TurnType::Normal),
            (Action::SharpLeft, MotorAction::Left, TurnType::Sharp),
            (Action::TurnRight, MotorAction::Right, TurnType::Normal),
            (Action::SharpRight, MotorAction::Right, TurnType::Sharp),
            (Action::EmergencyStop, MotorAction::EmergencyStop, TurnType::Normal),
            (Action::TrafficStop, MotorAction::Stop, TurnType::Normal),
            (Action::StopSignStop, MotorAction::Stop, TurnType::Normal),
            (Action::Stop, MotorAction::Stop, TurnType::Normal),
        ];
        for (action, motor, turn) in cases {
            let cmd = command_for(&decision(action, 50));
            assert_eq!((cmd.action, cmd.turn_type), (motor, turn), "{action:?}");
            assert_eq!(cmd.source, CommandSource::Autonomous);
        }
    }

    #[test]
    fn dispatch_drives_actuator_and_reports() {
        let mut adapter = DispatchAdapter::new(SimulatedMotorController::new(20, 100), RecordingSink::default());
        let report = adapter.dispatch(&decision(Action::TurnRight, 75));
        assert!(report.is_ok());
        let status = report.motor_status.unwrap();
        assert_eq!(status.current_action, MotorAction::Right);
        assert_eq!(status.actual_speed, 75);
        assert_eq!(adapter.sink().updates.len(), 1);
        assert!(!adapter.sink().updates[0].emergency_stop);
    }

    #[test]
    fn actuator_refusal_does_not_block_update() {
        let mut adapter = DispatchAdapter::new(SimulatedMotorController::new(20, 100), RecordingSink::default());
        let stop = adapter.dispatch(&decision(Action::EmergencyStop, 0));
        assert!(adapter.sink().updates[0].emergency_stop);
        assert!(stop.motor_status.unwrap().emergency_stop_active);

        let report = adapter.dispatch(&decision(Action::MoveForward, 75));
        assert!(report.actuator_error.is_some());
        assert!(report.transport_error.is_none());
        assert_eq!(adapter.sink().updates.len(), 2);
    }

    #[test]
    fn transport_failure_is_reported() {
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let mut adapter = DispatchAdapter::new(SimulatedMotorController::new(20, 100), sink);
        let report = adapter.dispatch(&decision(Action::MoveForward, 60));
        assert!(report.motor_status.is_some());
        assert_eq!(report.transport_error.as_deref(), Some("transport error: link down"));
        assert!(!adapter.publish_telemetry(&NavigationTelemetry::default()));
    }
}
