// THEORY:
// The `Vehicle` is the supervisor around the navigation pipeline. It owns the
// collaborators, runs one cycle per `tick`, and applies the operator's commands.
//
// Cycle order:
// 1.  Capture a frame and read the range sensor; a failed capture skips the cycle.
// 2.  Run the pipeline and, when streaming, publish the annotated frame.
// 3.  Emergency check: an obstacle closer than the emergency distance latches the
//     emergency stop before any decision is made, and nothing else runs this cycle.
// 4.  In auto mode without manual override, dispatch the decision.
// 5.  Publish telemetry and motor status; every `status_interval_cycles` also
//     publish a system status record.

use std::time::Instant;

use nav_link::{FramePacket, InboundCommand, LinkBus, LinkMessage, Severity, StreamAction, StreamControl, SystemStatus};
use smart_nav::config::{NavConfig, StreamingConfig, VehicleConfig};
use smart_nav::core_modules::dispatch::{CommandSource, DispatchAdapter, DispatchReport, MotorAction, MotorCommand, TurnType};
use smart_nav::core_modules::overlay;
use smart_nav::{Actuator, CycleReport, Frame, FrameSource, NavigationPipeline, RangeSensor};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VehicleState {
    pub auto_mode: bool,
    pub manual_override: bool,
    pub emergency_stop: bool,
}

/// What one `tick` did.
#[derive(Debug)]
pub enum CycleOutcome {
    CaptureFailed,
    EmergencyStop(CycleReport),
    /// Decision computed but not sent to the motors.
    Observed(CycleReport),
    Driven(CycleReport, DispatchReport),
}

pub struct Vehicle<A> {
    camera: Box<dyn FrameSource>,
    ranger: Box<dyn RangeSensor>,
    pipeline: NavigationPipeline,
    adapter: DispatchAdapter<A, LinkBus>,
    bus: LinkBus,
    state: VehicleState,
    vehicle_config: VehicleConfig,
    streaming: StreamingConfig,
    obstacle_threshold_cm: f64,
    loop_count: u64,
    started: Instant,
}

impl<A: Actuator> Vehicle<A> {
    pub fn new(
        config: NavConfig,
        camera: Box<dyn FrameSource>,
        ranger: Box<dyn RangeSensor>,
        actuator: A,
        bus: LinkBus,
    ) -> Self {
        Self {
            camera,
            ranger,
            adapter: DispatchAdapter::new(actuator, bus.clone()),
            bus,
            state: VehicleState::default(),
            vehicle_config: config.vehicle.clone(),
            streaming: config.streaming.clone(),
            obstacle_threshold_cm: config.navigation.obstacle_threshold_cm,
            pipeline: NavigationPipeline::new(config),
            loop_count: 0,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    pub fn actuator(&self) -> &A {
        self.adapter.actuator()
    }

    pub fn loop_count(&self) -> u64 {
        self.loop_count
    }

    pub fn tick(&mut self) -> CycleOutcome {
        // Stage 1: Sensing
        let image = match self.camera.capture() {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "frame capture failed, skipping cycle");
                return CycleOutcome::CaptureFailed;
            }
        };
        let range_cm = self.ranger.read_distance_cm();

        // Stage 2: Perception and Decision
        let frame = Frame::from_rgb_image(&image);
        let mut report = self.pipeline.process_cycle(&frame, range_cm);
        report.telemetry.camera_active = self.camera.is_active();
        if self.streaming.enabled && !report.skipped {
            self.publish_stream_frame(&frame, &report);
        }

        // Stage 3: Emergency Check
        let obstacle_detected = range_cm < self.obstacle_threshold_cm || report.environment.obstacle_present;
        if obstacle_detected && range_cm < self.vehicle_config.emergency_distance_cm {
            self.handle_emergency_stop("Emergency stop activated due to safety conditions");
            self.loop_count += 1;
            return CycleOutcome::EmergencyStop(report);
        }

        // Stage 4: Dispatch
        let dispatched = if self.state.auto_mode && !self.state.manual_override && !self.state.emergency_stop {
            Some(self.adapter.dispatch(&report.decision))
        } else {
            None
        };

        // Stage 5: Reporting
        self.adapter.publish_telemetry(&report.telemetry);
        self.adapter.publish_motor_status();
        let interval = self.vehicle_config.status_interval_cycles.max(1);
        if self.loop_count % interval == 0 {
            self.send_system_status("RUNNING", "System operational");
        }
        self.loop_count += 1;

        match dispatched {
            Some(d) => CycleOutcome::Driven(report, d),
            None => CycleOutcome::Observed(report),
        }
    }

    /// Applies one operator command and acknowledges it.
    pub fn handle_command(&mut self, command: InboundCommand) {
        info!(command = command.name(), "command received");
        match command {
            InboundCommand::SetAutoMode { enabled } => {
                self.state.auto_mode = enabled;
                info!(enabled, "auto mode");
            }
            InboundCommand::ManualOverride { enabled } => {
                self.state.manual_override = enabled;
                if enabled {
                    self.drive(MotorCommand {
                        action: MotorAction::Stop,
                        speed: 0,
                        turn_type: TurnType::Normal,
                        source: CommandSource::Manual,
                    });
                }
                info!(enabled, "manual override");
            }
            InboundCommand::EmergencyStop => {
                self.handle_emergency_stop("Emergency stop requested by operator");
            }
            InboundCommand::ResetEmergency => {
                self.state.emergency_stop = false;
                self.adapter.actuator_mut().reset_emergency_stop();
                info!("emergency stop reset");
            }
            InboundCommand::ManualControl(control) => {
                if self.state.manual_override && !self.state.emergency_stop {
                    self.drive(MotorCommand {
                        action: control.action,
                        speed: control.speed,
                        turn_type: control.turn_type,
                        source: CommandSource::Manual,
                    });
                }
            }
            InboundCommand::GetStatus => self.send_system_status("RUNNING", "System operational"),
            InboundCommand::StreamControl(control) => self.handle_stream_control(control),
        }

        self.bus.publish(LinkMessage::CommandAck {
            original_command: command.name().to_string(),
            status: "processed".to_string(),
        });
    }

    pub fn streaming(&self) -> &StreamingConfig {
        &self.streaming
    }

    fn handle_stream_control(&mut self, control: StreamControl) {
        match control.action {
            StreamAction::Start => self.streaming.enabled = true,
            StreamAction::Stop => self.streaming.enabled = false,
            StreamAction::Quality => {
                self.streaming.jpeg_quality = control.quality.unwrap_or(80).clamp(1, 100);
            }
            StreamAction::Status => {}
        }
        info!(
            enabled = self.streaming.enabled,
            quality = self.streaming.jpeg_quality,
            "video stream"
        );
    }

    /// Stops the motors without latching the emergency stop.
    pub fn halt(&mut self) {
        self.drive(MotorCommand {
            action: MotorAction::Stop,
            speed: 0,
            turn_type: TurnType::Normal,
            source: CommandSource::Autonomous,
        });
    }

    fn drive(&mut self, command: MotorCommand) {
        if let Err(e) = self.adapter.actuator_mut().execute(&command) {
            warn!(error = %e, action = ?command.action, "motor command rejected");
        }
    }

    fn handle_emergency_stop(&mut self, message: &str) {
        if self.state.emergency_stop {
            return;
        }
        self.state.emergency_stop = true;
        self.adapter.actuator_mut().emergency_stop();
        error!("EMERGENCY STOP ACTIVATED");
        self.bus.publish(LinkMessage::Alert {
            message: message.to_string(),
            severity: Severity::Critical,
        });
    }

    fn send_system_status(&self, status: &str, message: &str) {
        self.bus.publish(LinkMessage::SystemStatus(SystemStatus {
            status: status.to_string(),
            message: message.to_string(),
            auto_mode: self.state.auto_mode,
            manual_override: self.state.manual_override,
            emergency_stop: self.state.emergency_stop,
            uptime_secs: self.started.elapsed().as_secs_f64(),
            loop_count: self.loop_count,
            motor: self.adapter.actuator().status(),
            navigation: self.pipeline.status(),
        }));
    }

    fn publish_stream_frame(&self, frame: &Frame<'_>, report: &CycleReport) {
        let annotated = overlay::annotate(frame, report);
        let resized = overlay::stream_frame(&annotated, self.streaming.height);
        let (width, height) = resized.dimensions();
        match overlay::encode_jpeg(&resized, self.streaming.jpeg_quality) {
            Ok(jpeg) => {
                self.bus.publish_frame(FramePacket {
                    ts_millis: nav_link::now_millis(),
                    width,
                    height,
                    jpeg: jpeg.into(),
                });
            }
            Err(e) => warn!(error = %e, "stream frame dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nav_link::{CommandInbox, Envelope, ManualControl};
    use smart_nav::core_modules::hardware::{ScriptedRanger, SimulatedMotorController, SyntheticCamera};
    use smart_nav::Action;
    use tokio::sync::broadcast;

    fn vehicle(ranges: Vec<f64>) -> (Vehicle<SimulatedMotorController>, broadcast::Receiver<Envelope>, CommandInbox) {
        let mut config = NavConfig::default();
        config.vision.frame_skip = 1;
        let (bus, inbox) = LinkBus::new(64);
        let rx = bus.subscribe();
        let vehicle = Vehicle::new(
            config,
            Box::new(SyntheticCamera::new(160, 120)),
            Box::new(ScriptedRanger::new(ranges)),
            SimulatedMotorController::new(20, 100),
            bus,
        );
        (vehicle, rx, inbox)
    }

    fn drain(rx: &mut broadcast::Receiver<Envelope>) -> Vec<LinkMessage> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            out.push(envelope.message);
        }
        out
    }

    #[test]
    fn observes_without_driving_until_auto_mode() {
        let (mut vehicle, mut rx, _inbox) = vehicle(vec![]);
        assert!(matches!(vehicle.tick(), CycleOutcome::Observed(_)));
        assert_eq!(vehicle.actuator().status().total_commands, 0);

        vehicle.handle_command(InboundCommand::SetAutoMode { enabled: true });
        match vehicle.tick() {
            CycleOutcome::Driven(report, dispatched) => {
                assert_eq!(report.decision.action, Action::MoveForward);
                assert!(dispatched.is_ok());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(vehicle.actuator().status().current_action, MotorAction::Forward);

        let messages = drain(&mut rx);
        assert!(matches!(messages[0], LinkMessage::Telemetry(_)));
        assert!(messages.iter().any(|m| matches!(m, LinkMessage::SystemStatus(_))));
        assert!(messages.iter().any(|m| matches!(
            m,
            LinkMessage::CommandAck { original_command, .. } if original_command == "SET_AUTO_MODE"
        )));
        assert!(messages.iter().any(|m| matches!(m, LinkMessage::NavigationUpdate(_))));
    }

    #[test]
    fn close_obstacle_latches_emergency_before_decision() {
        let (mut vehicle, mut rx, _inbox) = vehicle(vec![10.0, 10.0]);
        vehicle.handle_command(InboundCommand::SetAutoMode { enabled: true });
        drain(&mut rx);

        assert!(matches!(vehicle.tick(), CycleOutcome::EmergencyStop(_)));
        assert!(vehicle.state().emergency_stop);
        assert!(vehicle.actuator().status().emergency_stop_active);
        let alerts: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(m, LinkMessage::Alert { severity: Severity::Critical, .. }))
            .collect();
        assert_eq!(alerts.len(), 1);

        // Latched: a second close reading raises no new alert.
        vehicle.tick();
        assert!(drain(&mut rx).is_empty());

        // Clear road but still latched: no dispatch.
        assert!(matches!(vehicle.tick(), CycleOutcome::Observed(_)));
        vehicle.handle_command(InboundCommand::ResetEmergency);
        assert!(matches!(vehicle.tick(), CycleOutcome::Driven(..)));
    }

    #[test]
    fn manual_control_requires_override() {
        let (mut vehicle, _rx, _inbox) = vehicle(vec![]);
        let control = InboundCommand::ManualControl(ManualControl {
            action: MotorAction::Left,
            speed: 60,
            turn_type: TurnType::Sharp,
        });
        vehicle.handle_command(control);
        assert_eq!(vehicle.actuator().status().total_commands, 0);

        vehicle.handle_command(InboundCommand::ManualOverride { enabled: true });
        vehicle.handle_command(control);
        let status = vehicle.actuator().status();
        assert_eq!(status.current_action, MotorAction::Left);
        assert_eq!(status.actual_speed, 60);

        vehicle.handle_command(InboundCommand::SetAutoMode { enabled: true });
        assert!(matches!(vehicle.tick(), CycleOutcome::Observed(_)));
    }

    #[test]
    fn streaming_publishes_jpeg_frames() {
        let mut config = NavConfig::default();
        config.streaming.enabled = true;
        config.streaming.height = 60;
        let (bus, _inbox) = LinkBus::new(8);
        let mut frames = bus.subscribe_frames();
        let mut vehicle = Vehicle::new(
            config,
            Box::new(SyntheticCamera::new(160, 120)),
            Box::new(ScriptedRanger::clear()),
            SimulatedMotorController::new(20, 100),
            bus,
        );
        vehicle.tick();
        let packet = frames.try_recv().unwrap();
        assert_eq!((packet.width, packet.height), (80, 60));
        assert_eq!(&packet.jpeg[..2], &[0xFF, 0xD8]);

        // Frame skip: the second cycle reuses the result and sends no frame.
        vehicle.tick();
        assert!(frames.try_recv().is_err());
    }

    #[test]
    fn stream_control_toggles_stream_at_runtime() {
        let mut config = NavConfig::default();
        config.vision.frame_skip = 1;
        config.streaming.height = 60;
        let (bus, _inbox) = LinkBus::new(32);
        let mut frames = bus.subscribe_frames();
        let mut rx = bus.subscribe();
        let mut vehicle = Vehicle::new(
            config,
            Box::new(SyntheticCamera::new(160, 120)),
            Box::new(ScriptedRanger::clear()),
            SimulatedMotorController::new(20, 100),
            bus,
        );
        vehicle.tick();
        assert!(frames.try_recv().is_err());

        let control = |action, quality| InboundCommand::StreamControl(StreamControl { action, quality });
        vehicle.handle_command(control(StreamAction::Start, None));
        vehicle.handle_command(control(StreamAction::Quality, Some(40)));
        assert!(vehicle.streaming().enabled);
        assert_eq!(vehicle.streaming().jpeg_quality, 40);
        vehicle.tick();
        assert!(frames.try_recv().is_ok());

        vehicle.handle_command(control(StreamAction::Quality, Some(0)));
        assert_eq!(vehicle.streaming().jpeg_quality, 1);
        vehicle.handle_command(control(StreamAction::Stop, None));
        vehicle.tick();
        assert!(frames.try_recv().is_err());

        let acks = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(
                m,
                LinkMessage::CommandAck { original_command, status }
                    if original_command == "STREAM_CONTROL" && status == "processed"
            ))
            .count();
        assert_eq!(acks, 4);
    }
}
