use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use smart_nav::core_modules::dispatch::{
    MotorAction, MotorStatus, NavigationTelemetry, NavigationUpdate, TelemetrySink, TurnType,
};
use smart_nav::core_modules::navigation::NavigationStatus;
use smart_nav::{NavError, NavResult};
use tokio::sync::{broadcast, mpsc};

#[cfg(feature = "web")]
mod server;

#[cfg(feature = "web")]
pub use server::start_server;

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One annotated, JPEG-encoded frame for remote display.
#[derive(Debug, Clone)]
pub struct FramePacket {
    pub ts_millis: u64,
    pub width: u32,
    pub height: u32,
    pub jpeg: Arc<[u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub status: String,
    pub message: String,
    pub auto_mode: bool,
    pub manual_override: bool,
    pub emergency_stop: bool,
    pub uptime_secs: f64,
    pub loop_count: u64,
    pub motor: MotorStatus,
    pub navigation: NavigationStatus,
}

/// Outbound record, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkMessage {
    Telemetry(NavigationTelemetry),
    NavigationUpdate(NavigationUpdate),
    MotorStatus(MotorStatus),
    Alert {
        message: String,
        severity: Severity,
    },
    #[serde(rename = "COMMAND_ACK")]
    CommandAck {
        original_command: String,
        status: String,
    },
    SystemStatus(SystemStatus),
}

/// A `LinkMessage` stamped with its send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ts_millis: u64,
    #[serde(flatten)]
    pub message: LinkMessage,
}

fn default_manual_speed() -> u8 {
    50
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualControl {
    pub action: MotorAction,
    #[serde(default = "default_manual_speed")]
    pub speed: u8,
    #[serde(default)]
    pub turn_type: TurnType,
}

/// What a `STREAM_CONTROL` command asks of the video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamAction {
    Start,
    Stop,
    /// Sets the JPEG quality to `quality`, 80 when absent.
    Quality,
    #[default]
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamControl {
    #[serde(default)]
    pub action: StreamAction,
    #[serde(default)]
    pub quality: Option<u8>,
}

/// Inbound command from a remote operator: `{"type": ..., "payload": {...}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundCommand {
    SetAutoMode { enabled: bool },
    ManualOverride { enabled: bool },
    EmergencyStop,
    ResetEmergency,
    ManualControl(ManualControl),
    GetStatus,
    StreamControl(StreamControl),
}

impl InboundCommand {
    /// Wire name, echoed back in the acknowledgement.
    pub fn name(&self) -> &'static str {
        match self {
            InboundCommand::SetAutoMode { .. } => "SET_AUTO_MODE",
            InboundCommand::ManualOverride { .. } => "MANUAL_OVERRIDE",
            InboundCommand::EmergencyStop => "EMERGENCY_STOP",
            InboundCommand::ResetEmergency => "RESET_EMERGENCY",
            InboundCommand::ManualControl(_) => "MANUAL_CONTROL",
            InboundCommand::GetStatus => "GET_STATUS",
            InboundCommand::StreamControl(_) => "STREAM_CONTROL",
        }
    }
}

/// Fan-out of outbound records and frames, plus the sending half of the command inbox.
#[derive(Clone)]
pub struct LinkBus {
    pub messages_tx: broadcast::Sender<Envelope>,
    pub frames_tx: broadcast::Sender<FramePacket>,
    commands_tx: mpsc::Sender<InboundCommand>,
}

/// Receiving half of the command channel, owned by the vehicle loop.
pub struct CommandInbox {
    rx: mpsc::Receiver<InboundCommand>,
}

impl LinkBus {
    pub fn new(capacity: usize) -> (Self, CommandInbox) {
        let (messages_tx, _) = broadcast::channel::<Envelope>(capacity.max(1));
        let (frames_tx, _) = broadcast::channel::<FramePacket>(capacity.max(1));
        let (commands_tx, rx) = mpsc::channel::<InboundCommand>(capacity.max(1));
        (
            Self {
                messages_tx,
                frames_tx,
                commands_tx,
            },
            CommandInbox { rx },
        )
    }

    /// Stamps and broadcasts a record. Returns how many listeners received it.
    pub fn publish(&self, message: LinkMessage) -> usize {
        let envelope = Envelope {
            ts_millis: now_millis(),
            message,
        };
        self.messages_tx.send(envelope).unwrap_or(0)
    }

    pub fn publish_frame(&self, packet: FramePacket) -> usize {
        self.frames_tx.send(packet).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.messages_tx.subscribe()
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<FramePacket> {
        self.frames_tx.subscribe()
    }

    /// Queues a command for the vehicle loop without waiting.
    pub fn submit_command(&self, command: InboundCommand) -> NavResult<()> {
        self.commands_tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NavError::transport("command inbox full"),
            mpsc::error::TrySendError::Closed(_) => NavError::transport("command inbox closed"),
        })
    }
}

impl TelemetrySink for LinkBus {
    fn send_navigation_update(&mut self, update: &NavigationUpdate) -> NavResult<()> {
        self.publish(LinkMessage::NavigationUpdate(update.clone()));
        Ok(())
    }

    fn send_telemetry(&mut self, telemetry: &NavigationTelemetry) -> NavResult<()> {
        self.publish(LinkMessage::Telemetry(*telemetry));
        Ok(())
    }

    fn send_motor_status(&mut self, status: &MotorStatus) -> NavResult<()> {
        self.publish(LinkMessage::MotorStatus(*status));
        Ok(())
    }
}

impl CommandInbox {
    /// Everything queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<InboundCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            commands.push(command);
        }
        commands
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[cfg(not(feature = "web"))]
pub async fn start_server(_bus: LinkBus, _cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    Err(anyhow::anyhow!("web feature not enabled for nav_link"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use smart_nav::Action;
    use smart_nav::LaneDirection;

    #[test]
    fn commands_parse_from_wire_json() {
        let auto: InboundCommand =
            serde_json::from_str(r#"{"type":"SET_AUTO_MODE","payload":{"enabled":true}}"#).unwrap();
        assert_eq!(auto, InboundCommand::SetAutoMode { enabled: true });

        let stop: InboundCommand = serde_json::from_str(r#"{"type":"EMERGENCY_STOP"}"#).unwrap();
        assert_eq!(stop, InboundCommand::EmergencyStop);

        let manual: InboundCommand =
            serde_json::from_str(r#"{"type":"MANUAL_CONTROL","payload":{"action":"left","turn_type":"sharp"}}"#)
                .unwrap();
        assert_eq!(
            manual,
            InboundCommand::ManualControl(ManualControl {
                action: MotorAction::Left,
                speed: 50,
                turn_type: TurnType::Sharp,
            })
        );
        assert_eq!(manual.name(), "MANUAL_CONTROL");

        let quality: InboundCommand =
            serde_json::from_str(r#"{"type":"STREAM_CONTROL","payload":{"action":"quality","quality":55}}"#).unwrap();
        assert_eq!(
            quality,
            InboundCommand::StreamControl(StreamControl {
                action: StreamAction::Quality,
                quality: Some(55),
            })
        );
        let status: InboundCommand =
            serde_json::from_str(r#"{"type":"STREAM_CONTROL","payload":{}}"#).unwrap();
        assert_eq!(status, InboundCommand::StreamControl(StreamControl::default()));

        assert!(serde_json::from_str::<InboundCommand>(r#"{"type":"SELF_DESTRUCT"}"#).is_err());
    }

    #[test]
    fn envelope_is_flat_and_tagged() {
        let envelope = Envelope {
            ts_millis: 7,
            message: LinkMessage::CommandAck {
                original_command: "GET_STATUS".into(),
                status: "processed".into(),
            },
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "COMMAND_ACK");
        assert_eq!(value["ts_millis"], 7);
        assert_eq!(value["original_command"], "GET_STATUS");

        let update = Envelope {
            ts_millis: 1,
            message: LinkMessage::NavigationUpdate(NavigationUpdate {
                action: Action::TurnLeft,
                target_speed: 75,
                reason: "Following lane direction".into(),
                filtered: true,
                emergency_stop: false,
            }),
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["type"], "navigation_update");
        assert_eq!(value["action"], "TURN_LEFT");
    }

    #[test]
    fn bus_delivers_to_subscribers_and_tolerates_none() {
        let (mut bus, _inbox) = LinkBus::new(8);
        assert!(bus.send_telemetry(&NavigationTelemetry::default()).is_ok());

        let mut rx = bus.subscribe();
        let telemetry = NavigationTelemetry {
            lane_direction: LaneDirection::Left,
            ..NavigationTelemetry::default()
        };
        bus.send_telemetry(&telemetry).unwrap();
        let got = rx.try_recv().unwrap();
        assert_eq!(got.message, LinkMessage::Telemetry(telemetry));
    }

    #[test]
    fn inbox_drains_in_order() {
        let (bus, mut inbox) = LinkBus::new(4);
        bus.submit_command(InboundCommand::GetStatus).unwrap();
        bus.submit_command(InboundCommand::ResetEmergency).unwrap();
        assert_eq!(inbox.drain(), vec![InboundCommand::GetStatus, InboundCommand::ResetEmergency]);
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn full_inbox_reports_transport_error() {
        let (bus, _inbox) = LinkBus::new(1);
        bus.submit_command(InboundCommand::GetStatus).unwrap();
        let err = bus.submit_command(InboundCommand::GetStatus).unwrap_err();
        assert_eq!(err.to_string(), "transport error: command inbox full");
    }
}
