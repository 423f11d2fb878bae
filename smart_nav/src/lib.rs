// THEORY:
// This file is the main entry point for the `smart_nav` library crate.
// It defines the public API exposed to the vehicle runner and the link layer.
//
// The primary export is the `NavigationPipeline` and its data structures
// (`NavConfig`, `CycleReport`, `Decision`, etc.), a high-level interface that
// turns one camera frame plus one range reading into one driving decision.
// The building blocks (`core_modules`) stay public so the runner can reach the
// dispatch adapter, the hardware capability traits and the debug overlay.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use config::NavConfig;
pub use core_modules::dispatch::{DispatchAdapter, DispatchReport, MotorCommand, MotorStatus, TelemetrySink};
pub use core_modules::environment::{Environment, LaneDirection, TrafficLightState};
pub use core_modules::frame::{Frame, PixelLayout};
pub use core_modules::hardware::{Actuator, FrameSource, RangeSensor};
pub use error::{NavError, NavResult};
pub use pipeline::{Action, CycleReport, Decision, NavigationPipeline};
