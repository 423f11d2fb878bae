// THEORY:
// The `navigation` module is the decision layer. It turns the fused `Environment`
// into one driving action per cycle and keeps the short memory needed to make that
// action steady.
//
// Key architectural principles:
// 1.  **Priority rules**: a fixed chain evaluated top to bottom; the first rule that
//     matches decides. Safety rules (obstacle, red light, stop sign) come first.
// 2.  **Action voting**: the raw action is pushed through a `TemporalStabilizer`.
//     When the vote is decisive the majority action is returned, carrying the speed
//     and reason of the latest raw decision that chose it. An emergency stop is
//     never out-voted.
// 3.  **State record**: `NavigationState` keeps the current state, the recent
//     actions and the recent raw decisions for status reporting.

use crate::config::NavigationConfig;
use crate::core_modules::environment::{Environment, LaneDirection, TrafficLightState};
use crate::core_modules::history::HistoryBuffer;
use crate::core_modules::stabilizer::TemporalStabilizer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    MoveForward,
    TurnLeft,
    TurnRight,
    SharpLeft,
    SharpRight,
    TrafficStop,
    StopSignStop,
    EmergencyStop,
    Stop,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::MoveForward => "MOVE_FORWARD",
            Action::TurnLeft => "TURN_LEFT",
            Action::TurnRight => "TURN_RIGHT",
            Action::SharpLeft => "SHARP_LEFT",
            Action::SharpRight => "SHARP_RIGHT",
            Action::TrafficStop => "TRAFFIC_STOP",
            Action::StopSignStop => "STOP_SIGN_STOP",
            Action::EmergencyStop => "EMERGENCY_STOP",
            Action::Stop => "STOP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// 0..=100.
    pub target_speed: u8,
    pub reason: String,
    /// True when the action vote met its threshold this cycle.
    pub filtered: bool,
}

impl Decision {
    fn raw(action: Action, target_speed: u8, reason: impl Into<String>) -> Self {
        Self {
            action,
            target_speed,
            reason: reason.into(),
            filtered: false,
        }
    }
}

/// Memory of what the engine has been doing.
#[derive(Debug, Clone)]
pub struct NavigationState {
    /// `None` until the first decision (idle).
    pub current_state: Option<Action>,
    pub recent_actions: HistoryBuffer<Action>,
    pub raw_decisions: HistoryBuffer<Decision>,
}

/// Serializable view of `NavigationState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationStatus {
    pub current_state: String,
    pub recent_actions: Vec<Action>,
    pub decision_history_length: usize,
}

impl NavigationState {
    pub fn new(action_history: usize, decision_history: usize) -> Self {
        Self {
            current_state: None,
            recent_actions: HistoryBuffer::new(action_history),
            raw_decisions: HistoryBuffer::new(decision_history),
        }
    }

    pub fn status(&self) -> NavigationStatus {
        NavigationStatus {
            current_state: self
                .current_state
                .map_or("IDLE", |a| a.as_str())
                .to_string(),
            recent_actions: self.recent_actions.iter().copied().collect(),
            decision_history_length: self.raw_decisions.len(),
        }
    }
}

pub struct DecisionEngine {
    config: NavigationConfig,
    action_stabilizer: TemporalStabilizer<Action>,
    state: NavigationState,
}

impl DecisionEngine {
    pub fn new(config: NavigationConfig) -> Self {
        Self {
            action_stabilizer: TemporalStabilizer::new(config.decision_history_length, config.action_ratio),
            state: NavigationState::new(config.action_history_length, config.decision_history_length),
            config,
        }
    }

    fn cruise_speed(&self, env: &Environment) -> u8 {
        if env.speed_limit_present {
            self.config.reduced_speed
        } else {
            self.config.default_speed
        }
    }

    /// The priority rule chain, without any temporal filtering.
    pub fn evaluate(&self, env: &Environment) -> Decision {
        let c = &self.config;

        if env.obstacle_present && env.obstacle_distance < c.stop_distance_cm {
            return Decision::raw(
                Action::EmergencyStop,
                0,
                format!("Obstacle at {:.0}cm", env.obstacle_distance),
            );
        }

        if env.traffic_light_state == TrafficLightState::Red
            && env.traffic_light_confidence > c.red_light_confidence
        {
            return Decision::raw(Action::TrafficStop, 0, "Red traffic light detected");
        }

        if env.stop_sign_present {
            return Decision::raw(Action::StopSignStop, 0, "Stop sign detected");
        }

        match env.lane_direction {
            LaneDirection::Left => {
                Decision::raw(Action::TurnLeft, self.cruise_speed(env), "Following lane direction")
            }
            LaneDirection::Right => {
                Decision::raw(Action::TurnRight, self.cruise_speed(env), "Following lane direction")
            }
            LaneDirection::Straight => {
                let speed = if env.obstacle_distance < c.safe_distance_cm {
                    c.reduced_speed
                } else {
                    self.cruise_speed(env)
                };
                Decision::raw(Action::MoveForward, speed, "Following lane - straight path")
            }
            LaneDirection::Unknown if env.obstacle_distance > c.safe_distance_cm => {
                Decision::raw(Action::MoveForward, c.reduced_speed, "Cautious forward movement")
            }
            _ => Decision::raw(Action::Stop, 0, "Uncertain environment - safety stop"),
        }
    }

    /// Evaluates, votes and records one decision.
    pub fn decide(&mut self, env: &Environment) -> Decision {
        let raw = self.evaluate(env);
        self.state.raw_decisions.push(raw.clone());
        let vote = self.action_stabilizer.push(raw.action);

        let decision = match vote.value {
            Some(action) if vote.accepted && raw.action != Action::EmergencyStop => {
                let source = self
                    .state
                    .raw_decisions
                    .iter()
                    .rev()
                    .find(|d| d.action == action)
                    .unwrap_or(&raw);
                Decision {
                    action,
                    target_speed: source.target_speed,
                    reason: source.reason.clone(),
                    filtered: true,
                }
            }
            _ => raw,
        };

        if self.state.current_state != Some(decision.action) {
            info!(
                action = decision.action.as_str(),
                reason = %decision.reason,
                "navigation state changed"
            );
        }
        debug!(
            action = decision.action.as_str(),
            speed = decision.target_speed,
            filtered = decision.filtered,
            confidence = vote.confidence,
            "decision"
        );

        self.state.current_state = Some(decision.action);
        self.state.recent_actions.push(decision.action);
        decision
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn status(&self) -> NavigationStatus {
        self.state.status()
    }
}
