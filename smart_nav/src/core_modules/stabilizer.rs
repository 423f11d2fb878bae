// THEORY:
// Single-frame perception flickers. The `TemporalStabilizer` turns a noisy stream of
// per-frame readings into a steady signal by majority vote over a short window.
//
// Key architectural principles:
// 1.  **One generic type**: the same stabilizer serves lane direction, the obstacle
//     flag, each sign flag and the decision action.
// 2.  **Hysteresis by ratio**: the stable value only changes when the majority's
//     share of the window reaches the ratio threshold. Otherwise the previous stable
//     value is held.
// 3.  **No invented default**: before the first observation there is no stable value.

use crate::core_modules::history::HistoryBuffer;

/// Output of one `push`.
#[derive(Debug, Clone, PartialEq)]
pub struct StableReading<T> {
    /// The stable value after this observation, if any has been established.
    pub value: Option<T>,
    /// Majority share of the current window.
    pub confidence: f64,
    /// Whether this observation's vote met the threshold.
    pub accepted: bool,
}

#[derive(Debug, Clone)]
pub struct TemporalStabilizer<T> {
    history: HistoryBuffer<T>,
    ratio_threshold: f64,
    stable: Option<T>,
    confidence: f64,
}

impl<T: PartialEq + Clone> TemporalStabilizer<T> {
    pub fn new(window: usize, ratio_threshold: f64) -> Self {
        Self {
            history: HistoryBuffer::new(window),
            ratio_threshold,
            stable: None,
            confidence: 0.0,
        }
    }

    /// Records one raw observation and returns the stabilized view.
    pub fn push(&mut self, value: T) -> StableReading<T> {
        self.history.push(value);
        let mut accepted = false;
        if let Some(vote) = self.history.majority() {
            self.confidence = vote.confidence;
            if vote.confidence >= self.ratio_threshold {
                self.stable = Some(vote.value);
                accepted = true;
            }
        }
        StableReading {
            value: self.stable.clone(),
            confidence: self.confidence,
            accepted,
        }
    }

    pub fn stable(&self) -> Option<&T> {
        self.stable.as_ref()
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn history(&self) -> &HistoryBuffer<T> {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.stable = None;
        self.confidence = 0.0;
    }
}
