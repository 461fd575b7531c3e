//! Simulation configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::history::{DATA_POINT_HISTORY, MESSAGE_HISTORY};

/// Upper bound on any tick period (one minute)
pub const MAX_PERIOD_MS: u64 = 60_000;

/// How the tick period is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    /// Period is drawn once per `start()` and kept for the whole run
    #[default]
    FixedAtStart,
    /// Period is redrawn before every tick
    JitterPerTick,
}

/// Configuration for a simulation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Maximum messages kept in history
    pub message_capacity: usize,
    /// Maximum data points kept in history
    pub data_point_capacity: usize,
    /// Shortest tick period (inclusive, ms)
    pub min_period_ms: u64,
    /// Longest tick period (exclusive, ms)
    pub max_period_ms: u64,
    /// Period selection mode
    pub timing: TimingMode,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    /// Create the four startup nodes
    pub seed_default_nodes: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            message_capacity: MESSAGE_HISTORY,
            data_point_capacity: DATA_POINT_HISTORY,
            min_period_ms: 100,
            max_period_ms: 300,
            timing: TimingMode::FixedAtStart,
            seed: None,
            seed_default_nodes: true,
        }
    }
}

impl SimulationConfig {
    /// Tick period range as `[min, max)` in milliseconds
    ///
    /// Both bounds are limited to [`MAX_PERIOD_MS`]; a degenerate range
    /// collapses to the minimum.
    pub fn period_range_ms(&self) -> (u64, u64) {
        let min = self.min_period_ms.clamp(1, MAX_PERIOD_MS - 1);
        let max = self.max_period_ms.clamp(min.saturating_add(1), MAX_PERIOD_MS);
        (min, max)
    }

    /// Shortest possible tick period
    pub fn min_period(&self) -> Duration {
        Duration::from_millis(self.period_range_ms().0)
    }
}
