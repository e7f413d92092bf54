// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Numeric configuration of the adaptation loop.

use crate::analysis::MIN_ANALYSIS_SAMPLES;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The tick rate must be at least 1 Hz.
    #[error("tick_rate must be > 0")]
    ZeroTickRate,
    /// The adaptation interval must be a positive, finite number of seconds.
    #[error("adaptation_interval_secs must be > 0, got {0}")]
    InvalidAdaptationInterval(f64),
    /// The optimization threshold is a performance ratio in `(0, 1]`.
    #[error("optimization_threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
    /// A history or window size was zero.
    #[error("`{0}` must be > 0")]
    ZeroSize(&'static str),
    /// The analysis window cannot hold enough samples for an analysis.
    #[error("analysis_window must be >= {min}, got {0}", min = MIN_ANALYSIS_SAMPLES)]
    AnalysisWindowTooSmall(usize),
}

/// Configuration for the frame scheduler and adaptation controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Fixed tick rate of the frame loop, in Hz.
    pub tick_rate: u32,
    /// Seconds between two adaptation cycles.
    pub adaptation_interval_secs: f64,
    /// Overall performance below which bottlenecks are acted upon.
    pub optimization_threshold: f64,
    /// Capacity of the metric history.
    pub performance_history_size: usize,
    /// Number of most recent samples analysed per cycle. At least
    /// [`MIN_ANALYSIS_SAMPLES`], or no cycle could ever find a bottleneck.
    pub analysis_window: usize,
    /// Ticks between two lightweight performance scans.
    pub scan_interval_ticks: u64,
    /// Ticks between two pulls of `report_metrics()`.
    /// `0` pulls only at the start of each adaptation cycle.
    pub metrics_pull_interval_ticks: u64,
    /// When disabled, cycles analyse and advise but never enqueue requests.
    pub enable_autonomous_optimization: bool,
    /// Maximum number of off-thread samples buffered between two ticks.
    /// If the buffer is full, new samples are dropped.
    pub telemetry_buffer_size: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            adaptation_interval_secs: 10.0,
            optimization_threshold: 0.8,
            performance_history_size: 1000,
            analysis_window: 100,
            scan_interval_ticks: 300,
            metrics_pull_interval_ticks: 0,
            enable_autonomous_optimization: true,
            telemetry_buffer_size: 1000,
        }
    }
}

impl ControlConfig {
    /// Checks every field for a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if !(self.adaptation_interval_secs.is_finite() && self.adaptation_interval_secs > 0.0) {
            return Err(ConfigError::InvalidAdaptationInterval(
                self.adaptation_interval_secs,
            ));
        }
        if !(self.optimization_threshold > 0.0 && self.optimization_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.optimization_threshold));
        }
        if self.performance_history_size == 0 {
            return Err(ConfigError::ZeroSize("performance_history_size"));
        }
        if self.analysis_window < MIN_ANALYSIS_SAMPLES {
            return Err(ConfigError::AnalysisWindowTooSmall(self.analysis_window));
        }
        if self.scan_interval_ticks == 0 {
            return Err(ConfigError::ZeroSize("scan_interval_ticks"));
        }
        if self.telemetry_buffer_size == 0 {
            return Err(ConfigError::ZeroSize("telemetry_buffer_size"));
        }
        Ok(())
    }

    /// Duration of one tick, `1 / tick_rate`.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(self.tick_secs())
    }

    /// Duration of one tick in seconds.
    pub fn tick_secs(&self) -> f64 {
        1.0 / self.tick_rate.max(1) as f64
    }
}
