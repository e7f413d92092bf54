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

//! The contract every subsystem governed by the adaptation loop implements.

use crate::control::StrategyParameters;
use crate::telemetry::MetricReport;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure raised by a subsystem while ticking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubsystemError {
    /// `update()` returned an error.
    #[error("subsystem `{subsystem}` failed to update: {reason}")]
    UpdateFailed {
        /// Name of the failing subsystem.
        subsystem: String,
        /// Subsystem-provided description.
        reason: String,
    },
    /// `initialize()` returned an error.
    #[error("subsystem `{subsystem}` failed to initialize: {reason}")]
    InitFailed {
        /// Name of the failing subsystem.
        subsystem: String,
        /// Subsystem-provided description.
        reason: String,
    },
    /// A subsystem call panicked; the panic was contained by the registry.
    #[error("subsystem `{subsystem}` panicked during {during}")]
    Panicked {
        /// Name of the failing subsystem.
        subsystem: String,
        /// The call that panicked (`update`, `report_metrics`, ...).
        during: &'static str,
    },
}

impl SubsystemError {
    /// Convenience constructor for [`SubsystemError::UpdateFailed`].
    pub fn update_failed(subsystem: impl Into<String>, reason: impl Into<String>) -> Self {
        SubsystemError::UpdateFailed {
            subsystem: subsystem.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`SubsystemError::InitFailed`].
    pub fn init_failed(subsystem: impl Into<String>, reason: impl Into<String>) -> Self {
        SubsystemError::InitFailed {
            subsystem: subsystem.into(),
            reason: reason.into(),
        }
    }
}

/// Health of a registered subsystem as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemStatus {
    /// Last update succeeded.
    #[default]
    Ready,
    /// Last initialization, update or report failed; cleared by the next
    /// successful update.
    Errored,
}

/// A subsystem the adaptation loop can tick, observe and tune.
///
/// Rendering, physics, AI, content generation and networking all implement
/// this trait uniformly; optional lifecycle hooks default to no-ops.
pub trait TunableSubsystem: Send {
    /// Stable name, used as the key for metrics and strategy mapping.
    fn name(&self) -> &str;

    /// Called once when the scheduler starts, before the first update.
    ///
    /// A failure marks the subsystem errored but does not stop the loop.
    fn initialize(&mut self) -> Result<(), SubsystemError> {
        Ok(())
    }

    /// Advances the subsystem by a fixed step of `dt` seconds.
    fn update(&mut self, dt: f32) -> Result<(), SubsystemError>;

    /// Returns the subsystem's current metric readings.
    ///
    /// Pulled by the loop when it refreshes the metric window. Subsystems that
    /// also push samples from other threads may return an empty list.
    fn report_metrics(&self) -> Vec<MetricReport>;

    /// Receives a strategy's parameters. Returns `true` if the adjustment was
    /// accepted, `false` if it was rejected (e.g. the knob is already at its
    /// bound).
    ///
    /// Must be fast and non-blocking: it runs inside a frame.
    fn apply_parameter(&mut self, strategy: &str, parameters: &StrategyParameters) -> bool;

    /// Cheap self-assessment in `[0, 1]`, polled by the periodic scan.
    fn performance_rating(&self) -> f64;

    /// Called once when the scheduler stops, after the last update.
    fn shutdown(&mut self) {}
}
