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

//! Offline-analysis document.

use crate::config::ControlConfig;
use crate::controller::{AdaptationStats, Suggestion};
use crate::registry::SubsystemInfo;
use crate::scheduler::{FrameStats, SchedulerState};
use attune_core::control::OptimizationStrategy;
use attune_core::PerformanceMetric;
use serde::Serialize;
use std::collections::BTreeMap;

/// Snapshot of the whole loop, serialisable for offline analysis.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceExport {
    /// Configuration in effect.
    pub settings: ControlConfig,
    /// Scheduler state at export time.
    pub engine_state: SchedulerState,
    /// Controller counters.
    pub stats: AdaptationStats,
    /// Frame-rate statistics.
    pub frame_stats: FrameStats,
    /// Status of every governed subsystem.
    pub subsystems: Vec<SubsystemInfo>,
    /// Full metric history, oldest first.
    pub performance_history: Vec<PerformanceMetric>,
    /// Strategy catalog with effectiveness and usage.
    pub optimization_strategies: Vec<OptimizationStrategy>,
    /// Baselines by subsystem then metric.
    pub baselines: BTreeMap<String, BTreeMap<String, f64>>,
    /// Advisories from the last cycle.
    pub suggestions: Vec<Suggestion>,
}
