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

//! # Attune Control
//!
//! The adaptation engine: a fixed-rate frame loop that measures every
//! governed subsystem, and a controller that periodically analyses the
//! rolling metric window, selects corrective strategies for bottlenecks and
//! applies them one per tick with effectiveness feedback.

#![warn(missing_docs)]

pub mod analysis;
pub mod config;
pub mod context;
pub mod controller;
pub mod export;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod strategy;

pub use analysis::{AnalysisReport, BottleneckAnalyzer};
pub use config::{ConfigError, ControlConfig};
pub use context::ControlContext;
pub use controller::{
    AdaptationController, AdaptationPhase, AdaptationStats, CycleOutcome, ScanReport, Suggestion,
    SuggestionKind,
};
pub use export::PerformanceExport;
pub use metrics::{metric_channel, MetricInbox, MetricReporter, MetricStore, RingBuffer};
pub use registry::{SubsystemInfo, SubsystemRegistry};
pub use scheduler::{FrameLoop, FrameScheduler, FrameStats, SchedulerError, SchedulerState, TickReport};
pub use strategy::{default_catalog, StrategyError, StrategyRegistry};
