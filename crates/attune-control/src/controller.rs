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

//! The adaptation controller.
//!
//! Detection and application are decoupled. Every `adaptation_interval_secs`
//! the controller runs one cycle (analyze → select → enqueue) and updates its
//! baselines and trends. Independently, the frame loop asks it to apply at
//! most one queued request per tick, so a burst of bottlenecks is spread over
//! several frames instead of landing in one.

use crate::analysis::{AnalysisReport, BottleneckAnalyzer};
use crate::context::ControlContext;
use crate::export::PerformanceExport;
use crate::metrics::RingBuffer;
use crate::registry::{SubsystemInfo, SubsystemRegistry};
use crate::scheduler::{FrameStats, SchedulerState};
use crate::strategy::StrategyError;
use attune_core::control::{OptimizationRequest, OptimizationStrategy, Severity};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// Capacity of each per-subsystem trend.
pub const TREND_CAPACITY: usize = 100;
/// Samples required in the store before trends are updated.
pub const MIN_TREND_SAMPLES: usize = 50;
/// Samples required in the store before baselines are updated.
pub const MIN_BASELINE_SAMPLES: usize = 100;
/// Samples considered by [`AdaptationController::performance_rating`].
pub const RATING_WINDOW: usize = 50;
/// Self-reported rating below which the periodic scan flags a subsystem.
pub const SLOW_SUBSYSTEM_RATING: f64 = 0.7;
/// Fraction of the target FPS below which the periodic scan warns.
pub const LOW_FPS_FRACTION: f64 = 0.8;
/// Weight kept by a baseline on each update.
const BASELINE_RETAIN: f64 = 0.9;
/// Number of trend points compared on each side of the decline check.
const DECLINE_SPAN: usize = 5;
/// A recent mean below this fraction of the previous mean is a decline.
const DECLINE_FACTOR: f64 = 0.9;

/// Where the controller currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationPhase {
    /// Waiting for the next cycle.
    #[default]
    Idle,
    /// Reducing the metric window.
    Analyzing,
    /// Resolving strategies for bottlenecks.
    Selecting,
    /// Requests from the last cycle are waiting to be applied.
    Queued,
    /// A request is being pushed into its subsystem.
    Applying,
}

/// The kind of an advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    /// A subsystem's performance dropped by 10 % or more between trend windows.
    PerformanceDecline,
    /// A bottleneck was found but no strategy is mapped to its subsystem.
    UnmappedBottleneck,
}

/// An advisory produced by a cycle. No action is taken on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    /// Subsystem concerned.
    pub subsystem: String,
    /// What was observed.
    pub kind: SuggestionKind,
    /// How serious it is.
    pub severity: Severity,
    /// Human readable advice.
    pub recommendation: String,
    /// Clock reading when the advisory was emitted.
    pub timestamp: f64,
}

/// Counters of the controller's activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdaptationStats {
    /// Cycles run.
    pub adaptation_cycles: u64,
    /// Requests placed in the queue.
    pub requests_enqueued: u64,
    /// Requests applied successfully.
    pub optimizations_applied: u64,
    /// Requests whose application failed.
    pub failed_optimizations: u64,
    /// Requests dropped by [`AdaptationController::discard_pending`].
    pub requests_discarded: u64,
    /// Bottlenecks skipped because no strategy was mapped.
    pub unmapped_bottlenecks: u64,
    /// Decline advisories emitted.
    pub decline_advisories: u64,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    /// The analysis the cycle acted on.
    pub report: AnalysisReport,
    /// Number of requests enqueued.
    pub enqueued: usize,
}

/// Result of the lightweight periodic scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    /// Average FPS over the frame history.
    pub average_fps: f64,
    /// Configured tick rate.
    pub target_fps: f64,
    /// Subsystems whose self-reported rating is below [`SLOW_SUBSYSTEM_RATING`].
    pub slow_subsystems: Vec<(String, f64)>,
}

impl ScanReport {
    /// `true` when the average FPS is below 80 % of the target.
    pub fn is_degraded(&self) -> bool {
        self.average_fps < self.target_fps * LOW_FPS_FRACTION
    }
}

/// Orchestrates analysis, strategy selection and rate-limited application.
pub struct AdaptationController {
    ctx: ControlContext,
    analyzer: BottleneckAnalyzer,
    phase: AdaptationPhase,
    queue: VecDeque<OptimizationRequest>,
    baselines: BTreeMap<String, BTreeMap<String, f64>>,
    trends: BTreeMap<String, RingBuffer<f64, TREND_CAPACITY>>,
    suggestions: Vec<Suggestion>,
    stats: AdaptationStats,
    last_adaptation_time: f64,
}

impl AdaptationController {
    /// Creates a controller. The first cycle is due one interval from now.
    pub fn new(ctx: ControlContext) -> Self {
        let last_adaptation_time = ctx.now();
        Self {
            ctx,
            analyzer: BottleneckAnalyzer::new(),
            phase: AdaptationPhase::Idle,
            queue: VecDeque::new(),
            baselines: BTreeMap::new(),
            trends: BTreeMap::new(),
            suggestions: Vec::new(),
            stats: AdaptationStats::default(),
            last_adaptation_time,
        }
    }

    /// The context this controller was built with.
    pub fn context(&self) -> &ControlContext {
        &self.ctx
    }

    /// Returns `true` once `adaptation_interval_secs` elapsed since the last cycle.
    pub fn is_cycle_due(&self) -> bool {
        self.ctx.now() - self.last_adaptation_time >= self.ctx.config.adaptation_interval_secs
    }

    /// Runs a cycle if one is due. Called once per tick.
    pub fn maybe_run_cycle(&mut self, subsystems: &mut SubsystemRegistry) -> Option<CycleOutcome> {
        if !self.is_cycle_due() {
            return None;
        }
        Some(self.run_cycle(subsystems))
    }

    /// Runs one full cycle now, regardless of the interval.
    pub fn run_cycle(&mut self, subsystems: &mut SubsystemRegistry) -> CycleOutcome {
        let now = self.ctx.now();
        self.last_adaptation_time = now;
        self.stats.adaptation_cycles += 1;
        self.suggestions.clear();

        // Refresh the window with the subsystems' own readings.
        for sample in subsystems.collect_reports(now) {
            self.ctx.store.record(sample);
        }

        // ── 1. Analyzing ─────────────────────────────────────────────────
        self.phase = AdaptationPhase::Analyzing;
        let window = self.ctx.store.window(self.ctx.config.analysis_window);
        let report = self.analyzer.analyze(&window);

        // ── 2-3. Selecting & Queued ──────────────────────────────────────
        self.phase = AdaptationPhase::Selecting;
        let enqueued = self.select_and_enqueue(&report, now);

        // ── 4. Baselines & trends ────────────────────────────────────────
        self.update_baselines(&window);
        self.update_trends(&report, now);

        self.phase = if self.queue.is_empty() {
            AdaptationPhase::Idle
        } else {
            AdaptationPhase::Queued
        };

        log::debug!(
            "Adaptation: Cycle #{}: overall={:.3}, bottlenecks={}, enqueued={}, pending={}",
            self.stats.adaptation_cycles,
            report.overall_performance,
            report.bottlenecks.len(),
            enqueued,
            self.queue.len()
        );

        CycleOutcome { report, enqueued }
    }

    fn select_and_enqueue(&mut self, report: &AnalysisReport, now: f64) -> usize {
        let threshold = self.ctx.config.optimization_threshold;
        if report.overall_performance >= threshold {
            return 0;
        }

        log::info!(
            "Adaptation: Overall performance {:.3} below threshold {:.2} ({} bottlenecks)",
            report.overall_performance,
            threshold,
            report.bottlenecks.len()
        );

        let mut enqueued = 0;
        let strategies = self.ctx.strategies();
        for bottleneck in &report.bottlenecks {
            let Some(strategy) = strategies.select(&bottleneck.subsystem) else {
                self.stats.unmapped_bottlenecks += 1;
                let recommendation = format!(
                    "No strategy mapped for '{}'; register one or investigate manually",
                    bottleneck.subsystem
                );
                log::info!("Adaptation: Suggestion: {}", recommendation);
                self.suggestions.push(Suggestion {
                    subsystem: bottleneck.subsystem.clone(),
                    kind: SuggestionKind::UnmappedBottleneck,
                    severity: bottleneck.severity,
                    recommendation,
                    timestamp: now,
                });
                continue;
            };

            if !self.ctx.config.enable_autonomous_optimization {
                log::info!(
                    "Adaptation: Would apply '{}' to '{}' (autonomous optimization disabled)",
                    strategy.name,
                    bottleneck.subsystem
                );
                continue;
            }

            self.queue.push_back(OptimizationRequest {
                strategy: strategy.name.clone(),
                subsystem: bottleneck.subsystem.clone(),
                severity: bottleneck.severity,
                enqueued_at: now,
            });
            enqueued += 1;
        }
        drop(strategies);

        self.stats.requests_enqueued += enqueued as u64;
        enqueued
    }

    /// EMA per (subsystem, metric), seeded with the metric's target.
    fn update_baselines(&mut self, window: &[attune_core::PerformanceMetric]) {
        if self.ctx.store.len() < MIN_BASELINE_SAMPLES {
            return;
        }
        for metric in window {
            let baseline = self
                .baselines
                .entry(metric.subsystem.clone())
                .or_default()
                .entry(metric.metric.clone())
                .or_insert(metric.target);
            *baseline = *baseline * BASELINE_RETAIN + metric.value * (1.0 - BASELINE_RETAIN);
        }
    }

    fn update_trends(&mut self, report: &AnalysisReport, now: f64) {
        if self.ctx.store.len() < MIN_TREND_SAMPLES {
            return;
        }
        for (subsystem, &ratio) in &report.subsystem_performance {
            let trend = self.trends.entry(subsystem.clone()).or_default();
            trend.push(ratio);

            let (Some(recent), Some(previous)) = (
                trend.recent_average(DECLINE_SPAN),
                trend.window_average(DECLINE_SPAN, DECLINE_SPAN),
            ) else {
                continue;
            };

            if recent < previous * DECLINE_FACTOR {
                let severity = if recent < 0.5 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                let recommendation = format!(
                    "Investigate performance issues in the '{}' subsystem ({:.2} → {:.2})",
                    subsystem, previous, recent
                );
                log::info!("Adaptation: Decline: {}", recommendation);
                self.stats.decline_advisories += 1;
                self.suggestions.push(Suggestion {
                    subsystem: subsystem.clone(),
                    kind: SuggestionKind::PerformanceDecline,
                    severity,
                    recommendation,
                    timestamp: now,
                });
            }
        }
    }

    /// Applies at most one queued request. Called once per tick.
    ///
    /// Returns `None` when the queue was empty. A failed application is
    /// logged and counted; it never blocks later requests.
    pub fn drain_one(
        &mut self,
        subsystems: &mut SubsystemRegistry,
    ) -> Option<Result<(), StrategyError>> {
        let request = self.queue.pop_front()?;
        self.phase = AdaptationPhase::Applying;

        let now = self.ctx.now();
        let result = self
            .ctx
            .strategies_mut()
            .apply(&request, subsystems.get_mut(&request.subsystem), now);

        match &result {
            Ok(()) => {
                self.stats.optimizations_applied += 1;
                log::info!(
                    "Adaptation: Applied '{}' to '{}' (severity={})",
                    request.strategy,
                    request.subsystem,
                    request.severity
                );
            }
            Err(e) => {
                self.stats.failed_optimizations += 1;
                log::warn!("Adaptation: Failed to apply optimization: {}", e);
            }
        }

        self.phase = if self.queue.is_empty() {
            AdaptationPhase::Idle
        } else {
            AdaptationPhase::Queued
        };
        Some(result)
    }

    /// Lightweight scan: logs FPS and flags slow subsystems.
    pub fn scan(&self, frame_stats: &FrameStats, subsystems: &mut SubsystemRegistry) -> ScanReport {
        let slow_subsystems: Vec<(String, f64)> = subsystems
            .ratings()
            .into_iter()
            .filter(|(_, rating)| *rating < SLOW_SUBSYSTEM_RATING)
            .collect();

        let report = ScanReport {
            average_fps: frame_stats.average_fps,
            target_fps: self.ctx.config.tick_rate as f64,
            slow_subsystems,
        };

        log::info!(
            "Scan: {:.1} FPS (target {:.0}), frame {:.2}ms",
            report.average_fps,
            report.target_fps,
            frame_stats.average_frame_time * 1000.0
        );
        if report.is_degraded() {
            log::warn!(
                "Scan: Performance issue detected: {:.1} FPS (target: {:.0})",
                report.average_fps,
                report.target_fps
            );
        }
        if !report.slow_subsystems.is_empty() {
            let list = report
                .slow_subsystems
                .iter()
                .map(|(name, rating)| format!("{name} ({rating:.2})"))
                .collect::<Vec<_>>()
                .join(", ");
            log::warn!("Scan: Slow subsystems: {}", list);
        }
        report
    }

    /// Mean performance ratio of the last 50 samples, `1.0` when empty.
    pub fn performance_rating(&self) -> f64 {
        let window = self.ctx.store.window(RATING_WINDOW);
        if window.is_empty() {
            return 1.0;
        }
        let mean =
            window.iter().map(|m| m.performance_ratio()).sum::<f64>() / window.len() as f64;
        mean.clamp(0.0, 1.0)
    }

    /// Drops every pending request. Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.stats.requests_discarded += dropped as u64;
        self.phase = AdaptationPhase::Idle;
        if dropped > 0 {
            log::debug!("Adaptation: Discarded {} pending requests", dropped);
        }
        dropped
    }

    /// Number of requests waiting to be applied.
    pub fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    /// Pending requests, oldest first.
    pub fn queue(&self) -> impl Iterator<Item = &OptimizationRequest> {
        self.queue.iter()
    }

    /// Current cycle phase.
    pub fn phase(&self) -> AdaptationPhase {
        self.phase
    }

    /// Activity counters.
    pub fn stats(&self) -> &AdaptationStats {
        &self.stats
    }

    /// Advisories from the last cycle.
    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    /// Baseline of one metric of one subsystem.
    pub fn baseline(&self, subsystem: &str, metric: &str) -> Option<f64> {
        self.baselines.get(subsystem)?.get(metric).copied()
    }

    /// All baselines, by subsystem then metric.
    pub fn baselines(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.baselines
    }

    /// Recent per-cycle performance ratios of a subsystem, oldest first.
    pub fn trend(&self, subsystem: &str) -> Vec<f64> {
        self.trends
            .get(subsystem)
            .map(|t| t.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Operator action: registers a new strategy in the catalog.
    pub fn add_strategy(&self, strategy: OptimizationStrategy) -> Result<(), StrategyError> {
        let name = strategy.name.clone();
        self.ctx.strategies_mut().register(strategy)?;
        log::info!("Adaptation: Added optimization strategy '{}'", name);
        Ok(())
    }

    /// Operator action: maps `subsystem` to an already registered strategy.
    pub fn map_subsystem(&self, subsystem: &str, strategy: &str) -> Result<(), StrategyError> {
        self.ctx.strategies_mut().map_subsystem(subsystem, strategy)
    }

    /// Operator action: forget every baseline.
    pub fn reset_baselines(&mut self) {
        self.baselines.clear();
        log::info!("Adaptation: Baselines reset");
    }

    /// Operator action: drop the metric history and the trends.
    pub fn clear_performance_history(&mut self) {
        self.ctx.store.clear();
        self.trends.clear();
        log::info!("Adaptation: Performance history cleared");
    }

    /// Builds the offline-analysis document.
    pub fn export(
        &self,
        frame_stats: FrameStats,
        state: SchedulerState,
        subsystems: Vec<SubsystemInfo>,
    ) -> PerformanceExport {
        PerformanceExport {
            settings: (*self.ctx.config).clone(),
            engine_state: state,
            stats: self.stats.clone(),
            frame_stats,
            subsystems,
            performance_history: self.ctx.store.snapshot(),
            optimization_strategies: self.ctx.strategies().iter().cloned().collect(),
            baselines: self.baselines.clone(),
            suggestions: self.suggestions.clone(),
        }
    }
}
