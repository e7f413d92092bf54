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

//! Simulated tunable subsystems.
//!
//! Each one models its cost as a function of a single knob that the
//! matching strategy moves by `step_size` within `[min, max]`. Costs are
//! computed, not measured, so the runtime behaves the same on any machine.

use attune_control::MetricReporter;
use attune_core::control::StrategyParameters;
use attune_core::{MetricReport, SubsystemError, TunableSubsystem};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Cost multiplier applied to a subsystem selected with `--stress`.
pub const STRESS_FACTOR: f64 = 2.5;
/// Fraction of its budget an unstressed subsystem spends at nominal load.
const NOMINAL_LOAD: f64 = 0.8;

/// Names of the simulated subsystems, in registration order.
pub const SUBSYSTEM_NAMES: [&str; 5] = [
    "renderer",
    "physics",
    "ai_behavior",
    "content_generator",
    "networking",
];

/// How cost responds to the knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KnobEffect {
    /// Cost grows with the knob (quality, complexity, packet rate).
    Proportional,
    /// Cost shrinks as the knob grows (update interval, cache size).
    Inverse,
}

/// How a strategy moves the knob to relieve load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relief {
    StepDown,
    StepUp,
}

/// An `f64` shared between threads.
#[derive(Debug, Clone)]
pub struct SharedValue(Arc<AtomicU64>);

impl SharedValue {
    fn new(value: f64) -> Self {
        Self(Arc::new(AtomicU64::new(value.to_bits())))
    }

    /// Current value.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// A subsystem with one tunable knob.
pub struct SimulatedSubsystem {
    name: &'static str,
    metric: &'static str,
    budget: f64,
    strategy: &'static str,
    knob: SharedValue,
    nominal: f64,
    effect: KnobEffect,
    relief: Relief,
    stress: f64,
    elapsed: f64,
    report_locally: bool,
}

impl SimulatedSubsystem {
    /// Builds the named subsystem, or `None` for an unknown name.
    pub fn by_name(name: &str, stressed: bool) -> Option<Self> {
        let stress = if stressed { STRESS_FACTOR } else { 1.0 };
        let (name, metric, budget, strategy, nominal, effect, relief) = match name {
            "renderer" => (
                "renderer",
                "frame_time",
                1.0 / 60.0,
                "rendering_quality_adjustment",
                1.0,
                KnobEffect::Proportional,
                Relief::StepDown,
            ),
            "physics" => (
                "physics",
                "step_time",
                0.004,
                "physics_complexity_reduction",
                1.0,
                KnobEffect::Proportional,
                Relief::StepDown,
            ),
            "ai_behavior" => (
                "ai_behavior",
                "think_time",
                0.003,
                "ai_behavior_optimization",
                0.05,
                KnobEffect::Inverse,
                Relief::StepUp,
            ),
            "content_generator" => (
                "content_generator",
                "generation_time",
                0.002,
                "content_generation_caching",
                100.0,
                KnobEffect::Inverse,
                Relief::StepUp,
            ),
            "networking" => (
                "networking",
                "latency",
                0.050,
                "network_packet_rate_adjustment",
                60.0,
                KnobEffect::Proportional,
                Relief::StepDown,
            ),
            _ => return None,
        };
        Some(Self {
            name,
            metric,
            budget,
            strategy,
            knob: SharedValue::new(nominal),
            nominal,
            effect,
            relief,
            stress,
            elapsed: 0.0,
            // Networking reports from its own thread.
            report_locally: name != "networking",
        })
    }

    /// Current knob position.
    pub fn knob(&self) -> f64 {
        self.knob.get()
    }

    /// Simulated cost at the current knob position.
    pub fn cost(&self) -> f64 {
        modelled_cost(
            self.budget,
            self.stress,
            load_factor(self.effect, self.nominal, self.knob.get()),
            self.elapsed,
        )
    }

    /// Describes the off-loop reporting this subsystem needs, if any.
    ///
    /// Nothing is spawned here; see [`ReporterThreads::spawn`].
    pub fn report_task(&self) -> Option<ReportTask> {
        if self.report_locally {
            return None;
        }
        Some(ReportTask {
            name: self.name,
            metric: self.metric,
            budget: self.budget,
            stress: self.stress,
            nominal: self.nominal,
            effect: self.effect,
            knob: self.knob.clone(),
        })
    }
}

/// What an off-loop reporter thread publishes.
#[derive(Debug, Clone)]
pub struct ReportTask {
    name: &'static str,
    metric: &'static str,
    budget: f64,
    stress: f64,
    nominal: f64,
    effect: KnobEffect,
    knob: SharedValue,
}

impl ReportTask {
    /// Subsystem the task reports for.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn spawn(
        self,
        reporter: MetricReporter,
        period: Duration,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<thread::JoinHandle<()>> {
        let ReportTask {
            name,
            metric,
            budget,
            stress,
            nominal,
            effect,
            knob,
        } = self;
        thread::Builder::new()
            .name(format!("attune-{name}"))
            .spawn(move || {
                let mut elapsed = 0.0;
                while running.load(Ordering::Relaxed) {
                    let load = load_factor(effect, nominal, knob.get());
                    let cost = modelled_cost(budget, stress, load, elapsed);
                    match reporter.record_performance_metric(
                        name,
                        MetricReport::cost(metric, cost, budget),
                        1.0,
                    ) {
                        Ok(true) => {}
                        Ok(false) => log::trace!("{}: Report dropped", name),
                        Err(e) => log::warn!("{}: Invalid report: {}", name, e),
                    }
                    elapsed += period.as_secs_f64();
                    thread::sleep(period);
                }
            })
    }
}

/// Reporter threads that live and die together.
///
/// Dropping the set clears the shared flag and joins every thread, so an
/// early return never leaves a reporter running.
pub struct ReporterThreads {
    running: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl ReporterThreads {
    /// Spawns one thread per task, each reporting every `period`.
    ///
    /// If a spawn fails, the threads already started are stopped first.
    pub fn spawn(
        tasks: Vec<ReportTask>,
        reporter: &MetricReporter,
        period: Duration,
    ) -> std::io::Result<Self> {
        let mut threads = Self {
            running: Arc::new(AtomicBool::new(true)),
            handles: Vec::with_capacity(tasks.len()),
        };
        for task in tasks {
            let name = task.name();
            let handle = task.spawn(reporter.clone(), period, Arc::clone(&threads.running))?;
            log::debug!("Runtime: '{}' reports every {:?}", name, period);
            threads.handles.push(handle);
        }
        Ok(threads)
    }

    /// Clears the flag and joins every thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("Runtime: A reporter thread panicked");
            }
        }
    }
}

impl Drop for ReporterThreads {
    fn drop(&mut self) {
        self.stop();
    }
}

fn load_factor(effect: KnobEffect, nominal: f64, knob: f64) -> f64 {
    match effect {
        KnobEffect::Proportional => knob / nominal,
        KnobEffect::Inverse => nominal / knob.max(f64::EPSILON),
    }
}

/// Budget share at nominal load, scaled and given a slow ±5 % wobble.
fn modelled_cost(budget: f64, stress: f64, load_factor: f64, elapsed: f64) -> f64 {
    let wobble = 1.0 + 0.05 * (elapsed * 0.7).sin();
    budget * NOMINAL_LOAD * stress * load_factor * wobble
}

impl TunableSubsystem for SimulatedSubsystem {
    fn name(&self) -> &str {
        self.name
    }

    fn update(&mut self, dt: f32) -> Result<(), SubsystemError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SubsystemError::update_failed(
                self.name,
                format!("invalid timestep {dt}"),
            ));
        }
        self.elapsed += dt as f64;
        Ok(())
    }

    fn report_metrics(&self) -> Vec<MetricReport> {
        if !self.report_locally {
            return Vec::new();
        }
        vec![MetricReport::cost(self.metric, self.cost(), self.budget)]
    }

    fn apply_parameter(&mut self, strategy: &str, parameters: &StrategyParameters) -> bool {
        if strategy != self.strategy {
            log::warn!("{}: Unsupported strategy '{}'", self.name, strategy);
            return false;
        }
        let current = self.knob();
        let next = match self.relief {
            Relief::StepDown => parameters.clamp(current - parameters.step_size),
            Relief::StepUp => parameters.clamp(current + parameters.step_size),
        };
        if (next - current).abs() < 1e-9 {
            log::debug!("{}: Knob already at its limit ({:.3})", self.name, current);
            return false;
        }
        self.knob.set(next);
        log::info!("{}: Knob {:.3} → {:.3}", self.name, current, next);
        true
    }

    fn performance_rating(&self) -> f64 {
        (self.budget / self.cost().max(f64::EPSILON)).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use attune_control::{default_catalog, ControlConfig, FrameScheduler};

    fn parameters_for(strategy: &str) -> StrategyParameters {
        default_catalog()
            .into_iter()
            .find(|(_, s)| s.name == strategy)
            .map(|(_, s)| s.parameters)
            .unwrap()
    }

    #[test]
    fn test_every_name_builds_and_matches_catalog() {
        let catalog = default_catalog();
        for name in SUBSYSTEM_NAMES {
            let subsystem = SimulatedSubsystem::by_name(name, false).unwrap();
            let (mapped, strategy) = catalog
                .iter()
                .find(|(subsystem, _)| *subsystem == name)
                .unwrap();
            assert_eq!(*mapped, name);
            assert_eq!(strategy.name, subsystem.strategy);
        }
        assert!(SimulatedSubsystem::by_name("audio", false).is_none());
    }

    #[test]
    fn test_unstressed_is_healthy() {
        let subsystem = SimulatedSubsystem::by_name("physics", false).unwrap();
        assert!(subsystem.performance_rating() > 0.9);
    }

    #[test]
    fn test_stress_creates_bottleneck() {
        let subsystem = SimulatedSubsystem::by_name("renderer", true).unwrap();
        let report = &subsystem.report_metrics()[0];
        let ratio = report.target / report.value;
        assert_abs_diff_eq!(ratio, 1.0 / (NOMINAL_LOAD * STRESS_FACTOR), epsilon = 1e-9);
        assert!(ratio < 0.7);
    }

    #[test]
    fn test_apply_moves_knob_until_limit() {
        let mut renderer = SimulatedSubsystem::by_name("renderer", true).unwrap();
        let parameters = parameters_for("rendering_quality_adjustment");
        let mut accepted = 0;
        while renderer.apply_parameter("rendering_quality_adjustment", &parameters) {
            accepted += 1;
        }
        assert_eq!(accepted, 5);
        assert_abs_diff_eq!(renderer.knob(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_inverse_knob_steps_up() {
        let mut cache = SimulatedSubsystem::by_name("content_generator", false).unwrap();
        let before = cache.cost();
        let parameters = parameters_for("content_generation_caching");
        assert!(cache.apply_parameter("content_generation_caching", &parameters));
        assert_abs_diff_eq!(cache.knob(), 110.0, epsilon = 1e-9);
        assert!(cache.cost() < before);
    }

    #[test]
    fn test_wrong_strategy_is_rejected() {
        let mut physics = SimulatedSubsystem::by_name("physics", false).unwrap();
        let parameters = parameters_for("rendering_quality_adjustment");
        assert!(!physics.apply_parameter("rendering_quality_adjustment", &parameters));
        assert_eq!(physics.knob(), 1.0);
    }

    #[test]
    fn test_networking_reports_off_thread() {
        let networking = SimulatedSubsystem::by_name("networking", false).unwrap();
        assert!(networking.report_metrics().is_empty());
        assert_eq!(networking.report_task().unwrap().name(), "networking");

        let renderer = SimulatedSubsystem::by_name("renderer", false).unwrap();
        assert!(renderer.report_task().is_none());
    }

    #[test]
    fn test_reporter_threads_joined_on_drop() {
        let scheduler = FrameScheduler::from_config(ControlConfig::default()).unwrap();
        let task = SimulatedSubsystem::by_name("networking", false)
            .unwrap()
            .report_task()
            .unwrap();
        let threads =
            ReporterThreads::spawn(vec![task], &scheduler.reporter(), Duration::from_millis(1))
                .unwrap();
        let running = Arc::clone(&threads.running);
        assert_eq!(threads.handles.len(), 1);
        thread::sleep(Duration::from_millis(10));

        drop(threads);
        assert!(!running.load(Ordering::Relaxed));
        // Only this clone is left once every thread has been joined.
        assert_eq!(Arc::strong_count(&running), 1);
    }
}
