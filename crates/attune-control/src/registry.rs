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

//! Registry of governed subsystems, ticked in registration order.

use attune_core::{
    MetricReport, PerformanceMetric, Stopwatch, SubsystemError, SubsystemStatus, TunableSubsystem,
};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};

/// Entry in the subsystem registry.
struct SubsystemEntry {
    subsystem: Box<dyn TunableSubsystem>,
    status: SubsystemStatus,
    consecutive_failures: u32,
    last_update_secs: f64,
}

/// A read-only view of one registered subsystem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsystemInfo {
    /// Subsystem name.
    pub name: String,
    /// Outcome of the last update.
    pub status: SubsystemStatus,
    /// Failed updates since the last success.
    pub consecutive_failures: u32,
    /// Wall time of the last update, in seconds.
    pub last_update_secs: f64,
}

/// Registry that owns every tunable subsystem of the loop.
#[derive(Default)]
pub struct SubsystemRegistry {
    entries: Vec<SubsystemEntry>,
}

impl SubsystemRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subsystem at the end of the update order.
    ///
    /// Returns the subsystem back if one with the same name already exists.
    pub fn register(
        &mut self,
        subsystem: Box<dyn TunableSubsystem>,
    ) -> Result<(), Box<dyn TunableSubsystem>> {
        if self.contains(subsystem.name()) {
            return Err(subsystem);
        }
        log::info!(
            "SubsystemRegistry: Registered '{}' (order={})",
            subsystem.name(),
            self.entries.len()
        );
        self.entries.push(SubsystemEntry {
            subsystem,
            status: SubsystemStatus::Ready,
            consecutive_failures: 0,
            last_update_secs: 0.0,
        });
        Ok(())
    }

    /// Returns the number of registered subsystems.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no subsystems are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if a subsystem with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.subsystem.name() == name)
    }

    /// Returns the subsystem with the given name, if registered.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut dyn TunableSubsystem> {
        self.entries
            .iter_mut()
            .find(|e| e.subsystem.name() == name)
            .map(|e| e.subsystem.as_mut() as &mut dyn TunableSubsystem)
    }

    /// Initializes every subsystem in registration order.
    ///
    /// A subsystem whose `initialize()` fails or panics is marked
    /// [`SubsystemStatus::Errored`]; the others are still initialized.
    pub fn initialize_all(&mut self) -> Vec<SubsystemError> {
        let mut failures = Vec::new();
        for entry in &mut self.entries {
            let outcome = guarded(entry, "initialize", |s| s.initialize()).and_then(|r| r);
            match outcome {
                Ok(()) => log::debug!("SubsystemRegistry: '{}' initialized", entry.subsystem.name()),
                Err(error) => {
                    mark_errored(entry, &error);
                    failures.push(error);
                }
            }
        }
        failures
    }

    /// Shuts every subsystem down in reverse registration order.
    ///
    /// Panics are contained and logged.
    pub fn shutdown_all(&mut self) {
        for entry in self.entries.iter_mut().rev() {
            if let Err(error) = guarded(entry, "shutdown", |s| s.shutdown()) {
                log::warn!("SubsystemRegistry: {}", error);
            }
        }
    }

    /// Updates every subsystem in registration order with a fixed `dt`.
    ///
    /// A failing or panicking subsystem is marked [`SubsystemStatus::Errored`]
    /// and the remaining ones still run. Returns the failures of this pass.
    pub fn update_all(&mut self, dt: f32) -> Vec<SubsystemError> {
        let mut failures = Vec::new();
        for entry in &mut self.entries {
            let stopwatch = Stopwatch::new();
            let outcome = guarded(entry, "update", |s| s.update(dt)).and_then(|r| r);
            entry.last_update_secs = stopwatch.elapsed_secs_f64();

            match outcome {
                Ok(()) => {
                    if entry.status == SubsystemStatus::Errored {
                        log::info!(
                            "SubsystemRegistry: '{}' recovered after {} failed updates",
                            entry.subsystem.name(),
                            entry.consecutive_failures
                        );
                    }
                    entry.status = SubsystemStatus::Ready;
                    entry.consecutive_failures = 0;
                }
                Err(error) => {
                    mark_errored(entry, &error);
                    failures.push(error);
                }
            }
        }
        failures
    }

    /// Pulls `report_metrics()` from every subsystem and stamps the readings.
    ///
    /// Invalid readings are logged and skipped. A subsystem that panics while
    /// reporting is marked [`SubsystemStatus::Errored`] and contributes nothing.
    pub fn collect_reports(&mut self, timestamp: f64) -> Vec<PerformanceMetric> {
        let mut samples = Vec::new();
        for entry in &mut self.entries {
            let reports = match guarded(entry, "report_metrics", |s| s.report_metrics()) {
                Ok(reports) => reports,
                Err(error) => {
                    mark_errored(entry, &error);
                    continue;
                }
            };
            let name = entry.subsystem.name();
            for MetricReport {
                metric,
                value,
                target,
                polarity,
            } in reports
            {
                match PerformanceMetric::new(timestamp, name, metric, value, target, polarity) {
                    Ok(sample) => samples.push(sample),
                    Err(e) => log::debug!("SubsystemRegistry: '{}' reported {}", name, e),
                }
            }
        }
        samples
    }

    /// Self-reported performance ratings, in registration order.
    ///
    /// A subsystem that panics while rating itself is marked
    /// [`SubsystemStatus::Errored`] and rated `0.0`.
    pub fn ratings(&mut self) -> Vec<(String, f64)> {
        let mut ratings = Vec::with_capacity(self.entries.len());
        for entry in &mut self.entries {
            let rating = match guarded(entry, "performance_rating", |s| s.performance_rating()) {
                Ok(rating) => rating,
                Err(error) => {
                    mark_errored(entry, &error);
                    0.0
                }
            };
            ratings.push((entry.subsystem.name().to_owned(), rating));
        }
        ratings
    }

    /// A snapshot of every subsystem's bookkeeping, in registration order.
    pub fn infos(&self) -> Vec<SubsystemInfo> {
        self.entries
            .iter()
            .map(|e| SubsystemInfo {
                name: e.subsystem.name().to_owned(),
                status: e.status,
                consecutive_failures: e.consecutive_failures,
                last_update_secs: e.last_update_secs,
            })
            .collect()
    }

    /// Status of the named subsystem, if registered.
    pub fn status(&self, name: &str) -> Option<SubsystemStatus> {
        self.entries
            .iter()
            .find(|e| e.subsystem.name() == name)
            .map(|e| e.status)
    }
}

/// Runs `call` on the entry's subsystem, turning a panic into
/// [`SubsystemError::Panicked`].
fn guarded<R>(
    entry: &mut SubsystemEntry,
    during: &'static str,
    call: impl FnOnce(&mut dyn TunableSubsystem) -> R,
) -> Result<R, SubsystemError> {
    let subsystem = entry.subsystem.as_mut() as &mut dyn TunableSubsystem;
    panic::catch_unwind(AssertUnwindSafe(|| call(subsystem))).map_err(|_| {
        SubsystemError::Panicked {
            subsystem: entry.subsystem.name().to_owned(),
            during,
        }
    })
}

/// Flags the entry as errored, warning only on the Ready to Errored edge.
fn mark_errored(entry: &mut SubsystemEntry, error: &SubsystemError) {
    if entry.status == SubsystemStatus::Ready {
        log::warn!("SubsystemRegistry: {}", error);
    }
    entry.status = SubsystemStatus::Errored;
    entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use attune_core::control::StrategyParameters;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records every call; `panics_in` names the call that panics.
    struct Recorder {
        name: &'static str,
        log: Log,
        fail: bool,
        panics_in: Option<&'static str>,
    }

    impl Recorder {
        fn record(&self, call: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", call, self.name));
            if self.panics_in == Some(call) {
                panic!("{} panicked in {}", self.name, call);
            }
        }
    }

    impl TunableSubsystem for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        fn initialize(&mut self) -> Result<(), SubsystemError> {
            self.record("initialize");
            if self.fail {
                return Err(SubsystemError::init_failed(self.name, "no device"));
            }
            Ok(())
        }
        fn update(&mut self, _: f32) -> Result<(), SubsystemError> {
            self.record("update");
            if self.fail {
                return Err(SubsystemError::update_failed(self.name, "stalled"));
            }
            Ok(())
        }
        fn report_metrics(&self) -> Vec<MetricReport> {
            self.record("report_metrics");
            vec![
                MetricReport::cost("update_time", 0.01, 0.016),
                MetricReport::cost("broken", 0.01, 0.0),
            ]
        }
        fn apply_parameter(&mut self, _: &str, _: &StrategyParameters) -> bool {
            true
        }
        fn performance_rating(&self) -> f64 {
            self.record("performance_rating");
            if self.fail {
                0.2
            } else {
                1.0
            }
        }
        fn shutdown(&mut self) {
            self.record("shutdown");
        }
    }

    fn recorder(name: &'static str, log: &Log) -> Recorder {
        Recorder {
            name,
            log: log.clone(),
            fail: false,
            panics_in: None,
        }
    }

    fn calls(log: &Log, call: &str) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.starts_with(call))
            .cloned()
            .collect()
    }

    #[test]
    fn test_updates_in_registration_order() {
        let log = Log::default();
        let mut registry = SubsystemRegistry::new();
        for name in ["renderer", "physics", "ai_behavior"] {
            assert!(registry.register(Box::new(recorder(name, &log))).is_ok());
        }
        registry.update_all(1.0 / 60.0);
        assert_eq!(
            calls(&log, "update"),
            vec!["update:renderer", "update:physics", "update:ai_behavior"]
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let log = Log::default();
        let mut registry = SubsystemRegistry::new();
        assert!(registry.register(Box::new(recorder("physics", &log))).is_ok());
        assert!(registry.register(Box::new(recorder("physics", &log))).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failure_is_isolated() {
        let log = Log::default();
        let mut registry = SubsystemRegistry::new();
        let mut failing = recorder("physics", &log);
        failing.fail = true;
        let mut panicking = recorder("ai_behavior", &log);
        panicking.panics_in = Some("update");
        registry.register(Box::new(failing)).ok();
        registry.register(Box::new(panicking)).ok();
        registry.register(Box::new(recorder("renderer", &log))).ok();

        let failures = registry.update_all(0.016);
        assert_eq!(failures.len(), 2);
        assert!(matches!(
            failures[1],
            SubsystemError::Panicked {
                during: "update",
                ..
            }
        ));
        assert_eq!(calls(&log, "update").len(), 3);
        assert_eq!(registry.status("physics"), Some(SubsystemStatus::Errored));
        assert_eq!(registry.status("ai_behavior"), Some(SubsystemStatus::Errored));
        assert_eq!(registry.status("renderer"), Some(SubsystemStatus::Ready));

        registry.update_all(0.016);
        let info = registry.infos();
        assert_eq!(info[0].consecutive_failures, 2);
    }

    #[test]
    fn test_collect_reports_skips_invalid() {
        let log = Log::default();
        let mut registry = SubsystemRegistry::new();
        registry.register(Box::new(recorder("physics", &log))).ok();
        let samples = registry.collect_reports(9.0);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].subsystem, "physics");
        assert_eq!(samples[0].timestamp, 9.0);
    }

    #[test]
    fn test_panicking_report_is_contained() {
        let log = Log::default();
        let mut registry = SubsystemRegistry::new();
        let mut panicking = recorder("networking", &log);
        panicking.panics_in = Some("report_metrics");
        registry.register(Box::new(recorder("renderer", &log))).ok();
        registry.register(Box::new(panicking)).ok();
        registry.register(Box::new(recorder("physics", &log))).ok();

        let samples = registry.collect_reports(1.0);
        let names: Vec<&str> = samples.iter().map(|s| s.subsystem.as_str()).collect();
        assert_eq!(names, vec!["renderer", "physics"]);
        assert_eq!(registry.status("networking"), Some(SubsystemStatus::Errored));
        assert_eq!(registry.status("renderer"), Some(SubsystemStatus::Ready));
        assert_eq!(registry.infos()[1].consecutive_failures, 1);

        // The next successful update clears the flag.
        registry.update_all(0.016);
        assert_eq!(registry.status("networking"), Some(SubsystemStatus::Ready));
    }

    #[test]
    fn test_panicking_rating_scores_zero() {
        let log = Log::default();
        let mut registry = SubsystemRegistry::new();
        let mut panicking = recorder("ai_behavior", &log);
        panicking.panics_in = Some("performance_rating");
        registry.register(Box::new(panicking)).ok();
        registry.register(Box::new(recorder("renderer", &log))).ok();

        let ratings = registry.ratings();
        assert_eq!(
            ratings,
            vec![
                ("ai_behavior".to_string(), 0.0),
                ("renderer".to_string(), 1.0)
            ]
        );
        assert_eq!(registry.status("ai_behavior"), Some(SubsystemStatus::Errored));
    }

    #[test]
    fn test_initialize_failures_are_isolated() {
        let log = Log::default();
        let mut registry = SubsystemRegistry::new();
        let mut failing = recorder("physics", &log);
        failing.fail = true;
        let mut panicking = recorder("ai_behavior", &log);
        panicking.panics_in = Some("initialize");
        registry.register(Box::new(failing)).ok();
        registry.register(Box::new(panicking)).ok();
        registry.register(Box::new(recorder("renderer", &log))).ok();

        let failures = registry.initialize_all();
        assert_eq!(failures.len(), 2);
        assert!(matches!(failures[0], SubsystemError::InitFailed { .. }));
        assert!(matches!(
            failures[1],
            SubsystemError::Panicked {
                during: "initialize",
                ..
            }
        ));
        assert_eq!(calls(&log, "initialize").len(), 3);
        assert_eq!(registry.status("physics"), Some(SubsystemStatus::Errored));
        assert_eq!(registry.status("ai_behavior"), Some(SubsystemStatus::Errored));
        assert_eq!(registry.status("renderer"), Some(SubsystemStatus::Ready));
    }

    #[test]
    fn test_shutdown_runs_in_reverse_order() {
        let log = Log::default();
        let mut registry = SubsystemRegistry::new();
        let mut panicking = recorder("physics", &log);
        panicking.panics_in = Some("shutdown");
        registry.register(Box::new(recorder("renderer", &log))).ok();
        registry.register(Box::new(panicking)).ok();
        registry.register(Box::new(recorder("ai_behavior", &log))).ok();

        registry.shutdown_all();
        assert_eq!(
            calls(&log, "shutdown"),
            vec![
                "shutdown:ai_behavior",
                "shutdown:physics",
                "shutdown:renderer"
            ]
        );
    }
}
