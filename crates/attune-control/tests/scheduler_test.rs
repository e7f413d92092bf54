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

//! Integration tests for the threaded `FrameScheduler` lifecycle.

use attune_control::{
    ControlConfig, ControlContext, FrameScheduler, SchedulerError, SchedulerState,
    SubsystemRegistry,
};
use attune_core::control::StrategyParameters;
use attune_core::{MetricReport, SubsystemError, SystemClock, TunableSubsystem};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

struct Counter {
    updates: Arc<AtomicU64>,
}

impl TunableSubsystem for Counter {
    fn name(&self) -> &str {
        "renderer"
    }

    fn update(&mut self, _dt: f32) -> Result<(), SubsystemError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn report_metrics(&self) -> Vec<MetricReport> {
        Vec::new()
    }

    fn apply_parameter(&mut self, _strategy: &str, _parameters: &StrategyParameters) -> bool {
        true
    }

    fn performance_rating(&self) -> f64 {
        1.0
    }
}

/// Panics on every metrics pull.
struct BrokenReporter {
    pulls: Arc<AtomicU64>,
}

impl TunableSubsystem for BrokenReporter {
    fn name(&self) -> &str {
        "networking"
    }

    fn update(&mut self, _dt: f32) -> Result<(), SubsystemError> {
        Ok(())
    }

    fn report_metrics(&self) -> Vec<MetricReport> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        panic!("socket table corrupted");
    }

    fn apply_parameter(&mut self, _strategy: &str, _parameters: &StrategyParameters) -> bool {
        true
    }

    fn performance_rating(&self) -> f64 {
        1.0
    }
}

/// Logs lifecycle calls, collapsing consecutive updates into one entry.
struct Lifecycle {
    events: Arc<Mutex<Vec<&'static str>>>,
    fail_init: bool,
}

impl Lifecycle {
    fn push(&self, event: &'static str) {
        let mut events = self.events.lock().unwrap();
        if events.last() != Some(&event) {
            events.push(event);
        }
    }
}

impl TunableSubsystem for Lifecycle {
    fn name(&self) -> &str {
        "ai_behavior"
    }

    fn initialize(&mut self) -> Result<(), SubsystemError> {
        self.push("initialize");
        if self.fail_init {
            return Err(SubsystemError::init_failed("ai_behavior", "navmesh missing"));
        }
        Ok(())
    }

    fn update(&mut self, _dt: f32) -> Result<(), SubsystemError> {
        self.push("update");
        Ok(())
    }

    fn report_metrics(&self) -> Vec<MetricReport> {
        Vec::new()
    }

    fn apply_parameter(&mut self, _strategy: &str, _parameters: &StrategyParameters) -> bool {
        true
    }

    fn performance_rating(&self) -> f64 {
        1.0
    }

    fn shutdown(&mut self) {
        self.push("shutdown");
    }
}

fn scheduler() -> (FrameScheduler, Arc<AtomicU64>) {
    scheduler_with(ControlConfig::default())
}

fn scheduler_with(config: ControlConfig) -> (FrameScheduler, Arc<AtomicU64>) {
    let config = ControlConfig {
        tick_rate: 200,
        adaptation_interval_secs: 3_600.0,
        ..config
    };
    let ctx = ControlContext::with_clock(config, Arc::new(SystemClock)).unwrap();
    let scheduler = FrameScheduler::new(ctx);
    let updates = Arc::new(AtomicU64::new(0));
    scheduler
        .register_subsystem(Box::new(Counter {
            updates: Arc::clone(&updates),
        }))
        .unwrap();
    (scheduler, updates)
}

#[test]
fn test_start_pause_resume_stop() {
    let (mut scheduler, updates) = scheduler();
    scheduler.start().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Running);

    thread::sleep(Duration::from_millis(100));
    assert!(updates.load(Ordering::SeqCst) > 0);

    assert!(scheduler.pause());
    assert_eq!(scheduler.state(), SchedulerState::Paused);
    // Let an in-flight tick finish.
    thread::sleep(Duration::from_millis(30));
    let paused_at = updates.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(60));
    assert_eq!(updates.load(Ordering::SeqCst), paused_at);

    assert!(scheduler.resume());
    thread::sleep(Duration::from_millis(60));
    assert!(updates.load(Ordering::SeqCst) > paused_at);

    scheduler.stop();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    let stopped_at = updates.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(updates.load(Ordering::SeqCst), stopped_at);
    assert_eq!(scheduler.frame_stats().frame_count, stopped_at);
}

#[test]
fn test_pacing_respects_tick_rate() {
    let (mut scheduler, updates) = scheduler();
    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(250));
    scheduler.stop();

    // 200 Hz for 250 ms is 50 ticks; allow for slow CI but never a busy loop.
    let ticks = updates.load(Ordering::SeqCst);
    assert!(ticks >= 5, "too few ticks: {ticks}");
    assert!(ticks <= 60, "pacing not applied: {ticks}");
    assert!(scheduler.frame_stats().average_fps <= 200.0 + 1e-9);
}

#[test]
fn test_double_start_is_rejected_and_restart_works() {
    let (mut scheduler, updates) = scheduler();
    scheduler.start().unwrap();
    assert!(matches!(scheduler.start(), Err(SchedulerError::AlreadyRunning)));
    scheduler.stop();

    let before = updates.load(Ordering::SeqCst);
    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    scheduler.stop();
    assert!(updates.load(Ordering::SeqCst) > before);
}

#[test]
fn test_stop_discards_pending_requests() {
    let (mut scheduler, _) = scheduler();
    scheduler.start().unwrap();
    assert!(scheduler.pause());
    thread::sleep(Duration::from_millis(30));

    let pending = scheduler.with_loop(|fl| {
        let ctx = fl.controller().context().clone();
        for _ in 0..50 {
            ctx.record_performance_metric("renderer", MetricReport::cost("draw_time", 0.025, 0.010), 1.0)
                .unwrap();
        }
        fl.controller_mut().run_cycle(&mut SubsystemRegistry::new());
        fl.controller().pending_requests()
    });
    assert_eq!(pending, 1);

    scheduler.stop();
    let stats = scheduler.with_loop(|fl| fl.controller().stats().clone());
    assert_eq!(stats.requests_discarded, 1);
    assert_eq!(stats.optimizations_applied, 0);
    assert_eq!(scheduler.with_loop(|fl| fl.controller().pending_requests()), 0);
}

#[test]
fn test_reporter_feeds_running_scheduler() {
    let (mut scheduler, _) = scheduler();
    let reporter = scheduler.reporter();
    scheduler.start().unwrap();

    let producer = thread::spawn(move || {
        for _ in 0..10 {
            reporter
                .record_performance_metric("networking", MetricReport::cost("latency", 0.03, 0.05), 1.0)
                .unwrap();
        }
    });
    producer.join().unwrap();
    thread::sleep(Duration::from_millis(50));
    scheduler.stop();

    let samples = scheduler.context().store.window_for("networking", 100);
    assert_eq!(samples.len(), 10);
}

#[test]
fn test_export_reflects_state() {
    let (mut scheduler, _) = scheduler();
    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    let export = scheduler.export();
    assert_eq!(export.engine_state, SchedulerState::Running);
    assert_eq!(export.subsystems.len(), 1);
    assert_eq!(export.optimization_strategies.len(), 5);
    scheduler.stop();
    assert_eq!(scheduler.export().engine_state, SchedulerState::Stopped);
}

#[test]
fn test_panicking_report_keeps_scheduler_running() {
    let (mut scheduler, updates) = scheduler_with(ControlConfig {
        metrics_pull_interval_ticks: 5,
        ..Default::default()
    });
    let pulls = Arc::new(AtomicU64::new(0));
    scheduler
        .register_subsystem(Box::new(BrokenReporter {
            pulls: Arc::clone(&pulls),
        }))
        .unwrap();
    scheduler.start().unwrap();

    thread::sleep(Duration::from_millis(150));
    let early = updates.load(Ordering::SeqCst);
    assert!(early > 5, "too few ticks: {early}");
    thread::sleep(Duration::from_millis(150));
    assert!(updates.load(Ordering::SeqCst) > early);
    assert_eq!(scheduler.state(), SchedulerState::Running);

    scheduler.stop();
    assert!(pulls.load(Ordering::SeqCst) > 1);
    assert!(scheduler
        .context()
        .store
        .window_for("networking", 100)
        .is_empty());
}

#[test]
fn test_subsystems_initialized_before_and_shut_down_after_ticks() {
    let (mut scheduler, _) = scheduler();
    let events = Arc::new(Mutex::new(Vec::new()));
    scheduler
        .register_subsystem(Box::new(Lifecycle {
            events: Arc::clone(&events),
            fail_init: false,
        }))
        .unwrap();

    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    scheduler.stop();
    assert_eq!(*events.lock().unwrap(), vec!["initialize", "update", "shutdown"]);

    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    scheduler.stop();
    assert_eq!(events.lock().unwrap().len(), 6);
}

#[test]
fn test_failed_initialize_does_not_block_start() {
    let (mut scheduler, updates) = scheduler();
    let events = Arc::new(Mutex::new(Vec::new()));
    scheduler
        .register_subsystem(Box::new(Lifecycle {
            events: Arc::clone(&events),
            fail_init: true,
        }))
        .unwrap();

    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    scheduler.stop();
    assert!(updates.load(Ordering::SeqCst) > 0);
    assert_eq!(*events.lock().unwrap(), vec!["initialize", "update", "shutdown"]);
}
