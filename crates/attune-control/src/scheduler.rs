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

//! Fixed-rate frame scheduling.
//!
//! [`FrameLoop`] is one tick of work, callable directly (tests, embedding in
//! an existing loop). [`FrameScheduler`] drives it from a dedicated thread at
//! `tick_rate` Hz with cooperative pacing, and adds pause/resume/stop.

use crate::config::ConfigError;
use crate::context::ControlContext;
use crate::controller::{AdaptationController, CycleOutcome, ScanReport};
use crate::export::PerformanceExport;
use crate::metrics::{metric_channel, MetricInbox, MetricReporter, RingBuffer};
use crate::registry::SubsystemRegistry;
use crate::strategy::StrategyError;
use attune_core::{MetricPolarity, PerformanceMetric, Stopwatch, SubsystemError, TunableSubsystem};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Number of frame times kept for statistics (5 s at 60 Hz).
pub const FRAME_HISTORY: usize = 300;
/// Subsystem name under which the loop records its own frame time.
pub const ENGINE_SUBSYSTEM: &str = "engine";
/// Metric name of the engine frame-time sample.
pub const FRAME_TIME_METRIC: &str = "frame_time";
/// How often a paused scheduler checks for resume or stop.
const PAUSE_POLL: Duration = Duration::from_millis(10);

/// Lifecycle state of a [`FrameScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SchedulerState {
    /// No thread is running.
    #[default]
    Stopped = 0,
    /// Ticking at the configured rate.
    Running = 1,
    /// Thread alive, no ticks.
    Paused = 2,
}

impl SchedulerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// Errors raised by the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start` was called while the thread is alive.
    #[error("scheduler is already running")]
    AlreadyRunning,
    /// The scheduling thread could not be spawned.
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    /// A subsystem with the same name is already registered.
    #[error("subsystem `{0}` is already registered")]
    DuplicateSubsystem(String),
}

/// Frame-rate statistics over the last [`FRAME_HISTORY`] ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameStats {
    /// Ticks executed since creation.
    pub frame_count: u64,
    /// Mean busy time of a tick, in seconds.
    pub average_frame_time: f64,
    /// Effective rate of the paced loop. A tick never completes faster than
    /// `1 / tick_rate`, so this is capped at the tick rate.
    pub average_fps: f64,
    /// Shortest tick, in seconds.
    pub min_frame_time: f64,
    /// Longest tick, in seconds.
    pub max_frame_time: f64,
    /// Most recent tick, in seconds.
    pub last_frame_time: f64,
    /// Mean of the newer half of the history minus the older half, in
    /// seconds. Positive when ticks are getting slower.
    pub frame_time_trend: f64,
}

/// What one tick did.
#[derive(Debug)]
pub struct TickReport {
    /// 1-based tick index.
    pub frame: u64,
    /// Busy time of the tick, in seconds.
    pub frame_time: f64,
    /// Samples ingested from off-thread reporters.
    pub ingested: usize,
    /// Subsystem update failures, in registration order.
    pub failures: Vec<SubsystemError>,
    /// The adaptation cycle, if one was due.
    pub cycle: Option<CycleOutcome>,
    /// The queued request applied this tick, if any.
    pub applied: Option<Result<(), StrategyError>>,
    /// The periodic scan, if one was due.
    pub scan: Option<ScanReport>,
}

/// One tick worth of work: subsystems, metrics and adaptation.
pub struct FrameLoop {
    ctx: ControlContext,
    subsystems: SubsystemRegistry,
    controller: AdaptationController,
    inbox: MetricInbox,
    reporter: MetricReporter,
    frame_times: RingBuffer<f64, FRAME_HISTORY>,
    frame_count: u64,
    dt: f32,
}

impl FrameLoop {
    /// Creates an empty loop on `ctx`.
    pub fn new(ctx: ControlContext) -> Self {
        let (reporter, inbox) =
            metric_channel(ctx.config.telemetry_buffer_size, Arc::clone(&ctx.clock));
        Self {
            dt: ctx.config.tick_secs() as f32,
            controller: AdaptationController::new(ctx.clone()),
            subsystems: SubsystemRegistry::new(),
            inbox,
            reporter,
            frame_times: RingBuffer::new(),
            frame_count: 0,
            ctx,
        }
    }

    /// Adds a subsystem. Subsystems are updated in registration order.
    pub fn register_subsystem(
        &mut self,
        subsystem: Box<dyn TunableSubsystem>,
    ) -> Result<(), SchedulerError> {
        self.subsystems
            .register(subsystem)
            .map_err(|rejected| SchedulerError::DuplicateSubsystem(rejected.name().to_owned()))
    }

    /// A handle through which any thread can report samples.
    pub fn reporter(&self) -> MetricReporter {
        self.reporter.clone()
    }

    /// Initializes every registered subsystem. Failures are isolated.
    pub fn initialize_subsystems(&mut self) -> Vec<SubsystemError> {
        let failures = self.subsystems.initialize_all();
        log::info!(
            "Scheduler: Initialized {} subsystems ({} failed).",
            self.subsystems.len(),
            failures.len()
        );
        failures
    }

    /// Shuts every registered subsystem down, last registered first.
    pub fn shutdown_subsystems(&mut self) {
        self.subsystems.shutdown_all();
        log::info!("Scheduler: Shut down {} subsystems.", self.subsystems.len());
    }

    /// Runs one tick.
    ///
    /// Order: ingest off-thread reports, update every subsystem, run the
    /// adaptation cycle if due, apply at most one queued request, record the
    /// engine frame time, then run the periodic scan if due.
    pub fn tick(&mut self) -> TickReport {
        let stopwatch = Stopwatch::new();
        self.frame_count += 1;
        let frame = self.frame_count;

        let ingested = self.inbox.drain_into(&self.ctx.store);
        let failures = self.subsystems.update_all(self.dt);

        let pull = self.ctx.config.metrics_pull_interval_ticks;
        if pull > 0 && frame % pull == 0 {
            for sample in self.subsystems.collect_reports(self.ctx.now()) {
                self.ctx.store.record(sample);
            }
        }

        let cycle = self.controller.maybe_run_cycle(&mut self.subsystems);
        let applied = self.controller.drain_one(&mut self.subsystems);

        let frame_time = stopwatch.elapsed_secs_f64();
        self.frame_times.push(frame_time);
        match PerformanceMetric::new(
            self.ctx.now(),
            ENGINE_SUBSYSTEM,
            FRAME_TIME_METRIC,
            frame_time,
            self.ctx.config.tick_secs(),
            MetricPolarity::Cost,
        ) {
            Ok(metric) => self.ctx.store.record(metric),
            Err(e) => log::warn!("Scheduler: Dropping engine frame time: {}", e),
        }

        let scan = if frame % self.ctx.config.scan_interval_ticks == 0 {
            let stats = self.frame_stats();
            Some(self.controller.scan(&stats, &mut self.subsystems))
        } else {
            None
        };

        TickReport {
            frame,
            frame_time,
            ingested,
            failures,
            cycle,
            applied,
            scan,
        }
    }

    /// Frame-rate statistics over the recent history.
    pub fn frame_stats(&self) -> FrameStats {
        let average_frame_time = self.frame_times.average();
        let paced = average_frame_time.max(self.ctx.config.tick_secs());
        FrameStats {
            frame_count: self.frame_count,
            average_frame_time,
            average_fps: if self.frame_times.is_empty() { 0.0 } else { 1.0 / paced },
            min_frame_time: self.frame_times.min().unwrap_or(0.0),
            max_frame_time: self.frame_times.max().unwrap_or(0.0),
            last_frame_time: self.frame_times.last().unwrap_or(0.0),
            frame_time_trend: self.frame_times.trend(),
        }
    }

    /// The adaptation controller.
    pub fn controller(&self) -> &AdaptationController {
        &self.controller
    }

    /// The adaptation controller, for operator actions.
    pub fn controller_mut(&mut self) -> &mut AdaptationController {
        &mut self.controller
    }

    /// The registered subsystems.
    pub fn subsystems(&self) -> &SubsystemRegistry {
        &self.subsystems
    }

    /// Builds the offline-analysis document.
    pub fn export(&self, state: SchedulerState) -> PerformanceExport {
        self.controller
            .export(self.frame_stats(), state, self.subsystems.infos())
    }
}

/// Drives a [`FrameLoop`] on a dedicated thread at a fixed rate.
///
/// The loop is shared behind a mutex; the scheduling thread is its sole
/// ticker. Dropping the scheduler stops the thread.
pub struct FrameScheduler {
    ctx: ControlContext,
    frame_loop: Arc<Mutex<FrameLoop>>,
    state: Arc<AtomicU8>,
    handle: Option<thread::JoinHandle<()>>,
    reporter: MetricReporter,
}

impl FrameScheduler {
    /// Creates a stopped scheduler on `ctx`.
    pub fn new(ctx: ControlContext) -> Self {
        let frame_loop = FrameLoop::new(ctx.clone());
        let reporter = frame_loop.reporter();
        Self {
            ctx,
            frame_loop: Arc::new(Mutex::new(frame_loop)),
            state: Arc::new(AtomicU8::new(SchedulerState::Stopped as u8)),
            handle: None,
            reporter,
        }
    }

    /// Creates a stopped scheduler on the system clock with the default catalog.
    pub fn from_config(config: crate::ControlConfig) -> Result<Self, SchedulerError> {
        Ok(Self::new(ControlContext::new(config)?))
    }

    /// The shared context.
    pub fn context(&self) -> &ControlContext {
        &self.ctx
    }

    /// Adds a subsystem. Allowed while running; it is picked up next tick.
    pub fn register_subsystem(
        &self,
        subsystem: Box<dyn TunableSubsystem>,
    ) -> Result<(), SchedulerError> {
        self.lock().register_subsystem(subsystem)
    }

    /// A handle through which any thread can report samples.
    pub fn reporter(&self) -> MetricReporter {
        self.reporter.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Initializes the subsystems and spawns the scheduling thread.
    ///
    /// A subsystem that fails to initialize is marked errored and still
    /// ticked; it does not prevent the start.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self
            .state
            .compare_exchange(
                SchedulerState::Stopped as u8,
                SchedulerState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning);
        }
        // A previous thread may still be winding down after `stop` raced it.
        if let Some(stale) = self.handle.take() {
            let _ = stale.join();
        }
        self.lock().initialize_subsystems();

        let state = Arc::clone(&self.state);
        let frame_loop = Arc::clone(&self.frame_loop);
        let tick_duration = self.ctx.config.tick_duration();
        let tick_rate = self.ctx.config.tick_rate;

        let spawned = thread::Builder::new()
            .name("attune-scheduler".to_owned())
            .spawn(move || {
                log::info!("Scheduler: Thread started at {} Hz.", tick_rate);
                let _stopped = StoppedOnExit(Arc::clone(&state));
                let mut panicked_ticks: u64 = 0;
                loop {
                    match SchedulerState::from_u8(state.load(Ordering::Acquire)) {
                        SchedulerState::Stopped => break,
                        SchedulerState::Paused => {
                            thread::sleep(PAUSE_POLL);
                            continue;
                        }
                        SchedulerState::Running => {}
                    }

                    // Fresh reference each tick, so paused time is never charged.
                    let stopwatch = Stopwatch::new();
                    let ticked = panic::catch_unwind(AssertUnwindSafe(|| {
                        frame_loop
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .tick();
                    }));
                    if ticked.is_err() {
                        panicked_ticks += 1;
                        if panicked_ticks == 1 {
                            log::error!("Scheduler: Tick panicked; the loop keeps running.");
                        }
                    }

                    let elapsed = stopwatch.elapsed();
                    if elapsed < tick_duration {
                        thread::sleep(tick_duration - elapsed);
                    }
                }
                log::info!("Scheduler: Thread stopped.");
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.state
                    .store(SchedulerState::Stopped as u8, Ordering::Release);
                self.lock().shutdown_subsystems();
                Err(SchedulerError::Spawn(e))
            }
        }
    }

    /// Suspends ticking. Returns `false` if the scheduler was not running.
    pub fn pause(&self) -> bool {
        let paused = self.transition(SchedulerState::Running, SchedulerState::Paused);
        if paused {
            log::info!("Scheduler: Paused.");
        }
        paused
    }

    /// Resumes ticking. Returns `false` if the scheduler was not paused.
    pub fn resume(&self) -> bool {
        let resumed = self.transition(SchedulerState::Paused, SchedulerState::Running);
        if resumed {
            log::info!("Scheduler: Resumed.");
        }
        resumed
    }

    /// Stops the thread after its in-flight tick, discards queued requests
    /// and shuts the subsystems down.
    pub fn stop(&mut self) {
        self.state
            .store(SchedulerState::Stopped as u8, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Scheduler: Thread panicked.");
            }
            let mut frame_loop = self.lock();
            frame_loop.controller_mut().discard_pending();
            frame_loop.shutdown_subsystems();
        }
    }

    /// Frame-rate statistics over the recent history.
    pub fn frame_stats(&self) -> FrameStats {
        self.lock().frame_stats()
    }

    /// Runs `f` with exclusive access to the loop, between two ticks.
    pub fn with_loop<R>(&self, f: impl FnOnce(&mut FrameLoop) -> R) -> R {
        f(&mut self.lock())
    }

    /// Builds the offline-analysis document.
    pub fn export(&self) -> PerformanceExport {
        self.lock().export(self.state())
    }

    fn transition(&self, from: SchedulerState, to: SchedulerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn lock(&self) -> MutexGuard<'_, FrameLoop> {
        self.frame_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resets the shared state to `Stopped` if the scheduling thread unwinds.
struct StoppedOnExit(Arc<AtomicU8>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        if thread::panicking() {
            log::error!("Scheduler: Thread exited abnormally.");
            self.0
                .store(SchedulerState::Stopped as u8, Ordering::Release);
        }
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
