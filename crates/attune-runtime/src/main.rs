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

//! `attune`: runs the adaptation loop against five simulated subsystems and
//! optionally exports the collected telemetry as JSON.
//!
//! Run with: cargo run -p attune-runtime -- --duration 30 --stress renderer

mod config;
mod export;
mod subsystems;

use anyhow::Context;
use attune_control::{ControlContext, FrameScheduler, PerformanceExport};
use clap::Parser;
use config::RuntimeConfig;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use subsystems::{ReporterThreads, SimulatedSubsystem, SUBSYSTEM_NAMES};

/// Command-line arguments. Each one overrides the config file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Frame loop rate in Hz.
    #[arg(long)]
    pub tick_rate: Option<u32>,
    /// Seconds between adaptation cycles.
    #[arg(long)]
    pub adaptation_interval: Option<f64>,
    /// Overall performance below which bottlenecks are acted upon.
    #[arg(long)]
    pub optimization_threshold: Option<f64>,
    /// Capacity of the metric history.
    #[arg(long)]
    pub history_size: Option<usize>,
    /// Run time in seconds.
    #[arg(short, long)]
    pub duration: Option<f64>,
    /// Write the performance export to this JSON file.
    #[arg(short, long)]
    pub export: Option<PathBuf>,
    /// Put a subsystem under artificial load (repeatable).
    #[arg(long, value_name = "SUBSYSTEM")]
    pub stress: Vec<String>,
    /// Analyse and advise only; never apply strategies.
    #[arg(long)]
    pub no_autonomous: bool,
    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    use env_logger::{Builder, Env};
    Builder::from_env(Env::default().default_filter_or(cli.log_level.as_str())).init();

    let config = RuntimeConfig::resolve(&cli)?;
    let export = run(&config)?;
    summarize(&export);

    if let Some(path) = &config.export {
        export::write_json(path, &export)?;
    }
    Ok(())
}

/// Runs the loop for `duration_secs` and returns the final export.
fn run(config: &RuntimeConfig) -> anyhow::Result<PerformanceExport> {
    let ctx = ControlContext::new(config.control.clone())
        .context("invalid control configuration")?;
    let mut scheduler = FrameScheduler::new(ctx);

    let mut report_tasks = Vec::new();
    for name in SUBSYSTEM_NAMES {
        let stressed = config.is_stressed(name);
        let subsystem = SimulatedSubsystem::by_name(name, stressed)
            .with_context(|| format!("no simulation for subsystem `{name}`"))?;
        report_tasks.extend(subsystem.report_task());
        scheduler.register_subsystem(Box::new(subsystem))?;
        if stressed {
            log::info!("Runtime: '{}' runs under artificial load", name);
        }
    }

    log::info!(
        "Runtime: Running for {:.1}s at {} Hz (adaptation every {:.1}s)",
        config.duration_secs,
        config.control.tick_rate,
        config.control.adaptation_interval_secs
    );
    scheduler.start()?;
    // Reporters only start once the loop runs; dropping either side on an
    // early return stops it.
    let mut reporters = ReporterThreads::spawn(
        report_tasks,
        &scheduler.reporter(),
        Duration::from_millis(config.network_report_ms),
    )
    .context("failed to spawn reporter threads")?;
    thread::sleep(Duration::from_secs_f64(config.duration_secs));
    scheduler.stop();
    reporters.stop();

    Ok(scheduler.export())
}

fn summarize(export: &PerformanceExport) {
    let stats = &export.stats;
    log::info!(
        "Runtime: {} frames, {:.1} FPS, {} cycles, {} applied, {} failed, {} suggestions",
        export.frame_stats.frame_count,
        export.frame_stats.average_fps,
        stats.adaptation_cycles,
        stats.optimizations_applied,
        stats.failed_optimizations,
        export.suggestions.len()
    );
    for strategy in export
        .optimization_strategies
        .iter()
        .filter(|s| s.application_count > 0 || s.failure_count > 0)
    {
        log::info!(
            "Runtime: '{}' applied {} times, {} failures, effectiveness {:.2}",
            strategy.name,
            strategy.application_count,
            strategy.failure_count,
            strategy.effectiveness
        );
    }
}
