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

//! Runtime configuration: TOML file with command-line overrides.

use crate::Cli;
use anyhow::{bail, Context};
use attune_control::ControlConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::subsystems::SUBSYSTEM_NAMES;

/// Everything the `attune` binary needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Settings of the adaptation loop.
    pub control: ControlConfig,
    /// How long to run, in seconds.
    pub duration_secs: f64,
    /// Where to write the JSON export, if anywhere.
    pub export: Option<PathBuf>,
    /// Subsystems to run under artificial load.
    pub stress: Vec<String>,
    /// Period of the off-thread networking reports, in milliseconds.
    pub network_report_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            duration_secs: 30.0,
            export: None,
            stress: Vec::new(),
            network_report_ms: 50,
        }
    }
}

impl RuntimeConfig {
    /// Reads a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// File (or defaults) with the command-line overrides applied, validated.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(rate) = cli.tick_rate {
            self.control.tick_rate = rate;
        }
        if let Some(interval) = cli.adaptation_interval {
            self.control.adaptation_interval_secs = interval;
        }
        if let Some(threshold) = cli.optimization_threshold {
            self.control.optimization_threshold = threshold;
        }
        if let Some(size) = cli.history_size {
            self.control.performance_history_size = size;
        }
        if cli.no_autonomous {
            self.control.enable_autonomous_optimization = false;
        }
        if let Some(duration) = cli.duration {
            self.duration_secs = duration;
        }
        if let Some(path) = &cli.export {
            self.export = Some(path.clone());
        }
        for name in &cli.stress {
            if !self.stress.contains(name) {
                self.stress.push(name.clone());
            }
        }
    }

    /// Checks the loop settings and the runtime's own fields.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.control
            .validate()
            .context("invalid control configuration")?;
        if !(self.duration_secs.is_finite() && self.duration_secs >= 0.0) {
            bail!("duration must be a non-negative number of seconds, got {}", self.duration_secs);
        }
        if self.network_report_ms == 0 {
            bail!("network_report_ms must be > 0");
        }
        for name in &self.stress {
            if !SUBSYSTEM_NAMES.contains(&name.as_str()) {
                bail!(
                    "unknown subsystem `{}` (expected one of: {})",
                    name,
                    SUBSYSTEM_NAMES.join(", ")
                );
            }
        }
        Ok(())
    }

    /// `true` if `subsystem` runs under artificial load.
    pub fn is_stressed(&self, subsystem: &str) -> bool {
        self.stress.iter().any(|s| s == subsystem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("attune").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let config = RuntimeConfig::resolve(&cli(&[])).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_file_then_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
duration_secs = 5.0
stress = ["physics"]

[control]
tick_rate = 30
optimization_threshold = 0.75
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap();
        let config = RuntimeConfig::resolve(&cli(&[
            "--config",
            path,
            "--tick-rate",
            "120",
            "--stress",
            "renderer",
        ]))
        .unwrap();

        assert_eq!(config.control.tick_rate, 120);
        assert_eq!(config.control.optimization_threshold, 0.75);
        assert_eq!(config.control.performance_history_size, 1000);
        assert_eq!(config.duration_secs, 5.0);
        assert!(config.is_stressed("physics"));
        assert!(config.is_stressed("renderer"));
        assert!(!config.is_stressed("networking"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(RuntimeConfig::resolve(&cli(&["--tick-rate", "0"])).is_err());
        assert!(RuntimeConfig::resolve(&cli(&["--optimization-threshold", "1.5"])).is_err());
        assert!(RuntimeConfig::resolve(&cli(&["--stress", "audio"])).is_err());
        assert!(RuntimeConfig::resolve(&cli(&["--duration=-1"])).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = RuntimeConfig::load(&missing).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
