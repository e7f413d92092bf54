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

//! Bottleneck analysis over a metric window.
//!
//! The analyzer reduces a window in two levels: samples are first averaged
//! within each subsystem, then the per-subsystem means are averaged into the
//! overall performance. A subsystem reporting many cheap metrics therefore
//! weighs exactly as much as one reporting a single expensive metric.

use attune_core::control::{Bottleneck, Severity};
use attune_core::PerformanceMetric;
use std::collections::BTreeMap;

/// Mean ratio below which a subsystem is a bottleneck.
pub const BOTTLENECK_THRESHOLD: f64 = 0.7;
/// Mean ratio below which a bottleneck is `high` severity.
pub const HIGH_SEVERITY_THRESHOLD: f64 = 0.5;
/// Fewer samples than this and the window is assumed healthy.
pub const MIN_ANALYSIS_SAMPLES: usize = 10;

/// Result of one analysis pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    /// Unweighted mean of the per-subsystem means, `1.0` on insufficient data.
    pub overall_performance: f64,
    /// Mean performance ratio per subsystem.
    pub subsystem_performance: BTreeMap<String, f64>,
    /// Subsystems below [`BOTTLENECK_THRESHOLD`], ordered by name.
    pub bottlenecks: Vec<Bottleneck>,
    /// Number of samples the pass looked at.
    pub sample_count: usize,
}

impl AnalysisReport {
    /// Neutral result used when there is not enough data to judge.
    pub fn healthy(sample_count: usize) -> Self {
        Self {
            overall_performance: 1.0,
            subsystem_performance: BTreeMap::new(),
            bottlenecks: Vec::new(),
            sample_count,
        }
    }

    /// `true` if the pass had too few samples to say anything.
    pub fn is_insufficient(&self) -> bool {
        self.sample_count < MIN_ANALYSIS_SAMPLES
    }
}

/// Classifies subsystems from their rolling performance ratios.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BottleneckAnalyzer {
    bottleneck_threshold: f64,
    high_severity_threshold: f64,
    min_samples: usize,
}

impl Default for BottleneckAnalyzer {
    fn default() -> Self {
        Self {
            bottleneck_threshold: BOTTLENECK_THRESHOLD,
            high_severity_threshold: HIGH_SEVERITY_THRESHOLD,
            min_samples: MIN_ANALYSIS_SAMPLES,
        }
    }
}

impl BottleneckAnalyzer {
    /// Creates an analyzer with the standard thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a mean ratio to a severity, or `None` if the subsystem is healthy.
    pub fn classify(&self, ratio: f64) -> Option<Severity> {
        if ratio >= self.bottleneck_threshold {
            None
        } else if ratio < self.high_severity_threshold {
            Some(Severity::High)
        } else {
            Some(Severity::Medium)
        }
    }

    /// Analyzes a window of samples.
    pub fn analyze(&self, window: &[PerformanceMetric]) -> AnalysisReport {
        if window.len() < self.min_samples {
            log::trace!(
                "Analysis: {} samples, below the {} required. Assuming healthy.",
                window.len(),
                self.min_samples
            );
            return AnalysisReport::healthy(window.len());
        }

        // ── 1. Within-subsystem reduction ────────────────────────────────
        let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for metric in window {
            let entry = sums.entry(metric.subsystem.as_str()).or_insert((0.0, 0));
            entry.0 += metric.performance_ratio();
            entry.1 += 1;
        }

        let subsystem_performance: BTreeMap<String, f64> = sums
            .into_iter()
            .map(|(name, (sum, count))| (name.to_owned(), sum / count as f64))
            .collect();

        // ── 2. Bottleneck classification ─────────────────────────────────
        let bottlenecks: Vec<Bottleneck> = subsystem_performance
            .iter()
            .filter_map(|(name, &ratio)| {
                self.classify(ratio).map(|severity| Bottleneck {
                    subsystem: name.clone(),
                    performance_ratio: ratio,
                    severity,
                })
            })
            .collect();

        // ── 3. Across-subsystem reduction ────────────────────────────────
        let overall_performance = if subsystem_performance.is_empty() {
            1.0
        } else {
            subsystem_performance.values().sum::<f64>() / subsystem_performance.len() as f64
        };

        for b in &bottlenecks {
            log::debug!(
                "Analysis: Bottleneck in '{}' (ratio={:.3}, severity={})",
                b.subsystem,
                b.performance_ratio,
                b.severity
            );
        }

        AnalysisReport {
            overall_performance,
            subsystem_performance,
            bottlenecks,
            sample_count: window.len(),
        }
    }
}
