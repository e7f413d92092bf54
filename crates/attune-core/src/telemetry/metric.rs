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

//! Performance samples and the ratio convention.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction in which a metric improves.
///
/// The raw `value / target` quotient means opposite things for a frame time
/// and for a packet throughput, so every sample states its polarity and the
/// ratio is always expressed as "fraction of budget met".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricPolarity {
    /// Lower is better (times, latencies). Ratio is `target / value`.
    #[default]
    Cost,
    /// Higher is better (rates, throughput). Ratio is `value / target`.
    Throughput,
}

/// Errors raised when a sample cannot be accepted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    /// A numeric field was NaN or infinite.
    #[error("metric field `{field}` is not a finite number")]
    NonFinite {
        /// Name of the offending field.
        field: &'static str,
    },
    /// Targets must be strictly positive for the ratio to be meaningful.
    #[error("metric target must be > 0, got {0}")]
    NonPositiveTarget(f64),
    /// Cost and throughput values cannot be negative.
    #[error("metric value must be >= 0, got {0}")]
    NegativeValue(f64),
}

/// A single timestamped observation of one metric of one subsystem.
///
/// Samples are immutable once recorded: the store only ever hands out copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    /// Seconds since the clock epoch at which the sample was taken.
    pub timestamp: f64,
    /// Name of the reporting subsystem (e.g. "renderer", "engine").
    pub subsystem: String,
    /// Name of the metric (e.g. "frame_time").
    pub metric: String,
    /// Observed value.
    pub value: f64,
    /// Budgeted value.
    pub target: f64,
    /// Relative importance of the sample. Carried for export; analysis is unweighted.
    pub weight: f64,
    /// Direction in which the metric improves.
    pub polarity: MetricPolarity,
}

impl PerformanceMetric {
    /// Creates a validated sample with a weight of `1.0`.
    pub fn new(
        timestamp: f64,
        subsystem: impl Into<String>,
        metric: impl Into<String>,
        value: f64,
        target: f64,
        polarity: MetricPolarity,
    ) -> Result<Self, MetricError> {
        if !timestamp.is_finite() {
            return Err(MetricError::NonFinite { field: "timestamp" });
        }
        if !value.is_finite() {
            return Err(MetricError::NonFinite { field: "value" });
        }
        if !target.is_finite() {
            return Err(MetricError::NonFinite { field: "target" });
        }
        if target <= 0.0 {
            return Err(MetricError::NonPositiveTarget(target));
        }
        if value < 0.0 {
            return Err(MetricError::NegativeValue(value));
        }
        Ok(Self {
            timestamp,
            subsystem: subsystem.into(),
            metric: metric.into(),
            value,
            target,
            weight: 1.0,
            polarity,
        })
    }

    /// Returns a copy of the sample with the given weight.
    ///
    /// Non-finite or negative weights fall back to `1.0`.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = if weight.is_finite() && weight >= 0.0 {
            weight
        } else {
            1.0
        };
        self
    }

    /// Fraction of the budget this sample meets, in `[0, 1]`.
    ///
    /// `1.0` means on or under budget. A cost sample of zero scores `1.0`.
    pub fn performance_ratio(&self) -> f64 {
        performance_ratio(self.value, self.target, self.polarity)
    }
}

/// Computes the clamped performance ratio for a raw `value`/`target` pair.
pub fn performance_ratio(value: f64, target: f64, polarity: MetricPolarity) -> f64 {
    let ratio = match polarity {
        MetricPolarity::Cost => {
            if value <= 0.0 {
                return 1.0;
            }
            target / value
        }
        MetricPolarity::Throughput => {
            if target <= 0.0 {
                return 1.0;
            }
            value / target
        }
    };
    ratio.clamp(0.0, 1.0)
}

/// A metric reading returned by [`TunableSubsystem::report_metrics`].
///
/// It carries no subsystem name or timestamp; the store stamps both on ingest.
///
/// [`TunableSubsystem::report_metrics`]: crate::subsystem::TunableSubsystem::report_metrics
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReport {
    /// Name of the metric.
    pub metric: String,
    /// Observed value.
    pub value: f64,
    /// Budgeted value.
    pub target: f64,
    /// Direction in which the metric improves.
    pub polarity: MetricPolarity,
}

impl MetricReport {
    /// A lower-is-better reading (time, latency).
    pub fn cost(metric: impl Into<String>, value: f64, target: f64) -> Self {
        Self {
            metric: metric.into(),
            value,
            target,
            polarity: MetricPolarity::Cost,
        }
    }

    /// A higher-is-better reading (rate, throughput).
    pub fn throughput(metric: impl Into<String>, value: f64, target: f64) -> Self {
        Self {
            metric: metric.into(),
            value,
            target,
            polarity: MetricPolarity::Throughput,
        }
    }
}
