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

//! Types exchanged between analysis, strategy selection and application.
//!
//! A [`Bottleneck`] is produced by analysis, resolved into an
//! [`OptimizationRequest`] naming an [`OptimizationStrategy`], and finally
//! handed to the owning subsystem as a [`StrategyParameters`] set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Effectiveness gained by a successful application.
pub const EFFECTIVENESS_GAIN: f64 = 0.1;
/// Effectiveness lost by a failed application.
pub const EFFECTIVENESS_PENALTY: f64 = 0.05;

/// How far below budget a bottlenecked subsystem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Mean ratio in `[0.5, 0.7)`.
    Medium,
    /// Mean ratio below `0.5`.
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Medium => f.write_str("medium"),
            Severity::High => f.write_str("high"),
        }
    }
}

/// A subsystem whose rolling performance ratio fell below the health threshold.
///
/// Transient: produced by one analysis pass and consumed immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct Bottleneck {
    /// The under-performing subsystem.
    pub subsystem: String,
    /// Its mean performance ratio over the analysed window.
    pub performance_ratio: f64,
    /// Classification of the shortfall.
    pub severity: Severity,
}

/// The knob description a strategy hands to its subsystem.
///
/// Interpretation is the subsystem's responsibility: typically it steps its
/// own setting by `step_size` towards `target_value`, staying within
/// `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParameters {
    /// The value the subsystem is steering towards.
    pub target_value: f64,
    /// Amount by which a single application moves the knob.
    pub step_size: f64,
    /// Lower bound of the knob.
    pub min: f64,
    /// Upper bound of the knob.
    pub max: f64,
    /// Additional strategy-specific values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl StrategyParameters {
    /// Creates a parameter set without extra values.
    pub fn new(target_value: f64, step_size: f64, min: f64, max: f64) -> Self {
        Self {
            target_value,
            step_size,
            min,
            max,
            extra: BTreeMap::new(),
        }
    }

    /// Adds a strategy-specific value.
    pub fn with_extra(mut self, key: impl Into<String>, value: f64) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Clamps `value` into `[min, max]`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min.min(self.max), self.max.max(self.min))
    }
}

/// A named, parameterised corrective action with feedback-tuned effectiveness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStrategy {
    /// Unique name, the strategy's identity.
    pub name: String,
    /// Human readable description.
    pub description: String,
    /// Parameters pushed to the subsystem on application.
    pub parameters: StrategyParameters,
    /// Confidence score in `[0, 1]`.
    pub effectiveness: f64,
    /// Clock reading of the last successful application, if any.
    pub last_applied: Option<f64>,
    /// Number of successful applications.
    pub application_count: u64,
    /// Number of failed applications.
    pub failure_count: u64,
}

impl OptimizationStrategy {
    /// Creates a strategy with zero effectiveness and no history.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: StrategyParameters,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            effectiveness: 0.0,
            last_applied: None,
            application_count: 0,
            failure_count: 0,
        }
    }

    /// Records a successful application at `now`.
    pub fn record_success(&mut self, now: f64) {
        self.effectiveness = (self.effectiveness + EFFECTIVENESS_GAIN).min(1.0);
        self.application_count += 1;
        self.last_applied = Some(now);
    }

    /// Records a failed application. The success count is left untouched.
    pub fn record_failure(&mut self) {
        self.effectiveness = (self.effectiveness - EFFECTIVENESS_PENALTY).max(0.0);
        self.failure_count += 1;
    }
}

/// A pending application of one strategy to one subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRequest {
    /// Name of the strategy to apply.
    pub strategy: String,
    /// Subsystem the strategy targets.
    pub subsystem: String,
    /// Severity of the bottleneck that produced the request.
    pub severity: Severity,
    /// Clock reading when the request was queued.
    pub enqueued_at: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn strategy() -> OptimizationStrategy {
        OptimizationStrategy::new("s", "test", StrategyParameters::new(1.0, 0.1, 0.5, 1.5))
    }

    #[test]
    fn test_effectiveness_trajectory() {
        let mut s = strategy();
        let mut trajectory = vec![s.effectiveness];
        for success in [true, true, false, true, true] {
            if success {
                s.record_success(1.0);
            } else {
                s.record_failure();
            }
            trajectory.push(s.effectiveness);
        }
        let expected = [0.0, 0.1, 0.2, 0.15, 0.25, 0.35];
        for (got, want) in trajectory.iter().zip(expected) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-9);
        }
        assert_eq!(s.application_count, 4);
        assert_eq!(s.failure_count, 1);
    }

    #[test]
    fn test_effectiveness_stays_in_unit_interval() {
        let mut s = strategy();
        for _ in 0..50 {
            s.record_failure();
            assert!(s.effectiveness >= 0.0);
        }
        for _ in 0..50 {
            s.record_success(2.0);
            assert!(s.effectiveness <= 1.0);
        }
        assert_eq!(s.effectiveness, 1.0);
        assert_eq!(s.last_applied, Some(2.0));
    }

    #[test]
    fn test_parameters_clamp() {
        let p = StrategyParameters::new(1.0, 0.1, 0.5, 1.5);
        assert_eq!(p.clamp(0.1), 0.5);
        assert_eq!(p.clamp(2.0), 1.5);
        assert_eq!(p.clamp(1.2), 1.2);
    }
}
