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

//! Shared state handed to the scheduler and the controller.

use crate::config::{ConfigError, ControlConfig};
use crate::metrics::MetricStore;
use crate::strategy::StrategyRegistry;
use attune_core::telemetry::{MetricError, MetricReport};
use attune_core::{Clock, SystemClock};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The explicit context object of the adaptation loop.
///
/// Cloning is cheap: every field is shared. The metric store and the strategy
/// registry are process-wide for one loop, reachable from the scheduler thread
/// and from operators holding a clone.
#[derive(Clone)]
pub struct ControlContext {
    /// Validated configuration.
    pub config: Arc<ControlConfig>,
    /// Wall-clock source for cycle scheduling and sample timestamps.
    pub clock: Arc<dyn Clock>,
    /// Rolling performance history.
    pub store: Arc<MetricStore>,
    /// Strategy catalog and subsystem mapping.
    pub strategies: Arc<RwLock<StrategyRegistry>>,
}

impl ControlContext {
    /// Creates a context on the system clock with the default strategy catalog.
    pub fn new(config: ControlConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a context on the given clock with the default strategy catalog.
    pub fn with_clock(config: ControlConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        Self::with_parts(config, clock, StrategyRegistry::with_default_catalog())
    }

    /// Creates a context from explicit parts.
    pub fn with_parts(
        config: ControlConfig,
        clock: Arc<dyn Clock>,
        strategies: StrategyRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store: Arc::new(MetricStore::new(config.performance_history_size)),
            config: Arc::new(config),
            clock,
            strategies: Arc::new(RwLock::new(strategies)),
        })
    }

    /// Current clock reading in seconds.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Records a sample on the calling thread.
    pub fn record_performance_metric(
        &self,
        subsystem: &str,
        report: MetricReport,
        weight: f64,
    ) -> Result<(), MetricError> {
        let metric = attune_core::PerformanceMetric::new(
            self.now(),
            subsystem,
            report.metric,
            report.value,
            report.target,
            report.polarity,
        )?
        .with_weight(weight);
        self.store.record(metric);
        Ok(())
    }

    /// Read access to the strategy registry. A poisoned lock is recovered.
    pub fn strategies(&self) -> RwLockReadGuard<'_, StrategyRegistry> {
        self.strategies.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write access to the strategy registry. A poisoned lock is recovered.
    pub fn strategies_mut(&self) -> RwLockWriteGuard<'_, StrategyRegistry> {
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ControlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlContext")
            .field("config", &self.config)
            .field("now", &self.now())
            .field("samples", &self.store.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attune_core::ManualClock;

    #[test]
    fn test_context_rejects_invalid_config() {
        let config = ControlConfig {
            tick_rate: 0,
            ..Default::default()
        };
        assert!(ControlContext::new(config).is_err());
    }

    #[test]
    fn test_record_performance_metric_stamps_clock() {
        let clock = Arc::new(ManualClock::new(42.0));
        let ctx = ControlContext::with_clock(ControlConfig::default(), clock).unwrap();
        ctx.record_performance_metric("physics", MetricReport::cost("step_time", 0.01, 0.016), 2.0)
            .unwrap();
        let window = ctx.store.window(1);
        assert_eq!(window[0].timestamp, 42.0);
        assert_eq!(window[0].weight, 2.0);
        assert_eq!(window[0].subsystem, "physics");
    }

    #[test]
    fn test_store_capacity_follows_config() {
        let config = ControlConfig {
            performance_history_size: 5,
            ..Default::default()
        };
        let ctx = ControlContext::new(config).unwrap();
        assert_eq!(ctx.store.capacity(), 5);
        assert_eq!(ctx.strategies().len(), 5);
    }
}
