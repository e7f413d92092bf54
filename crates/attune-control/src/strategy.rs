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

//! Strategy catalog, subsystem mapping and feedback-tuned application.

use attune_core::control::{OptimizationRequest, OptimizationStrategy, StrategyParameters};
use attune_core::TunableSubsystem;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// Failures of registry operations and strategy applications.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// No strategy with this name is registered.
    #[error("unknown strategy `{0}`")]
    UnknownStrategy(String),
    /// A strategy with this name is already registered.
    #[error("strategy `{0}` is already registered")]
    DuplicateStrategy(String),
    /// The targeted subsystem is not reachable.
    #[error("subsystem `{0}` is not available")]
    SubsystemUnavailable(String),
    /// The subsystem refused the parameter push.
    #[error("subsystem `{subsystem}` rejected strategy `{strategy}`")]
    Rejected {
        /// Strategy that was pushed.
        strategy: String,
        /// Subsystem that refused it.
        subsystem: String,
    },
}

/// Catalog of optimization strategies and the subsystem → strategy mapping.
///
/// Strategy names are unique. Each subsystem maps to at most one strategy.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    strategies: Vec<OptimizationStrategy>,
    mapping: HashMap<String, String>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the five standard strategies, one per
    /// standard subsystem.
    pub fn with_default_catalog() -> Self {
        let mut registry = Self::new();
        for (subsystem, strategy) in default_catalog() {
            // Catalog names are distinct, registration cannot fail.
            if let Err(e) = registry.register_for(subsystem, strategy) {
                log::error!("StrategyRegistry: Default catalog entry rejected: {}", e);
            }
        }
        registry
    }

    /// Adds a strategy. Names must be unique.
    pub fn register(&mut self, strategy: OptimizationStrategy) -> Result<(), StrategyError> {
        if self.get(&strategy.name).is_some() {
            return Err(StrategyError::DuplicateStrategy(strategy.name));
        }
        log::info!("StrategyRegistry: Registered strategy '{}'", strategy.name);
        self.strategies.push(strategy);
        Ok(())
    }

    /// Maps `subsystem` to an already registered strategy, replacing any
    /// previous mapping.
    pub fn map_subsystem(
        &mut self,
        subsystem: impl Into<String>,
        strategy: &str,
    ) -> Result<(), StrategyError> {
        if self.get(strategy).is_none() {
            return Err(StrategyError::UnknownStrategy(strategy.to_owned()));
        }
        let subsystem = subsystem.into();
        log::debug!("StrategyRegistry: '{}' → '{}'", subsystem, strategy);
        self.mapping.insert(subsystem, strategy.to_owned());
        Ok(())
    }

    /// Registers `strategy` and maps `subsystem` to it.
    pub fn register_for(
        &mut self,
        subsystem: impl Into<String>,
        strategy: OptimizationStrategy,
    ) -> Result<(), StrategyError> {
        let name = strategy.name.clone();
        self.register(strategy)?;
        self.map_subsystem(subsystem, &name)
    }

    /// Returns the strategy mapped to `subsystem`, if any.
    pub fn select(&self, subsystem: &str) -> Option<&OptimizationStrategy> {
        self.mapping.get(subsystem).and_then(|name| self.get(name))
    }

    /// Looks a strategy up by name.
    pub fn get(&self, name: &str) -> Option<&OptimizationStrategy> {
        self.strategies.iter().find(|s| s.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut OptimizationStrategy> {
        self.strategies.iter_mut().find(|s| s.name == name)
    }

    /// Iterates over strategies in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &OptimizationStrategy> {
        self.strategies.iter()
    }

    /// Number of registered strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns `true` if no strategy is registered.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Pushes the requested strategy's parameters into `subsystem` and feeds
    /// the result back into the strategy's effectiveness.
    ///
    /// `subsystem` is `None` when the target could not be reached; that counts
    /// as a failed application. A panicking subsystem counts as a rejection.
    pub fn apply(
        &mut self,
        request: &OptimizationRequest,
        subsystem: Option<&mut dyn TunableSubsystem>,
        now: f64,
    ) -> Result<(), StrategyError> {
        let strategy = self
            .get_mut(&request.strategy)
            .ok_or_else(|| StrategyError::UnknownStrategy(request.strategy.clone()))?;

        let Some(subsystem) = subsystem else {
            strategy.record_failure();
            return Err(StrategyError::SubsystemUnavailable(request.subsystem.clone()));
        };

        let accepted = panic::catch_unwind(AssertUnwindSafe(|| {
            subsystem.apply_parameter(&strategy.name, &strategy.parameters)
        }))
        .unwrap_or(false);

        if accepted {
            strategy.record_success(now);
            Ok(())
        } else {
            strategy.record_failure();
            Err(StrategyError::Rejected {
                strategy: request.strategy.clone(),
                subsystem: request.subsystem.clone(),
            })
        }
    }
}

/// The standard catalog: `(subsystem, strategy)` pairs.
pub fn default_catalog() -> Vec<(&'static str, OptimizationStrategy)> {
    vec![
        (
            "renderer",
            OptimizationStrategy::new(
                "rendering_quality_adjustment",
                "Step rendering quality down under load and back up with headroom",
                StrategyParameters::new(1.0, 0.1, 0.5, 1.5).with_extra("target_fps", 60.0),
            ),
        ),
        (
            "physics",
            OptimizationStrategy::new(
                "physics_complexity_reduction",
                "Reduce physics simulation complexity under load",
                StrategyParameters::new(0.016, 0.05, 0.5, 1.5),
            ),
        ),
        (
            "ai_behavior",
            OptimizationStrategy::new(
                "ai_behavior_optimization",
                "Adjust the AI behavior update rate",
                StrategyParameters::new(0.05, 0.01, 0.05, 0.5),
            ),
        ),
        (
            "content_generator",
            OptimizationStrategy::new(
                "content_generation_caching",
                "Grow the content generation cache",
                StrategyParameters::new(1.0, 10.0, 50.0, 500.0),
            ),
        ),
        (
            "networking",
            OptimizationStrategy::new(
                "network_packet_rate_adjustment",
                "Adjust the network packet rate based on latency",
                StrategyParameters::new(0.05, 5.0, 20.0, 120.0),
            ),
        ),
    ]
}
