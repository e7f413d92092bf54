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

//! Provides the performance sample model used throughout the adaptation loop.
//!
//! Subsystems describe how far they are from their budget with scalar samples
//! (`value` against `target`). This module defines the sample itself, the
//! polarity convention used to turn a sample into a performance ratio, and the
//! lightweight report type subsystems hand back when polled.

pub mod metric;

pub use self::metric::{MetricError, MetricPolarity, MetricReport, PerformanceMetric};
