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

//! Rolling storage for performance samples.
//!
//! [`MetricStore`] is the FIFO-bounded history every analysis pass reads from.
//! [`RingBuffer`] is the fixed-capacity numeric window used for frame times and
//! per-subsystem trends. Off-thread collaborators report through a
//! [`MetricReporter`]; the frame loop drains the matching [`MetricInbox`] at the
//! start of each tick so cross-thread traffic has a single writer.

use attune_core::telemetry::{MetricError, MetricReport, PerformanceMetric};
use attune_core::Clock;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

/// A fixed-size circular buffer for storing numerical samples.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    data: [T; N],
    index: usize,
    count: usize,
}

impl<T: Default + Copy, const N: usize> RingBuffer<T, N> {
    /// Creates a new, empty ring buffer.
    pub fn new() -> Self {
        Self {
            data: [T::default(); N],
            index: 0,
            count: 0,
        }
    }

    /// Pushes a new value into the buffer, overwriting the oldest if full.
    pub fn push(&mut self, value: T) {
        self.data[self.index] = value;
        self.index = (self.index + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    /// Returns the number of elements currently in the buffer.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns `true` if nothing has been pushed since creation or the last clear.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Forgets every value.
    pub fn clear(&mut self) {
        self.index = 0;
        self.count = 0;
    }

    /// Returns an iterator over the values in chronological order (oldest to newest).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        // The oldest value sits at `index` once the buffer has wrapped, and at 0 before.
        let start = if self.count < N { 0 } else { self.index };
        (0..self.count).map(move |i| &self.data[(start + i) % N])
    }
}

impl<T: Default + Copy, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<f64, N> {
    /// Calculates the arithmetic mean of the values in the buffer.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.iter().sum::<f64>() / self.count as f64
    }

    /// Mean of the `n` most recent values, or `None` if fewer than `n` exist.
    pub fn recent_average(&self, n: usize) -> Option<f64> {
        self.window_average(0, n)
    }

    /// Mean of the `n` values preceding the `skip` most recent ones.
    ///
    /// `window_average(5, 5)` is the mean of the five values before the last five.
    pub fn window_average(&self, skip: usize, n: usize) -> Option<f64> {
        if n == 0 || self.count < skip + n {
            return None;
        }
        let end = self.count - skip;
        let sum: f64 = self.iter().skip(end - n).take(n).sum();
        Some(sum / n as f64)
    }

    /// Difference between the mean of the newer half and the older half.
    /// Positive when values are rising.
    pub fn trend(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let half = self.count / 2;
        let first_half_avg: f64 = self.iter().take(half).sum::<f64>() / half as f64;
        let last_half_avg: f64 = self.iter().skip(self.count - half).sum::<f64>() / half as f64;
        last_half_avg - first_half_avg
    }

    /// Returns the minimum value in the buffer, or `None` if empty.
    pub fn min(&self) -> Option<f64> {
        self.iter().copied().reduce(f64::min)
    }

    /// Returns the maximum value in the buffer, or `None` if empty.
    pub fn max(&self) -> Option<f64> {
        self.iter().copied().reduce(f64::max)
    }

    /// Returns the most recently pushed value.
    pub fn last(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.data[(self.index + N - 1) % N])
    }
}

/// FIFO-bounded history of performance samples.
///
/// Insertion appends and evicts the oldest entry once `capacity` is reached.
/// Readers always receive copies, so recorded samples can never be mutated.
/// The store is internally synchronised and is shared as `Arc<MetricStore>`.
#[derive(Debug)]
pub struct MetricStore {
    capacity: usize,
    samples: RwLock<VecDeque<PerformanceMetric>>,
}

impl MetricStore {
    /// Creates an empty store. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends a sample, evicting the oldest one if the store is full.
    pub fn record(&self, metric: PerformanceMetric) {
        let mut samples = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        while samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(metric);
    }

    /// Validates a subsystem report, stamps it and records it.
    pub fn record_report(
        &self,
        timestamp: f64,
        subsystem: &str,
        report: &MetricReport,
    ) -> Result<(), MetricError> {
        let metric = PerformanceMetric::new(
            timestamp,
            subsystem,
            report.metric.as_str(),
            report.value,
            report.target,
            report.polarity,
        )?;
        self.record(metric);
        Ok(())
    }

    /// Returns copies of the `n` most recent samples, oldest first.
    pub fn window(&self, n: usize) -> Vec<PerformanceMetric> {
        let samples = self.samples.read().unwrap_or_else(PoisonError::into_inner);
        let skip = samples.len().saturating_sub(n);
        samples.iter().skip(skip).cloned().collect()
    }

    /// Returns copies of the `n` most recent samples of one subsystem, oldest first.
    pub fn window_for(&self, subsystem: &str, n: usize) -> Vec<PerformanceMetric> {
        let samples = self.samples.read().unwrap_or_else(PoisonError::into_inner);
        let mut selected: Vec<PerformanceMetric> = samples
            .iter()
            .rev()
            .filter(|m| m.subsystem == subsystem)
            .take(n)
            .cloned()
            .collect();
        selected.reverse();
        selected
    }

    /// Returns a copy of the whole history, oldest first.
    pub fn snapshot(&self) -> Vec<PerformanceMetric> {
        self.window(self.capacity)
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the store holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of samples retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every sample.
    pub fn clear(&self) {
        self.samples
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Creates a bounded reporting channel.
///
/// The reporter side is cloneable and may live on any thread; the inbox is
/// owned by the frame loop.
pub fn metric_channel(capacity: usize, clock: Arc<dyn Clock>) -> (MetricReporter, MetricInbox) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (MetricReporter { tx, clock }, MetricInbox { rx })
}

/// Cloneable handle used by subsystems to push samples from any thread.
#[derive(Clone)]
pub struct MetricReporter {
    tx: Sender<PerformanceMetric>,
    clock: Arc<dyn Clock>,
}

impl MetricReporter {
    /// Records a sample of `subsystem`, stamped with the current clock reading.
    ///
    /// Returns `Ok(false)` if the sample was dropped because the inbox is full
    /// or the frame loop is gone.
    pub fn record_performance_metric(
        &self,
        subsystem: &str,
        report: MetricReport,
        weight: f64,
    ) -> Result<bool, MetricError> {
        let metric = PerformanceMetric::new(
            self.clock.now(),
            subsystem,
            report.metric,
            report.value,
            report.target,
            report.polarity,
        )?
        .with_weight(weight);
        match self.tx.try_send(metric) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(m)) => {
                log::trace!("MetricReporter: Inbox full, dropping {}:{}", m.subsystem, m.metric);
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Ok(false),
        }
    }
}

impl std::fmt::Debug for MetricReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricReporter")
            .field("pending", &self.tx.len())
            .finish()
    }
}

/// Receiving end of [`metric_channel`].
#[derive(Debug)]
pub struct MetricInbox {
    rx: Receiver<PerformanceMetric>,
}

impl MetricInbox {
    /// Moves every pending sample into `store`, in arrival order.
    /// Returns how many were ingested.
    pub fn drain_into(&self, store: &MetricStore) -> usize {
        let mut ingested = 0;
        while let Ok(metric) = self.rx.try_recv() {
            store.record(metric);
            ingested += 1;
        }
        ingested
    }
}
