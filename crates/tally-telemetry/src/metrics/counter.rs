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

//! Monotonic counters.

use tally_core::{Backend, MetricKind, MetricsError, MetricsResult, Sample};

use crate::metrics::metric::{Metric, MetricBuilder, TypedMetric};

/// A value that only goes up, exported with the `_total` suffix.
///
/// ```
/// use tally_telemetry::{Counter, CollectorRegistry};
///
/// let registry = CollectorRegistry::new();
/// let requests = Counter::builder("http_requests", "Handled requests")
///     .required_labels(["method"])
///     .registry(&registry)
///     .build()
///     .unwrap();
///
/// requests.labels([("method", "get")]).unwrap().inc().unwrap();
/// assert_eq!(registry.collect().count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Counter {
    metric: Metric,
}

impl TypedMetric for Counter {
    const KIND: MetricKind = MetricKind::Counter;

    fn from_metric(metric: Metric) -> Self {
        Self { metric }
    }
}

impl Counter {
    /// Creates an unlabelled counter in the default registry.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> MetricsResult<Self> {
        Self::builder(name, description).build()
    }

    /// Starts declaring a counter.
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> MetricBuilder<Self> {
        MetricBuilder::new(name, description)
    }

    /// Returns a counter with `labels` bound on top of this one's.
    pub fn labels<I, K, V>(&self, labels: I) -> MetricsResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.metric.labels(labels).map(Self::from_metric)
    }

    /// The underlying label binding.
    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    fn backend(&self) -> MetricsResult<&dyn Backend> {
        self.metric.check_can_observe()?.scalar()
    }

    /// Adds one.
    pub fn inc(&self) -> MetricsResult<()> {
        self.inc_by(1.0)
    }

    /// Adds `amount`, which must not be negative.
    pub fn inc_by(&self, amount: f64) -> MetricsResult<()> {
        let backend = self.backend()?;
        if amount < 0.0 {
            return Err(MetricsError::NegativeIncrement(amount));
        }
        backend.inc(amount)
    }

    /// The current value.
    pub fn get(&self) -> MetricsResult<f64> {
        self.backend()?.get()
    }

    /// The current value as an exported sample.
    pub fn sample(&self) -> MetricsResult<Sample> {
        self.metric.scalar_sample("_total")
    }

    /// Runs `f` and counts it when it returns an error.
    ///
    /// The outer result only fails when the counter cannot be observed, in
    /// which case `f` is not run.
    pub fn count_errors<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> MetricsResult<Result<T, E>> {
        self.count_errors_if(|_| true, f)
    }

    /// Runs `f` and counts the errors matching `predicate`.
    ///
    /// Other errors pass through uncounted.
    pub fn count_errors_if<T, E>(
        &self,
        predicate: impl FnOnce(&E) -> bool,
        f: impl FnOnce() -> Result<T, E>,
    ) -> MetricsResult<Result<T, E>> {
        let backend = self.backend()?;
        let result = f();
        if let Err(error) = &result {
            if predicate(error) {
                if let Err(e) = backend.inc(1.0) {
                    log::warn!("Failed to count error on {}: {}", self.metric.name(), e);
                }
            }
        }
        Ok(result)
    }
}
