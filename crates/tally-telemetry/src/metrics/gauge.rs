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

//! Gauges: values that can go up and down.

use std::time::{SystemTime, UNIX_EPOCH};

use tally_core::{Backend, MetricKind, MetricsResult, Sample};

use crate::metrics::metric::{Metric, MetricBuilder, TypedMetric};
use crate::utils::timer::{InProgressGuard, ScopedMetricTimer};

/// A value that can be set, incremented and decremented.
#[derive(Debug, Clone)]
pub struct Gauge {
    metric: Metric,
}

impl TypedMetric for Gauge {
    const KIND: MetricKind = MetricKind::Gauge;

    fn from_metric(metric: Metric) -> Self {
        Self { metric }
    }
}

impl Gauge {
    /// Creates an unlabelled gauge in the default registry.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> MetricsResult<Self> {
        Self::builder(name, description).build()
    }

    /// Starts declaring a gauge.
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> MetricBuilder<Self> {
        MetricBuilder::new(name, description)
    }

    /// Returns a gauge with `labels` bound on top of this one's.
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

    /// Adds `amount`.
    pub fn inc_by(&self, amount: f64) -> MetricsResult<()> {
        self.backend()?.inc(amount)
    }

    /// Subtracts one.
    pub fn dec(&self) -> MetricsResult<()> {
        self.dec_by(1.0)
    }

    /// Subtracts `amount`.
    pub fn dec_by(&self, amount: f64) -> MetricsResult<()> {
        self.backend()?.dec(amount)
    }

    /// Replaces the value.
    pub fn set(&self, value: f64) -> MetricsResult<()> {
        self.backend()?.set(value)
    }

    /// Sets the value to the current Unix time in seconds.
    pub fn set_to_current_time(&self) -> MetricsResult<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.set(now.as_secs_f64())
    }

    /// Increments now and decrements when the returned guard is dropped.
    pub fn track_inprogress(&self) -> MetricsResult<InProgressGuard> {
        InProgressGuard::enter(self.metric.check_can_observe()?.clone())
    }

    /// Sets the gauge to the guard's lifetime in seconds when it is dropped.
    pub fn start_timer(&self) -> MetricsResult<ScopedMetricTimer> {
        Ok(ScopedMetricTimer::setting(
            self.metric.check_can_observe()?.clone(),
        ))
    }

    /// Runs `f` and sets the gauge to its duration in seconds.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> MetricsResult<T> {
        let _timer = self.start_timer()?;
        Ok(f())
    }

    /// The current value.
    pub fn get(&self) -> MetricsResult<f64> {
        self.backend()?.get()
    }

    /// The current value as an exported sample.
    pub fn sample(&self) -> MetricsResult<Sample> {
        self.metric.scalar_sample("")
    }
}
