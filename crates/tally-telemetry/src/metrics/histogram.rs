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

//! Histograms: observations counted into cumulative buckets.

use tally_core::{MetricKind, MetricsResult, Sample};

use crate::metrics::metric::{Metric, MetricBuilder, TypedMetric};
use crate::storage::histogram_backend::{HistogramBackend, HistogramSnapshot};
use crate::utils::timer::ScopedMetricTimer;

/// Bucket bounds used when none are given, tuned for request latencies in seconds.
pub const DEFAULT_BUCKETS: [f64; 12] = [
    0.005,
    0.01,
    0.025,
    0.05,
    0.1,
    0.25,
    0.5,
    1.0,
    2.5,
    5.0,
    10.0,
    f64::INFINITY,
];

/// Counts observations into buckets and tracks their sum.
///
/// Exports `_bucket` samples (one per bound, with an `le` label), `_sum` and
/// `_count`.
#[derive(Debug, Clone)]
pub struct Histogram {
    metric: Metric,
}

impl TypedMetric for Histogram {
    const KIND: MetricKind = MetricKind::Histogram;

    fn from_metric(metric: Metric) -> Self {
        Self { metric }
    }
}

impl MetricBuilder<Histogram> {
    /// Sets the bucket bounds; `+Inf` is appended when missing.
    ///
    /// Bounds must be sorted and free of NaN, which `build` checks.
    pub fn buckets(mut self, bounds: impl IntoIterator<Item = f64>) -> Self {
        let mut buckets: Vec<f64> = bounds.into_iter().collect();
        if buckets.last().is_some_and(|last| *last != f64::INFINITY) {
            buckets.push(f64::INFINITY);
        }
        self.definition.buckets = buckets;
        self
    }
}

impl Histogram {
    /// Creates an unlabelled histogram with the default buckets in the default registry.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> MetricsResult<Self> {
        Self::builder(name, description).build()
    }

    /// Starts declaring a histogram with [`DEFAULT_BUCKETS`].
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> MetricBuilder<Self> {
        let mut builder = MetricBuilder::new(name, description);
        builder.definition.buckets = DEFAULT_BUCKETS.to_vec();
        builder
    }

    /// Returns a histogram with `labels` bound on top of this one's.
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

    /// The bucket bounds, ending with `+Inf`.
    pub fn buckets(&self) -> &[f64] {
        self.metric.collector().buckets()
    }

    fn backend(&self) -> MetricsResult<&HistogramBackend> {
        self.metric.check_can_observe()?.histogram()
    }

    /// Records one observation.
    pub fn observe(&self, value: f64) -> MetricsResult<()> {
        self.backend()?.observe(value)
    }

    /// Observes the guard's lifetime in seconds when it is dropped.
    pub fn start_timer(&self) -> MetricsResult<ScopedMetricTimer> {
        Ok(ScopedMetricTimer::observing(
            self.metric.check_can_observe()?.clone(),
        ))
    }

    /// Runs `f` and observes its duration in seconds.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> MetricsResult<T> {
        let _timer = self.start_timer()?;
        Ok(f())
    }

    /// A consistent read of the buckets, sum and count.
    pub fn get(&self) -> MetricsResult<HistogramSnapshot> {
        self.backend()?.snapshot()
    }

    /// The `_bucket`, `_sum` and `_count` samples of this label combination.
    pub fn samples(&self) -> MetricsResult<Vec<Sample>> {
        let slot = self.metric.check_can_observe()?;
        let mut samples = Vec::with_capacity(self.buckets().len() + 2);
        self.metric.collector().collect_slot(slot, &mut samples)?;
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::registry::CollectorRegistry;
    use tally_core::MetricsError;

    fn histogram(registry: &CollectorRegistry) -> Histogram {
        Histogram::builder("latency_seconds", "Request latency")
            .buckets([0.1, 1.0])
            .registry(registry)
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_buckets() {
        let registry = CollectorRegistry::new();
        let latency = Histogram::builder("latency_seconds", "Request latency")
            .registry(&registry)
            .build()
            .unwrap();
        assert_eq!(latency.buckets(), &DEFAULT_BUCKETS);
    }

    #[test]
    fn test_buckets_gain_infinity() {
        let registry = CollectorRegistry::new();
        assert_eq!(histogram(&registry).buckets(), &[0.1, 1.0, f64::INFINITY]);
    }

    #[test]
    fn test_invalid_buckets_are_rejected() {
        let registry = CollectorRegistry::new();
        for bounds in [vec![], vec![1.0, 0.5], vec![f64::NAN]] {
            let result = Histogram::builder("bad_seconds", "Bad buckets")
                .buckets(bounds)
                .registry(&registry)
                .build();
            assert!(matches!(result, Err(MetricsError::InvalidBuckets(_))));
        }
    }

    #[test]
    fn test_observe_fills_cumulative_buckets() {
        let registry = CollectorRegistry::new();
        let latency = histogram(&registry);
        latency.observe(0.0625).unwrap();
        latency.observe(0.5).unwrap();
        latency.observe(3.0).unwrap();

        let snapshot = latency.get().unwrap();
        assert_eq!(
            snapshot.buckets,
            vec![(0.1, 1.0), (1.0, 2.0), (f64::INFINITY, 3.0)]
        );
        assert_eq!(snapshot.sum, 3.5625);
        assert_eq!(snapshot.count, 3.0);
    }

    #[test]
    fn test_nan_observation_keeps_sum_and_count_in_step() {
        let registry = CollectorRegistry::new();
        let latency = histogram(&registry);
        latency.observe(0.5).unwrap();
        assert!(matches!(
            latency.observe(f64::NAN),
            Err(MetricsError::InvalidObservation(_))
        ));

        let snapshot = latency.get().unwrap();
        assert_eq!(snapshot.sum, 0.5);
        assert_eq!(snapshot.count, 1.0);
    }

    #[test]
    fn test_samples() {
        let registry = CollectorRegistry::new();
        let latency = histogram(&registry);
        latency.observe(0.5).unwrap();

        let samples = latency.samples().unwrap();
        let names: Vec<_> = samples.iter().map(Sample::full_name).collect();
        assert_eq!(
            names,
            [
                "latency_seconds_bucket",
                "latency_seconds_bucket",
                "latency_seconds_bucket",
                "latency_seconds_sum",
                "latency_seconds_count",
            ]
        );
        let bounds: Vec<_> = samples[..3]
            .iter()
            .map(|s| s.labels.as_ref().unwrap()["le"].clone())
            .collect();
        assert_eq!(bounds, ["0.1", "1.0", "+Inf"]);
        assert_eq!(samples[3].labels, None);
        assert_eq!(samples[4].value, 1.0);
    }

    #[test]
    fn test_timer_observes_once() {
        let registry = CollectorRegistry::new();
        let latency = histogram(&registry);
        let value = latency.time(|| "done").unwrap();
        assert_eq!(value, "done");
        assert_eq!(latency.get().unwrap().count, 1.0);

        let timer = latency.start_timer().unwrap();
        timer.stop().unwrap();
        assert_eq!(latency.get().unwrap().count, 2.0);
    }

    #[test]
    fn test_bucket_label_is_reserved() {
        let registry = CollectorRegistry::new();
        let result = Histogram::builder("latency_seconds", "Request latency")
            .required_labels(["le"])
            .registry(&registry)
            .build();
        assert!(matches!(result, Err(MetricsError::LabelValidation(_))));
    }

    #[test]
    fn test_different_buckets_are_incompatible() {
        let registry = CollectorRegistry::new();
        histogram(&registry);
        let result = Histogram::builder("latency_seconds", "Request latency")
            .buckets([0.5])
            .registry(&registry)
            .build();
        assert!(matches!(
            result,
            Err(MetricsError::IncompatibleCollector { .. })
        ));
    }
}
