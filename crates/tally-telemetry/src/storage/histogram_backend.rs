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

//! Histogram storage composed of scalar backends.

use std::sync::{Mutex, PoisonError};

use tally_core::{Backend, BackendSpec, MetricKind, MetricsError, MetricsResult};

use crate::storage::backend::ActiveBackend;

/// A consistent read of a histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// `(upper_bound, cumulative_count)` pairs, ending with `+Inf`.
    pub buckets: Vec<(f64, f64)>,
    /// Sum of all observed values.
    pub sum: f64,
    /// Number of observations.
    pub count: f64,
}

/// One histogram value: a counting backend per bucket bound plus a sum backend.
///
/// Buckets are cumulative: an observation increments every bucket whose bound
/// it does not exceed, so the last (`+Inf`) bucket doubles as the count.
#[derive(Debug)]
pub struct HistogramBackend {
    buckets: Vec<(f64, Box<dyn Backend>)>,
    sum: Box<dyn Backend>,
    // Serialises whole observations against snapshots.
    lock: Mutex<()>,
}

impl HistogramBackend {
    /// Builds the backends for `bounds` (already validated, ending in `+Inf`).
    pub fn new(metric: &str, bounds: &[f64], active: &ActiveBackend) -> MetricsResult<Self> {
        let buckets = bounds
            .iter()
            .map(|&bound| Ok((bound, active.create(&BackendSpec::bucket(metric, bound))?)))
            .collect::<MetricsResult<Vec<_>>>()?;
        let sum = active.create(&BackendSpec::new(metric, MetricKind::Histogram))?;

        Ok(Self {
            buckets,
            sum,
            lock: Mutex::new(()),
        })
    }

    /// Records one observation. NaN is rejected before any backend is touched.
    pub fn observe(&self, value: f64) -> MetricsResult<()> {
        if value.is_nan() {
            return Err(MetricsError::InvalidObservation(value));
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        for (bound, bucket) in &self.buckets {
            if value <= *bound {
                bucket.inc(1.0)?;
            }
        }
        self.sum.inc(value)
    }

    /// Reads bucket counts, sum and count together.
    pub fn snapshot(&self) -> MetricsResult<HistogramSnapshot> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let buckets = self
            .buckets
            .iter()
            .map(|(bound, bucket)| Ok((*bound, bucket.get()?)))
            .collect::<MetricsResult<Vec<_>>>()?;
        let count = buckets.last().map_or(0.0, |(_, count)| *count);

        Ok(HistogramSnapshot {
            buckets,
            sum: self.sum.get()?,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::active_backend;

    #[test]
    fn test_histogram_operations() {
        let active = active_backend().unwrap();
        let histogram =
            HistogramBackend::new("latency", &[1.0, 5.0, 10.0, 50.0, f64::INFINITY], &active).unwrap();

        histogram.observe(0.5).unwrap(); // <= 1.0, 5.0, 10.0, 50.0, +Inf
        histogram.observe(3.0).unwrap(); // <= 5.0, 10.0, 50.0, +Inf
        histogram.observe(7.0).unwrap(); // <= 10.0, 50.0, +Inf
        histogram.observe(250.0).unwrap(); // +Inf only

        let snapshot = histogram.snapshot().unwrap();
        let counts: Vec<f64> = snapshot.buckets.iter().map(|(_, count)| *count).collect();
        assert_eq!(counts, vec![1.0, 2.0, 3.0, 3.0, 4.0]);
        assert_eq!(snapshot.count, 4.0);
        assert_eq!(snapshot.sum, 260.5);
    }

    #[test]
    fn test_value_on_bound_lands_in_that_bucket() {
        let active = active_backend().unwrap();
        let histogram = HistogramBackend::new("latency", &[1.0, f64::INFINITY], &active).unwrap();

        histogram.observe(1.0).unwrap();

        let snapshot = histogram.snapshot().unwrap();
        assert_eq!(snapshot.buckets, vec![(1.0, 1.0), (f64::INFINITY, 1.0)]);
    }

    #[test]
    fn test_nan_is_rejected_without_side_effects() {
        let active = active_backend().unwrap();
        let histogram = HistogramBackend::new("latency", &[1.0, f64::INFINITY], &active).unwrap();
        histogram.observe(0.5).unwrap();

        assert!(matches!(
            histogram.observe(f64::NAN),
            Err(MetricsError::InvalidObservation(_))
        ));

        let snapshot = histogram.snapshot().unwrap();
        assert_eq!(snapshot.sum, 0.5);
        assert_eq!(snapshot.count, 1.0);
    }
}
