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

//! The contract every value storage backend implements.

use std::fmt::Debug;

use super::metrics::{MetricKind, MetricsResult};

/// What a backend instance is being created for.
///
/// Passed to backend constructors so a backend can key external storage or
/// enforce kind-specific rules (e.g. counters never go down).
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSpec {
    /// Name of the owning metric.
    pub metric: String,
    /// Kind of the owning metric.
    pub kind: MetricKind,
    /// Upper bound of the bucket this backend counts, for histogram buckets.
    pub histogram_bucket: Option<f64>,
}

impl BackendSpec {
    /// Creates a spec for a scalar value of the given kind.
    pub fn new(metric: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            metric: metric.into(),
            kind,
            histogram_bucket: None,
        }
    }

    /// Creates a spec for one histogram bucket.
    pub fn bucket(metric: impl Into<String>, upper_bound: f64) -> Self {
        Self {
            metric: metric.into(),
            kind: MetricKind::Histogram,
            histogram_bucket: Some(upper_bound),
        }
    }
}

/// Trait defining the interface for value storage backends.
///
/// One instance stores one number for one label combination. Implementations
/// must make the four operations linearizable: concurrent callers on the same
/// instance observe them as if applied one at a time.
pub trait Backend: Send + Sync + Debug + 'static {
    /// Get a reference to this object as Any for downcasting
    fn as_any(&self) -> &dyn std::any::Any;

    /// Adds `amount` to the value.
    fn inc(&self, amount: f64) -> MetricsResult<()>;

    /// Subtracts `amount` from the value.
    fn dec(&self, amount: f64) -> MetricsResult<()>;

    /// Overwrites the value.
    fn set(&self, value: f64) -> MetricsResult<()>;

    /// Reads the current value.
    fn get(&self) -> MetricsResult<f64>;
}
