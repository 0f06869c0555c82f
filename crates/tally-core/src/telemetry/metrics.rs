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

//! Abstract definitions for metric kinds, label sets and collected samples.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use thiserror::Error;

/// A mapping from label name to label value.
///
/// A `BTreeMap` keeps the names in canonical (sorted) order, which is the order
/// used both for [`LabelKey`]s and for rendering.
pub type Labels = BTreeMap<String, String>;

/// The fundamental type of a metric.
///
/// Two metrics with the same name must agree on their kind; this is what stops a
/// counter and a gauge from silently sharing one collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// A value that only ever increases (e.g., total requests).
    Counter,
    /// A value that can go up or down (e.g., requests in flight).
    Gauge,
    /// Observations counted into cumulative buckets, plus their sum.
    Histogram,
}

impl MetricKind {
    /// Every kind a complete backend must be able to store.
    pub const ALL: [MetricKind; 3] = [MetricKind::Counter, MetricKind::Gauge, MetricKind::Histogram];

    /// Returns the lowercase name used in exposition `# TYPE` lines.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity of one label combination inside a collector.
///
/// Holds the resolved label values ordered by label name, so two bindings that
/// resolve to the same values always map to the same backend regardless of the
/// order in which their labels were supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelKey(Vec<String>);

impl LabelKey {
    /// Resolves the key for `labels` over the declared `required` names.
    ///
    /// Returns `None` when any required name has no value.
    pub fn resolve(required: &BTreeSet<String>, labels: &Labels) -> Option<Self> {
        required
            .iter()
            .map(|name| labels.get(name).cloned())
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }

    /// The label values in canonical order.
    pub fn values(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` for the key of a metric without labels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One exportable value produced during collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// The name of the metric the sample belongs to.
    pub name: String,
    /// Kind-specific suffix appended to the name (`_total`, `_bucket`, ...).
    pub suffix: &'static str,
    /// The exported labels, or `None` when no labels participate at all.
    pub labels: Option<Labels>,
    /// The current value.
    pub value: f64,
}

impl Sample {
    /// Creates a new sample.
    pub fn new(
        name: impl Into<String>,
        suffix: &'static str,
        labels: Option<Labels>,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            suffix,
            labels,
            value,
        }
    }

    /// Returns the metric name with its suffix (e.g., `http_requests_total`).
    pub fn full_name(&self) -> String {
        format!("{}{}", self.name, self.suffix)
    }
}

/// A specialized `Result` type for metric-related operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// An error that can occur within the metrics system.
///
/// None of these are retried; every one is surfaced to the caller of the
/// operation that produced it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    /// A metric name does not match the exposition grammar.
    #[error("invalid metric name: {0:?}")]
    InvalidName(String),
    /// A label name does not match the exposition grammar or uses the reserved prefix.
    #[error("invalid label name: {0:?}")]
    InvalidLabel(String),
    /// Default or bound labels do not agree with the declared required labels.
    #[error("label validation failed: {0}")]
    LabelValidation(String),
    /// An observation was attempted before every required label had a value.
    #[error("metric {name:?} cannot be observed, missing labels: {missing:?}")]
    UnobservableMetric {
        /// The metric that was observed.
        name: String,
        /// The required labels that are still unbound.
        missing: Vec<String>,
    },
    /// A backend identifier is malformed, unknown, or not a complete backend.
    #[error("invalid backend {id:?}: {reason}")]
    InvalidBackend {
        /// The identifier that failed to resolve.
        id: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A counter was incremented by a negative amount.
    #[error("counters can only be incremented by non-negative amounts, got {0}")]
    NegativeIncrement(f64),
    /// A histogram observation that no bucket can hold.
    #[error("cannot observe {0} in a histogram")]
    InvalidObservation(f64),
    /// Histogram bucket boundaries are invalid.
    #[error("invalid histogram buckets: {0}")]
    InvalidBuckets(String),
    /// A metric tried to reuse a collector declared with a different shape.
    #[error("metric {name:?} is already declared differently: {reason}")]
    IncompatibleCollector {
        /// The contested metric name.
        name: String,
        /// The first mismatch found.
        reason: String,
    },
    /// An error originating from the backend storage layer.
    #[error("storage error: {0}")]
    StorageError(String),
    /// Backend configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}
