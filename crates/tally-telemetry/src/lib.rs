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

//! Metric collection service.
//!
//! Declares counters, gauges and histograms, stores their values through a
//! pluggable backend and gathers them as samples from a collector registry.

#![warn(missing_docs)]

pub mod metrics;
pub mod storage;
pub mod utils;

pub use metrics::collector::{MetricCollector, MetricDefinition};
pub use metrics::counter::Counter;
pub use metrics::gauge::Gauge;
pub use metrics::histogram::{Histogram, DEFAULT_BUCKETS};
pub use metrics::metric::{Metric, MetricBuilder, TypedMetric};
pub use metrics::registry::{global, CollectorRegistry, RegistryProxy};
pub use storage::backend::{active_backend, create_backend, load_backend, BackendRegistration};
pub use storage::histogram_backend::HistogramSnapshot;
pub use storage::memory_backend::SingleProcessBackend;
pub use utils::timer::{InProgressGuard, ScopedMetricTimer};
