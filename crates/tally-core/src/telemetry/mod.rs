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

//! Provides the foundational traits and data structures for application metrics.
//!
//! This module defines the "common language" of the metrics system. It holds
//! the abstract "what" (kinds, labels, samples, the storage contract), while
//! `tally-telemetry` provides the collectors, the registry and the concrete
//! backends.

pub mod backend;
pub mod config;
pub mod metrics;
pub mod names;

pub use self::backend::{Backend, BackendSpec};
pub use self::config::BackendConfig;
pub use self::metrics::{LabelKey, Labels, MetricKind, MetricsError, MetricsResult, Sample};
