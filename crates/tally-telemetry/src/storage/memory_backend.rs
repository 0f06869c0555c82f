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

use std::sync::{Mutex, MutexGuard};

use tally_core::{Backend, BackendConfig, BackendSpec, MetricKind, MetricsError, MetricsResult};

use crate::storage::backend::{BackendRegistration, DEFAULT_BACKEND};

/// In-process value backend: one `f64` behind a mutex.
///
/// Every operation takes the lock, so operations on one instance are
/// linearizable while distinct label combinations never contend.
#[derive(Debug)]
pub struct SingleProcessBackend {
    kind: MetricKind,
    value: Mutex<f64>,
}

impl SingleProcessBackend {
    /// Create a new backend storing a value of the given kind, starting at zero
    pub fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            value: Mutex::new(0.0),
        }
    }

    /// Constructor used by the plugin table.
    pub fn create(_config: &BackendConfig, spec: &BackendSpec) -> MetricsResult<Box<dyn Backend>> {
        Ok(Box::new(Self::new(spec.kind)))
    }

    /// The kind of value this backend stores.
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    fn lock(&self) -> MetricsResult<MutexGuard<'_, f64>> {
        self.value
            .lock()
            .map_err(|_| MetricsError::StorageError("Failed to acquire value lock".to_string()))
    }
}

inventory::submit! {
    BackendRegistration::new(DEFAULT_BACKEND, SingleProcessBackend::create)
}

impl Backend for SingleProcessBackend {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn inc(&self, amount: f64) -> MetricsResult<()> {
        if self.kind == MetricKind::Counter && amount < 0.0 {
            return Err(MetricsError::NegativeIncrement(amount));
        }
        *self.lock()? += amount;
        Ok(())
    }

    fn dec(&self, amount: f64) -> MetricsResult<()> {
        *self.lock()? -= amount;
        Ok(())
    }

    fn set(&self, value: f64) -> MetricsResult<()> {
        *self.lock()? = value;
        Ok(())
    }

    fn get(&self) -> MetricsResult<f64> {
        Ok(*self.lock()?)
    }
}
