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

//! Registry of metric collectors.

use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, RwLock};

use tally_core::Sample;

use crate::metrics::collector::MetricCollector;

/// A thread-safe registry of metric collectors, unique by name.
///
/// Cloning yields another handle to the same registry. Collectors are kept in
/// registration order, which is also the order of [`collect`](Self::collect).
#[derive(Debug, Clone, Default)]
pub struct CollectorRegistry {
    collectors: Arc<Mutex<Vec<Arc<MetricCollector>>>>,
}

impl CollectorRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<MetricCollector>>> {
        self.collectors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a collector. The first collector registered under a name wins;
    /// registering another one with the same name does nothing.
    pub fn register(&self, collector: Arc<MetricCollector>) {
        let mut collectors = self.lock();
        if collectors.iter().any(|c| c.name() == collector.name()) {
            log::debug!("Collector {} already registered, ignoring", collector.name());
            return;
        }
        log::debug!("Registered collector {}", collector.name());
        collectors.push(collector);
    }

    /// Removes the collector registered under `collector`'s name, if any.
    pub fn unregister(&self, collector: &MetricCollector) {
        let mut collectors = self.lock();
        let before = collectors.len();
        collectors.retain(|c| c.name() != collector.name());
        if collectors.len() != before {
            log::debug!("Unregistered collector {}", collector.name());
        }
    }

    /// Returns the collector registered under `name`, or registers `collector`
    /// and returns it. Lookup and insertion happen under one lock, so racing
    /// callers all receive the same collector.
    pub fn get_or_register(&self, collector: MetricCollector) -> Arc<MetricCollector> {
        self.get_or_insert(collector).0
    }

    /// Like [`get_or_register`](Self::get_or_register), also telling whether
    /// `collector` was the one inserted.
    pub(crate) fn get_or_insert(&self, collector: MetricCollector) -> (Arc<MetricCollector>, bool) {
        let mut collectors = self.lock();
        if let Some(existing) = collectors.iter().find(|c| c.name() == collector.name()) {
            return (existing.clone(), false);
        }
        log::debug!("Registered collector {}", collector.name());
        let collector = Arc::new(collector);
        collectors.push(collector.clone());
        (collector, true)
    }

    /// Removes this exact collector, leaving a same-named replacement alone.
    pub(crate) fn withdraw(&self, collector: &Arc<MetricCollector>) {
        let mut collectors = self.lock();
        let before = collectors.len();
        collectors.retain(|c| !Arc::ptr_eq(c, collector));
        if collectors.len() != before {
            log::debug!("Withdrew collector {}", collector.name());
        }
    }

    /// Returns the collector registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<MetricCollector>> {
        self.lock().iter().find(|c| c.name() == name).cloned()
    }

    /// Returns the registered collectors, in registration order.
    pub fn collectors(&self) -> Vec<Arc<MetricCollector>> {
        self.lock().clone()
    }

    /// Number of registered collectors.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns `true` if both handles point at the same registry.
    pub fn ptr_eq(&self, other: &CollectorRegistry) -> bool {
        Arc::ptr_eq(&self.collectors, &other.collectors)
    }

    /// Lazily yields the samples of every registered collector.
    ///
    /// The set of collectors is captured when this is called; the registry lock
    /// is not held while samples are produced.
    pub fn collect(&self) -> impl Iterator<Item = Sample> {
        self.collectors()
            .into_iter()
            .flat_map(|collector| collector.collect())
    }
}

/// Holder of the default registry that metrics register into.
///
/// Swapping the registry is an explicit call; metrics constructed before the
/// swap stay in the registry they were built against.
#[derive(Debug, Default)]
pub struct RegistryProxy {
    registry: RwLock<CollectorRegistry>,
}

impl RegistryProxy {
    /// Creates a proxy over `registry`.
    pub fn new(registry: CollectorRegistry) -> Self {
        Self {
            registry: RwLock::new(registry),
        }
    }

    /// Returns a handle to the current registry.
    pub fn registry(&self) -> CollectorRegistry {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current registry, returning the previous one.
    pub fn set_registry(&self, registry: CollectorRegistry) -> CollectorRegistry {
        log::info!("Replacing the default metrics registry");
        let mut current = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, registry)
    }

    /// Registers into the current registry.
    pub fn register(&self, collector: Arc<MetricCollector>) {
        self.registry().register(collector);
    }

    /// Unregisters from the current registry.
    pub fn unregister(&self, collector: &MetricCollector) {
        self.registry().unregister(collector);
    }

    /// Collects from the current registry.
    pub fn collect(&self) -> impl Iterator<Item = Sample> {
        self.registry().collect()
    }
}

static DEFAULT_REGISTRY: LazyLock<RegistryProxy> = LazyLock::new(RegistryProxy::default);

/// The process-wide registry proxy used by metrics built without an explicit registry.
pub fn global() -> &'static RegistryProxy {
    &DEFAULT_REGISTRY
}
