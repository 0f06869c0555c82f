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

//! Backend plugin table and the process-wide backend selection.
//!
//! Backends register themselves with [`inventory::submit!`] under a
//! fully-qualified identifier (`namespace::Name`). Exactly one registration is
//! active at a time; every value storage slot created afterwards is built by it.
//! Switching the active backend does not migrate values already stored by the
//! previous one.

use std::env;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tally_core::{Backend, BackendConfig, BackendSpec, MetricKind, MetricsError, MetricsResult};

/// Environment variable naming the backend to activate when none is given explicitly.
pub const BACKEND_ENV: &str = "TALLY_BACKEND";

/// Environment variable pointing at a JSON file with the backend configuration.
pub const BACKEND_CONFIG_ENV: &str = "TALLY_BACKEND_CONFIG";

/// Identifier of the built-in in-process backend.
pub const DEFAULT_BACKEND: &str = "tally::SingleProcessBackend";

/// Every kind a backend has to support to be accepted.
pub const ALL_KINDS: &[MetricKind] = &MetricKind::ALL;

/// Constructor stored in the plugin table.
pub type CreateFn = fn(&BackendConfig, &BackendSpec) -> MetricsResult<Box<dyn Backend>>;

/// One-time initialization hook stored in the plugin table.
pub type InitializeFn = fn(&BackendConfig) -> MetricsResult<()>;

/// An entry in the backend plugin table.
///
/// ```ignore
/// inventory::submit! {
///     BackendRegistration::new("myapp::RedisBackend", RedisBackend::create)
///         .with_initialize(RedisBackend::initialize)
/// }
/// ```
pub struct BackendRegistration {
    /// Fully-qualified identifier, `namespace::Name`.
    pub id: &'static str,
    /// Metric kinds this backend can store.
    pub kinds: &'static [MetricKind],
    /// Called once per process, the first time this backend is loaded.
    pub initialize: InitializeFn,
    /// Builds one backend instance.
    pub create: CreateFn,
}

fn no_initialize(_config: &BackendConfig) -> MetricsResult<()> {
    Ok(())
}

impl BackendRegistration {
    /// Creates a registration supporting every metric kind, without an initialization hook.
    pub const fn new(id: &'static str, create: CreateFn) -> Self {
        Self {
            id,
            kinds: ALL_KINDS,
            initialize: no_initialize,
            create,
        }
    }

    /// Sets the one-time initialization hook.
    pub const fn with_initialize(self, initialize: InitializeFn) -> Self {
        Self { initialize, ..self }
    }

    /// Restricts the metric kinds this backend declares support for.
    pub const fn with_kinds(self, kinds: &'static [MetricKind]) -> Self {
        Self { kinds, ..self }
    }

    /// The part of the identifier before the last `::`.
    pub fn namespace(&self) -> &'static str {
        self.id.rsplit_once("::").map_or("", |(namespace, _)| namespace)
    }

    /// The part of the identifier after the last `::`.
    pub fn name(&self) -> &'static str {
        self.id.rsplit_once("::").map_or(self.id, |(_, name)| name)
    }
}

impl fmt::Debug for BackendRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistration")
            .field("id", &self.id)
            .field("kinds", &self.kinds)
            .finish()
    }
}

inventory::collect!(BackendRegistration);

/// The backend every new value slot is created with.
#[derive(Debug, Clone)]
pub struct ActiveBackend {
    registration: &'static BackendRegistration,
    config: Arc<BackendConfig>,
}

impl ActiveBackend {
    /// Identifier of the active registration.
    pub fn id(&self) -> &'static str {
        self.registration.id
    }

    /// Configuration the backend was loaded with.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Builds a backend instance for `spec`.
    pub fn create(&self, spec: &BackendSpec) -> MetricsResult<Box<dyn Backend>> {
        (self.registration.create)(&self.config, spec)
    }
}

static ACTIVE: RwLock<Option<ActiveBackend>> = RwLock::new(None);

// Ids whose initialization hook already ran. Doubles as the load lock: held for
// the whole load so that concurrent loads never run a hook twice.
static INITIALIZED: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

fn invalid(id: &str, reason: impl Into<String>) -> MetricsError {
    MetricsError::InvalidBackend {
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Resolves a backend identifier against the plugin table.
///
/// Fails when the identifier is malformed, when nothing is registered in its
/// namespace, when the namespace has no such backend, or when the backend does
/// not support every metric kind.
pub fn import_backend(id: &str) -> MetricsResult<&'static BackendRegistration> {
    let Some((namespace, name)) = id.rsplit_once("::") else {
        return Err(invalid(id, "expected a path of the form `namespace::Name`"));
    };
    if !id.split("::").all(is_valid_segment) {
        return Err(invalid(id, "malformed backend path"));
    }

    let mut in_namespace = IntoIterator::into_iter(inventory::iter::<BackendRegistration>)
        .filter(|registration| registration.namespace() == namespace)
        .peekable();
    if in_namespace.peek().is_none() {
        return Err(invalid(id, format!("no backends registered under `{namespace}`")));
    }
    let registration = in_namespace
        .find(|registration| registration.name() == name)
        .ok_or_else(|| invalid(id, format!("`{namespace}` has no backend named `{name}`")))?;

    let missing: Vec<&str> = ALL_KINDS
        .iter()
        .filter(|kind| !registration.kinds.contains(kind))
        .map(|kind| kind.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(invalid(
            id,
            format!("not a complete backend, cannot store: {}", missing.join(", ")),
        ));
    }

    Ok(registration)
}

/// Selects and initializes the process-wide backend.
///
/// The backend is `backend` when given, else the one named by [`BACKEND_ENV`],
/// else [`DEFAULT_BACKEND`]. The configuration is `config` when given, else the
/// JSON file named by [`BACKEND_CONFIG_ENV`], else empty. The registration's
/// initialization hook runs only the first time that registration is loaded.
pub fn load_backend(
    backend: Option<&str>,
    config: Option<BackendConfig>,
) -> MetricsResult<ActiveBackend> {
    let mut initialized = INITIALIZED.lock().unwrap_or_else(PoisonError::into_inner);
    load_locked(&mut initialized, backend, config)
}

// Runs with the load lock held, so loads and lazy default selection never interleave.
fn load_locked(
    initialized: &mut Vec<&'static str>,
    backend: Option<&str>,
    config: Option<BackendConfig>,
) -> MetricsResult<ActiveBackend> {
    let id = match backend {
        Some(id) => id.to_string(),
        None => env::var(BACKEND_ENV)
            .ok()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
    };
    let config = match config {
        Some(config) => config,
        None => match env::var(BACKEND_CONFIG_ENV) {
            Ok(path) if !path.is_empty() => BackendConfig::from_file(path)?,
            _ => BackendConfig::default(),
        },
    };

    let registration = import_backend(&id)?;
    if !initialized.contains(&registration.id) {
        (registration.initialize)(&config)?;
        initialized.push(registration.id);
    }

    let active = ActiveBackend {
        registration,
        config: Arc::new(config),
    };
    *ACTIVE.write().unwrap_or_else(PoisonError::into_inner) = Some(active.clone());

    log::info!("Loaded metrics backend {}", registration.id);
    Ok(active)
}

fn current() -> Option<ActiveBackend> {
    ACTIVE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Returns the active backend, loading the default selection on first use.
///
/// A load already in progress on another thread is waited for and wins over
/// the default.
pub fn active_backend() -> MetricsResult<ActiveBackend> {
    if let Some(active) = current() {
        return Ok(active);
    }
    let mut initialized = INITIALIZED.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(active) = current() {
        return Ok(active);
    }
    load_locked(&mut initialized, None, None)
}

/// Builds a backend instance for `spec` with the active backend.
pub fn create_backend(spec: &BackendSpec) -> MetricsResult<Box<dyn Backend>> {
    active_backend()?.create(spec)
}
