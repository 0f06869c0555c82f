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

//! Configuration handed to value backends.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::metrics::{MetricsError, MetricsResult};

/// Free-form backend configuration.
///
/// The metrics system never interprets the options itself; they are passed to
/// the backend's one-time initialization hook and to every backend it creates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendConfig {
    options: Map<String, Value>,
}

impl BackendConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON object string
    pub fn from_json(json: &str) -> MetricsResult<Self> {
        serde_json::from_str(json).map_err(|e| MetricsError::Config(e.to_string()))
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> MetricsResult<Self> {
        let path = path.as_ref();
        log::debug!("Loading backend configuration from {}", path.display());
        let content = std::fs::read_to_string(path)
            .map_err(|e| MetricsError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> MetricsResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| MetricsError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), json).map_err(|e| MetricsError::Config(e.to_string()))
    }

    /// Adds an option, returning the updated configuration.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Raw access to an option.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Returns a string option.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Returns a numeric option.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Returns a boolean option.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Returns `true` if no options are set.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}
