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

//! Metric and label name grammar.

use std::sync::LazyLock;

use regex::Regex;

use super::metrics::{MetricsError, MetricsResult};

static METRIC_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("metric name pattern"));

static LABEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("label name pattern"));

/// Prefix reserved for labels generated by the metrics system itself.
pub const RESERVED_LABEL_PREFIX: &str = "__";

/// Returns `true` if `name` is a valid metric name.
pub fn validate_name(name: &str) -> bool {
    METRIC_NAME.is_match(name)
}

/// Returns `true` if `name` is a valid, non-reserved label name.
pub fn validate_label(name: &str) -> bool {
    LABEL_NAME.is_match(name) && !name.starts_with(RESERVED_LABEL_PREFIX)
}

/// Fails with [`MetricsError::InvalidName`] unless `name` is a valid metric name.
pub fn check_name(name: &str) -> MetricsResult<()> {
    if validate_name(name) {
        Ok(())
    } else {
        Err(MetricsError::InvalidName(name.to_string()))
    }
}

/// Fails with [`MetricsError::InvalidLabel`] on the first invalid label name.
pub fn check_labels<'a>(names: impl IntoIterator<Item = &'a str>) -> MetricsResult<()> {
    for name in names {
        if !validate_label(name) {
            return Err(MetricsError::InvalidLabel(name.to_string()));
        }
    }
    Ok(())
}
