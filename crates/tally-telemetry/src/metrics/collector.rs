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

//! Per-metric value storage keyed by label combination.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tally_core::telemetry::names;
use tally_core::{
    Backend, BackendSpec, LabelKey, Labels, MetricKind, MetricsError, MetricsResult, Sample,
};

use crate::storage::backend::active_backend;
use crate::storage::histogram_backend::HistogramBackend;

/// Label name carrying the bucket bound of histogram samples.
pub const BUCKET_LABEL: &str = "le";

/// The declared shape of a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    /// Unique metric name.
    pub name: String,
    /// Human-readable help text.
    pub description: String,
    /// Metric kind.
    pub kind: MetricKind,
    /// Label names every observation must have values for.
    pub required_labels: BTreeSet<String>,
    /// Values pre-filling some of the required labels.
    pub default_labels: Labels,
    /// Bucket upper bounds, histograms only.
    pub buckets: Vec<f64>,
}

impl MetricDefinition {
    /// Creates a definition without labels or buckets.
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required_labels: BTreeSet::new(),
            default_labels: Labels::new(),
            buckets: Vec::new(),
        }
    }

    /// Checks names and the relationship between required and default labels.
    pub fn validate(&self) -> MetricsResult<()> {
        names::check_name(&self.name)?;
        names::check_labels(self.required_labels.iter().map(String::as_str))?;

        if !self.default_labels.is_empty() && self.required_labels.is_empty() {
            return Err(MetricsError::LabelValidation(
                "default labels given without required labels".to_string(),
            ));
        }
        if let Some(extra) = self
            .default_labels
            .keys()
            .find(|name| !self.required_labels.contains(*name))
        {
            return Err(MetricsError::LabelValidation(format!(
                "default label {extra:?} is not a required label"
            )));
        }
        if self.kind == MetricKind::Histogram && self.required_labels.contains(BUCKET_LABEL) {
            return Err(MetricsError::LabelValidation(format!(
                "{BUCKET_LABEL:?} is reserved for histogram buckets"
            )));
        }
        match self.kind {
            MetricKind::Histogram => {
                if normalize_buckets(self.buckets.iter().copied())? != self.buckets {
                    return Err(MetricsError::InvalidBuckets(
                        "the last bucket must be +Inf".to_string(),
                    ));
                }
            }
            _ if !self.buckets.is_empty() => {
                return Err(MetricsError::InvalidBuckets(format!(
                    "only histograms have buckets, not {}",
                    self.kind
                )));
            }
            _ => {}
        }
        Ok(())
    }

    /// Returns why `other` cannot share a collector with `self`, if it cannot.
    ///
    /// Descriptions are allowed to differ.
    pub fn mismatch(&self, other: &MetricDefinition) -> Option<String> {
        if self.kind != other.kind {
            Some(format!("declared as {}, not {}", self.kind, other.kind))
        } else if self.required_labels != other.required_labels {
            Some(format!(
                "required labels are {:?}, not {:?}",
                self.required_labels, other.required_labels
            ))
        } else if self.default_labels != other.default_labels {
            Some(format!(
                "default labels are {:?}, not {:?}",
                self.default_labels, other.default_labels
            ))
        } else if self.buckets != other.buckets {
            Some(format!("buckets are {:?}, not {:?}", self.buckets, other.buckets))
        } else {
            None
        }
    }
}

/// The stored value behind one label combination.
#[derive(Debug)]
pub enum SlotValue {
    /// Counter or gauge value.
    Scalar(Box<dyn Backend>),
    /// Histogram buckets and sum.
    Histogram(HistogramBackend),
}

/// One label combination of a metric and its storage.
#[derive(Debug)]
pub struct ValueSlot {
    labels: Labels,
    value: SlotValue,
}

impl ValueSlot {
    /// Fully resolved labels of this combination.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// The stored value.
    pub fn value(&self) -> &SlotValue {
        &self.value
    }

    /// The scalar backend, for counters and gauges.
    pub fn scalar(&self) -> MetricsResult<&dyn Backend> {
        match &self.value {
            SlotValue::Scalar(backend) => Ok(backend.as_ref()),
            SlotValue::Histogram(_) => Err(MetricsError::StorageError(
                "histogram slot used as a scalar".to_string(),
            )),
        }
    }

    /// The histogram storage, for histograms.
    pub fn histogram(&self) -> MetricsResult<&HistogramBackend> {
        match &self.value {
            SlotValue::Histogram(histogram) => Ok(histogram),
            SlotValue::Scalar(_) => Err(MetricsError::StorageError(
                "scalar slot used as a histogram".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default)]
struct Slots {
    // Creation order, which is also collection order.
    ordered: Vec<Arc<ValueSlot>>,
    index: HashMap<LabelKey, usize>,
}

/// Owns every value of one named metric, one slot per label combination.
#[derive(Debug)]
pub struct MetricCollector {
    definition: MetricDefinition,
    slots: Mutex<Slots>,
}

impl MetricCollector {
    /// Validates `definition` and creates an empty collector for it.
    pub fn new(definition: MetricDefinition) -> MetricsResult<Self> {
        definition.validate()?;
        Ok(Self {
            definition,
            slots: Mutex::new(Slots::default()),
        })
    }

    /// The metric name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// The metric description.
    pub fn description(&self) -> &str {
        &self.definition.description
    }

    /// The metric kind.
    pub fn kind(&self) -> MetricKind {
        self.definition.kind
    }

    /// The declared required labels.
    pub fn required_labels(&self) -> &BTreeSet<String> {
        &self.definition.required_labels
    }

    /// The declared default labels.
    pub fn default_labels(&self) -> &Labels {
        &self.definition.default_labels
    }

    /// Histogram bucket bounds; empty for other kinds.
    pub fn buckets(&self) -> &[f64] {
        &self.definition.buckets
    }

    /// The full declaration.
    pub fn definition(&self) -> &MetricDefinition {
        &self.definition
    }

    /// Number of label combinations holding a value.
    pub fn len(&self) -> usize {
        self.lock_slots().ordered.len()
    }

    /// Returns `true` if no label combination holds a value yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the slot for a fully resolved label mapping, creating it on first use.
    pub fn slot(&self, labels: &Labels) -> MetricsResult<Arc<ValueSlot>> {
        let key = LabelKey::resolve(&self.definition.required_labels, labels).ok_or_else(|| {
            MetricsError::UnobservableMetric {
                name: self.definition.name.clone(),
                missing: self
                    .definition
                    .required_labels
                    .iter()
                    .filter(|name| !labels.contains_key(*name))
                    .cloned()
                    .collect(),
            }
        })?;

        let mut slots = self.lock_slots();
        if let Some(&position) = slots.index.get(&key) {
            return Ok(slots.ordered[position].clone());
        }

        let labels: Labels = labels
            .iter()
            .filter(|(name, _)| self.definition.required_labels.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let slot = Arc::new(ValueSlot {
            value: self.create_value()?,
            labels,
        });
        log::trace!(
            "Allocated {} value for {}{:?}",
            self.definition.kind,
            self.definition.name,
            key.values()
        );

        let position = slots.ordered.len();
        slots.ordered.push(slot.clone());
        slots.index.insert(key, position);
        Ok(slot)
    }

    fn create_value(&self) -> MetricsResult<SlotValue> {
        let active = active_backend()?;
        let name = &self.definition.name;
        Ok(match self.definition.kind {
            MetricKind::Histogram => {
                SlotValue::Histogram(HistogramBackend::new(name, &self.definition.buckets, &active)?)
            }
            kind => SlotValue::Scalar(active.create(&BackendSpec::new(name.as_str(), kind))?),
        })
    }

    /// Produces the current samples, in label-combination creation order.
    ///
    /// Values that cannot be read are logged and skipped.
    pub fn collect(&self) -> Vec<Sample> {
        let slots = self.lock_slots().ordered.clone();
        let mut samples = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Err(e) = self.collect_slot(&slot, &mut samples) {
                log::warn!("Skipping unreadable value of {}: {}", self.definition.name, e);
            }
        }
        samples
    }

    fn exported_labels(&self, slot: &ValueSlot) -> Option<Labels> {
        (!slot.labels.is_empty()).then(|| slot.labels.clone())
    }

    pub(crate) fn collect_slot(&self, slot: &ValueSlot, samples: &mut Vec<Sample>) -> MetricsResult<()> {
        let name = &self.definition.name;
        match &slot.value {
            SlotValue::Scalar(backend) => {
                let suffix = match self.definition.kind {
                    MetricKind::Counter => "_total",
                    _ => "",
                };
                samples.push(Sample::new(
                    name.as_str(),
                    suffix,
                    self.exported_labels(slot),
                    backend.get()?,
                ));
            }
            SlotValue::Histogram(histogram) => {
                let snapshot = histogram.snapshot()?;
                for (bound, count) in &snapshot.buckets {
                    let mut labels = slot.labels.clone();
                    labels.insert(BUCKET_LABEL.to_string(), format_bound(*bound));
                    samples.push(Sample::new(name.as_str(), "_bucket", Some(labels), *count));
                }
                let labels = self.exported_labels(slot);
                samples.push(Sample::new(name.as_str(), "_sum", labels.clone(), snapshot.sum));
                samples.push(Sample::new(name.as_str(), "_count", labels, snapshot.count));
            }
        }
        Ok(())
    }
}

/// Validates bucket bounds and appends `+Inf` when it is missing.
pub fn normalize_buckets(bounds: impl IntoIterator<Item = f64>) -> MetricsResult<Vec<f64>> {
    let mut bounds: Vec<f64> = bounds.into_iter().collect();
    if bounds.is_empty() {
        return Err(MetricsError::InvalidBuckets(
            "at least one bucket is required".to_string(),
        ));
    }
    if bounds.iter().any(|bound| bound.is_nan()) {
        return Err(MetricsError::InvalidBuckets("NaN is not a bucket bound".to_string()));
    }
    if bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(MetricsError::InvalidBuckets(format!(
            "bounds must be strictly increasing: {bounds:?}"
        )));
    }
    if bounds.last() != Some(&f64::INFINITY) {
        bounds.push(f64::INFINITY);
    }
    Ok(bounds)
}

/// Formats a bucket bound the way exposition `le` labels expect.
pub fn format_bound(bound: f64) -> String {
    if bound == f64::INFINITY {
        "+Inf".to_string()
    } else if bound.fract() == 0.0 {
        format!("{bound:.1}")
    } else {
        bound.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn definition(required: &[&str]) -> MetricDefinition {
        let mut definition = MetricDefinition::new("name", "desc", MetricKind::Counter);
        definition.required_labels = required.iter().map(|s| s.to_string()).collect();
        definition
    }

    #[test]
    fn test_collector_rejects_invalid_names() {
        for name in ["invalid.name", "µspecialcharacter", "http_req@st_total", "http{request}"] {
            let result = MetricCollector::new(MetricDefinition::new(name, "desc", MetricKind::Counter));
            assert!(matches!(result, Err(MetricsError::InvalidName(_))), "{name}");
        }
    }

    #[test]
    fn test_collector_rejects_invalid_labels() {
        for label in ["__private", "microµ", "@type"] {
            let result = MetricCollector::new(definition(&[label]));
            assert!(matches!(result, Err(MetricsError::InvalidLabel(_))), "{label}");
        }
        assert!(MetricCollector::new(definition(&["action", "method", "_type"])).is_ok());
    }

    #[test]
    fn test_default_labels_require_required_labels() {
        let mut without_required = definition(&[]);
        without_required.default_labels = labels(&[("bob", "bobvalue")]);
        assert!(matches!(
            MetricCollector::new(without_required),
            Err(MetricsError::LabelValidation(_))
        ));

        let mut outside_required = definition(&["bob"]);
        outside_required.default_labels = labels(&[("bobby", "bobbyvalue")]);
        assert!(matches!(
            MetricCollector::new(outside_required),
            Err(MetricsError::LabelValidation(_))
        ));

        let mut subset = definition(&["bob", "bobby"]);
        subset.default_labels = labels(&[("bob", "bobvalue")]);
        let collector = MetricCollector::new(subset).unwrap();
        assert_eq!(collector.default_labels(), &labels(&[("bob", "bobvalue")]));
    }

    #[test]
    fn test_histogram_reserves_bucket_label() {
        let mut histogram = MetricDefinition::new("latency", "desc", MetricKind::Histogram);
        histogram.required_labels.insert("le".to_string());
        assert!(matches!(
            MetricCollector::new(histogram),
            Err(MetricsError::LabelValidation(_))
        ));
    }

    #[test]
    fn test_slot_is_shared_per_label_combination() {
        let collector = MetricCollector::new(definition(&["a", "b"])).unwrap();

        let first = collector.slot(&labels(&[("a", "1"), ("b", "2")])).unwrap();
        let second = collector.slot(&labels(&[("b", "2"), ("a", "1")])).unwrap();
        let other = collector.slot(&labels(&[("a", "7"), ("b", "8")])).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(collector.len(), 2);
    }

    #[test]
    fn test_slot_with_missing_labels_fails() {
        let collector = MetricCollector::new(definition(&["a", "b"])).unwrap();

        let err = collector.slot(&labels(&[("a", "6")])).unwrap_err();
        assert_eq!(
            err,
            MetricsError::UnobservableMetric {
                name: "name".to_string(),
                missing: vec!["b".to_string()],
            }
        );
        assert!(collector.is_empty());
    }

    #[test]
    fn test_collect_follows_creation_order() {
        let collector = MetricCollector::new(definition(&["method"])).unwrap();
        collector.slot(&labels(&[("method", "post")])).unwrap();
        collector.slot(&labels(&[("method", "get")])).unwrap();

        let samples = collector.collect();
        let methods: Vec<&str> = samples
            .iter()
            .map(|s| s.labels.as_ref().unwrap()["method"].as_str())
            .collect();
        assert_eq!(methods, vec!["post", "get"]);
        assert!(samples.iter().all(|s| s.suffix == "_total"));
    }

    #[test]
    fn test_collect_without_labels_has_no_label_map() {
        let collector = MetricCollector::new(MetricDefinition::new("up", "desc", MetricKind::Gauge)).unwrap();
        collector.slot(&Labels::new()).unwrap().scalar().unwrap().set(1.0).unwrap();

        assert_eq!(collector.collect(), vec![Sample::new("up", "", None, 1.0)]);
    }

    #[test]
    fn test_collect_histogram() {
        let mut definition = MetricDefinition::new("latency", "desc", MetricKind::Histogram);
        definition.buckets = vec![0.5, 1.0, f64::INFINITY];
        let collector = MetricCollector::new(definition).unwrap();

        let slot = collector.slot(&Labels::new()).unwrap();
        slot.histogram().unwrap().observe(0.7).unwrap();

        let samples = collector.collect();
        let rendered: Vec<(String, Option<String>, f64)> = samples
            .iter()
            .map(|s| {
                (
                    s.full_name(),
                    s.labels.as_ref().map(|l| l["le"].clone()),
                    s.value,
                )
            })
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("latency_bucket".to_string(), Some("0.5".to_string()), 0.0),
                ("latency_bucket".to_string(), Some("1.0".to_string()), 1.0),
                ("latency_bucket".to_string(), Some("+Inf".to_string()), 1.0),
                ("latency_sum".to_string(), None, 0.7),
                ("latency_count".to_string(), None, 1.0),
            ]
        );
    }

    #[test]
    fn test_normalize_buckets() {
        assert_eq!(
            normalize_buckets([0.1, 1.0]).unwrap(),
            vec![0.1, 1.0, f64::INFINITY]
        );
        assert_eq!(
            normalize_buckets([1.0, f64::INFINITY]).unwrap(),
            vec![1.0, f64::INFINITY]
        );
        for invalid in [vec![], vec![1.0, 1.0], vec![2.0, 1.0], vec![f64::NAN]] {
            assert!(matches!(
                normalize_buckets(invalid),
                Err(MetricsError::InvalidBuckets(_))
            ));
        }
    }

    #[test]
    fn test_only_histograms_have_buckets() {
        let mut counter = definition(&[]);
        counter.buckets = vec![1.0, f64::INFINITY];
        assert!(matches!(
            MetricCollector::new(counter),
            Err(MetricsError::InvalidBuckets(_))
        ));
    }

    #[test]
    fn test_format_bound() {
        assert_eq!(format_bound(0.005), "0.005");
        assert_eq!(format_bound(10.0), "10.0");
        assert_eq!(format_bound(f64::INFINITY), "+Inf");
    }

    #[test]
    fn test_definition_mismatch() {
        let counter = definition(&["a"]);
        let mut gauge = counter.clone();
        gauge.kind = MetricKind::Gauge;
        let mut relabelled = counter.clone();
        relabelled.required_labels.insert("b".to_string());
        let mut redescribed = counter.clone();
        redescribed.description = "other".to_string();

        assert!(counter.mismatch(&gauge).is_some());
        assert!(counter.mismatch(&relabelled).is_some());
        assert!(counter.mismatch(&redescribed).is_none());
    }
}
