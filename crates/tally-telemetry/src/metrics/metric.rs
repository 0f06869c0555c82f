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

//! Label binding shared by every metric facade.
//!
//! A [`Metric`] is an immutable view on a [`MetricCollector`] with some labels
//! bound. It can be observed once every required label has a value, from the
//! bound labels or the collector's default labels; binding more labels produces
//! a new view.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use tally_core::{Labels, MetricKind, MetricsError, MetricsResult, Sample};

use crate::metrics::collector::{MetricCollector, MetricDefinition, ValueSlot};
use crate::metrics::registry::{self, CollectorRegistry};

/// A metric with a (possibly partial) label binding.
#[derive(Debug, Clone)]
pub struct Metric {
    collector: Arc<MetricCollector>,
    labels: Labels,
    // Present exactly when every required label is covered.
    slot: Option<Arc<ValueSlot>>,
}

impl Metric {
    /// Binds `labels` on `collector`, resolving the value slot when observable.
    pub fn bind(collector: Arc<MetricCollector>, labels: Labels) -> MetricsResult<Self> {
        check_label_names(collector.name(), collector.required_labels(), &labels)?;

        let mut metric = Self {
            collector,
            labels,
            slot: None,
        };
        if metric.can_observe() {
            let slot = metric.collector.slot(&metric.effective_labels())?;
            metric.slot = Some(slot);
        }
        Ok(metric)
    }

    /// Returns a new metric with `labels` bound on top of the current binding.
    ///
    /// Newly supplied values replace previously bound ones. Every name must be
    /// one of the collector's required labels.
    pub fn labels<I, K, V>(&self, labels: I) -> MetricsResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let mut merged = self.labels.clone();
        merged.extend(
            labels
                .into_iter()
                .map(|(name, value)| (name.into(), value.to_string())),
        );
        Self::bind(self.collector.clone(), merged)
    }

    /// The metric name.
    pub fn name(&self) -> &str {
        self.collector.name()
    }

    /// The metric description.
    pub fn description(&self) -> &str {
        self.collector.description()
    }

    /// The collector shared by every metric with this name.
    pub fn collector(&self) -> &Arc<MetricCollector> {
        &self.collector
    }

    /// Labels bound on this view, without defaults.
    pub fn bound_labels(&self) -> &Labels {
        &self.labels
    }

    /// Default labels overlaid by the bound labels.
    pub fn effective_labels(&self) -> Labels {
        let mut labels = self.collector.default_labels().clone();
        labels.extend(self.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        labels
    }

    /// Returns `true` when every required label has a value.
    pub fn can_observe(&self) -> bool {
        self.collector
            .required_labels()
            .iter()
            .all(|name| {
                self.labels.contains_key(name) || self.collector.default_labels().contains_key(name)
            })
    }

    /// Returns the value slot, or [`MetricsError::UnobservableMetric`].
    pub fn check_can_observe(&self) -> MetricsResult<&Arc<ValueSlot>> {
        self.slot.as_ref().ok_or_else(|| {
            let defaults = self.collector.default_labels();
            MetricsError::UnobservableMetric {
                name: self.name().to_string(),
                missing: self
                    .collector
                    .required_labels()
                    .iter()
                    .filter(|name| {
                        !self.labels.contains_key(*name) && !defaults.contains_key(*name)
                    })
                    .cloned()
                    .collect(),
            }
        })
    }

    /// Labels exported with this metric's samples, `None` when it has no labels.
    pub fn sample_labels(&self) -> Option<Labels> {
        let labels = self.effective_labels();
        (!labels.is_empty()).then_some(labels)
    }

    /// The current scalar value as a sample with the given suffix.
    pub(crate) fn scalar_sample(&self, suffix: &'static str) -> MetricsResult<Sample> {
        let value = self.check_can_observe()?.scalar()?.get()?;
        Ok(Sample::new(self.name(), suffix, self.sample_labels(), value))
    }
}

fn check_label_names(
    metric: &str,
    required: &BTreeSet<String>,
    labels: &Labels,
) -> MetricsResult<()> {
    match labels.keys().find(|name| !required.contains(*name)) {
        Some(name) => Err(MetricsError::LabelValidation(format!(
            "{name:?} is not a required label of {metric}"
        ))),
        None => Ok(()),
    }
}

/// A typed front end over [`Metric`].
pub trait TypedMetric: Sized {
    /// The kind of collector this facade drives.
    const KIND: MetricKind;

    /// Wraps a bound metric.
    fn from_metric(metric: Metric) -> Self;
}

#[derive(Debug, Clone)]
enum Target {
    Default,
    Registry(CollectorRegistry),
    Unregistered,
    Collector(Arc<MetricCollector>),
}

/// Builder for counters, gauges and histograms.
///
/// Without a registry, the metric registers into the current default registry
/// (see [`registry::global`]). A metric whose name is already registered reuses
/// that collector, provided both were declared the same way.
#[derive(Debug, Clone)]
pub struct MetricBuilder<M> {
    pub(crate) definition: MetricDefinition,
    target: Target,
    labels: Labels,
    _metric: PhantomData<fn() -> M>,
}

impl<M: TypedMetric> MetricBuilder<M> {
    pub(crate) fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            definition: MetricDefinition::new(name, description, M::KIND),
            target: Target::Default,
            labels: Labels::new(),
            _metric: PhantomData,
        }
    }

    /// Declares the labels every observation must have values for.
    pub fn required_labels<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definition.required_labels = names.into_iter().map(Into::into).collect();
        self
    }

    /// Pre-fills some of the required labels.
    pub fn default_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.definition.default_labels = labels
            .into_iter()
            .map(|(name, value)| (name.into(), value.to_string()))
            .collect();
        self
    }

    /// Binds labels on the built metric, as [`Metric::labels`] would.
    pub fn labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.labels
            .extend(labels.into_iter().map(|(name, value)| (name.into(), value.to_string())));
        self
    }

    /// Registers into `registry` instead of the default registry.
    pub fn registry(mut self, registry: &CollectorRegistry) -> Self {
        self.target = Target::Registry(registry.clone());
        self
    }

    /// Builds a metric that is not registered anywhere.
    pub fn unregistered(mut self) -> Self {
        self.target = Target::Unregistered;
        self
    }

    /// Reuses an existing collector instead of looking one up by name.
    pub fn collector(mut self, collector: Arc<MetricCollector>) -> Self {
        self.target = Target::Collector(collector);
        self
    }

    /// Validates the declaration, obtains its collector and binds the labels.
    ///
    /// An explicitly supplied collector only has to be of the right kind; its
    /// own declaration replaces the builder's.
    pub fn build(self) -> MetricsResult<M> {
        let (collector, owner) = match self.target {
            Target::Collector(collector) => {
                if collector.kind() != M::KIND {
                    return Err(MetricsError::IncompatibleCollector {
                        name: collector.name().to_string(),
                        reason: format!("declared as {}, not {}", collector.kind(), M::KIND),
                    });
                }
                (collector, None)
            }
            target => {
                check_label_names(
                    &self.definition.name,
                    &self.definition.required_labels,
                    &self.labels,
                )?;
                let definition = self.definition.clone();
                let candidate = MetricCollector::new(self.definition)?;
                let (collector, owner) = match target {
                    Target::Unregistered => (Arc::new(candidate), None),
                    Target::Registry(registry) => {
                        let (collector, inserted) = registry.get_or_insert(candidate);
                        (collector, inserted.then_some(registry))
                    }
                    _ => {
                        let registry = registry::global().registry();
                        let (collector, inserted) = registry.get_or_insert(candidate);
                        (collector, inserted.then_some(registry))
                    }
                };
                if let Some(reason) = collector.definition().mismatch(&definition) {
                    return Err(MetricsError::IncompatibleCollector {
                        name: definition.name,
                        reason,
                    });
                }
                (collector, owner)
            }
        };

        match Metric::bind(collector.clone(), self.labels) {
            Ok(metric) => Ok(M::from_metric(metric)),
            Err(e) => {
                // A collector this call registered must not outlive the failure.
                if let Some(registry) = owner {
                    registry.withdraw(&collector);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::counter::Counter;
    use crate::metrics::gauge::Gauge;

    fn requests(registry: &CollectorRegistry) -> Counter {
        Counter::builder("http_requests", "Handled requests")
            .required_labels(["method", "status"])
            .registry(registry)
            .build()
            .unwrap()
    }

    #[test]
    fn test_partial_labels_cannot_observe() {
        let registry = CollectorRegistry::new();
        let get = requests(&registry).labels([("method", "get")]).unwrap();
        assert!(!get.metric().can_observe());

        let err = get.inc().unwrap_err();
        assert_eq!(
            err,
            MetricsError::UnobservableMetric {
                name: "http_requests".to_string(),
                missing: vec!["status".to_string()],
            }
        );
        assert!(get.metric().collector().is_empty());
    }

    #[test]
    fn test_unobservable_call_leaves_bound_values_alone() {
        let registry = CollectorRegistry::new();
        let counter = requests(&registry);
        let ok = counter
            .labels([("method", "get"), ("status", "200")])
            .unwrap();
        ok.inc().unwrap();

        let partial = counter.labels([("method", "get")]).unwrap();
        assert!(partial.inc().is_err());
        assert!(partial.inc_by(5.0).is_err());

        assert_eq!(ok.get().unwrap(), 1.0);
        assert_eq!(counter.metric().collector().len(), 1);
    }

    #[test]
    fn test_failed_build_does_not_claim_the_name() {
        let registry = CollectorRegistry::new();
        let result = Counter::builder("jobs", "Processed jobs")
            .required_labels(["queue"])
            .labels([("path", "/")])
            .registry(&registry)
            .build();
        assert!(matches!(result, Err(MetricsError::LabelValidation(_))));
        assert!(registry.is_empty());

        let jobs = Counter::builder("jobs", "Processed jobs")
            .required_labels(["queue", "path"])
            .labels([("path", "/")])
            .registry(&registry)
            .build()
            .unwrap();
        assert_eq!(jobs.metric().collector().required_labels().len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_build_keeps_existing_collector() {
        let registry = CollectorRegistry::new();
        let existing = requests(&registry);
        let result = Counter::builder("http_requests", "Handled requests")
            .required_labels(["method", "status"])
            .labels([("path", "/")])
            .registry(&registry)
            .build();
        assert!(result.is_err());
        assert!(Arc::ptr_eq(
            &registry.get("http_requests").unwrap(),
            existing.metric().collector()
        ));
    }

    #[test]
    fn test_withdraw_only_removes_the_same_collector() {
        let registry = CollectorRegistry::new();
        let registered = requests(&registry);
        let lookalike = Arc::new(
            MetricCollector::new(registered.metric().collector().definition().clone()).unwrap(),
        );
        registry.withdraw(&lookalike);
        assert_eq!(registry.len(), 1);
        registry.withdraw(registered.metric().collector());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_labels_compose() {
        let registry = CollectorRegistry::new();
        let counter = requests(&registry);
        let stepwise = counter
            .labels([("method", "get")])
            .unwrap()
            .labels([("status", "200")])
            .unwrap();
        let at_once = counter
            .labels([("status", "200"), ("method", "get")])
            .unwrap();

        stepwise.inc().unwrap();
        at_once.inc().unwrap();
        assert_eq!(stepwise.get().unwrap(), 2.0);
        assert_eq!(registry.collect().count(), 1);
    }

    #[test]
    fn test_labels_leave_original_untouched() {
        let registry = CollectorRegistry::new();
        let counter = requests(&registry);
        let get = counter.labels([("method", "get")]).unwrap();
        assert!(counter.metric().bound_labels().is_empty());
        assert_eq!(get.metric().bound_labels().len(), 1);
    }

    #[test]
    fn test_relabelling_replaces_value() {
        let registry = CollectorRegistry::new();
        let counter = requests(&registry)
            .labels([("method", "get"), ("status", "200")])
            .unwrap();
        let post = counter.labels([("method", "post")]).unwrap();
        assert_eq!(post.metric().bound_labels()["method"], "post");
        assert_eq!(post.metric().bound_labels()["status"], "200");
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let registry = CollectorRegistry::new();
        let result = requests(&registry).labels([("path", "/")]);
        assert!(matches!(result, Err(MetricsError::LabelValidation(_))));
    }

    #[test]
    fn test_label_values_are_stringified() {
        let registry = CollectorRegistry::new();
        let counter = requests(&registry)
            .labels([("method", "get")])
            .unwrap()
            .labels([("status", 404)])
            .unwrap();
        let sample = counter.sample().unwrap();
        assert_eq!(sample.labels.unwrap()["status"], "404");
    }

    #[test]
    fn test_builder_labels_bind_on_build() {
        let registry = CollectorRegistry::new();
        let counter = Counter::builder("http_requests", "Handled requests")
            .required_labels(["method"])
            .labels([("method", "get")])
            .registry(&registry)
            .build()
            .unwrap();
        assert!(counter.metric().can_observe());
    }

    #[test]
    fn test_default_labels_are_overridable() {
        let registry = CollectorRegistry::new();
        let counter = Counter::builder("jobs", "Processed jobs")
            .required_labels(["queue"])
            .default_labels([("queue", "default")])
            .registry(&registry)
            .build()
            .unwrap();
        assert!(counter.metric().can_observe());

        counter.inc().unwrap();
        counter.labels([("queue", "urgent")]).unwrap().inc().unwrap();

        let queues: Vec<_> = registry
            .collect()
            .map(|sample| sample.labels.unwrap()["queue"].clone())
            .collect();
        assert_eq!(queues, ["default", "urgent"]);
    }

    #[test]
    fn test_same_declaration_shares_collector() {
        let registry = CollectorRegistry::new();
        let first = requests(&registry);
        let second = requests(&registry);
        assert!(Arc::ptr_eq(first.metric().collector(), second.metric().collector()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_description_may_differ() {
        let registry = CollectorRegistry::new();
        requests(&registry);
        let other = Counter::builder("http_requests", "Other wording")
            .required_labels(["method", "status"])
            .registry(&registry)
            .build()
            .unwrap();
        assert_eq!(other.metric().description(), "Handled requests");
    }

    #[test]
    fn test_incompatible_declarations_are_rejected() {
        let registry = CollectorRegistry::new();
        requests(&registry);

        let gauge = Gauge::builder("http_requests", "Handled requests")
            .required_labels(["method", "status"])
            .registry(&registry)
            .build();
        assert!(matches!(gauge, Err(MetricsError::IncompatibleCollector { .. })));

        let fewer_labels = Counter::builder("http_requests", "Handled requests")
            .required_labels(["method"])
            .registry(&registry)
            .build();
        assert!(matches!(
            fewer_labels,
            Err(MetricsError::IncompatibleCollector { .. })
        ));
    }

    #[test]
    fn test_unregistered_metric_is_not_collected() {
        let registry = CollectorRegistry::new();
        let counter = Counter::builder("jobs", "Processed jobs")
            .unregistered()
            .build()
            .unwrap();
        counter.inc().unwrap();
        assert!(registry.is_empty());
        assert_eq!(counter.get().unwrap(), 1.0);
    }

    #[test]
    fn test_explicit_collector_is_shared() {
        let registry = CollectorRegistry::new();
        let first = requests(&registry);
        let second = Counter::builder("ignored", "Ignored")
            .collector(first.metric().collector().clone())
            .labels([("method", "get"), ("status", "200")])
            .build()
            .unwrap();
        second.inc().unwrap();
        assert_eq!(second.metric().name(), "http_requests");
        assert_eq!(registry.collect().count(), 1);
    }

    #[test]
    fn test_explicit_collector_of_other_kind_is_rejected() {
        let registry = CollectorRegistry::new();
        let counter = requests(&registry);
        let result = Gauge::builder("http_requests", "Handled requests")
            .collector(counter.metric().collector().clone())
            .build();
        assert!(matches!(result, Err(MetricsError::IncompatibleCollector { .. })));
    }
}
