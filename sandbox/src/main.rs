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

// Tally Sandbox
// Records a few metrics and prints them in the text exposition format

use std::fmt::Write;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tally_core::{Labels, Sample};
use tally_telemetry::{load_backend, CollectorRegistry, Counter, Gauge, Histogram};

fn format_labels(labels: &Labels) -> String {
    let pairs: Vec<String> = labels
        .iter()
        .map(|(name, value)| {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            format!("{name}=\"{escaped}\"")
        })
        .collect();
    format!("{{{}}}", pairs.join(","))
}

fn format_sample(sample: &Sample) -> String {
    let labels = sample.labels.as_ref().map(format_labels).unwrap_or_default();
    format!("{}{} {}", sample.full_name(), labels, sample.value)
}

fn render(registry: &CollectorRegistry) -> Result<String> {
    let mut out = String::new();
    for collector in registry.collectors() {
        writeln!(out, "# HELP {} {}", collector.name(), collector.description())?;
        writeln!(out, "# TYPE {} {}", collector.name(), collector.kind())?;
        for sample in collector.collect() {
            writeln!(out, "{}", format_sample(&sample))?;
        }
    }
    Ok(out)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let backend = load_backend(None, None)?;
    log::info!("Recording with backend {}", backend.id());

    let registry = CollectorRegistry::new();
    let requests = Counter::builder("http_requests", "Handled HTTP requests")
        .required_labels(["method", "status"])
        .default_labels([("status", "200")])
        .registry(&registry)
        .build()?;
    let in_flight = Gauge::builder("http_requests_in_flight", "Requests being handled")
        .registry(&registry)
        .build()?;
    let latency = Histogram::builder("http_request_duration_seconds", "Request latency")
        .buckets([0.001, 0.01, 0.1])
        .registry(&registry)
        .build()?;

    let traffic = [("get", None), ("get", None), ("post", Some(201)), ("get", Some(404))];
    for (method, status) in traffic {
        let _in_flight = in_flight.track_inprogress()?;
        let _timer = latency.start_timer()?;
        let request = requests.labels([("method", method)])?;
        match status {
            Some(status) => request.labels([("status", status)])?.inc()?,
            None => request.inc()?,
        }
        thread::sleep(Duration::from_millis(2));
    }

    print!("{}", render(&registry)?);
    Ok(())
}
