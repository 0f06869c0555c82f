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

//! Provides RAII-based guards for automatically recording metrics. (RAII = Resource Acquisition Is Initialization)

use std::sync::Arc;
use std::time::{Duration, Instant};

use tally_core::MetricsResult;

use crate::metrics::collector::ValueSlot;

#[derive(Debug, Clone, Copy)]
enum TimerAction {
    Observe,
    Set,
}

/// Times a scope and records the elapsed seconds when dropped or stopped.
///
/// Histogram timers observe the duration; gauge timers set the gauge to it.
/// The measurement is recorded even on early returns or panics.
#[derive(Debug)]
#[must_use = "the timer records when dropped; binding it to `_` records immediately"]
pub struct ScopedMetricTimer {
    start: Instant,
    slot: Arc<ValueSlot>,
    action: TimerAction,
    recorded: bool,
}

impl ScopedMetricTimer {
    pub(crate) fn observing(slot: Arc<ValueSlot>) -> Self {
        Self::start(slot, TimerAction::Observe)
    }

    pub(crate) fn setting(slot: Arc<ValueSlot>) -> Self {
        Self::start(slot, TimerAction::Set)
    }

    fn start(slot: Arc<ValueSlot>, action: TimerAction) -> Self {
        Self {
            start: Instant::now(),
            slot,
            action,
            recorded: false,
        }
    }

    /// Time elapsed since the timer started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Records now instead of on drop, returning the recorded seconds.
    pub fn stop(mut self) -> MetricsResult<f64> {
        self.recorded = true;
        self.record()
    }

    fn record(&self) -> MetricsResult<f64> {
        let seconds = self.elapsed().as_secs_f64();
        match self.action {
            TimerAction::Observe => self.slot.histogram()?.observe(seconds)?,
            TimerAction::Set => self.slot.scalar()?.set(seconds)?,
        }
        Ok(seconds)
    }
}

impl Drop for ScopedMetricTimer {
    fn drop(&mut self) {
        if self.recorded {
            return;
        }
        if let Err(e) = self.record() {
            log::warn!("[ScopedMetricTimer] Failed to record metric: {e}");
        }
    }
}

/// Keeps a gauge incremented for as long as it lives.
#[derive(Debug)]
#[must_use = "the gauge is decremented as soon as the guard is dropped"]
pub struct InProgressGuard {
    slot: Arc<ValueSlot>,
}

impl InProgressGuard {
    pub(crate) fn enter(slot: Arc<ValueSlot>) -> MetricsResult<Self> {
        slot.scalar()?.inc(1.0)?;
        Ok(Self { slot })
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        if let Err(e) = self.slot.scalar().and_then(|gauge| gauge.dec(1.0)) {
            log::warn!("[InProgressGuard] Failed to record metric: {e}");
        }
    }
}
