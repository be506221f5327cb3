use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::catalog::{OperationType, SamplingParams};
use crate::graph::NodeId;
use crate::outcome::OutcomeSet;
use crate::statistic::OutcomeCounter;

/// Per-outcome counts observed during one sampled window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSample {
    /// Tick at which the sample was taken.
    pub tick: u64,
    pub outcomes: OutcomeSet,
    pub counts: Vec<u64>,
}

impl WindowSample {
    /// Count for the outcome labelled `name`, if the family has one.
    pub fn count(&self, name: &str) -> Option<u64> {
        self.outcomes
            .ordinal_of(name)
            .and_then(|i| self.counts.get(i).copied())
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

struct SamplerState {
    ticks: u64,
    last_totals: Vec<u64>,
    buckets: VecDeque<Vec<u64>>,
    history: VecDeque<WindowSample>,
}

/// Windowed history of one operation kind, fed from its live counters.
///
/// Each tick reads the cumulative totals of every bound counter and keeps the
/// difference from the previous read as one bucket. An increment racing with
/// the read is seen by exactly one of two consecutive reads, so it ends up in
/// exactly one bucket. Every `interval` ticks the last `window` buckets are
/// summed into a [`WindowSample`]; at most `history` samples are retained.
pub struct SampledStatistic {
    kind: OperationType,
    params: SamplingParams,
    sources: Vec<(NodeId, Arc<OutcomeCounter>)>,
    state: Mutex<SamplerState>,
}

impl SampledStatistic {
    pub fn new(
        kind: OperationType,
        params: SamplingParams,
        sources: Vec<(NodeId, Arc<OutcomeCounter>)>,
    ) -> Self {
        let width = kind.outcomes().len();
        let sampled = Self {
            kind,
            params: SamplingParams {
                history: params.history.max(1),
                interval: params.interval.max(1),
                window: params.window.max(1),
            },
            sources,
            state: Mutex::new(SamplerState {
                ticks: 0,
                last_totals: vec![0; width],
                buckets: VecDeque::new(),
                history: VecDeque::new(),
            }),
        };
        // Activity before binding is not part of any window.
        let baseline = sampled.totals();
        sampled.state.lock().last_totals = baseline;
        sampled
    }

    pub fn kind(&self) -> OperationType {
        self.kind
    }

    pub fn params(&self) -> SamplingParams {
        self.params
    }

    /// Graph nodes this sampler reads from.
    pub fn source_nodes(&self) -> Vec<NodeId> {
        self.sources.iter().map(|(id, _)| *id).collect()
    }

    /// Live cumulative counts summed over every bound counter.
    pub fn totals(&self) -> Vec<u64> {
        let mut totals = vec![0; self.kind.outcomes().len()];
        for (_, counter) in &self.sources {
            for (slot, value) in totals.iter_mut().zip(counter.snapshot()) {
                *slot += value;
            }
        }
        totals
    }

    /// Advances the sampler by one tick.
    pub fn tick(&self) {
        let mut state = self.state.lock();
        let now = self.totals();

        // Counters can be reset underneath us; treat a drop as a fresh start.
        let bucket: Vec<u64> = now
            .iter()
            .zip(state.last_totals.iter())
            .map(|(n, l)| n.saturating_sub(*l))
            .collect();
        state.last_totals = now;

        state.buckets.push_back(bucket);
        while state.buckets.len() as u64 > self.params.window {
            state.buckets.pop_front();
        }

        state.ticks += 1;
        if state.ticks % self.params.interval == 0 {
            let mut counts = vec![0; self.kind.outcomes().len()];
            for bucket in &state.buckets {
                for (slot, value) in counts.iter_mut().zip(bucket) {
                    *slot += value;
                }
            }
            let sample = WindowSample {
                tick: state.ticks,
                outcomes: self.kind.outcomes(),
                counts,
            };
            state.history.push_back(sample);
            while state.history.len() > self.params.history {
                state.history.pop_front();
            }
        }
    }

    /// Sample `index` windows back (0 is the newest).
    pub fn window(&self, index: usize) -> Option<WindowSample> {
        let state = self.state.lock();
        let len = state.history.len();
        if index >= len {
            return None;
        }
        state.history.get(len - 1 - index).cloned()
    }

    /// Retained samples, oldest first.
    pub fn history(&self) -> Vec<WindowSample> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }
}
