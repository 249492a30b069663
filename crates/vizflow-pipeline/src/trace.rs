//! Bounded in-memory record of pass outcomes
//!
//! Every stage visited by a pull records one [`PassEvent`] per pass. The
//! trace is what tests and the CLI use to see which stages ran, which were
//! served from cache and where a pull stopped.

use crate::types::StageId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use vizflow_core::PassKind;

/// What happened to one stage in one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassOutcome {
    /// The callback ran
    Ran,
    /// Execution was skipped because the cached output is still valid
    Cached,
    /// The callback or a check failed
    Failed,
    /// The pass was not reached because the pull stopped earlier
    Skipped,
}

/// One trace entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassEvent {
    /// Monotonic sequence number across the trace
    pub seq: u64,
    /// Pull identifier
    pub pull: u64,
    /// Stage visited
    pub stage: StageId,
    /// Stage type name
    pub stage_name: String,
    /// Pass
    pub pass: PassKind,
    /// Outcome
    pub outcome: PassOutcome,
}

#[derive(Debug, Default)]
struct TraceBuffer {
    events: VecDeque<PassEvent>,
    next_seq: u64,
}

/// Ring buffer of [`PassEvent`]s, safe to share between pulls
#[derive(Debug)]
pub struct PassTrace {
    inner: Mutex<TraceBuffer>,
    enabled: bool,
    capacity: usize,
}

impl PassTrace {
    /// Trace keeping at most `capacity` events
    #[must_use]
    pub fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(TraceBuffer::default()),
            enabled,
            capacity: capacity.max(1),
        }
    }

    /// Whether events are recorded
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append an event, evicting the oldest when full
    pub fn record(&self, pull: u64, stage: StageId, stage_name: &str, pass: PassKind, outcome: PassOutcome) {
        if !self.enabled {
            return;
        }
        let mut guard = self.inner.lock();
        let seq = guard.next_seq;
        guard.next_seq += 1;
        if guard.events.len() == self.capacity {
            guard.events.pop_front();
        }
        guard.events.push_back(PassEvent {
            seq,
            pull,
            stage,
            stage_name: stage_name.to_string(),
            pass,
            outcome,
        });
    }

    /// Snapshot of every retained event
    #[must_use]
    pub fn events(&self) -> Vec<PassEvent> {
        self.inner.lock().events.iter().cloned().collect()
    }

    /// Events of one pull
    #[must_use]
    pub fn events_for_pull(&self, pull: u64) -> Vec<PassEvent> {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|e| e.pull == pull)
            .cloned()
            .collect()
    }

    /// Stages that executed during `pull`, in execution order
    #[must_use]
    pub fn executed(&self, pull: u64) -> Vec<StageId> {
        self.events_for_pull(pull)
            .into_iter()
            .filter(|e| e.pass == PassKind::Execute && e.outcome == PassOutcome::Ran)
            .map(|e| e.stage)
            .collect()
    }

    /// Identifier of the most recent pull seen, if any
    #[must_use]
    pub fn last_pull(&self) -> Option<u64> {
        self.inner.lock().events.back().map(|e| e.pull)
    }

    /// Number of retained events
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Whether no events are retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    /// Drop every event
    pub fn clear(&self) {
        self.inner.lock().events.clear();
    }

    /// Serialize the retained events as a JSON array
    ///
    /// # Errors
    /// Propagates serializer failures.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events())
    }
}

impl Default for PassTrace {
    fn default() -> Self {
        Self::new(true, 4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let trace = PassTrace::new(true, 2);
        for pull in 0..3 {
            trace.record(pull, StageId(0), "s", PassKind::Execute, PassOutcome::Ran);
        }
        let events = trace.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 1);
        assert_eq!(trace.last_pull(), Some(2));
    }

    #[test]
    fn disabled_trace_records_nothing() {
        let trace = PassTrace::new(false, 8);
        trace.record(0, StageId(0), "s", PassKind::Execute, PassOutcome::Ran);
        assert!(trace.is_empty());
    }

    #[test]
    fn executed_filters_by_pull_and_outcome() {
        let trace = PassTrace::default();
        trace.record(1, StageId(0), "a", PassKind::Execute, PassOutcome::Ran);
        trace.record(1, StageId(1), "b", PassKind::Execute, PassOutcome::Cached);
        trace.record(2, StageId(2), "c", PassKind::Execute, PassOutcome::Ran);
        assert_eq!(trace.executed(1), vec![StageId(0)]);
        let json = trace.to_json().unwrap();
        assert!(json.contains("\"Cached\""));
    }
}
