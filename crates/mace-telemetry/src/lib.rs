// SPDX-License-Identifier: MIT OR Apache-2.0
//! Monotonic runtime counters.
//!
//! Telemetry observes the core and never feeds back into it: nothing here
//! touches the deterministic context, so counter values have no effect on
//! ids, timestamps, or replay verdicts.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Well-known counter names.
pub mod counters {
    /// Requests that invoked an agent.
    pub const AGENT_EXECUTIONS: &str = "agent_executions_total";
    /// Reflective log entries persisted.
    pub const LOGS_WRITTEN: &str = "reflective_logs_written_total";
    /// Replay attempts started.
    pub const REPLAY_RUNS: &str = "replay_runs_total";
    /// Replay attempts that failed verification.
    pub const REPLAY_FAILURES: &str = "replay_failures_total";
    /// Semantic-memory writes rejected by a gate.
    pub const SEM_PUT_REJECTED: &str = "sem_put_rejected_total";
}

/// Point-in-time view of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Counter values keyed by name (deterministic ordering).
    pub counters: BTreeMap<String, u64>,
}

/// Thread-safe set of monotonic counters.
///
/// Clone freely; clones share the same underlying counters.
#[derive(Debug, Clone, Default)]
pub struct CounterSet {
    inner: Arc<Mutex<BTreeMap<String, u64>>>,
}

impl CounterSet {
    /// Create an empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment `name` and return the new value.
    pub fn increment(&self, name: &str) -> u64 {
        let mut data = self.inner.lock().expect("telemetry lock poisoned");
        let slot = data.entry(name.to_string()).or_insert(0);
        *slot += 1;
        let value = *slot;
        debug!(counter = name, value, "telemetry increment");
        value
    }

    /// Current value of `name`; zero when never incremented.
    #[must_use]
    pub fn get(&self, name: &str) -> u64 {
        let data = self.inner.lock().expect("telemetry lock poisoned");
        data.get(name).copied().unwrap_or(0)
    }

    /// Snapshot every counter.
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let data = self.inner.lock().expect("telemetry lock poisoned");
        TelemetrySnapshot {
            counters: data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn counters_start_at_zero_and_advance() {
        let t = CounterSet::new();
        assert_eq!(t.get(counters::AGENT_EXECUTIONS), 0);
        assert_eq!(t.increment(counters::AGENT_EXECUTIONS), 1);
        assert_eq!(t.increment(counters::AGENT_EXECUTIONS), 2);
        assert_eq!(t.get(counters::AGENT_EXECUTIONS), 2);
    }

    #[test]
    fn clones_share_state() {
        let t = CounterSet::new();
        let u = t.clone();
        t.increment("a");
        u.increment("a");
        assert_eq!(t.get("a"), 2);
    }

    #[test]
    fn snapshot_is_deterministic_and_serializable() {
        let t = CounterSet::new();
        t.increment("zebra");
        t.increment("alpha");
        let snap = t.snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let alpha = json.find("alpha").unwrap();
        let zebra = json.find("zebra").unwrap();
        assert!(alpha < zebra);
        let back: TelemetrySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn concurrent_increments_all_land() {
        let t = CounterSet::new();
        let mut handles = vec![];
        for _ in 0..8 {
            let tc = t.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    tc.increment("shared");
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.get("shared"), 800);
    }
}
