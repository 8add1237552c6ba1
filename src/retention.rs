//! Counter history persisted across independent check executions.
//!
//! A check process is stateless by itself; to alert on the *increase* of a
//! hardware counter it stores one snapshot per run in a JSON file keyed by
//! `(checker, hostname)` and computes the delta over a window of past
//! snapshots on the next run. The store is bounded: after appending, the
//! history is pruned oldest-first to [`MAX_SNAPSHOTS`], so the snapshot
//! taken in the current run is never the one dropped.
//!
//! Counters are monotonically increasing hardware registers that reset
//! when the device reboots. A negative per-interval difference is treated
//! as such a reset: the interval contributes zero and the reset is counted
//! so the checker can surface it, rather than feeding a huge bogus delta
//! into the thresholds.
//!
//! Evaluation is a pure function of the stored history — the `MaxAge`
//! window measures age against the newest snapshot, not the wall clock —
//! so evaluating twice without appending yields identical results.
//!
//! The store assumes serialized executions per target; concurrent runs
//! against the same file are an operational precondition violation and are
//! not guarded against.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

/// Upper bound on stored snapshots; oldest entries are dropped first.
pub const MAX_SNAPSHOTS: usize = 50;

/// Counter reading for one port at one point in time.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PortSample {
    pub name: String,
    pub counter: u64,
}

/// All port readings taken by one execution.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Snapshot {
    pub timestamp: u64,
    pub values: BTreeMap<String, PortSample>,
}

#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("cannot read retention file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("retention file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write retention file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// File-backed snapshot history for one `(checker, hostname)` pair.
///
/// A missing file is an empty history. A corrupt or unreadable file is an
/// error: silently resetting history would restart the "insufficient
/// data" cycle and could mask a real problem, so the caller must surface
/// it as UNKNOWN instead.
pub struct RetentionStore {
    path: PathBuf,
}

impl RetentionStore {
    pub fn new(dir: impl AsRef<Path>, checker: &str, hostname: &str) -> Self {
        let path = dir
            .as_ref()
            .join(format!("{}.{}.json", checker, hostname));
        RetentionStore { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<Snapshot>, RetentionError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no retention file at {}, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(RetentionError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        serde_json::from_slice(&raw).map_err(|e| RetentionError::Corrupt {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Persist the full history, replacing the file atomically so a killed
    /// execution never leaves a truncated store behind.
    pub fn save(&self, history: &[Snapshot]) -> Result<(), RetentionError> {
        let write_err = |source| RetentionError::Write {
            path: self.path.clone(),
            source,
        };

        let raw = serde_json::to_vec(history).map_err(|e| RetentionError::Corrupt {
            path: self.path.clone(),
            source: e,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;
        debug!("saved {} snapshots to {}", history.len(), self.path.display());
        Ok(())
    }
}

/// How much history a delta computation needs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Window {
    /// At least this many snapshots; the delta is summed over consecutive
    /// pairs of the last `n`.
    Samples(usize),
    /// Snapshots older than this many seconds (relative to the newest
    /// snapshot) are ignored; at least two must remain.
    MaxAge(u64),
}

/// Accumulated counter increase for one port over the selected window.
#[derive(Clone, Debug, PartialEq)]
pub struct PortDelta {
    pub key: String,
    pub name: String,
    pub delta: u64,
    /// Intervals where the counter went backwards (device reset); those
    /// intervals contribute zero to `delta`.
    pub resets: u32,
}

/// Outcome of evaluating the history against a window.
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    /// The window is not filled yet; `need` more executions are required.
    Insufficient { have: usize, need: usize },
    /// Deltas are computable; `span_minutes` is the time covered by the
    /// window, rounded up.
    Ready {
        deltas: Vec<PortDelta>,
        span_minutes: u64,
    },
}

/// Append the snapshot taken by this execution and prune oldest-first to
/// `max` entries. The appended snapshot survives pruning by construction.
pub fn append_pruned(history: &mut Vec<Snapshot>, snapshot: Snapshot, max: usize) {
    debug_assert!(max >= 1);
    history.push(snapshot);
    if history.len() > max {
        let excess = history.len() - max;
        history.drain(..excess);
    }
}

/// Compute per-port deltas over the selected window of `history`.
///
/// Ports are keyed by their stable key (port alias); the reported display
/// name is the most recently seen one. A port missing on either side of an
/// interval contributes nothing for that interval. Snapshots are assumed
/// in append order (timestamps non-decreasing).
pub fn evaluate(history: &[Snapshot], window: Window) -> Evaluation {
    let slice: &[Snapshot] = match window {
        Window::Samples(n) => {
            if history.len() < n {
                return Evaluation::Insufficient {
                    have: history.len(),
                    need: n - history.len(),
                };
            }
            &history[history.len() - n..]
        }
        Window::MaxAge(age) => {
            let newest = match history.last() {
                Some(snapshot) => snapshot.timestamp,
                None => return Evaluation::Insufficient { have: 0, need: 2 },
            };
            let cutoff = newest.saturating_sub(age);
            let start = history
                .iter()
                .position(|s| s.timestamp >= cutoff)
                .unwrap_or(history.len());
            let slice = &history[start..];
            if slice.len() < 2 {
                return Evaluation::Insufficient {
                    have: slice.len(),
                    need: 2 - slice.len(),
                };
            }
            slice
        }
    };

    let mut stats: BTreeMap<String, PortDelta> = BTreeMap::new();
    for pair in slice.windows(2) {
        let (earlier, later) = (&pair[0], &pair[1]);
        for (key, sample) in &later.values {
            let stat = stats.entry(key.clone()).or_insert_with(|| PortDelta {
                key: key.clone(),
                name: sample.name.clone(),
                delta: 0,
                resets: 0,
            });
            stat.name = sample.name.clone();

            let Some(previous) = earlier.values.get(key) else {
                continue;
            };
            if sample.counter < previous.counter {
                stat.resets += 1;
            } else {
                stat.delta += sample.counter - previous.counter;
            }
        }
    }

    let span_seconds = slice[slice.len() - 1]
        .timestamp
        .saturating_sub(slice[0].timestamp);
    let span_minutes = span_seconds.div_ceil(60);

    Evaluation::Ready {
        deltas: stats.into_values().collect(),
        span_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(timestamp: u64, counters: &[(&str, u64)]) -> Snapshot {
        Snapshot {
            timestamp,
            values: counters
                .iter()
                .map(|(key, counter)| {
                    (
                        key.to_string(),
                        PortSample {
                            name: format!("port {}", key),
                            counter: *counter,
                        },
                    )
                })
                .collect(),
        }
    }

    fn deltas(evaluation: Evaluation) -> Vec<PortDelta> {
        match evaluation {
            Evaluation::Ready { deltas, .. } => deltas,
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn test_insufficient_until_window_filled() {
        let mut history = Vec::new();
        append_pruned(&mut history, snapshot(100, &[("0/1", 10)]), MAX_SNAPSHOTS);

        assert_eq!(
            evaluate(&history, Window::Samples(2)),
            Evaluation::Insufficient { have: 1, need: 1 }
        );

        append_pruned(&mut history, snapshot(160, &[("0/1", 60)]), MAX_SNAPSHOTS);
        let result = deltas(evaluate(&history, Window::Samples(2)));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].delta, 50);
        assert_eq!(result[0].resets, 0);
    }

    #[test]
    fn test_delta_sums_consecutive_intervals() {
        let history = vec![
            snapshot(0, &[("0/1", 10), ("0/2", 5)]),
            snapshot(60, &[("0/1", 25), ("0/2", 5)]),
            snapshot(120, &[("0/1", 30), ("0/2", 6)]),
        ];
        let result = deltas(evaluate(&history, Window::Samples(3)));
        assert_eq!(result[0].key, "0/1");
        assert_eq!(result[0].delta, 20);
        assert_eq!(result[1].key, "0/2");
        assert_eq!(result[1].delta, 1);
    }

    #[test]
    fn test_window_uses_only_last_n_samples() {
        let history = vec![
            snapshot(0, &[("p", 0)]),
            snapshot(60, &[("p", 1000)]),
            snapshot(120, &[("p", 1010)]),
            snapshot(180, &[("p", 1015)]),
        ];
        let result = deltas(evaluate(&history, Window::Samples(2)));
        assert_eq!(result[0].delta, 5);
    }

    #[test]
    fn test_counter_reset_clamps_to_zero() {
        let history = vec![
            snapshot(0, &[("p", 900)]),
            snapshot(60, &[("p", 4)]),
            snapshot(120, &[("p", 10)]),
        ];
        let result = deltas(evaluate(&history, Window::Samples(3)));
        assert_eq!(result[0].delta, 6);
        assert_eq!(result[0].resets, 1);
    }

    #[test]
    fn test_port_absent_from_one_side_is_skipped() {
        let history = vec![
            snapshot(0, &[("a", 1)]),
            snapshot(60, &[("a", 3), ("b", 7)]),
            snapshot(120, &[("a", 4), ("b", 9)]),
        ];
        let result = deltas(evaluate(&history, Window::Samples(3)));
        assert_eq!(result[0].key, "a");
        assert_eq!(result[0].delta, 3);
        // "b" only has one complete interval.
        assert_eq!(result[1].key, "b");
        assert_eq!(result[1].delta, 2);
    }

    #[test]
    fn test_max_age_window_is_relative_to_newest_snapshot() {
        let history = vec![
            snapshot(0, &[("p", 0)]),
            snapshot(500, &[("p", 100)]),
            snapshot(560, &[("p", 130)]),
        ];
        // Only the two snapshots within 120s of t=560 qualify.
        let result = deltas(evaluate(&history, Window::MaxAge(120)));
        assert_eq!(result[0].delta, 30);

        assert_eq!(
            evaluate(&history[..1], Window::MaxAge(120)),
            Evaluation::Insufficient { have: 1, need: 1 }
        );
        assert_eq!(
            evaluate(&[], Window::MaxAge(120)),
            Evaluation::Insufficient { have: 0, need: 2 }
        );
    }

    #[test]
    fn test_span_minutes_rounds_up() {
        let history = vec![snapshot(0, &[("p", 0)]), snapshot(61, &[("p", 1)])];
        match evaluate(&history, Window::Samples(2)) {
            Evaluation::Ready { span_minutes, .. } => assert_eq!(span_minutes, 2),
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let history = vec![
            snapshot(0, &[("p", 10)]),
            snapshot(60, &[("p", 20)]),
            snapshot(120, &[("p", 35)]),
        ];
        let first = evaluate(&history, Window::Samples(3));
        let second = evaluate(&history, Window::Samples(3));
        assert_eq!(first, second);
    }

    #[test]
    fn test_prune_never_drops_the_new_snapshot() {
        let mut history: Vec<Snapshot> =
            (0..5).map(|i| snapshot(i * 60, &[("p", i)])).collect();
        let newest = snapshot(600, &[("p", 99)]);
        append_pruned(&mut history, newest.clone(), 3);

        assert_eq!(history.len(), 3);
        assert_eq!(history.last(), Some(&newest));
        assert_eq!(history[0].timestamp, 240);
    }

    #[test]
    fn test_store_roundtrip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = RetentionStore::new(dir.path(), "check_san_crc", "director1");

        assert_eq!(store.load().unwrap(), Vec::new());

        let history = vec![snapshot(100, &[("0/1", 10)])];
        store.save(&history).unwrap();
        assert_eq!(store.load().unwrap(), history);

        // A second target keeps its own file.
        let other = RetentionStore::new(dir.path(), "check_san_crc", "director2");
        assert_eq!(other.load().unwrap(), Vec::new());
    }

    #[test]
    fn test_corrupt_store_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = RetentionStore::new(dir.path(), "check_san_crc", "director1");
        std::fs::write(store.path(), b"not json").unwrap();

        assert!(matches!(
            store.load(),
            Err(RetentionError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_unwritable_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let store = RetentionStore::new(&missing, "check_san_crc", "director1");

        assert!(matches!(
            store.save(&[snapshot(1, &[])]),
            Err(RetentionError::Write { .. })
        ));
    }
}
