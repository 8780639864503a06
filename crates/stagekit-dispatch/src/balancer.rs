//! `LoadBalancer`: picks a worker from a pool's stats snapshot.
//!
//! The dispatcher itself does not route to a specific worker (workers
//! pull from the shared queue), so this is advisory: used when a caller
//! wants to report which worker *should* pick up the next item, e.g. for
//! a dashboard, or when a future transport wants point-to-point dispatch
//! instead of a shared queue.

use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::pool::WorkerStats;
use crate::worker::WorkerState;

/// Worker-selection strategy.
#[derive(Debug, Clone, Copy, Default)]
pub enum LoadBalancer {
    /// Cycle through eligible workers in order.
    #[default]
    RoundRobin,
    /// Pick the eligible worker with the lowest reported load.
    LeastLoaded,
    /// Pick a uniformly random eligible worker.
    Random,
}

impl LoadBalancer {
    /// Select an index into `workers`, considering only workers that are
    /// `Idle` or `Busy` (never `Error` or `Offline`). Returns `None` if
    /// no worker is eligible.
    #[must_use]
    pub fn select(&self, workers: &[WorkerStats], round_robin_cursor: &AtomicUsize) -> Option<usize> {
        let eligible: Vec<usize> = workers
            .iter()
            .enumerate()
            .filter(|(_, w)| matches!(w.state, WorkerState::Idle | WorkerState::Busy))
            .map(|(i, _)| i)
            .collect();
        if eligible.is_empty() {
            return None;
        }
        match self {
            Self::RoundRobin => {
                let cursor = round_robin_cursor.fetch_add(1, Ordering::SeqCst);
                Some(eligible[cursor % eligible.len()])
            }
            Self::LeastLoaded => eligible
                .into_iter()
                .min_by_key(|&i| workers[i].load)
                .or(None),
            Self::Random => eligible.choose(&mut rand::thread_rng()).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn stats(load: usize, state: WorkerState) -> WorkerStats {
        WorkerStats {
            worker_id: Uuid::new_v4(),
            state,
            load,
        }
    }

    #[test]
    fn least_loaded_picks_minimum_load() {
        let workers = vec![
            stats(5, WorkerState::Idle),
            stats(1, WorkerState::Busy),
            stats(9, WorkerState::Idle),
        ];
        let cursor = AtomicUsize::new(0);
        let picked = LoadBalancer::LeastLoaded.select(&workers, &cursor).unwrap();
        assert_eq!(picked, 1);
    }

    #[test]
    fn offline_and_error_workers_are_never_selected() {
        let workers = vec![stats(0, WorkerState::Offline), stats(0, WorkerState::Error)];
        let cursor = AtomicUsize::new(0);
        assert!(LoadBalancer::RoundRobin.select(&workers, &cursor).is_none());
    }

    #[test]
    fn round_robin_cycles_through_eligible() {
        let workers = vec![stats(0, WorkerState::Idle), stats(0, WorkerState::Idle)];
        let cursor = AtomicUsize::new(0);
        let first = LoadBalancer::RoundRobin.select(&workers, &cursor).unwrap();
        let second = LoadBalancer::RoundRobin.select(&workers, &cursor).unwrap();
        assert_ne!(first, second);
    }
}
