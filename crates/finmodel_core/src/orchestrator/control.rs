//! In-flight job controls owned by one orchestrator instance

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rustc_hash::FxHashMap;

use crate::model::{JobId, SimulationProgress};

/// Cancel flag and live progress counters of one running attempt
#[derive(Debug)]
pub struct JobControl {
    pub attempt: u32,
    cancelled: Arc<AtomicBool>,
    completed: Arc<AtomicUsize>,
    /// Units of work expected; 0 until the executor knows
    total: AtomicUsize,
}

impl JobControl {
    pub fn new(attempt: u32) -> Self {
        Self {
            attempt,
            cancelled: Arc::new(AtomicBool::new(false)),
            completed: Arc::new(AtomicUsize::new(0)),
            total: AtomicUsize::new(0),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    /// Counters handed to the Monte Carlo engine
    pub fn simulation_progress(&self) -> SimulationProgress {
        SimulationProgress::from_atomics(Arc::clone(&self.completed), Arc::clone(&self.cancelled))
    }

    /// Live progress, capped below 100 until the job is marked done
    pub fn percent(&self) -> u8 {
        let total = self.total.load(Ordering::SeqCst);
        if total == 0 {
            return 0;
        }
        let completed = self.completed.load(Ordering::SeqCst).min(total);
        ((completed * 100 / total).min(99)) as u8
    }
}

#[derive(Debug, Default)]
pub struct ControlTable {
    entries: Mutex<FxHashMap<JobId, Arc<JobControl>>>,
}

impl ControlTable {
    pub fn register(&self, id: JobId, attempt: u32) -> Arc<JobControl> {
        let control = Arc::new(JobControl::new(attempt));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&control));
        control
    }

    /// Remove `control` unless a newer attempt already replaced it
    pub fn release(&self, id: JobId, control: &Arc<JobControl>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.get(&id).is_some_and(|c| Arc::ptr_eq(c, control)) {
            entries.remove(&id);
        }
    }

    pub fn get(&self, id: JobId) -> Option<Arc<JobControl>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<(JobId, Arc<JobControl>)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, c)| (*id, Arc::clone(c)))
            .collect()
    }
}
