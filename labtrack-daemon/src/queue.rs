//! Per-opportunity task queue.
//!
//! Ordering rules:
//! - FIFO overall, but at most one task per opportunity runs at a time;
//!   a task for a busy opportunity waits behind the running one
//! - an identical `(opportunity, kind)` pair already waiting is coalesced
//!   rather than queued twice, so a burst of flag scans collapses to one
//!   pass per opportunity

use std::collections::{HashSet, VecDeque};

use labtrack_core::types::OpportunityNumber;

/// Remote work the daemon can run for one opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    EnsureFolder,
    SyncSampleIds,
    ExportDocumentation,
    ArchiveFolder,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::EnsureFolder => "ensure_folder",
            TaskKind::SyncSampleIds => "sync_sample_ids",
            TaskKind::ExportDocumentation => "export_documentation",
            TaskKind::ArchiveFolder => "archive_folder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Task {
    pub number: OpportunityNumber,
    pub kind: TaskKind,
}

impl Task {
    pub fn new(number: OpportunityNumber, kind: TaskKind) -> Self {
        Self { number, kind }
    }
}

/// FIFO queue with per-opportunity single flight and duplicate coalescing.
#[derive(Debug, Default)]
pub struct SingleFlightQueue {
    pending: VecDeque<Task>,
    queued: HashSet<Task>,
    running: HashSet<OpportunityNumber>,
}

impl SingleFlightQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task. Returns `false` when an identical task is already
    /// waiting and this one was coalesced into it.
    pub fn enqueue(&mut self, task: Task) -> bool {
        if self.queued.contains(&task) {
            return false;
        }
        self.queued.insert(task.clone());
        self.pending.push_back(task);
        true
    }

    /// Take the next runnable task, skipping opportunities with a task in
    /// flight. The returned task counts as running until [`Self::complete`].
    pub fn next(&mut self) -> Option<Task> {
        let index = self
            .pending
            .iter()
            .position(|task| !self.running.contains(&task.number))?;
        let task = self.pending.remove(index).expect("index from position");
        self.queued.remove(&task);
        self.running.insert(task.number.clone());
        Some(task)
    }

    /// Mark the in-flight task for `number` finished, releasing the
    /// opportunity for its next queued task.
    pub fn complete(&mut self, number: &OpportunityNumber) {
        self.running.remove(number);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }
}
