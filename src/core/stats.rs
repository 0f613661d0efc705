use serde::{Serialize, Deserialize};

/// Per-source counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub total_documents: u64,
    pub total_bytes: u64,
}

impl SourceStats {
    pub fn reset(&mut self) {
        *self = SourceStats::default();
    }
}

/// Indexing phase reported to the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Collect,
    Sort,
    CollectMva,
    SortMva,
    Merge,
}

/// Snapshot handed to progress callbacks.
///
/// Counters are reset on phase entry and only grow while the phase runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexProgress {
    pub phase: Phase,
    /// Collect: documents collected so far
    pub documents: u64,
    /// Collect: text bytes collected so far
    pub bytes: u64,
    /// Collect-MVA / Sort-MVA: values processed so far
    pub attrs: u64,
    /// Sort-MVA: values total
    pub attrs_total: u64,
    /// Sort: hits written so far
    pub hits: u64,
    /// Sort: hits total
    pub hits_total: u64,
    /// Merge: words merged so far
    pub words: u64,
}

impl IndexProgress {
    pub fn new() -> Self {
        IndexProgress {
            phase: Phase::Collect,
            documents: 0,
            bytes: 0,
            attrs: 0,
            attrs_total: 0,
            hits: 0,
            hits_total: 0,
            words: 0,
        }
    }

    pub fn enter(&mut self, phase: Phase) {
        *self = IndexProgress::new();
        self.phase = phase;
    }
}

impl Default for IndexProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress callback; the flag is true on the final report of a phase.
pub type ProgressCallback = Box<dyn FnMut(&IndexProgress, bool) + Send>;

/// Wraps an optional callback with the reporting cadence.
pub(crate) struct ProgressReporter {
    progress: IndexProgress,
    callback: Option<ProgressCallback>,
    every: u64,
    ticks: u64,
}

impl ProgressReporter {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        ProgressReporter {
            progress: IndexProgress::new(),
            callback,
            every: 1024,
            ticks: 0,
        }
    }

    pub(crate) fn enter(&mut self, phase: Phase) {
        self.progress.enter(phase);
        self.ticks = 0;
        self.report(false);
    }

    pub(crate) fn get_mut(&mut self) -> &mut IndexProgress {
        &mut self.progress
    }

    /// Counts one unit of work and reports periodically.
    pub(crate) fn tick(&mut self) {
        self.ticks += 1;
        if self.ticks % self.every == 0 {
            self.report(false);
        }
    }

    pub(crate) fn finish_phase(&mut self) {
        self.report(true);
    }

    fn report(&mut self, phase_end: bool) {
        if let Some(callback) = self.callback.as_mut() {
            callback(&self.progress, phase_end);
        }
    }
}
