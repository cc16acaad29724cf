//! Completion aggregation across a sample's analysis processes.
//!
//! A sample is ready to auto-complete when at least one process was ever spawned for it and
//! none of its processes is still active. Only the process kinds enabled in the deployment
//! are consulted.

use crate::config::EnabledProcesses;
use crate::process::{
    processes_for_sample, AnalysisProcess, HistopathologyProcess, ImmunoassayProcess,
    MolecularProcess, ProcessKind,
};
use crate::repositories::{Record, Transaction};
use crate::sample::{Sample, SampleState};
use lab_uuid::RecordId;
use serde::Serialize;

/// Process counts for one sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompletionTally {
    pub active: usize,
    pub total: usize,
}

impl CompletionTally {
    fn add<P: AnalysisProcess>(&mut self, processes: &[P]) {
        self.total += processes.len();
        self.active += processes.iter().filter(|p| p.is_active()).count();
    }

    /// True when at least one process exists and none is active.
    ///
    /// A sample whose processes were all cancelled counts as done.
    pub fn all_processes_completed(&self) -> bool {
        self.total > 0 && self.active == 0
    }
}

/// Counts the processes of every enabled kind owned by `sample_id`.
pub fn tally(
    tx: &mut dyn Transaction,
    enabled: &EnabledProcesses,
    sample_id: RecordId,
) -> CompletionTally {
    let mut tally = CompletionTally::default();
    for kind in enabled.iter() {
        match kind {
            ProcessKind::Molecular => {
                tally.add(&processes_for_sample::<MolecularProcess>(tx, sample_id))
            }
            ProcessKind::Histopathology => {
                tally.add(&processes_for_sample::<HistopathologyProcess>(tx, sample_id))
            }
            ProcessKind::Immunoassay => {
                tally.add(&processes_for_sample::<ImmunoassayProcess>(tx, sample_id))
            }
        }
    }
    tally
}

/// See [`CompletionTally::all_processes_completed`].
pub fn all_processes_completed(
    tx: &mut dyn Transaction,
    enabled: &EnabledProcesses,
    sample_id: RecordId,
) -> bool {
    tally(tx, enabled, sample_id).all_processes_completed()
}

/// Auto-completion is offered only for a processing sample whose processes are all done.
pub fn can_auto_complete(
    tx: &mut dyn Transaction,
    enabled: &EnabledProcesses,
    sample: &Sample,
) -> bool {
    sample.state() == SampleState::Processing
        && all_processes_completed(tx, enabled, sample.id())
}
