//! Workflow service.
//!
//! The entry points CLI and REST callers use. Every operation runs as one store transaction:
//! the state it reads, the guards it checks and the writes it makes either all land or none
//! do. The creation-time checks (one sample per order, one active process per kind and
//! sample) rely on that to hold under concurrent callers.

use crate::aggregator::{self, CompletionTally};
use crate::config::CoreConfig;
use crate::orders::{OrderDirectory, StaticOrderDirectory};
use crate::process::{
    self, AnalysisProcess, HistopathologyProcess, ImmunoassayProcess, MolecularProcess,
    ProcessAction, ProcessCommand, ProcessDraft, ProcessKind, ProcessPatch, ProcessRecord,
    ProcessState, ProcessSummary,
};
use crate::repositories::{AnyStore, Record, RecordKind, Store, Transaction};
use crate::sample::{Sample, SampleAction, SampleState, SampleType};
use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use lab_types::ExternalRef;
use lab_uuid::RecordId;
use serde::Serialize;
use std::sync::Arc;

/// A sample together with the state of its processes.
#[derive(Clone, Debug, Serialize)]
pub struct SampleOverview {
    pub sample: Sample,
    pub processes: Vec<ProcessSummary>,
    pub completion: CompletionTally,
    pub all_processes_completed: bool,
    pub can_auto_complete: bool,
    pub allowed_actions: Vec<SampleAction>,
}

/// Service for the sample and analysis process workflow.
pub struct WorkflowService<S: Store = AnyStore> {
    cfg: Arc<CoreConfig>,
    store: S,
    orders: Arc<dyn OrderDirectory>,
}

impl WorkflowService<AnyStore> {
    /// Builds a service from resolved configuration: the store backend it names and the
    /// order file it points at (no orders if unset).
    ///
    /// # Errors
    ///
    /// Returns an error if the order file cannot be read or parsed.
    pub fn from_config(cfg: Arc<CoreConfig>) -> WorkflowResult<Self> {
        let orders = match cfg.orders_file() {
            Some(path) => StaticOrderDirectory::load(path)?,
            None => {
                tracing::warn!("no lab test order file configured; sample creation will fail");
                StaticOrderDirectory::new()
            }
        };
        let store = AnyStore::from_config(&cfg);
        Ok(Self::new(cfg, store, Arc::new(orders)))
    }
}

impl<S: Store> WorkflowService<S> {
    pub fn new(cfg: Arc<CoreConfig>, store: S, orders: Arc<dyn OrderDirectory>) -> Self {
        Self { cfg, store, orders }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    fn ensure_enabled(&self, kind: ProcessKind) -> WorkflowResult<()> {
        if self.cfg.enabled_processes().contains(kind) {
            Ok(())
        } else {
            Err(WorkflowError::VariantDisabled(kind))
        }
    }

    // ----- samples -----

    /// Creates the workflow sample for a lab test order.
    ///
    /// The order number is copied from the order. The origin institution falls back to the
    /// order's when not given.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::NotFound` if the order does not exist.
    /// - `WorkflowError::DuplicateWorkflow` if the order already has a sample.
    pub fn create_sample(
        &self,
        order: &ExternalRef,
        sample_type: SampleType,
        origin_institution: Option<ExternalRef>,
        notes: Option<String>,
    ) -> WorkflowResult<Sample> {
        let snapshot = self
            .orders
            .order_snapshot(order)?
            .ok_or_else(|| WorkflowError::not_found(RecordKind::LabTestOrder, order))?;
        let now = Utc::now();

        let result = self.store.transaction(|tx| {
            let existing = tx.samples().search(&|s: &Sample| s.lab_test() == order);
            if !existing.is_empty() {
                return Err(WorkflowError::DuplicateWorkflow {
                    order: order.clone(),
                });
            }

            let sample = Sample::new(
                order.clone(),
                snapshot.order_number,
                sample_type,
                origin_institution.or(snapshot.origin_institution),
                notes,
                now,
            );
            tx.samples().insert(sample.clone())?;
            Ok(sample)
        });

        match &result {
            Ok(sample) => tracing::info!(
                "created sample {} for order {} ({})",
                sample.id(),
                order,
                sample.sample_type.as_str()
            ),
            Err(e) => tracing::warn!("create sample for order {} refused: {}", order, e),
        }
        result
    }

    /// Moves a sample along its lifecycle.
    ///
    /// `auto_complete` is accepted only when every process of the sample is done.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::NotFound` if the sample does not exist.
    /// - `WorkflowError::InvalidStateTransition` if the action is illegal now.
    pub fn advance_sample(&self, sample_id: RecordId, action: SampleAction) -> WorkflowResult<Sample> {
        let enabled = self.cfg.enabled_processes();
        let now = Utc::now();

        let result = self.store.transaction(|tx| {
            let mut sample = tx.samples().require(sample_id)?;
            if action == SampleAction::AutoComplete
                && !aggregator::can_auto_complete(tx, enabled, &sample)
            {
                return Err(WorkflowError::InvalidStateTransition {
                    entity: RecordKind::Sample,
                    state: sample.state().as_str(),
                    action: action.as_str(),
                });
            }
            sample.apply(action, now)?;
            tx.samples().update(sample.clone())?;
            Ok(sample)
        });

        match &result {
            Ok(sample) => tracing::info!(
                "sample {} {} -> {}",
                sample_id,
                action.as_str(),
                sample.state()
            ),
            Err(e) => tracing::warn!("sample {} {} refused: {}", sample_id, action.as_str(), e),
        }
        result
    }

    pub fn get_sample(&self, sample_id: RecordId) -> WorkflowResult<Sample> {
        self.store.snapshot(|tx| tx.samples().require(sample_id))
    }

    /// All samples, newest first.
    pub fn list_samples(&self) -> WorkflowResult<Vec<Sample>> {
        let mut samples = self.store.snapshot(|tx| Ok(tx.samples().search(&|_| true)))?;
        samples.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(samples)
    }

    /// State of the sample attached to `order`, or `None` if the order has no sample yet.
    pub fn order_sample_state(&self, order: &ExternalRef) -> WorkflowResult<Option<SampleState>> {
        self.store.snapshot(|tx| {
            let samples = tx.samples().search(&|s: &Sample| s.lab_test() == order);
            Ok(samples.first().map(Sample::state))
        })
    }

    /// Whether `sample_id` has at least one process and none still active.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::NotFound` if the sample does not exist.
    pub fn query_completion(&self, sample_id: RecordId) -> WorkflowResult<bool> {
        let enabled = self.cfg.enabled_processes();
        self.store.snapshot(|tx| {
            tx.samples().require(sample_id)?;
            Ok(aggregator::all_processes_completed(tx, enabled, sample_id))
        })
    }

    /// The sample, its processes (newest first) and its completion state.
    pub fn sample_overview(&self, sample_id: RecordId) -> WorkflowResult<SampleOverview> {
        let enabled = self.cfg.enabled_processes();
        self.store.snapshot(|tx| {
            let sample = tx.samples().require(sample_id)?;

            let mut processes: Vec<(DateTime<Utc>, ProcessSummary)> = Vec::new();
            for kind in enabled.iter() {
                match kind {
                    ProcessKind::Molecular => {
                        collect_summaries::<MolecularProcess>(tx, sample_id, &mut processes)
                    }
                    ProcessKind::Histopathology => {
                        collect_summaries::<HistopathologyProcess>(tx, sample_id, &mut processes)
                    }
                    ProcessKind::Immunoassay => {
                        collect_summaries::<ImmunoassayProcess>(tx, sample_id, &mut processes)
                    }
                }
            }
            processes.sort_by(|a, b| b.0.cmp(&a.0));

            let completion = aggregator::tally(tx, enabled, sample_id);
            let can_auto_complete =
                sample.state() == SampleState::Processing && completion.all_processes_completed();

            Ok(SampleOverview {
                allowed_actions: sample.allowed_actions(),
                processes: processes.into_iter().map(|(_, s)| s).collect(),
                completion,
                all_processes_completed: completion.all_processes_completed(),
                can_auto_complete,
                sample,
            })
        })
    }

    /// Deletes a sample and every process it owns.
    ///
    /// Returns the number of processes removed with it.
    pub fn delete_sample(&self, sample_id: RecordId) -> WorkflowResult<usize> {
        let result = self.store.transaction(|tx| {
            tx.samples().require(sample_id)?;
            let removed = delete_processes(tx, sample_id);
            tx.samples().delete_where(&|s: &Sample| s.id() == sample_id);
            Ok(removed)
        });
        if let Ok(removed) = &result {
            tracing::info!("deleted sample {} and {} processes", sample_id, removed);
        }
        result
    }

    /// Deletes every sample of an order, with their processes. Called when the order itself
    /// is deleted.
    ///
    /// Returns the number of samples removed.
    pub fn delete_samples_for_order(&self, order: &ExternalRef) -> WorkflowResult<usize> {
        let result = self.store.transaction(|tx| {
            let samples = tx.samples().search(&|s: &Sample| s.lab_test() == order);
            for sample in &samples {
                delete_processes(tx, sample.id());
            }
            Ok(tx.samples().delete_where(&|s: &Sample| s.lab_test() == order))
        });
        if let Ok(removed) = &result {
            tracing::info!("deleted {} samples of order {}", removed, order);
        }
        result
    }

    // ----- processes -----

    /// Spawns an analysis process of the draft's kind.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::VariantDisabled` if the kind is not enabled.
    /// - `WorkflowError::NotFound` if the sample does not exist.
    /// - `WorkflowError::InvalidSampleState` unless the sample is received or processing.
    /// - `WorkflowError::ProcessAlreadyActive` if a process of the kind is still active.
    pub fn create_process(
        &self,
        sample_id: RecordId,
        draft: ProcessDraft,
    ) -> WorkflowResult<ProcessSummary> {
        Ok(match draft {
            ProcessDraft::Molecular(d) => self.create_process_of::<MolecularProcess>(sample_id, d)?.summary(),
            ProcessDraft::Histopathology(d) => {
                self.create_process_of::<HistopathologyProcess>(sample_id, d)?.summary()
            }
            ProcessDraft::Immunoassay(d) => {
                self.create_process_of::<ImmunoassayProcess>(sample_id, d)?.summary()
            }
        })
    }

    /// Typed form of [`WorkflowService::create_process`].
    ///
    /// A sample still in `received` moves to `processing` in the same transaction.
    pub fn create_process_of<P: AnalysisProcess>(
        &self,
        sample_id: RecordId,
        draft: P::Draft,
    ) -> WorkflowResult<P> {
        self.ensure_enabled(P::PROCESS_KIND)?;
        let now = Utc::now();

        let result = self.store.transaction(|tx| {
            let mut sample = tx.samples().require(sample_id)?;
            if !sample.state().accepts_processes() {
                return Err(WorkflowError::InvalidSampleState {
                    sample_id,
                    state: sample.state(),
                });
            }
            process::ensure_no_active::<P>(tx, sample_id)?;

            let created = P::create(sample_id, draft, now)?;
            P::repository(tx).insert(created.clone())?;

            if sample.promote_to_processing(now)? {
                tx.samples().update(sample)?;
            }
            Ok(created)
        });

        match &result {
            Ok(p) => tracing::info!(
                "created {} process {} for sample {} in {}",
                P::PROCESS_KIND,
                p.id(),
                sample_id,
                p.state().as_str()
            ),
            Err(e) => tracing::warn!(
                "create {} process for sample {} refused: {}",
                P::PROCESS_KIND,
                sample_id,
                e
            ),
        }
        result
    }

    /// Applies a parsed command to a process of its kind.
    pub fn advance(&self, process_id: RecordId, command: ProcessCommand) -> WorkflowResult<ProcessRecord> {
        Ok(match command {
            ProcessCommand::Molecular { action, patch } => self
                .advance_process::<MolecularProcess>(process_id, action, patch)?
                .into(),
            ProcessCommand::Histopathology { action, patch } => self
                .advance_process::<HistopathologyProcess>(process_id, action, patch)?
                .into(),
            ProcessCommand::Immunoassay { action, patch } => self
                .advance_process::<ImmunoassayProcess>(process_id, action, patch)?
                .into(),
        })
    }

    /// Moves a process along its lifecycle.
    ///
    /// `patch`, if given, is merged before the guard is checked, in the same transaction, so
    /// a caller can supply the fields a step needs together with the step itself. Starting a
    /// process moves a received sample to processing. With `auto_complete_samples` enabled,
    /// the process reaching a terminal state completes its sample when nothing else is
    /// active.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::VariantDisabled` if the kind is not enabled.
    /// - `WorkflowError::NotFound` if the process does not exist.
    /// - `WorkflowError::InvalidStateTransition` if the action is illegal now.
    /// - `WorkflowError::MissingRequiredField` if the step's guard fails.
    ///
    /// Nothing is written when any of these is returned.
    pub fn advance_process<P: AnalysisProcess>(
        &self,
        process_id: RecordId,
        action: P::Action,
        patch: Option<P::Patch>,
    ) -> WorkflowResult<P> {
        self.ensure_enabled(P::PROCESS_KIND)?;
        let enabled = self.cfg.enabled_processes();
        let auto_complete = self.cfg.auto_complete_samples();
        let now = Utc::now();

        let result = self.store.transaction(|tx| {
            let mut current = P::repository(tx).require(process_id)?;
            if let Some(patch) = patch {
                patch_active(&mut current, patch)?;
            }
            current.transition(action, now)?;
            P::repository(tx).update(current.clone())?;

            let promote = action.starts_processing();
            let finish = auto_complete && current.state().is_terminal();
            if promote || finish {
                let mut sample = tx.samples().require(current.sample_id())?;
                let mut changed = promote && sample.promote_to_processing(now)?;
                if finish && aggregator::can_auto_complete(tx, enabled, &sample) {
                    sample.apply(SampleAction::AutoComplete, now)?;
                    tracing::info!("sample {} auto-completed", sample.id());
                    changed = true;
                }
                if changed {
                    tx.samples().update(sample)?;
                }
            }
            Ok(current)
        });

        match &result {
            Ok(p) => tracing::info!(
                "{} process {} {} -> {}",
                P::PROCESS_KIND,
                process_id,
                action.as_str(),
                p.state().as_str()
            ),
            Err(e) => tracing::warn!(
                "{} process {} {} refused: {}",
                P::PROCESS_KIND,
                process_id,
                action.as_str(),
                e
            ),
        }
        result
    }

    /// Edits the fields of an active process without moving it.
    pub fn update_process(&self, process_id: RecordId, patch: ProcessPatch) -> WorkflowResult<ProcessRecord> {
        Ok(match patch {
            ProcessPatch::Molecular(p) => self.update_process_of::<MolecularProcess>(process_id, p)?.into(),
            ProcessPatch::Histopathology(p) => {
                self.update_process_of::<HistopathologyProcess>(process_id, p)?.into()
            }
            ProcessPatch::Immunoassay(p) => {
                self.update_process_of::<ImmunoassayProcess>(process_id, p)?.into()
            }
        })
    }

    /// Typed form of [`WorkflowService::update_process`].
    ///
    /// # Errors
    ///
    /// - `WorkflowError::NotFound` if the process does not exist.
    /// - `WorkflowError::InvalidStateTransition` if the process is already terminal.
    /// - `WorkflowError::InvalidInput` if a patched value is out of range.
    pub fn update_process_of<P: AnalysisProcess>(
        &self,
        process_id: RecordId,
        patch: P::Patch,
    ) -> WorkflowResult<P> {
        self.ensure_enabled(P::PROCESS_KIND)?;
        let result = self.store.transaction(|tx| {
            let mut current = P::repository(tx).require(process_id)?;
            patch_active(&mut current, patch)?;
            P::repository(tx).update(current.clone())?;
            Ok(current)
        });
        match &result {
            Ok(_) => tracing::info!("{} process {} updated", P::PROCESS_KIND, process_id),
            Err(e) => tracing::warn!(
                "{} process {} update refused: {}",
                P::PROCESS_KIND,
                process_id,
                e
            ),
        }
        result
    }

    pub fn get_process(&self, kind: ProcessKind, process_id: RecordId) -> WorkflowResult<ProcessRecord> {
        Ok(match kind {
            ProcessKind::Molecular => self.get_process_of::<MolecularProcess>(process_id)?.into(),
            ProcessKind::Histopathology => {
                self.get_process_of::<HistopathologyProcess>(process_id)?.into()
            }
            ProcessKind::Immunoassay => self.get_process_of::<ImmunoassayProcess>(process_id)?.into(),
        })
    }

    pub fn get_process_of<P: AnalysisProcess>(&self, process_id: RecordId) -> WorkflowResult<P> {
        self.ensure_enabled(P::PROCESS_KIND)?;
        self.store.snapshot(|tx| P::repository(tx).require(process_id))
    }
}

fn patch_active<P: AnalysisProcess>(process: &mut P, patch: P::Patch) -> WorkflowResult<()> {
    if !process.is_active() {
        return Err(WorkflowError::InvalidStateTransition {
            entity: P::RECORD_KIND,
            state: process.state().as_str(),
            action: "update",
        });
    }
    process.apply_patch(patch)
}

fn collect_summaries<P: AnalysisProcess>(
    tx: &mut dyn Transaction,
    sample_id: RecordId,
    out: &mut Vec<(DateTime<Utc>, ProcessSummary)>,
) {
    out.extend(
        process::processes_for_sample::<P>(tx, sample_id)
            .iter()
            .map(|p| (p.created_at(), p.summary())),
    );
}

/// Cascade for a sample: removes its processes of every kind, enabled or not.
fn delete_processes(tx: &mut dyn Transaction, sample_id: RecordId) -> usize {
    process::delete_for_sample::<MolecularProcess>(tx, sample_id)
        + process::delete_for_sample::<HistopathologyProcess>(tx, sample_id)
        + process::delete_for_sample::<ImmunoassayProcess>(tx, sample_id)
}
