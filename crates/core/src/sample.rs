//! Workflow sample: one physical specimen traveling through the lab.
//!
//! ```text
//! pending → collected → in_transit → received → processing → completed
//!               └──────────────────────┘
//! rejected is reachable from every non-terminal state
//! ```
//!
//! `completed` and `rejected` are terminal. The state and the checkpoint timestamps are
//! system-controlled: they change only through [`Sample::apply`], never by direct
//! assignment.

use crate::repositories::{Record, RecordKind};
use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use lab_types::{ExternalRef, NonEmptyText};
use lab_uuid::RecordId;
use serde::{Deserialize, Serialize};

coded_enum! {
    /// Kind of specimen collected.
    #[derive(Default)]
    pub enum SampleType ("sample type") {
        #[default]
        Blood => ("blood", "Blood"),
        Urine => ("urine", "Urine"),
        Stool => ("stool", "Stool"),
        TissueFormalin => ("tissue_formalin", "Tissue Fixed in Formalin"),
        TissueParaffin => ("tissue_paraffin", "Paraffin Block"),
        SmearExfoliative => ("smear_exfoliative", "Exfoliative Smear"),
        SmearPuncture => ("smear_puncture", "Puncture Smear"),
        Secretion => ("secretion", "Secretion"),
        Sputum => ("sputum", "Sputum"),
        Saliva => ("saliva", "Saliva"),
        Csf => ("csf", "Cerebrospinal Fluid"),
        Other => ("other", "Other"),
    }
}

coded_enum! {
    /// Lifecycle state of a sample.
    #[derive(Default)]
    pub enum SampleState ("sample state") {
        #[default]
        Pending => ("pending", "Pending Collection"),
        Collected => ("collected", "Collected"),
        InTransit => ("in_transit", "In Transit"),
        Received => ("received", "Received at Lab"),
        Processing => ("processing", "Processing"),
        Completed => ("completed", "Completed"),
        Rejected => ("rejected", "Rejected"),
    }
}

impl SampleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SampleState::Completed | SampleState::Rejected)
    }

    /// Analysis processes may only be spawned while the sample is at the lab.
    pub fn accepts_processes(&self) -> bool {
        matches!(self, SampleState::Received | SampleState::Processing)
    }
}

coded_enum! {
    /// Operations that move a sample through its lifecycle.
    pub enum SampleAction ("sample action") {
        Collect => ("collect", "Collect"),
        Dispatch => ("dispatch", "Dispatch"),
        Receive => ("receive", "Receive"),
        Process => ("process", "Start Processing"),
        Complete => ("complete", "Complete"),
        /// Same edge as [`SampleAction::Complete`], additionally gated by the completion
        /// aggregator in the workflow service.
        AutoComplete => ("auto_complete", "Auto Complete"),
        Reject => ("reject", "Reject"),
    }
}

/// The sample transition table. `None` means the edge does not exist.
pub fn next_sample_state(state: SampleState, action: SampleAction) -> Option<SampleState> {
    use SampleAction::*;
    use SampleState::*;

    match (action, state) {
        (Collect, Pending) => Some(Collected),
        (Dispatch, Collected) => Some(InTransit),
        (Receive, Collected | InTransit) => Some(Received),
        (Process, Received) => Some(Processing),
        (Complete | AutoComplete, Processing) => Some(Completed),
        (Reject, current) if !current.is_terminal() => Some(Rejected),
        _ => None,
    }
}

/// One physical specimen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    id: RecordId,
    /// Order number copied from the lab test order; follows the sample through every process.
    order_number: NonEmptyText,
    /// Owning lab test order.
    lab_test: ExternalRef,
    pub origin_institution: Option<ExternalRef>,
    pub sample_type: SampleType,
    state: SampleState,
    created_at: DateTime<Utc>,
    collection_date: Option<DateTime<Utc>>,
    received_date: Option<DateTime<Utc>>,
    completion_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Sample {
    /// Creates a sample in `pending`.
    pub fn new(
        lab_test: ExternalRef,
        order_number: NonEmptyText,
        sample_type: SampleType,
        origin_institution: Option<ExternalRef>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            order_number,
            lab_test,
            origin_institution,
            sample_type,
            state: SampleState::Pending,
            created_at: now,
            collection_date: None,
            received_date: None,
            completion_date: None,
            notes: crate::validation::clean_text(notes),
        }
    }

    pub fn order_number(&self) -> &NonEmptyText {
        &self.order_number
    }

    pub fn lab_test(&self) -> &ExternalRef {
        &self.lab_test
    }

    pub fn state(&self) -> SampleState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn collection_date(&self) -> Option<DateTime<Utc>> {
        self.collection_date
    }

    pub fn received_date(&self) -> Option<DateTime<Utc>> {
        self.received_date
    }

    pub fn completion_date(&self) -> Option<DateTime<Utc>> {
        self.completion_date
    }

    /// Applies `action`, stamping the matching checkpoint date.
    ///
    /// Returns the state the sample was in before the transition.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidStateTransition`] if the edge does not exist from the
    /// current state. The sample is left untouched in that case.
    pub fn apply(&mut self, action: SampleAction, now: DateTime<Utc>) -> WorkflowResult<SampleState> {
        let from = self.state;
        let to = next_sample_state(from, action).ok_or(WorkflowError::InvalidStateTransition {
            entity: RecordKind::Sample,
            state: from.as_str(),
            action: action.as_str(),
        })?;

        match action {
            SampleAction::Collect => self.collection_date = Some(now),
            SampleAction::Receive => self.received_date = Some(now),
            SampleAction::Complete | SampleAction::AutoComplete => {
                self.completion_date = Some(now)
            }
            SampleAction::Dispatch | SampleAction::Process | SampleAction::Reject => {}
        }
        self.state = to;

        Ok(from)
    }

    /// The first analysis process to start implicitly moves a received sample into
    /// processing. Returns true if the sample changed.
    pub fn promote_to_processing(&mut self, now: DateTime<Utc>) -> WorkflowResult<bool> {
        if self.state != SampleState::Received {
            return Ok(false);
        }
        self.apply(SampleAction::Process, now)?;
        Ok(true)
    }

    /// Actions with an edge out of the current state. `auto_complete` is left out because it
    /// also depends on the sample's processes.
    pub fn allowed_actions(&self) -> Vec<SampleAction> {
        SampleAction::ALL
            .iter()
            .copied()
            .filter(|a| *a != SampleAction::AutoComplete)
            .filter(|a| next_sample_state(self.state, *a).is_some())
            .collect()
    }
}

impl Record for Sample {
    const RECORD_KIND: RecordKind = RecordKind::Sample;

    fn id(&self) -> RecordId {
        self.id
    }
}
