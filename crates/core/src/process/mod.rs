//! Analysis processes.
//!
//! Three kinds of laboratory procedure can run against a sample: molecular biology,
//! histopathology and immunoassay. Each is its own state machine, but all share one contract
//! ([`AnalysisProcess`]):
//!
//! - creation starts in `draft` (histopathology cytology studies start in `cutting`),
//! - `cancel` is legal from every non-terminal state,
//! - `completed` and `cancelled` are terminal,
//! - at most one non-terminal process of a kind may exist per sample.
//!
//! The exclusivity rule is enforced by [`ensure_no_active`], which must run inside the same
//! store transaction as the insert it guards.

pub mod histopathology;
pub mod immunoassay;
pub mod markers;
pub mod molecular;

pub use histopathology::{HistopathologyAction, HistopathologyProcess, HistopathologyState};
pub use immunoassay::{ImmunoassayAction, ImmunoassayProcess, ImmunoassayState};
pub use molecular::{MolecularAction, MolecularProcess, MolecularState};

use crate::repositories::{Record, RecordKind, Repository, Transaction};
use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use lab_uuid::RecordId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::str::FromStr;

coded_enum! {
    /// The three analysis process kinds.
    #[derive(PartialOrd, Ord)]
    pub enum ProcessKind ("process kind") {
        Molecular => ("molecular" | "molecular_biology", "Molecular Biology"),
        Histopathology => ("histopathology", "Histopathology"),
        Immunoassay => ("immunoassay", "Immunoassay"),
    }
}

impl ProcessKind {
    pub fn record_kind(&self) -> RecordKind {
        match self {
            ProcessKind::Molecular => RecordKind::MolecularProcess,
            ProcessKind::Histopathology => RecordKind::HistopathologyProcess,
            ProcessKind::Immunoassay => RecordKind::ImmunoassayProcess,
        }
    }
}

/// Lifecycle state of one process kind.
pub trait ProcessState: Copy + PartialEq + Debug {
    fn as_str(&self) -> &'static str;

    /// `completed` and `cancelled`.
    fn is_terminal(&self) -> bool;
}

/// Operation on one process kind.
pub trait ProcessAction: Copy + Debug + FromStr<Err = WorkflowError> {
    fn as_str(&self) -> &'static str;

    /// The action that takes a process out of `draft`. Starting a process also moves a
    /// received sample into processing.
    fn starts_processing(&self) -> bool;
}

/// Shared contract of the three process state machines.
pub trait AnalysisProcess: Record + Serialize + DeserializeOwned + Debug {
    const PROCESS_KIND: ProcessKind;

    type State: ProcessState;
    type Action: ProcessAction;
    /// Fields supplied at creation.
    type Draft: DeserializeOwned + Debug;
    /// Editable fields. Every field is optional; `None` leaves the stored value alone.
    type Patch: DeserializeOwned + Default + Debug;

    /// Builds a new process for `sample_id` in its initial state.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if the draft carries invalid values.
    fn create(sample_id: RecordId, draft: Self::Draft, now: DateTime<Utc>) -> WorkflowResult<Self>;

    fn sample_id(&self) -> RecordId;

    fn state(&self) -> Self::State;

    fn created_at(&self) -> DateTime<Utc>;

    /// Merges `patch` into the process.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if a patched value is out of range.
    fn apply_patch(&mut self, patch: Self::Patch) -> WorkflowResult<()>;

    /// Applies `action`, checking its guard first.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::InvalidStateTransition` if the action is illegal in the current state.
    /// - `WorkflowError::MissingRequiredField` if a guard precondition is unmet.
    ///
    /// On error the process is unchanged.
    fn transition(&mut self, action: Self::Action, now: DateTime<Utc>) -> WorkflowResult<()>;

    /// This kind's collection inside a store transaction.
    fn repository(tx: &mut dyn Transaction) -> &mut dyn Repository<Self>;

    fn is_active(&self) -> bool {
        !self.state().is_terminal()
    }

    fn summary(&self) -> ProcessSummary {
        ProcessSummary {
            id: self.id(),
            kind: Self::PROCESS_KIND,
            state: self.state().as_str(),
            active: self.is_active(),
        }
    }
}

/// Error for an action that has no edge out of `state`.
pub(crate) fn refuse<P: AnalysisProcess>(state: P::State, action: P::Action) -> WorkflowError {
    WorkflowError::InvalidStateTransition {
        entity: P::RECORD_KIND,
        state: state.as_str(),
        action: action.as_str(),
    }
}

/// Processes of kind `P` owned by `sample_id`.
pub fn processes_for_sample<P: AnalysisProcess>(
    tx: &mut dyn Transaction,
    sample_id: RecordId,
) -> Vec<P> {
    P::repository(tx).search(&|p: &P| p.sample_id() == sample_id)
}

/// Fails if `sample_id` already has a non-terminal process of kind `P`.
///
/// # Errors
///
/// Returns `WorkflowError::ProcessAlreadyActive` if such a process exists.
pub fn ensure_no_active<P: AnalysisProcess>(
    tx: &mut dyn Transaction,
    sample_id: RecordId,
) -> WorkflowResult<()> {
    let active = P::repository(tx).search(&|p: &P| p.sample_id() == sample_id && p.is_active());
    if active.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::ProcessAlreadyActive {
            kind: P::PROCESS_KIND,
            sample_id,
        })
    }
}

/// Removes every process of kind `P` owned by `sample_id`.
pub(crate) fn delete_for_sample<P: AnalysisProcess>(
    tx: &mut dyn Transaction,
    sample_id: RecordId,
) -> usize {
    P::repository(tx).delete_where(&|p: &P| p.sample_id() == sample_id)
}

/// Parses a JSON payload for one process kind. Malformed payloads are the caller's fault.
pub(crate) fn payload_from_json<T: DeserializeOwned>(
    kind: ProcessKind,
    what: &str,
    value: serde_json::Value,
) -> WorkflowResult<T> {
    serde_json::from_value(value)
        .map_err(|e| WorkflowError::InvalidInput(format!("invalid {kind} {what}: {e}")))
}

/// Id, kind and state of one process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub id: RecordId,
    pub kind: ProcessKind,
    pub state: &'static str,
    pub active: bool,
}

/// Creation input for any process kind.
#[derive(Debug)]
pub enum ProcessDraft {
    Molecular(molecular::MolecularDraft),
    Histopathology(histopathology::HistopathologyDraft),
    Immunoassay(immunoassay::ImmunoassayDraft),
}

impl ProcessDraft {
    pub fn kind(&self) -> ProcessKind {
        match self {
            ProcessDraft::Molecular(_) => ProcessKind::Molecular,
            ProcessDraft::Histopathology(_) => ProcessKind::Histopathology,
            ProcessDraft::Immunoassay(_) => ProcessKind::Immunoassay,
        }
    }

    /// Parses the creation fields of `kind` from JSON.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if the payload does not match the kind's fields.
    pub fn from_json(kind: ProcessKind, value: serde_json::Value) -> WorkflowResult<Self> {
        Ok(match kind {
            ProcessKind::Molecular => {
                ProcessDraft::Molecular(payload_from_json(kind, "draft", value)?)
            }
            ProcessKind::Histopathology => {
                ProcessDraft::Histopathology(payload_from_json(kind, "draft", value)?)
            }
            ProcessKind::Immunoassay => {
                ProcessDraft::Immunoassay(payload_from_json(kind, "draft", value)?)
            }
        })
    }
}

/// Field changes for any process kind.
#[derive(Debug)]
pub enum ProcessPatch {
    Molecular(molecular::MolecularPatch),
    Histopathology(histopathology::HistopathologyPatch),
    Immunoassay(immunoassay::ImmunoassayPatch),
}

impl ProcessPatch {
    /// Parses the editable fields of `kind` from JSON.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` on unknown or malformed fields.
    pub fn from_json(kind: ProcessKind, value: serde_json::Value) -> WorkflowResult<Self> {
        Ok(match kind {
            ProcessKind::Molecular => {
                ProcessPatch::Molecular(payload_from_json(kind, "patch", value)?)
            }
            ProcessKind::Histopathology => {
                ProcessPatch::Histopathology(payload_from_json(kind, "patch", value)?)
            }
            ProcessKind::Immunoassay => {
                ProcessPatch::Immunoassay(payload_from_json(kind, "patch", value)?)
            }
        })
    }
}

/// An action on any process kind, with optional field changes applied first.
#[derive(Debug)]
pub enum ProcessCommand {
    Molecular {
        action: MolecularAction,
        patch: Option<molecular::MolecularPatch>,
    },
    Histopathology {
        action: HistopathologyAction,
        patch: Option<histopathology::HistopathologyPatch>,
    },
    Immunoassay {
        action: ImmunoassayAction,
        patch: Option<immunoassay::ImmunoassayPatch>,
    },
}

impl ProcessCommand {
    /// Parses an action code and an optional JSON patch for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if the action is unknown for the kind or the
    /// patch is malformed.
    pub fn parse(
        kind: ProcessKind,
        action: &str,
        patch: Option<serde_json::Value>,
    ) -> WorkflowResult<Self> {
        Ok(match kind {
            ProcessKind::Molecular => ProcessCommand::Molecular {
                action: action.parse()?,
                patch: patch
                    .map(|v| payload_from_json(kind, "patch", v))
                    .transpose()?,
            },
            ProcessKind::Histopathology => ProcessCommand::Histopathology {
                action: action.parse()?,
                patch: patch
                    .map(|v| payload_from_json(kind, "patch", v))
                    .transpose()?,
            },
            ProcessKind::Immunoassay => ProcessCommand::Immunoassay {
                action: action.parse()?,
                patch: patch
                    .map(|v| payload_from_json(kind, "patch", v))
                    .transpose()?,
            },
        })
    }

    pub fn kind(&self) -> ProcessKind {
        match self {
            ProcessCommand::Molecular { .. } => ProcessKind::Molecular,
            ProcessCommand::Histopathology { .. } => ProcessKind::Histopathology,
            ProcessCommand::Immunoassay { .. } => ProcessKind::Immunoassay,
        }
    }
}

/// A stored process of any kind, tagged with its kind when serialized.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessRecord {
    Molecular(MolecularProcess),
    Histopathology(HistopathologyProcess),
    Immunoassay(ImmunoassayProcess),
}

impl ProcessRecord {
    pub fn summary(&self) -> ProcessSummary {
        match self {
            ProcessRecord::Molecular(p) => p.summary(),
            ProcessRecord::Histopathology(p) => p.summary(),
            ProcessRecord::Immunoassay(p) => p.summary(),
        }
    }

    pub fn sample_id(&self) -> RecordId {
        match self {
            ProcessRecord::Molecular(p) => p.sample_id(),
            ProcessRecord::Histopathology(p) => p.sample_id(),
            ProcessRecord::Immunoassay(p) => p.sample_id(),
        }
    }
}

impl From<MolecularProcess> for ProcessRecord {
    fn from(p: MolecularProcess) -> Self {
        ProcessRecord::Molecular(p)
    }
}

impl From<HistopathologyProcess> for ProcessRecord {
    fn from(p: HistopathologyProcess) -> Self {
        ProcessRecord::Histopathology(p)
    }
}

impl From<ImmunoassayProcess> for ProcessRecord {
    fn from(p: ImmunoassayProcess) -> Self {
        ProcessRecord::Immunoassay(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_codes_and_aliases() {
        assert_eq!("molecular".parse::<ProcessKind>().unwrap(), ProcessKind::Molecular);
        assert_eq!(
            "molecular_biology".parse::<ProcessKind>().unwrap(),
            ProcessKind::Molecular
        );
        assert_eq!(ProcessKind::Histopathology.label(), "Histopathology");
        assert_eq!(ProcessKind::Immunoassay.to_string(), "immunoassay");
        assert!(matches!(
            "serology".parse::<ProcessKind>(),
            Err(WorkflowError::InvalidInput(_))
        ));
    }

    #[test]
    fn kinds_order_stably() {
        let mut kinds = vec![
            ProcessKind::Immunoassay,
            ProcessKind::Molecular,
            ProcessKind::Histopathology,
        ];
        kinds.sort();
        assert_eq!(kinds, ProcessKind::ALL.to_vec());
    }

    #[test]
    fn draft_from_json_picks_kind() {
        let draft = ProcessDraft::from_json(
            ProcessKind::Immunoassay,
            json!({ "kit_name": "Anti-HCV", "responsible_professional": "HP-1" }),
        )
        .unwrap();
        assert_eq!(draft.kind(), ProcessKind::Immunoassay);
    }

    #[test]
    fn malformed_draft_is_invalid_input() {
        let err = ProcessDraft::from_json(ProcessKind::Immunoassay, json!({ "kit_name": 3 }))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
    }

    #[test]
    fn command_parses_action_for_kind() {
        let cmd = ProcessCommand::parse(
            ProcessKind::Histopathology,
            "complete_macroscopy",
            Some(json!({ "number_of_cuts": 3, "number_of_cassettes": 2 })),
        )
        .unwrap();
        match cmd {
            ProcessCommand::Histopathology { action, patch } => {
                assert_eq!(action, HistopathologyAction::CompleteMacroscopy);
                assert_eq!(patch.unwrap().number_of_cuts, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(ProcessCommand::parse(ProcessKind::Molecular, "complete_staining", None).is_err());
    }
}
