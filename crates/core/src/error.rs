use crate::process::ProcessKind;
use crate::repositories::RecordKind;
use crate::sample::SampleState;
use lab_types::{ExternalRef, TextError};
use lab_uuid::{RecordId, UuidError};

#[allow(clippy::single_component_path_imports)]
use serde_yaml;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },
    #[error("cannot {action} {entity} in state '{state}'")]
    InvalidStateTransition {
        entity: RecordKind,
        state: &'static str,
        action: &'static str,
    },
    #[error(
        "sample {sample_id} is '{state}'; analysis processes can only be created while received or processing"
    )]
    InvalidSampleState {
        sample_id: RecordId,
        state: SampleState,
    },
    #[error("an active {kind} process already exists for sample {sample_id}")]
    ProcessAlreadyActive {
        kind: ProcessKind,
        sample_id: RecordId,
    },
    #[error("missing required field: {field}")]
    MissingRequiredField { field: &'static str },
    #[error("a workflow sample already exists for lab test order {order}")]
    DuplicateWorkflow { order: ExternalRef },

    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} processes are not enabled in this deployment")]
    VariantDisabled(ProcessKind),

    #[error("failed to read workflow store: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write workflow store: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to serialize workflow store: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize JSON: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
    #[error("workflow store lock poisoned")]
    StorePoisoned,
}

impl WorkflowError {
    pub(crate) fn not_found(kind: RecordKind, id: impl ToString) -> Self {
        WorkflowError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True for the errors a caller can fix by changing the request (as opposed to storage
    /// failures).
    pub fn is_caller_error(&self) -> bool {
        !matches!(
            self,
            WorkflowError::FileRead(_)
                | WorkflowError::FileWrite(_)
                | WorkflowError::Serialization(_)
                | WorkflowError::Deserialization(_)
                | WorkflowError::YamlDeserialization(_)
                | WorkflowError::StorePoisoned
        )
    }
}

impl From<TextError> for WorkflowError {
    fn from(e: TextError) -> Self {
        WorkflowError::InvalidInput(e.to_string())
    }
}

impl From<UuidError> for WorkflowError {
    fn from(e: UuidError) -> Self {
        WorkflowError::InvalidInput(e.to_string())
    }
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
