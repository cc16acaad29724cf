//! Request and response bodies.
//!
//! Core records are flattened into string-typed responses here so the OpenAPI schema stays
//! independent of the core crate's internal types. Process payloads are the exception: their
//! fields differ per kind and are passed through as JSON objects.

use chrono::{DateTime, Utc};
use lab_core::{
    ProcessRecord, ProcessSummary, Sample, SampleOverview, SampleState, WorkflowError,
    WorkflowResult,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSampleReq {
    /// Lab test order reference
    pub order: String,
    /// Sample type code, e.g. `blood`, `tissue_paraffin` (default `blood`)
    pub sample_type: Option<String>,
    pub origin_institution: Option<String>,
    pub notes: Option<String>,
}

fn rfc3339(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|d| d.to_rfc3339())
}

#[derive(Serialize, ToSchema)]
pub struct SampleRes {
    pub id: String,
    pub order_number: String,
    pub lab_test: String,
    pub origin_institution: Option<String>,
    pub sample_type: String,
    pub sample_type_label: String,
    pub state: String,
    pub state_label: String,
    pub created_at: String,
    pub collection_date: Option<String>,
    pub received_date: Option<String>,
    pub completion_date: Option<String>,
    pub notes: Option<String>,
}

impl From<&Sample> for SampleRes {
    fn from(s: &Sample) -> Self {
        use lab_core::repositories::Record;

        Self {
            id: s.id().to_string(),
            order_number: s.order_number().to_string(),
            lab_test: s.lab_test().to_string(),
            origin_institution: s.origin_institution.as_ref().map(ToString::to_string),
            sample_type: s.sample_type.as_str().into(),
            sample_type_label: s.sample_type.label().into(),
            state: s.state().as_str().into(),
            state_label: s.state().label().into(),
            created_at: s.created_at().to_rfc3339(),
            collection_date: rfc3339(s.collection_date()),
            received_date: rfc3339(s.received_date()),
            completion_date: rfc3339(s.completion_date()),
            notes: s.notes.clone(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ListSamplesRes {
    pub samples: Vec<SampleRes>,
}

#[derive(Serialize, ToSchema)]
pub struct ProcessSummaryRes {
    pub id: String,
    pub kind: String,
    pub state: String,
    pub active: bool,
}

impl From<&ProcessSummary> for ProcessSummaryRes {
    fn from(p: &ProcessSummary) -> Self {
        Self {
            id: p.id.to_string(),
            kind: p.kind.as_str().into(),
            state: p.state.into(),
            active: p.active,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SampleOverviewRes {
    pub sample: SampleRes,
    pub processes: Vec<ProcessSummaryRes>,
    pub active_processes: usize,
    pub total_processes: usize,
    pub all_processes_completed: bool,
    pub can_auto_complete: bool,
    pub allowed_actions: Vec<String>,
}

impl From<&SampleOverview> for SampleOverviewRes {
    fn from(o: &SampleOverview) -> Self {
        Self {
            sample: SampleRes::from(&o.sample),
            processes: o.processes.iter().map(ProcessSummaryRes::from).collect(),
            active_processes: o.completion.active,
            total_processes: o.completion.total,
            all_processes_completed: o.all_processes_completed,
            can_auto_complete: o.can_auto_complete,
            allowed_actions: o
                .allowed_actions
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CompletionRes {
    pub sample_id: String,
    pub all_processes_completed: bool,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteSampleRes {
    pub processes_removed: usize,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteOrderSamplesRes {
    pub samples_removed: usize,
}

#[derive(Serialize, ToSchema)]
pub struct OrderSampleStateRes {
    pub order: String,
    /// Sample state code, or `no_sample` when the order has no sample yet
    pub state: String,
}

impl OrderSampleStateRes {
    pub fn new(order: String, state: Option<SampleState>) -> Self {
        Self {
            order,
            state: state.map_or("no_sample", |s| s.as_str()).into(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateProcessReq {
    /// `molecular`, `histopathology` or `immunoassay`
    pub kind: String,
    /// Creation fields of the kind
    #[schema(value_type = Object)]
    #[serde(default = "empty_object")]
    pub fields: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Field changes for a process, in the shape of the kind's record.
#[derive(Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ProcessFieldsReq(#[schema(value_type = Object)] pub serde_json::Value);

#[derive(Deserialize, ToSchema, Default)]
pub struct ProcessActionReq {
    /// Field changes applied before the action's guard is checked
    #[schema(value_type = Option<Object>)]
    pub patch: Option<serde_json::Value>,
}

#[derive(Serialize, ToSchema)]
pub struct ProcessRes {
    pub id: String,
    pub kind: String,
    pub sample_id: String,
    pub state: String,
    /// Full process record
    #[schema(value_type = Object)]
    pub process: serde_json::Value,
}

impl ProcessRes {
    pub fn from_record(record: &ProcessRecord) -> WorkflowResult<Self> {
        let summary = record.summary();
        Ok(Self {
            id: summary.id.to_string(),
            kind: summary.kind.as_str().into(),
            sample_id: record.sample_id().to_string(),
            state: summary.state.into(),
            process: serde_json::to_value(record).map_err(WorkflowError::Serialization)?,
        })
    }
}
