//! # Lab Core
//!
//! Core business logic for the laboratory sample workflow.
//!
//! This crate tracks physical specimens through collection, transit and lab processing, and
//! coordinates the analysis processes (molecular biology, histopathology, immunoassay) that
//! run against them:
//! - the sample state machine and its creation gate for processes
//! - one state machine per process kind, with guarded steps
//! - the one-active-process-per-kind rule
//! - completion aggregation driving sample auto-completion
//! - transactional storage, in memory or as a JSON document on disk
//!
//! **No API concerns**: HTTP servers and command-line parsing belong in `api-rest` and `cli`.

#[macro_use]
mod macros;

pub mod aggregator;
pub mod config;
pub mod constants;
pub mod error;
pub mod orders;
pub mod process;
pub mod repositories;
pub mod sample;
pub mod service;
pub mod validation;

pub use config::{CoreConfig, EnabledProcesses, StoreBackend};
pub use error::{WorkflowError, WorkflowResult};
pub use lab_types::{ExternalRef, NonEmptyText, TextError};
pub use lab_uuid::RecordId;
pub use orders::{OrderDirectory, OrderSnapshot, OrderSource, StaticOrderDirectory};
pub use process::{
    AnalysisProcess, ProcessCommand, ProcessDraft, ProcessKind, ProcessPatch, ProcessRecord,
    ProcessSummary,
};
pub use repositories::{AnyStore, JsonFileStore, MemoryStore, Store};
pub use sample::{Sample, SampleAction, SampleState, SampleType};
pub use service::{SampleOverview, WorkflowService};
