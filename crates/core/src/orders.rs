//! Lab test orders, as seen by the workflow.
//!
//! Orders live outside this crate. The workflow only needs to know whether an order exists
//! and, at sample creation, a snapshot of the fields it copies onto the sample.

use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use lab_types::{ExternalRef, NonEmptyText};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Who the order was raised for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OrderSource {
    Patient(ExternalRef),
    /// Non-patient sources such as environmental or research specimens.
    Other(NonEmptyText),
}

/// Order fields read once, when the sample is created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_number: NonEmptyText,
    pub source: OrderSource,
    #[serde(default)]
    pub requesting_professional: Option<ExternalRef>,
    #[serde(default)]
    pub requested_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub origin_institution: Option<ExternalRef>,
}

/// Read access to lab test orders.
pub trait OrderDirectory: Send + Sync {
    /// Snapshot of `order`, or `None` if no such order exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory itself cannot be read.
    fn order_snapshot(&self, order: &ExternalRef) -> WorkflowResult<Option<OrderSnapshot>>;

    fn order_exists(&self, order: &ExternalRef) -> WorkflowResult<bool> {
        Ok(self.order_snapshot(order)?.is_some())
    }
}

/// Fixed set of orders, typically loaded from a YAML file at startup.
///
/// The file maps order references to snapshots:
///
/// ```yaml
/// ORD-2026-0001:
///   order_number: "2026-0001"
///   source: { type: patient, value: PAT-88 }
///   requesting_professional: HP-12
/// ```
#[derive(Clone, Debug, Default)]
pub struct StaticOrderDirectory {
    orders: HashMap<ExternalRef, OrderSnapshot>,
}

impl StaticOrderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(mut self, order: ExternalRef, snapshot: OrderSnapshot) -> Self {
        self.orders.insert(order, snapshot);
        self
    }

    /// Parses a YAML order map.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::YamlDeserialization` if the document is malformed or a field
    /// fails validation.
    pub fn from_yaml_str(raw: &str) -> WorkflowResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let orders: HashMap<ExternalRef, OrderSnapshot> =
            serde_yaml::from_str(raw).map_err(WorkflowError::YamlDeserialization)?;
        Ok(Self { orders })
    }

    /// Loads a YAML order map from disk.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::FileRead` if the file cannot be read.
    /// - `WorkflowError::YamlDeserialization` if it cannot be parsed.
    pub fn load(path: &Path) -> WorkflowResult<Self> {
        let raw = fs::read_to_string(path).map_err(WorkflowError::FileRead)?;
        let directory = Self::from_yaml_str(&raw)?;
        tracing::info!(
            "loaded {} lab test orders from {}",
            directory.len(),
            path.display()
        );
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl OrderDirectory for StaticOrderDirectory {
    fn order_snapshot(&self, order: &ExternalRef) -> WorkflowResult<Option<OrderSnapshot>> {
        Ok(self.orders.get(order).cloned())
    }
}
