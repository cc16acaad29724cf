//! Immunoassay process: `draft → in_progress → completed`, cancellable until terminal.

use super::markers::{validate_all, ImmunoassayAntibody};
use super::{refuse, AnalysisProcess, ProcessAction, ProcessKind, ProcessState};
use crate::repositories::{Record, RecordKind, Repository, Transaction};
use crate::validation::clean_text;
use crate::WorkflowResult;
use chrono::{DateTime, NaiveDate, Utc};
use lab_types::{ExternalRef, NonEmptyText};
use lab_uuid::RecordId;
use serde::{Deserialize, Serialize};

coded_enum! {
    #[derive(Default)]
    pub enum ImmunoassayState ("immunoassay state") {
        #[default]
        Draft => ("draft", "Draft"),
        InProgress => ("in_progress", "In Progress"),
        Completed => ("completed", "Completed"),
        Cancelled => ("cancelled", "Cancelled"),
    }
}

impl ProcessState for ImmunoassayState {
    fn as_str(&self) -> &'static str {
        ImmunoassayState::as_str(self)
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ImmunoassayState::Completed | ImmunoassayState::Cancelled)
    }
}

coded_enum! {
    pub enum ImmunoassayAction ("immunoassay action") {
        Start => ("start", "Start Process"),
        Complete => ("complete" | "complete_process", "Complete Process"),
        Cancel => ("cancel", "Cancel"),
    }
}

impl ProcessAction for ImmunoassayAction {
    fn as_str(&self) -> &'static str {
        ImmunoassayAction::as_str(self)
    }

    fn starts_processing(&self) -> bool {
        matches!(self, ImmunoassayAction::Start)
    }
}

coded_enum! {
    #[derive(Default)]
    pub enum AssayType ("assay type") {
        #[default]
        Elisa => ("elisa", "ELISA (Enzyme-Linked Immunosorbent Assay)"),
        Clia => ("clia", "CLIA (Chemiluminescent Immunoassay)"),
    }
}

coded_enum! {
    pub enum ControlResult ("control result") {
        Pass => ("pass", "Pass"),
        Fail => ("fail", "Fail"),
        NotDone => ("not_done", "Not Done"),
    }
}

/// Creation fields.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImmunoassayDraft {
    #[serde(default)]
    pub assay_type: AssayType,
    pub kit_name: NonEmptyText,
    #[serde(default)]
    pub kit_lot: Option<String>,
    #[serde(default)]
    pub kit_expiry: Option<NaiveDate>,
    pub responsible_professional: ExternalRef,
    #[serde(default)]
    pub observations: Option<String>,
}

/// Editable fields.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImmunoassayPatch {
    pub kit_name: Option<NonEmptyText>,
    pub kit_lot: Option<String>,
    pub kit_expiry: Option<NaiveDate>,
    pub positive_control: Option<ControlResult>,
    pub negative_control: Option<ControlResult>,
    pub observations: Option<String>,
    pub interpretation: Option<String>,
    /// Replaces the whole antibody list.
    pub antibodies: Option<Vec<ImmunoassayAntibody>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImmunoassayProcess {
    id: RecordId,
    sample_id: RecordId,
    state: ImmunoassayState,
    created_at: DateTime<Utc>,
    pub assay_type: AssayType,
    pub kit_name: NonEmptyText,
    pub kit_lot: Option<String>,
    pub kit_expiry: Option<NaiveDate>,
    pub responsible_professional: ExternalRef,
    processing_date: Option<DateTime<Utc>>,
    delivery_date: Option<DateTime<Utc>>,
    pub positive_control: Option<ControlResult>,
    pub negative_control: Option<ControlResult>,
    pub antibodies: Vec<ImmunoassayAntibody>,
    pub observations: Option<String>,
    pub interpretation: Option<String>,
}

impl ImmunoassayProcess {
    pub fn processing_date(&self) -> Option<DateTime<Utc>> {
        self.processing_date
    }

    pub fn delivery_date(&self) -> Option<DateTime<Utc>> {
        self.delivery_date
    }
}

impl Record for ImmunoassayProcess {
    const RECORD_KIND: RecordKind = RecordKind::ImmunoassayProcess;

    fn id(&self) -> RecordId {
        self.id
    }
}

impl AnalysisProcess for ImmunoassayProcess {
    const PROCESS_KIND: ProcessKind = ProcessKind::Immunoassay;

    type State = ImmunoassayState;
    type Action = ImmunoassayAction;
    type Draft = ImmunoassayDraft;
    type Patch = ImmunoassayPatch;

    fn create(sample_id: RecordId, draft: ImmunoassayDraft, now: DateTime<Utc>) -> WorkflowResult<Self> {
        Ok(Self {
            id: RecordId::new(),
            sample_id,
            state: ImmunoassayState::Draft,
            created_at: now,
            assay_type: draft.assay_type,
            kit_name: draft.kit_name,
            kit_lot: clean_text(draft.kit_lot),
            kit_expiry: draft.kit_expiry,
            responsible_professional: draft.responsible_professional,
            processing_date: None,
            delivery_date: None,
            positive_control: None,
            negative_control: None,
            antibodies: Vec::new(),
            observations: clean_text(draft.observations),
            interpretation: None,
        })
    }

    fn sample_id(&self) -> RecordId {
        self.sample_id
    }

    fn state(&self) -> ImmunoassayState {
        self.state
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply_patch(&mut self, patch: ImmunoassayPatch) -> WorkflowResult<()> {
        if let Some(antibodies) = &patch.antibodies {
            validate_all(antibodies, ImmunoassayAntibody::validate)?;
        }

        if let Some(v) = patch.kit_name {
            self.kit_name = v;
        }
        if patch.kit_lot.is_some() {
            self.kit_lot = clean_text(patch.kit_lot);
        }
        if let Some(v) = patch.kit_expiry {
            self.kit_expiry = Some(v);
        }
        if let Some(v) = patch.positive_control {
            self.positive_control = Some(v);
        }
        if let Some(v) = patch.negative_control {
            self.negative_control = Some(v);
        }
        if patch.observations.is_some() {
            self.observations = clean_text(patch.observations);
        }
        if patch.interpretation.is_some() {
            self.interpretation = clean_text(patch.interpretation);
        }
        if let Some(v) = patch.antibodies {
            self.antibodies = v;
        }
        Ok(())
    }

    fn transition(&mut self, action: ImmunoassayAction, now: DateTime<Utc>) -> WorkflowResult<()> {
        use ImmunoassayAction as A;
        use ImmunoassayState as S;

        match (action, self.state) {
            (A::Start, S::Draft) => {
                self.state = S::InProgress;
                self.processing_date = Some(now);
            }
            (A::Complete, S::InProgress) => {
                self.state = S::Completed;
                self.delivery_date = Some(now);
            }
            (A::Cancel, state) if !ProcessState::is_terminal(&state) => {
                self.state = S::Cancelled;
            }
            (action, state) => return Err(refuse::<Self>(state, action)),
        }
        Ok(())
    }

    fn repository(tx: &mut dyn Transaction) -> &mut dyn Repository<Self> {
        tx.immunoassay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkflowError;
    use serde_json::json;

    fn draft() -> ImmunoassayDraft {
        serde_json::from_value(json!({
            "kit_name": "Anti-HCV ELISA",
            "kit_lot": " L-204 ",
            "kit_expiry": "2027-03-31",
            "responsible_professional": "HP-22",
        }))
        .unwrap()
    }

    fn process() -> ImmunoassayProcess {
        ImmunoassayProcess::create(RecordId::new(), draft(), Utc::now()).unwrap()
    }

    #[test]
    fn created_in_draft_with_defaults() {
        let p = process();
        assert_eq!(p.state(), ImmunoassayState::Draft);
        assert_eq!(p.assay_type, AssayType::Elisa);
        assert_eq!(p.kit_lot.as_deref(), Some("L-204"));
        assert!(p.is_active());
    }

    #[test]
    fn kit_name_is_required() {
        let result = serde_json::from_value::<ImmunoassayDraft>(json!({
            "responsible_professional": "HP-22",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn start_then_complete_stamps_dates() {
        let mut p = process();
        let now = Utc::now();

        p.transition(ImmunoassayAction::Start, now).unwrap();
        assert_eq!(p.state(), ImmunoassayState::InProgress);
        assert_eq!(p.processing_date(), Some(now));

        p.transition(ImmunoassayAction::Complete, now).unwrap();
        assert_eq!(p.state(), ImmunoassayState::Completed);
        assert_eq!(p.delivery_date(), Some(now));
        assert!(!p.is_active());
    }

    #[test]
    fn complete_from_draft_is_refused() {
        let mut p = process();
        let err = p.transition(ImmunoassayAction::Complete, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidStateTransition {
                entity: RecordKind::ImmunoassayProcess,
                state: "draft",
                action: "complete",
            }
        ));
        assert_eq!(p.state(), ImmunoassayState::Draft);
    }

    #[test]
    fn cancel_until_terminal() {
        let mut p = process();
        p.transition(ImmunoassayAction::Cancel, Utc::now()).unwrap();
        assert_eq!(p.state(), ImmunoassayState::Cancelled);
        assert!(p.transition(ImmunoassayAction::Cancel, Utc::now()).is_err());
        assert!(p.transition(ImmunoassayAction::Start, Utc::now()).is_err());
    }

    #[test]
    fn patch_records_results() {
        let mut p = process();
        let patch: ImmunoassayPatch = serde_json::from_value(json!({
            "positive_control": "pass",
            "negative_control": "not_done",
            "antibodies": [
                { "name": "Anti-HCV", "quantitative_result": 0.3, "unit": "index",
                  "qualitative_result": "negative", "interpretation": "non_reactive" }
            ]
        }))
        .unwrap();

        p.apply_patch(patch).unwrap();
        assert_eq!(p.positive_control, Some(ControlResult::Pass));
        assert_eq!(p.antibodies.len(), 1);
        assert_eq!(p.kit_name.as_str(), "Anti-HCV ELISA");
    }

    #[test]
    fn unknown_patch_field_is_rejected() {
        let result = serde_json::from_value::<ImmunoassayPatch>(json!({ "state": "completed" }));
        assert!(result.is_err());
    }
}
