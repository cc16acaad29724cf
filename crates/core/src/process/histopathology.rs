//! Histopathology process.
//!
//! ```text
//! draft → macroscopy → processing → cutting → staining → completed
//! ```
//!
//! Cytology studies need no paraffin embedding and are created directly in `cutting`.
//! `complete_process` closes a study from `cutting` or `staining` without the remaining steps.
//! `cancel` is legal from every non-terminal state.

use super::markers::{validate_all, HistopathologyAntibody};
use super::{refuse, AnalysisProcess, ProcessAction, ProcessKind, ProcessState};
use crate::repositories::{Record, RecordKind, Repository, Transaction};
use crate::validation::{clean_text, require_positive};
use crate::WorkflowResult;
use chrono::{DateTime, Utc};
use lab_types::ExternalRef;
use lab_uuid::RecordId;
use serde::{Deserialize, Serialize};

coded_enum! {
    #[derive(Default)]
    pub enum HistopathologyState ("histopathology state") {
        #[default]
        Draft => ("draft", "Draft"),
        Macroscopy => ("macroscopy", "Macroscopy"),
        Processing => ("processing", "Processing"),
        Cutting => ("cutting", "Cutting"),
        Staining => ("staining", "Staining"),
        Completed => ("completed", "Completed"),
        Cancelled => ("cancelled", "Cancelled"),
    }
}

impl ProcessState for HistopathologyState {
    fn as_str(&self) -> &'static str {
        HistopathologyState::as_str(self)
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            HistopathologyState::Completed | HistopathologyState::Cancelled
        )
    }
}

coded_enum! {
    pub enum HistopathologyAction ("histopathology action") {
        StartMacroscopy => ("start_macroscopy" | "start", "Start Macroscopy"),
        CompleteMacroscopy => ("complete_macroscopy", "Complete Macroscopy"),
        CompleteProcessing => ("complete_processing", "Complete Processing"),
        CompleteCutting => ("complete_cutting", "Complete Cutting"),
        CompleteStaining => ("complete_staining", "Complete Staining"),
        CompleteProcess => ("complete_process" | "complete", "Complete Process"),
        Cancel => ("cancel", "Cancel"),
    }
}

impl ProcessAction for HistopathologyAction {
    fn as_str(&self) -> &'static str {
        HistopathologyAction::as_str(self)
    }

    fn starts_processing(&self) -> bool {
        matches!(self, HistopathologyAction::StartMacroscopy)
    }
}

coded_enum! {
    #[derive(Default)]
    pub enum HistopathologyStudyType ("histopathology study type") {
        #[default]
        Routine => ("routine", "Routine Histopathology"),
        Histochemistry => ("histochemistry", "Histochemistry"),
        Immunohistochemistry => ("immunohistochemistry", "Immunohistochemistry"),
        Fish => ("fish", "FISH (Fluorescence In Situ Hybridization)"),
        Cytology => ("cytology", "Cytology"),
    }
}

impl HistopathologyStudyType {
    /// Cytology skips macroscopy and processing.
    pub fn skips_embedding(&self) -> bool {
        matches!(self, HistopathologyStudyType::Cytology)
    }

    /// Studies that record antibodies or special stains.
    pub fn uses_antibodies(&self) -> bool {
        matches!(
            self,
            HistopathologyStudyType::Histochemistry
                | HistopathologyStudyType::Immunohistochemistry
                | HistopathologyStudyType::Fish
        )
    }
}

/// Creation fields.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistopathologyDraft {
    #[serde(default)]
    pub study_type: HistopathologyStudyType,
    pub responsible_professional: ExternalRef,
    #[serde(default)]
    pub number_of_cuts: Option<u32>,
    #[serde(default)]
    pub number_of_cassettes: Option<u32>,
    #[serde(default)]
    pub observations: Option<String>,
}

/// Editable fields.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistopathologyPatch {
    pub number_of_cuts: Option<u32>,
    pub number_of_cassettes: Option<u32>,
    pub macroscopy_observations: Option<String>,
    pub inclusion_date: Option<DateTime<Utc>>,
    pub cutting_date: Option<DateTime<Utc>>,
    pub staining_date: Option<DateTime<Utc>>,
    pub observations: Option<String>,
    pub diagnosis: Option<String>,
    /// Replaces the whole antibody list.
    pub antibodies: Option<Vec<HistopathologyAntibody>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistopathologyProcess {
    id: RecordId,
    sample_id: RecordId,
    state: HistopathologyState,
    created_at: DateTime<Utc>,
    study_type: HistopathologyStudyType,
    pub responsible_professional: ExternalRef,
    macroscopy_date: Option<DateTime<Utc>>,
    pub number_of_cuts: Option<u32>,
    pub number_of_cassettes: Option<u32>,
    pub macroscopy_observations: Option<String>,
    processing_date: Option<DateTime<Utc>>,
    pub inclusion_date: Option<DateTime<Utc>>,
    pub cutting_date: Option<DateTime<Utc>>,
    pub staining_date: Option<DateTime<Utc>>,
    delivery_date: Option<DateTime<Utc>>,
    pub antibodies: Vec<HistopathologyAntibody>,
    pub observations: Option<String>,
    pub diagnosis: Option<String>,
}

impl HistopathologyProcess {
    /// Fixed at creation: it decides the initial state.
    pub fn study_type(&self) -> HistopathologyStudyType {
        self.study_type
    }

    pub fn macroscopy_date(&self) -> Option<DateTime<Utc>> {
        self.macroscopy_date
    }

    pub fn processing_date(&self) -> Option<DateTime<Utc>> {
        self.processing_date
    }

    pub fn delivery_date(&self) -> Option<DateTime<Utc>> {
        self.delivery_date
    }

    /// Cuts and cassettes must be recorded before macroscopy can close.
    fn check_macroscopy_done(&self) -> WorkflowResult<()> {
        if self.study_type.skips_embedding() {
            return Ok(());
        }
        require_positive(self.number_of_cuts, "number_of_cuts")?;
        require_positive(self.number_of_cassettes, "number_of_cassettes")?;
        Ok(())
    }
}

impl Record for HistopathologyProcess {
    const RECORD_KIND: RecordKind = RecordKind::HistopathologyProcess;

    fn id(&self) -> RecordId {
        self.id
    }
}

impl AnalysisProcess for HistopathologyProcess {
    const PROCESS_KIND: ProcessKind = ProcessKind::Histopathology;

    type State = HistopathologyState;
    type Action = HistopathologyAction;
    type Draft = HistopathologyDraft;
    type Patch = HistopathologyPatch;

    fn create(
        sample_id: RecordId,
        draft: HistopathologyDraft,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Self> {
        let state = if draft.study_type.skips_embedding() {
            HistopathologyState::Cutting
        } else {
            HistopathologyState::Draft
        };

        Ok(Self {
            id: RecordId::new(),
            sample_id,
            state,
            created_at: now,
            study_type: draft.study_type,
            responsible_professional: draft.responsible_professional,
            macroscopy_date: None,
            number_of_cuts: draft.number_of_cuts,
            number_of_cassettes: draft.number_of_cassettes,
            macroscopy_observations: None,
            processing_date: None,
            inclusion_date: None,
            cutting_date: None,
            staining_date: None,
            delivery_date: None,
            antibodies: Vec::new(),
            observations: clean_text(draft.observations),
            diagnosis: None,
        })
    }

    fn sample_id(&self) -> RecordId {
        self.sample_id
    }

    fn state(&self) -> HistopathologyState {
        self.state
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply_patch(&mut self, patch: HistopathologyPatch) -> WorkflowResult<()> {
        if let Some(antibodies) = &patch.antibodies {
            validate_all(antibodies, HistopathologyAntibody::validate)?;
        }

        if let Some(v) = patch.number_of_cuts {
            self.number_of_cuts = Some(v);
        }
        if let Some(v) = patch.number_of_cassettes {
            self.number_of_cassettes = Some(v);
        }
        if patch.macroscopy_observations.is_some() {
            self.macroscopy_observations = clean_text(patch.macroscopy_observations);
        }
        if let Some(v) = patch.inclusion_date {
            self.inclusion_date = Some(v);
        }
        if let Some(v) = patch.cutting_date {
            self.cutting_date = Some(v);
        }
        if let Some(v) = patch.staining_date {
            self.staining_date = Some(v);
        }
        if patch.observations.is_some() {
            self.observations = clean_text(patch.observations);
        }
        if patch.diagnosis.is_some() {
            self.diagnosis = clean_text(patch.diagnosis);
        }
        if let Some(v) = patch.antibodies {
            self.antibodies = v;
        }
        Ok(())
    }

    fn transition(
        &mut self,
        action: HistopathologyAction,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        use HistopathologyAction as A;
        use HistopathologyState as S;

        match (action, self.state) {
            (A::StartMacroscopy, S::Draft) => {
                self.state = S::Macroscopy;
                self.macroscopy_date = Some(now);
            }
            (A::CompleteMacroscopy, S::Macroscopy) => {
                self.check_macroscopy_done()?;
                self.state = S::Processing;
                self.processing_date = Some(now);
            }
            (A::CompleteProcessing, S::Processing) => {
                self.state = S::Cutting;
            }
            (A::CompleteCutting, S::Cutting) => {
                self.state = S::Staining;
                self.cutting_date.get_or_insert(now);
            }
            (A::CompleteStaining, S::Staining) => {
                self.state = S::Completed;
                self.staining_date.get_or_insert(now);
                self.delivery_date = Some(now);
            }
            (A::CompleteProcess, S::Cutting | S::Staining) => {
                self.state = S::Completed;
                self.delivery_date = Some(now);
            }
            (A::Cancel, state) if !state.is_terminal() => {
                self.state = S::Cancelled;
            }
            (action, state) => return Err(refuse::<Self>(state, action)),
        }
        Ok(())
    }

    fn repository(tx: &mut dyn Transaction) -> &mut dyn Repository<Self> {
        tx.histopathology()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkflowError;
    use serde_json::json;

    fn create(study_type: &str) -> HistopathologyProcess {
        let draft: HistopathologyDraft = serde_json::from_value(json!({
            "study_type": study_type,
            "responsible_professional": "HP-9",
        }))
        .unwrap();
        HistopathologyProcess::create(RecordId::new(), draft, Utc::now()).unwrap()
    }

    fn advance(p: &mut HistopathologyProcess, action: HistopathologyAction) -> WorkflowResult<()> {
        p.transition(action, Utc::now())
    }

    #[test]
    fn cytology_starts_in_cutting() {
        let p = create("cytology");
        assert_eq!(p.state(), HistopathologyState::Cutting);
        assert!(p.is_active());
    }

    #[test]
    fn other_studies_start_in_draft() {
        for study in HistopathologyStudyType::ALL
            .iter()
            .filter(|s| !s.skips_embedding())
        {
            assert_eq!(create(study.as_str()).state(), HistopathologyState::Draft);
        }
    }

    #[test]
    fn macroscopy_requires_cuts_and_cassettes() {
        let mut p = create("routine");
        advance(&mut p, HistopathologyAction::StartMacroscopy).unwrap();
        assert!(p.macroscopy_date().is_some());

        let err = advance(&mut p, HistopathologyAction::CompleteMacroscopy).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::MissingRequiredField {
                field: "number_of_cuts"
            }
        ));
        assert_eq!(p.state(), HistopathologyState::Macroscopy);

        p.number_of_cuts = Some(4);
        let err = advance(&mut p, HistopathologyAction::CompleteMacroscopy).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::MissingRequiredField {
                field: "number_of_cassettes"
            }
        ));

        p.number_of_cassettes = Some(0);
        assert!(advance(&mut p, HistopathologyAction::CompleteMacroscopy).is_err());

        p.number_of_cassettes = Some(2);
        advance(&mut p, HistopathologyAction::CompleteMacroscopy).unwrap();
        assert_eq!(p.state(), HistopathologyState::Processing);
        assert!(p.processing_date().is_some());
    }

    #[test]
    fn full_path_keeps_existing_checkpoint_dates() {
        let mut p = create("immunohistochemistry");
        p.number_of_cuts = Some(3);
        p.number_of_cassettes = Some(1);
        let recorded_cut = Utc::now() - chrono::Duration::hours(2);
        p.cutting_date = Some(recorded_cut);

        for action in [
            HistopathologyAction::StartMacroscopy,
            HistopathologyAction::CompleteMacroscopy,
            HistopathologyAction::CompleteProcessing,
            HistopathologyAction::CompleteCutting,
        ] {
            advance(&mut p, action).unwrap();
        }
        assert_eq!(p.state(), HistopathologyState::Staining);
        assert_eq!(p.cutting_date, Some(recorded_cut));

        advance(&mut p, HistopathologyAction::CompleteStaining).unwrap();
        assert_eq!(p.state(), HistopathologyState::Completed);
        assert!(p.staining_date.is_some());
        assert!(p.delivery_date().is_some());
    }

    #[test]
    fn complete_cutting_stamps_missing_date() {
        let mut p = create("cytology");
        assert!(p.cutting_date.is_none());
        advance(&mut p, HistopathologyAction::CompleteCutting).unwrap();
        assert!(p.cutting_date.is_some());
    }

    #[test]
    fn complete_process_from_cutting() {
        let mut p = create("cytology");
        advance(&mut p, HistopathologyAction::CompleteProcess).unwrap();
        assert_eq!(p.state(), HistopathologyState::Completed);
        assert!(p.delivery_date().is_some());
    }

    #[test]
    fn complete_process_from_draft_is_refused() {
        let mut p = create("routine");
        let err = advance(&mut p, HistopathologyAction::CompleteProcess).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidStateTransition {
                state: "draft",
                action: "complete_process",
                ..
            }
        ));
    }

    #[test]
    fn cancel_from_every_active_state() {
        let mut p = create("routine");
        p.number_of_cuts = Some(1);
        p.number_of_cassettes = Some(1);
        let path = [
            HistopathologyAction::StartMacroscopy,
            HistopathologyAction::CompleteMacroscopy,
            HistopathologyAction::CompleteProcessing,
            HistopathologyAction::CompleteCutting,
        ];

        for steps in 0..=path.len() {
            let mut q = p.clone();
            for action in &path[..steps] {
                advance(&mut q, *action).unwrap();
            }
            advance(&mut q, HistopathologyAction::Cancel).unwrap();
            assert_eq!(q.state(), HistopathologyState::Cancelled);
            assert!(advance(&mut q, HistopathologyAction::Cancel).is_err());
        }
        p.state = HistopathologyState::Completed;
        assert!(advance(&mut p, HistopathologyAction::Cancel).is_err());
    }

    #[test]
    fn start_alias_parses() {
        assert_eq!(
            "start".parse::<HistopathologyAction>().unwrap(),
            HistopathologyAction::StartMacroscopy
        );
    }

    #[test]
    fn patch_rejects_bad_percentage_without_changes() {
        let mut p = create("immunohistochemistry");
        let patch: HistopathologyPatch = serde_json::from_value(json!({
            "number_of_cuts": 5,
            "antibodies": [{ "name": "CK7", "percentage": 150 }]
        }))
        .unwrap();

        assert!(p.apply_patch(patch).is_err());
        assert_eq!(p.number_of_cuts, None);
        assert!(p.antibodies.is_empty());
    }
}
