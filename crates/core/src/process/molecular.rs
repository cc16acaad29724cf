//! Molecular biology process.
//!
//! States are `draft → in_progress → completed`, cancellable until terminal. While in
//! progress, three gated sub-steps are tracked with completion flags:
//!
//! 1. extraction: date, material, kit and professional recorded
//! 2. PCR: extraction done, then pre and post amplification dates for RT-PCR or a single PCR
//!    date otherwise, plus the kit
//! 3. gel: PCR done, gel date and gel type; only for end-point PCR, RT-PCR and electrophoresis
//!
//! The flags track progress only. `complete` is accepted from `in_progress` whatever they say.

use super::markers::{validate_all, MolecularMarker};
use super::{refuse, AnalysisProcess, ProcessAction, ProcessKind, ProcessState};
use crate::repositories::{Record, RecordKind, Repository, Transaction};
use crate::validation::{clean_text, require, require_text};
use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use lab_types::ExternalRef;
use lab_uuid::RecordId;
use serde::{Deserialize, Serialize};

coded_enum! {
    #[derive(Default)]
    pub enum MolecularState ("molecular state") {
        #[default]
        Draft => ("draft", "Draft"),
        InProgress => ("in_progress" | "processing", "In Progress"),
        Completed => ("completed", "Completed"),
        Cancelled => ("cancelled", "Cancelled"),
    }
}

impl ProcessState for MolecularState {
    fn as_str(&self) -> &'static str {
        MolecularState::as_str(self)
    }

    fn is_terminal(&self) -> bool {
        matches!(self, MolecularState::Completed | MolecularState::Cancelled)
    }
}

coded_enum! {
    pub enum MolecularAction ("molecular action") {
        Start => ("start", "Start Process"),
        CompleteExtraction => ("complete_extraction", "Complete Extraction"),
        CompletePcr => ("complete_pcr", "Complete PCR"),
        CompleteGel => ("complete_gel", "Complete Gel Electrophoresis"),
        Complete => ("complete" | "complete_process", "Complete Process"),
        Cancel => ("cancel", "Cancel"),
    }
}

impl ProcessAction for MolecularAction {
    fn as_str(&self) -> &'static str {
        MolecularAction::as_str(self)
    }

    fn starts_processing(&self) -> bool {
        matches!(self, MolecularAction::Start)
    }
}

coded_enum! {
    #[derive(Default)]
    pub enum MolecularStudyType ("molecular study type") {
        #[default]
        PcrEndpoint => ("pcr_endpoint" | "pcr", "End-point PCR"),
        RtPcr => ("rt_pcr", "RT-PCR"),
        Qpcr => ("qpcr", "qPCR/Real-time PCR"),
        Electrophoresis => ("electrophoresis", "Electrophoresis"),
        Sequencing => ("sequencing", "DNA Sequencing"),
        ExtractionOnly => ("extraction_only", "Genetic Material Extraction Only"),
        Blotting => ("blotting", "Blotting (Southern/Northern/Western)"),
        Microarray => ("microarray", "Microarray"),
        Fish => ("fish", "FISH"),
        Other => ("other", "Other"),
    }
}

impl MolecularStudyType {
    /// Studies whose product is run on a gel.
    pub fn uses_gel(&self) -> bool {
        matches!(
            self,
            MolecularStudyType::PcrEndpoint
                | MolecularStudyType::RtPcr
                | MolecularStudyType::Electrophoresis
        )
    }

    /// RT-PCR records separate pre and post amplification dates.
    pub fn split_pcr_dates(&self) -> bool {
        matches!(self, MolecularStudyType::RtPcr)
    }
}

coded_enum! {
    pub enum ExtractionMaterial ("extraction material") {
        Dna => ("dna", "DNA"),
        Rna => ("rna", "RNA"),
        TotalNucleicAcid => ("total_nucleic_acid", "Total Nucleic Acid"),
        Other => ("other", "Other"),
    }
}

coded_enum! {
    pub enum GelType ("gel type") {
        Agarose => ("agarose", "Agarose"),
        Polyacrylamide => ("polyacrylamide", "Polyacrylamide"),
    }
}

/// Creation fields.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MolecularDraft {
    #[serde(default, alias = "analysis_type")]
    pub study_type: MolecularStudyType,
    pub responsible_professional: ExternalRef,
    #[serde(default)]
    pub observations: Option<String>,
}

/// Editable fields.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MolecularPatch {
    pub extraction_date: Option<DateTime<Utc>>,
    pub extraction_material: Option<ExtractionMaterial>,
    pub extraction_kit: Option<String>,
    pub extraction_professional: Option<ExternalRef>,
    pub pcr_pre_date: Option<DateTime<Utc>>,
    pub pcr_post_date: Option<DateTime<Utc>>,
    pub pcr_date: Option<DateTime<Utc>>,
    pub pcr_kit: Option<String>,
    pub gel_date: Option<DateTime<Utc>>,
    pub gel_type: Option<GelType>,
    pub observations: Option<String>,
    pub analysis_result: Option<String>,
    /// Replaces the whole marker list.
    pub markers: Option<Vec<MolecularMarker>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MolecularProcess {
    id: RecordId,
    sample_id: RecordId,
    state: MolecularState,
    created_at: DateTime<Utc>,
    pub study_type: MolecularStudyType,
    pub responsible_professional: ExternalRef,
    processing_date: Option<DateTime<Utc>>,
    delivery_date: Option<DateTime<Utc>>,

    pub extraction_date: Option<DateTime<Utc>>,
    pub extraction_material: Option<ExtractionMaterial>,
    pub extraction_kit: Option<String>,
    pub extraction_professional: Option<ExternalRef>,
    extraction_completed: bool,

    pub pcr_pre_date: Option<DateTime<Utc>>,
    pub pcr_post_date: Option<DateTime<Utc>>,
    pub pcr_date: Option<DateTime<Utc>>,
    pub pcr_kit: Option<String>,
    pcr_completed: bool,

    pub gel_date: Option<DateTime<Utc>>,
    pub gel_type: Option<GelType>,
    gel_completed: bool,

    pub markers: Vec<MolecularMarker>,
    pub observations: Option<String>,
    pub analysis_result: Option<String>,
}

impl MolecularProcess {
    pub fn processing_date(&self) -> Option<DateTime<Utc>> {
        self.processing_date
    }

    pub fn delivery_date(&self) -> Option<DateTime<Utc>> {
        self.delivery_date
    }

    pub fn extraction_completed(&self) -> bool {
        self.extraction_completed
    }

    pub fn pcr_completed(&self) -> bool {
        self.pcr_completed
    }

    pub fn gel_completed(&self) -> bool {
        self.gel_completed
    }

    fn check_extraction(&self) -> WorkflowResult<()> {
        require(self.extraction_date, "extraction_date")?;
        require(self.extraction_material, "extraction_material")?;
        require_text(self.extraction_kit.as_deref(), "extraction_kit")?;
        if self.extraction_professional.is_none() {
            return Err(WorkflowError::MissingRequiredField {
                field: "extraction_professional",
            });
        }
        Ok(())
    }

    fn check_pcr(&self) -> WorkflowResult<()> {
        if !self.extraction_completed {
            return Err(WorkflowError::MissingRequiredField {
                field: "extraction_completed",
            });
        }
        if self.study_type.split_pcr_dates() {
            require(self.pcr_pre_date, "pcr_pre_date")?;
            require(self.pcr_post_date, "pcr_post_date")?;
        } else {
            require(self.pcr_date, "pcr_date")?;
        }
        require_text(self.pcr_kit.as_deref(), "pcr_kit")?;
        Ok(())
    }

    fn check_gel(&self) -> WorkflowResult<()> {
        if !self.pcr_completed {
            return Err(WorkflowError::MissingRequiredField {
                field: "pcr_completed",
            });
        }
        require(self.gel_date, "gel_date")?;
        require(self.gel_type, "gel_type")?;
        Ok(())
    }
}

impl Record for MolecularProcess {
    const RECORD_KIND: RecordKind = RecordKind::MolecularProcess;

    fn id(&self) -> RecordId {
        self.id
    }
}

impl AnalysisProcess for MolecularProcess {
    const PROCESS_KIND: ProcessKind = ProcessKind::Molecular;

    type State = MolecularState;
    type Action = MolecularAction;
    type Draft = MolecularDraft;
    type Patch = MolecularPatch;

    fn create(sample_id: RecordId, draft: MolecularDraft, now: DateTime<Utc>) -> WorkflowResult<Self> {
        Ok(Self {
            id: RecordId::new(),
            sample_id,
            state: MolecularState::Draft,
            created_at: now,
            study_type: draft.study_type,
            responsible_professional: draft.responsible_professional,
            processing_date: None,
            delivery_date: None,
            extraction_date: None,
            extraction_material: None,
            extraction_kit: None,
            extraction_professional: None,
            extraction_completed: false,
            pcr_pre_date: None,
            pcr_post_date: None,
            pcr_date: None,
            pcr_kit: None,
            pcr_completed: false,
            gel_date: None,
            gel_type: None,
            gel_completed: false,
            markers: Vec::new(),
            observations: clean_text(draft.observations),
            analysis_result: None,
        })
    }

    fn sample_id(&self) -> RecordId {
        self.sample_id
    }

    fn state(&self) -> MolecularState {
        self.state
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply_patch(&mut self, patch: MolecularPatch) -> WorkflowResult<()> {
        if let Some(markers) = &patch.markers {
            validate_all(markers, MolecularMarker::validate)?;
        }

        if let Some(v) = patch.extraction_date {
            self.extraction_date = Some(v);
        }
        if let Some(v) = patch.extraction_material {
            self.extraction_material = Some(v);
        }
        if patch.extraction_kit.is_some() {
            self.extraction_kit = clean_text(patch.extraction_kit);
        }
        if let Some(v) = patch.extraction_professional {
            self.extraction_professional = Some(v);
        }
        if let Some(v) = patch.pcr_pre_date {
            self.pcr_pre_date = Some(v);
        }
        if let Some(v) = patch.pcr_post_date {
            self.pcr_post_date = Some(v);
        }
        if let Some(v) = patch.pcr_date {
            self.pcr_date = Some(v);
        }
        if patch.pcr_kit.is_some() {
            self.pcr_kit = clean_text(patch.pcr_kit);
        }
        if let Some(v) = patch.gel_date {
            self.gel_date = Some(v);
        }
        if let Some(v) = patch.gel_type {
            self.gel_type = Some(v);
        }
        if patch.observations.is_some() {
            self.observations = clean_text(patch.observations);
        }
        if patch.analysis_result.is_some() {
            self.analysis_result = clean_text(patch.analysis_result);
        }
        if let Some(v) = patch.markers {
            self.markers = v;
        }
        Ok(())
    }

    fn transition(&mut self, action: MolecularAction, now: DateTime<Utc>) -> WorkflowResult<()> {
        use MolecularAction as A;
        use MolecularState as S;

        match (action, self.state) {
            (A::Start, S::Draft) => {
                self.state = S::InProgress;
                self.processing_date = Some(now);
            }
            (A::CompleteExtraction, S::InProgress) => {
                self.check_extraction()?;
                self.extraction_completed = true;
            }
            (A::CompletePcr, S::InProgress) => {
                self.check_pcr()?;
                self.pcr_completed = true;
            }
            (A::CompleteGel, S::InProgress) if self.study_type.uses_gel() => {
                self.check_gel()?;
                self.gel_completed = true;
            }
            (A::Complete, S::InProgress) => {
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
        tx.molecular()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn started(study_type: &str) -> MolecularProcess {
        let draft: MolecularDraft = serde_json::from_value(json!({
            "study_type": study_type,
            "responsible_professional": "HP-3",
        }))
        .unwrap();
        let mut p = MolecularProcess::create(RecordId::new(), draft, Utc::now()).unwrap();
        p.transition(MolecularAction::Start, Utc::now()).unwrap();
        p
    }

    fn patch(value: serde_json::Value) -> MolecularPatch {
        serde_json::from_value(value).unwrap()
    }

    fn extracted(study_type: &str) -> MolecularProcess {
        let mut p = started(study_type);
        p.apply_patch(patch(json!({
            "extraction_date": "2026-10-01T08:00:00Z",
            "extraction_material": "dna",
            "extraction_kit": "QIAamp DNA Mini",
            "extraction_professional": "HP-4",
        })))
        .unwrap();
        p.transition(MolecularAction::CompleteExtraction, Utc::now())
            .unwrap();
        p
    }

    fn missing_field(result: WorkflowResult<()>) -> &'static str {
        match result {
            Err(WorkflowError::MissingRequiredField { field }) => field,
            other => panic!("expected MissingRequiredField, got {other:?}"),
        }
    }

    #[test]
    fn start_moves_to_in_progress() {
        let p = started("pcr_endpoint");
        assert_eq!(p.state(), MolecularState::InProgress);
        assert!(p.processing_date().is_some());
    }

    #[test]
    fn steps_are_refused_outside_in_progress() {
        let draft: MolecularDraft =
            serde_json::from_value(json!({ "responsible_professional": "HP-3" })).unwrap();
        let mut p = MolecularProcess::create(RecordId::new(), draft, Utc::now()).unwrap();
        assert_eq!(p.study_type, MolecularStudyType::PcrEndpoint);

        let err = p
            .transition(MolecularAction::CompleteExtraction, Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStateTransition { .. }));
    }

    #[test]
    fn extraction_names_first_missing_field() {
        let mut p = started("qpcr");
        assert_eq!(
            missing_field(p.transition(MolecularAction::CompleteExtraction, Utc::now())),
            "extraction_date"
        );

        p.apply_patch(patch(json!({
            "extraction_date": "2026-10-01T08:00:00Z",
            "extraction_material": "rna",
        })))
        .unwrap();
        assert_eq!(
            missing_field(p.transition(MolecularAction::CompleteExtraction, Utc::now())),
            "extraction_kit"
        );
        assert!(!p.extraction_completed());
    }

    #[test]
    fn pcr_requires_extraction_first() {
        let mut p = started("pcr_endpoint");
        p.apply_patch(patch(json!({
            "pcr_date": "2026-10-01T10:00:00Z",
            "pcr_kit": "Taq Master Mix",
        })))
        .unwrap();
        assert_eq!(
            missing_field(p.transition(MolecularAction::CompletePcr, Utc::now())),
            "extraction_completed"
        );
    }

    #[test]
    fn rt_pcr_needs_both_dates() {
        let mut p = extracted("rt_pcr");
        p.apply_patch(patch(json!({
            "pcr_date": "2026-10-01T10:00:00Z",
            "pcr_pre_date": "2026-10-01T09:00:00Z",
            "pcr_kit": "OneStep RT-PCR",
        })))
        .unwrap();
        assert_eq!(
            missing_field(p.transition(MolecularAction::CompletePcr, Utc::now())),
            "pcr_post_date"
        );

        p.apply_patch(patch(json!({ "pcr_post_date": "2026-10-01T11:00:00Z" })))
            .unwrap();
        p.transition(MolecularAction::CompletePcr, Utc::now()).unwrap();
        assert!(p.pcr_completed());
    }

    #[test]
    fn gel_after_pcr() {
        let mut p = extracted("electrophoresis");
        p.apply_patch(patch(json!({
            "gel_date": "2026-10-02T09:00:00Z",
            "gel_type": "agarose",
        })))
        .unwrap();
        assert_eq!(
            missing_field(p.transition(MolecularAction::CompleteGel, Utc::now())),
            "pcr_completed"
        );

        p.apply_patch(patch(json!({
            "pcr_date": "2026-10-01T10:00:00Z",
            "pcr_kit": "Taq",
        })))
        .unwrap();
        p.transition(MolecularAction::CompletePcr, Utc::now()).unwrap();
        p.transition(MolecularAction::CompleteGel, Utc::now()).unwrap();
        assert!(p.gel_completed());
    }

    #[test]
    fn gel_is_not_applicable_to_sequencing() {
        let mut p = extracted("sequencing");
        let err = p
            .transition(MolecularAction::CompleteGel, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidStateTransition {
                state: "in_progress",
                action: "complete_gel",
                ..
            }
        ));
    }

    #[test]
    fn complete_does_not_require_step_flags() {
        let mut p = started("sequencing");
        p.transition(MolecularAction::Complete, Utc::now()).unwrap();
        assert_eq!(p.state(), MolecularState::Completed);
        assert!(p.delivery_date().is_some());
        assert!(!p.extraction_completed());
    }

    #[test]
    fn extraction_only_study_has_no_gel_step() {
        let mut p = extracted("extraction_only");
        assert_eq!(p.study_type, MolecularStudyType::ExtractionOnly);
        assert!(!p.study_type.uses_gel());
        assert!(p.extraction_completed());

        let err = p
            .transition(MolecularAction::CompleteGel, Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStateTransition { .. }));

        p.transition(MolecularAction::Complete, Utc::now()).unwrap();
        assert_eq!(p.state(), MolecularState::Completed);
    }

    #[test]
    fn legacy_codes_are_accepted() {
        assert_eq!(
            "pcr".parse::<MolecularStudyType>().unwrap(),
            MolecularStudyType::PcrEndpoint
        );
        let draft: MolecularDraft = serde_json::from_value(json!({
            "analysis_type": "blotting",
            "responsible_professional": "HP-3",
        }))
        .unwrap();
        assert_eq!(draft.study_type, MolecularStudyType::Blotting);
    }
}
