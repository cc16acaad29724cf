//! Marker and antibody sub-records.
//!
//! Each process owns an ordered list of these. They have no lifecycle of their own: they are
//! written with their parent process and deleted with it.

use crate::validation::validate_percentage;
use crate::{WorkflowError, WorkflowResult};
use lab_types::NonEmptyText;
use serde::{Deserialize, Serialize};

coded_enum! {
    #[derive(Default)]
    pub enum HistopathologyMarkerType ("histopathology marker type") {
        #[default]
        Primary => ("primary", "Primary Antibody"),
        Secondary => ("secondary", "Secondary Antibody"),
        Marker => ("marker", "Marker"),
        Probe => ("probe", "Probe"),
        Stain => ("stain", "Special Stain"),
    }
}

coded_enum! {
    pub enum StainResult ("stain result") {
        Positive => ("positive", "Positive"),
        Negative => ("negative", "Negative"),
        FocalPositive => ("focal_positive", "Focal Positive"),
        WeakPositive => ("weak_positive", "Weak Positive"),
        StrongPositive => ("strong_positive", "Strong Positive"),
        Equivocal => ("equivocal", "Equivocal"),
    }
}

coded_enum! {
    pub enum Intensity ("intensity") {
        Weak => ("1+", "1+"),
        Moderate => ("2+", "2+"),
        Strong => ("3+", "3+"),
    }
}

coded_enum! {
    #[derive(Default)]
    pub enum MolecularMarkerType ("molecular marker type") {
        Primary => ("primary", "Primary Antibody"),
        Secondary => ("secondary", "Secondary Antibody"),
        Marker => ("marker", "Molecular Marker"),
        Probe => ("probe", "Probe"),
        #[default]
        Primer => ("primer", "Primer"),
    }
}

coded_enum! {
    pub enum MolecularResult ("molecular result") {
        Positive => ("positive", "Positive"),
        Negative => ("negative", "Negative"),
        Weak => ("weak", "Weak"),
        Strong => ("strong", "Strong"),
        Amplified => ("amplified", "Amplified"),
        NotAmplified => ("not_amplified", "Not Amplified"),
    }
}

coded_enum! {
    #[derive(Default)]
    pub enum ImmunoassayTestType ("immunoassay test type") {
        #[default]
        Antibody => ("antibody", "Antibody Detection"),
        Antigen => ("antigen", "Antigen Detection"),
        AntibodyTiter => ("antibody_titer", "Antibody Titer"),
    }
}

coded_enum! {
    pub enum QualitativeResult ("qualitative result") {
        Positive => ("positive", "Positive"),
        Negative => ("negative", "Negative"),
        Equivocal => ("equivocal", "Equivocal"),
        Borderline => ("borderline", "Borderline"),
    }
}

coded_enum! {
    pub enum Interpretation ("interpretation") {
        Reactive => ("reactive", "Reactive"),
        NonReactive => ("non_reactive", "Non-Reactive"),
        Indeterminate => ("indeterminate", "Indeterminate"),
        LowTiter => ("low_titer", "Low Titer"),
        HighTiter => ("high_titer", "High Titer"),
    }
}

/// Antibody, marker or special stain applied to histopathology sections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistopathologyAntibody {
    #[serde(default)]
    pub antibody_type: HistopathologyMarkerType,
    pub name: NonEmptyText,
    #[serde(default)]
    pub clone: Option<String>,
    #[serde(default)]
    pub dilution: Option<String>,
    #[serde(default)]
    pub result: Option<StainResult>,
    /// Share of positive cells, `0..=100`.
    #[serde(default)]
    pub percentage: Option<u8>,
    #[serde(default)]
    pub intensity: Option<Intensity>,
    #[serde(default)]
    pub observations: Option<String>,
}

impl HistopathologyAntibody {
    pub fn validate(&self) -> WorkflowResult<()> {
        validate_percentage(self.percentage, &format!("percentage of {}", self.name))
    }
}

/// Primer, probe or marker used in a molecular study.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MolecularMarker {
    #[serde(default)]
    pub marker_type: MolecularMarkerType,
    pub name: NonEmptyText,
    #[serde(default)]
    pub sequence: Option<String>,
    #[serde(default)]
    pub concentration: Option<String>,
    #[serde(default)]
    pub dilution: Option<String>,
    #[serde(default)]
    pub incubation_time: Option<String>,
    #[serde(default)]
    pub temperature: Option<String>,
    #[serde(default)]
    pub result: Option<MolecularResult>,
    #[serde(default)]
    pub intensity: Option<Intensity>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
}

impl MolecularMarker {
    pub fn validate(&self) -> WorkflowResult<()> {
        if let Some(seq) = &self.sequence {
            let ok = seq
                .chars()
                .filter(|c| !c.is_whitespace())
                .all(|c| c.is_ascii_alphabetic());
            if !ok {
                return Err(WorkflowError::InvalidInput(format!(
                    "sequence of {} must contain only nucleotide letters",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Antibody or antigen measured in an immunoassay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImmunoassayAntibody {
    #[serde(default)]
    pub test_type: ImmunoassayTestType,
    pub name: NonEmptyText,
    #[serde(default)]
    pub method_specifics: Option<String>,
    #[serde(default)]
    pub quantitative_result: Option<f64>,
    /// e.g. IU/mL, ng/mL, index
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub qualitative_result: Option<QualitativeResult>,
    #[serde(default)]
    pub reference_range: Option<String>,
    #[serde(default)]
    pub cutoff_value: Option<f64>,
    #[serde(default)]
    pub interpretation: Option<Interpretation>,
    #[serde(default)]
    pub observations: Option<String>,
}

impl ImmunoassayAntibody {
    pub fn validate(&self) -> WorkflowResult<()> {
        for (field, value) in [
            ("quantitative_result", self.quantitative_result),
            ("cutoff_value", self.cutoff_value),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(WorkflowError::InvalidInput(format!(
                    "{field} of {} must be a finite number",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Validates every entry of a marker list.
pub(crate) fn validate_all<T>(
    items: &[T],
    validate: impl Fn(&T) -> WorkflowResult<()>,
) -> WorkflowResult<()> {
    items.iter().try_for_each(validate)
}
