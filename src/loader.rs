//! Data loader boundary
//!
//! Parsing the source dataset is done elsewhere; the converter only sees the
//! [`DataLoader`] trait. The loader mode travels with each request instead of
//! being set on the loader beforehand.

use crate::array::VolumeArray;
use crate::error::{KbpError, Result};
use crate::metadata::Field;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which fields a batch request must populate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderMode {
    /// Everything needed to train a dose model
    #[default]
    TrainingModel,
    /// Only the dose, for scoring stored predictions
    PredictedDose,
    /// Dose, masks and voxel spacing for evaluation
    Evaluation,
    /// Model inputs without the reference dose
    DosePrediction,
}

impl LoaderMode {
    pub fn required_fields(&self) -> &'static [Field] {
        match self {
            LoaderMode::TrainingModel => &Field::ALL,
            LoaderMode::PredictedDose => &[Field::Dose],
            LoaderMode::Evaluation => &[
                Field::Dose,
                Field::StructureMasks,
                Field::VoxelDimensions,
                Field::PossibleDoseMask,
            ],
            LoaderMode::DosePrediction => &[
                Field::Ct,
                Field::StructureMasks,
                Field::PossibleDoseMask,
                Field::VoxelDimensions,
            ],
        }
    }

    pub fn includes(&self, field: Field) -> bool {
        self.required_fields().contains(&field)
    }
}

/// Arrays for one or more patients, each field indexed by request position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientBatch {
    pub patient_ids: Vec<String>,
    pub dose: Vec<VolumeArray>,
    pub ct: Vec<VolumeArray>,
    pub structure_masks: Vec<VolumeArray>,
    pub possible_dose_mask: Vec<VolumeArray>,
    pub voxel_dimensions: Vec<VolumeArray>,
    /// Per position, aligned to the trailing axis of `structure_masks`
    pub structure_mask_names: Vec<Vec<String>>,
}

impl PatientBatch {
    pub fn len(&self) -> usize {
        self.patient_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patient_ids.is_empty()
    }

    pub fn field_values(&self, field: Field) -> &[VolumeArray] {
        match field {
            Field::Dose => &self.dose,
            Field::Ct => &self.ct,
            Field::StructureMasks => &self.structure_masks,
            Field::PossibleDoseMask => &self.possible_dose_mask,
            Field::VoxelDimensions => &self.voxel_dimensions,
        }
    }

    fn field_values_mut(&mut self, field: Field) -> &mut Vec<VolumeArray> {
        match field {
            Field::Dose => &mut self.dose,
            Field::Ct => &mut self.ct,
            Field::StructureMasks => &mut self.structure_masks,
            Field::PossibleDoseMask => &mut self.possible_dose_mask,
            Field::VoxelDimensions => &mut self.voxel_dimensions,
        }
    }

    /// The array of `field` for the patient at request position `position`
    pub fn field(&self, field: Field, position: usize) -> Result<&VolumeArray> {
        self.field_values(field).get(position).ok_or_else(|| {
            KbpError::MissingField(format!("{} for batch position {}", field, position))
        })
    }

    pub fn roi_names(&self, position: usize) -> Result<&[String]> {
        self.structure_mask_names
            .get(position)
            .map(|names| names.as_slice())
            .ok_or_else(|| {
                KbpError::MissingField(format!(
                    "structure_mask_names for batch position {}",
                    position
                ))
            })
    }
}

/// Source of patient data consumed by the converter
pub trait DataLoader {
    /// All known patient IDs, in a stable order
    fn patient_id_list(&self) -> Vec<String>;

    /// Dataset-wide ROI vocabulary
    fn full_roi_list(&self) -> Vec<String>;

    /// Load the requested patients with the fields `mode` requires
    fn get_patients(&mut self, ids: &[String], mode: LoaderMode) -> Result<PatientBatch>;
}

/// All fields of one patient held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct PatientSample {
    pub id: String,
    pub dose: VolumeArray,
    pub ct: VolumeArray,
    pub structure_masks: VolumeArray,
    pub possible_dose_mask: VolumeArray,
    pub voxel_dimensions: VolumeArray,
    pub structure_mask_names: Vec<String>,
}

impl PatientSample {
    pub fn field(&self, field: Field) -> &VolumeArray {
        match field {
            Field::Dose => &self.dose,
            Field::Ct => &self.ct,
            Field::StructureMasks => &self.structure_masks,
            Field::PossibleDoseMask => &self.possible_dose_mask,
            Field::VoxelDimensions => &self.voxel_dimensions,
        }
    }
}

/// A [`DataLoader`] over patients already held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    patients: Vec<PatientSample>,
    rois: Vec<String>,
}

impl MemoryLoader {
    pub fn new(rois: Vec<String>) -> Self {
        Self {
            patients: Vec::new(),
            rois,
        }
    }

    pub fn with_patient(mut self, patient: PatientSample) -> Self {
        self.patients.push(patient);
        self
    }

    pub fn push(&mut self, patient: PatientSample) {
        self.patients.push(patient);
    }
}

impl DataLoader for MemoryLoader {
    fn patient_id_list(&self) -> Vec<String> {
        self.patients.iter().map(|p| p.id.clone()).collect()
    }

    fn full_roi_list(&self) -> Vec<String> {
        self.rois.clone()
    }

    fn get_patients(&mut self, ids: &[String], mode: LoaderMode) -> Result<PatientBatch> {
        // first occurrence wins when an ID is listed twice
        let mut by_id: HashMap<&str, &PatientSample> = HashMap::new();
        for patient in &self.patients {
            by_id.entry(patient.id.as_str()).or_insert(patient);
        }

        let mut batch = PatientBatch::default();
        for id in ids {
            let patient = by_id
                .get(id.as_str())
                .ok_or_else(|| KbpError::Loader(format!("Unknown patient {}", id)))?;

            batch.patient_ids.push(patient.id.clone());
            for &field in mode.required_fields() {
                batch
                    .field_values_mut(field)
                    .push(patient.field(field).clone());
            }
            if mode.includes(Field::StructureMasks) {
                batch
                    .structure_mask_names
                    .push(patient.structure_mask_names.clone());
            }
        }
        Ok(batch)
    }
}
