//! Container schema: well-known names and typed views over the group tree

use crate::error::{KbpError, Result};
use crate::layout::{DatasetDescriptor, Group};
use crate::types::VolumeShape;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Group holding one child group per patient
pub const PATIENTS_GROUP: &str = "patients";

/// Nested group under each patient holding the `roi_<i>` attributes
pub const ROI_NAMES_GROUP: &str = "roi_names";

pub const ATTR_NUM_PATIENTS: &str = "num_patients";
pub const ATTR_PATIENT_SHAPE: &str = "patient_shape";
pub const ATTR_ROIS: &str = "rois";
pub const ATTR_CREATED_AT: &str = "created_at";
pub const ATTR_ID: &str = "id";
pub const ATTR_NUM_ROIS: &str = "num_rois";

/// Separator used when the ROI vocabulary is flattened into one attribute
pub const ROI_LIST_SEPARATOR: &str = ",";

/// Name of the derived field carrying the ordered ROI names of a patient
pub const STRUCTURE_MASK_NAMES: &str = "structure_mask_names";

/// The ROI vocabulary of the OpenKBP challenge data
pub const OPENKBP_ROIS: [&str; 10] = [
    "Brainstem",
    "SpinalCord",
    "RightParotid",
    "LeftParotid",
    "Esophagus",
    "Larynx",
    "Mandible",
    "PTV56",
    "PTV63",
    "PTV70",
];

/// Attribute key for the ROI name of mask channel `index`
pub fn roi_key(index: usize) -> String {
    format!("roi_{}", index)
}

/// Placeholder for a ROI name whose attribute is missing
pub fn unknown_roi_name(index: usize) -> String {
    format!("Unknown_{}", index)
}

/// Per-patient array fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Dose,
    Ct,
    StructureMasks,
    PossibleDoseMask,
    VoxelDimensions,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Dose,
        Field::Ct,
        Field::StructureMasks,
        Field::PossibleDoseMask,
        Field::VoxelDimensions,
    ];

    /// Dataset name inside a patient group
    pub fn name(&self) -> &'static str {
        match self {
            Field::Dose => "dose",
            Field::Ct => "ct",
            Field::StructureMasks => "structure_masks",
            Field::PossibleDoseMask => "possible_dose_mask",
            Field::VoxelDimensions => "voxel_dimensions",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Field::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Whether the field is a full volume with a trailing channel axis
    pub fn is_volumetric(&self) -> bool {
        !matches!(self, Field::VoxelDimensions)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Container-wide attributes stored on the root group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    /// Number of patients the conversion run was asked to write
    pub num_patients: usize,

    /// Spatial extent shared by every patient volume
    pub patient_shape: VolumeShape,

    /// Dataset-wide ROI vocabulary
    pub rois: Vec<String>,

    /// Creation timestamp
    pub created_at: Option<DateTime<Utc>>,
}

impl ContainerMetadata {
    /// Create new metadata stamped with the current time
    pub fn new(num_patients: usize, patient_shape: VolumeShape, rois: Vec<String>) -> Self {
        Self {
            num_patients,
            patient_shape,
            rois,
            created_at: Some(Utc::now()),
        }
    }

    /// The ROI vocabulary as the single descriptive string stored on disk
    pub fn rois_joined(&self) -> String {
        self.rois.join(ROI_LIST_SEPARATOR)
    }

    /// Reject vocabularies that would not split back into the same list
    pub fn check_rois(&self) -> Result<()> {
        match self.rois.iter().find(|roi| roi.contains(ROI_LIST_SEPARATOR)) {
            Some(roi) => Err(KbpError::SchemaViolation(format!(
                "ROI name {:?} contains the list separator {:?}",
                roi, ROI_LIST_SEPARATOR
            ))),
            None => Ok(()),
        }
    }

    pub fn write_to(&self, root: &mut Group) {
        root.set_attr(ATTR_NUM_PATIENTS, self.num_patients as i64);
        root.set_attr(
            ATTR_PATIENT_SHAPE,
            self.patient_shape
                .dims()
                .iter()
                .map(|&d| d as i64)
                .collect::<Vec<_>>(),
        );
        root.set_attr(ATTR_ROIS, self.rois_joined());
        if let Some(created_at) = self.created_at {
            root.set_attr(ATTR_CREATED_AT, created_at.to_rfc3339());
        }
    }

    pub fn from_group(root: &Group) -> Result<Self> {
        let num_patients = root
            .attr(ATTR_NUM_PATIENTS)
            .and_then(|v| v.as_int())
            .ok_or_else(|| KbpError::MissingField(ATTR_NUM_PATIENTS.to_string()))?;

        let dims = root
            .attr(ATTR_PATIENT_SHAPE)
            .and_then(|v| v.as_int_list())
            .ok_or_else(|| KbpError::MissingField(ATTR_PATIENT_SHAPE.to_string()))?;
        if dims.len() != 3 || dims.iter().any(|&d| d <= 0) {
            return Err(KbpError::InvalidFormat(format!(
                "patient_shape must be three positive extents, got {:?}",
                dims
            )));
        }
        let patient_shape =
            VolumeShape::new([dims[0] as usize, dims[1] as usize, dims[2] as usize])?;

        let rois = match root.attr(ATTR_ROIS).and_then(|v| v.as_str()) {
            Some("") | None => Vec::new(),
            Some(joined) => joined
                .split(ROI_LIST_SEPARATOR)
                .map(str::to_string)
                .collect(),
        };

        let created_at = match root.attr(ATTR_CREATED_AT).and_then(|v| v.as_str()) {
            Some(stamp) => Some(
                DateTime::parse_from_rfc3339(stamp)
                    .map_err(|e| KbpError::InvalidFormat(format!("created_at: {}", e)))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(Self {
            num_patients: num_patients.max(0) as usize,
            patient_shape,
            rois,
            created_at,
        })
    }
}

/// Write `names` as ordinal-keyed attributes `roi_0..roi_<n-1>`
pub fn write_roi_names(group: &mut Group, names: &[String]) {
    for (i, name) in names.iter().enumerate() {
        group.set_attr(roi_key(i), name.as_str());
    }
}

/// Read the ROI name for mask channel `index`
pub fn roi_name(group: &Group, index: usize) -> Result<String> {
    let key = roi_key(index);
    group
        .attr(&key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(KbpError::MissingRoiMetadata(key))
}

/// Rebuild the ordered ROI name list for `0..num_rois`.
///
/// A missing or non-string ordinal is replaced by `Unknown_<i>`; the other
/// indices are unaffected.
pub fn read_roi_names(group: Option<&Group>, num_rois: usize) -> Vec<String> {
    (0..num_rois)
        .map(|i| {
            let found = match group {
                Some(group) => roi_name(group, i),
                None => Err(KbpError::MissingRoiMetadata(roi_key(i))),
            };
            found.unwrap_or_else(|err| {
                log::warn!("{}; substituting placeholder", err);
                unknown_roi_name(i)
            })
        })
        .collect()
}

/// Typed view of one patient group, without the array payloads
#[derive(Debug, Clone, PartialEq)]
pub struct PatientEntry {
    pub id: String,
    pub num_rois: usize,
    pub datasets: Vec<(String, DatasetDescriptor)>,
    pub structure_mask_names: Vec<String>,
}

impl PatientEntry {
    /// Build the view for the group stored under `key`.
    ///
    /// `num_rois` must agree with the channel count of `structure_masks`.
    pub fn from_group(key: &str, group: &Group) -> Result<Self> {
        let id = group
            .attr(ATTR_ID)
            .and_then(|v| v.as_str())
            .unwrap_or(key)
            .to_string();

        let mask_channels = group
            .dataset(Field::StructureMasks.name())
            .and_then(|desc| desc.shape.last().copied());

        let num_rois = match (group.attr(ATTR_NUM_ROIS).and_then(|v| v.as_int()), mask_channels) {
            (Some(n), _) if n < 0 => {
                return Err(KbpError::SchemaViolation(format!(
                    "Patient {} has negative num_rois {}",
                    key, n
                )))
            }
            (Some(n), Some(channels)) if n as usize != channels => {
                return Err(KbpError::SchemaViolation(format!(
                    "Patient {} declares {} ROIs but structure_masks has {} channels",
                    key, n, channels
                )))
            }
            (Some(n), _) => n as usize,
            (None, Some(channels)) => channels,
            (None, None) => 0,
        };

        let structure_mask_names = read_roi_names(group.group(ROI_NAMES_GROUP), num_rois);

        let datasets = group
            .datasets()
            .map(|(name, desc)| (name.to_string(), desc.clone()))
            .collect();

        Ok(Self {
            id,
            num_rois,
            datasets,
            structure_mask_names,
        })
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetDescriptor> {
        self.datasets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, desc)| desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionMethod;
    use crate::types::DataType;

    fn mask_descriptor(channels: usize) -> DatasetDescriptor {
        DatasetDescriptor {
            data_type: DataType::U8,
            shape: vec![4, 4, 4, channels],
            compression: CompressionMethod::Deflate,
            offset: 4,
            stored_size: 10,
            raw_size: 64 * channels as u64,
            checksum: 0,
        }
    }

    #[test]
    fn test_container_metadata_attributes() {
        let metadata = ContainerMetadata::new(
            2,
            VolumeShape::default(),
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
        );
        let mut root = Group::new();
        metadata.write_to(&mut root);

        assert_eq!(root.attr(ATTR_ROIS).and_then(|v| v.as_str()), Some("A,B,C"));
        assert_eq!(
            root.attr(ATTR_PATIENT_SHAPE).and_then(|v| v.as_int_list()),
            Some(&[128i64, 128, 128][..])
        );

        let parsed = ContainerMetadata::from_group(&root).unwrap();
        assert_eq!(parsed.num_patients, 2);
        assert_eq!(parsed.rois, metadata.rois);
        assert!(parsed.created_at.is_some());
    }

    #[test]
    fn test_empty_vocabulary() {
        let metadata = ContainerMetadata::new(0, VolumeShape::default(), Vec::new());
        let mut root = Group::new();
        metadata.write_to(&mut root);
        let parsed = ContainerMetadata::from_group(&root).unwrap();
        assert!(parsed.rois.is_empty());
    }

    #[test]
    fn test_missing_root_attributes() {
        let err = ContainerMetadata::from_group(&Group::new()).unwrap_err();
        assert!(matches!(err, KbpError::MissingField(_)));
    }

    #[test]
    fn test_roi_names_with_gap() {
        let names: Vec<String> = OPENKBP_ROIS[..4].iter().map(|s| s.to_string()).collect();
        let mut group = Group::new();
        write_roi_names(&mut group, &names);
        group.remove_attr("roi_2");

        assert!(matches!(
            roi_name(&group, 2),
            Err(KbpError::MissingRoiMetadata(_))
        ));
        let recovered = read_roi_names(Some(&group), 4);
        assert_eq!(
            recovered,
            vec!["Brainstem", "SpinalCord", "Unknown_2", "LeftParotid"]
        );
        assert_eq!(read_roi_names(None, 2), vec!["Unknown_0", "Unknown_1"]);
    }

    #[test]
    fn test_patient_entry_checks_roi_count() {
        let mut group = Group::new();
        group.set_attr(ATTR_ID, "pt_7");
        group.set_attr(ATTR_NUM_ROIS, 2i64);
        group
            .insert_dataset(Field::StructureMasks.name(), mask_descriptor(3))
            .unwrap();
        let err = PatientEntry::from_group("pt_7", &group).unwrap_err();
        assert!(matches!(err, KbpError::SchemaViolation(_)));
    }

    #[test]
    fn test_patient_entry_falls_back_to_mask_channels() {
        let mut group = Group::new();
        group
            .insert_dataset(Field::StructureMasks.name(), mask_descriptor(2))
            .unwrap();
        let mut rois = Group::new();
        write_roi_names(&mut rois, &["A".to_string(), "B".to_string()]);
        group.insert_group(ROI_NAMES_GROUP, rois).unwrap();

        let entry = PatientEntry::from_group("pt_8", &group).unwrap();
        assert_eq!(entry.id, "pt_8");
        assert_eq!(entry.num_rois, 2);
        assert_eq!(entry.structure_mask_names, vec!["A", "B"]);
        assert!(entry.dataset("structure_masks").is_some());
    }

    #[test]
    fn test_field_names() {
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.name()), Some(field));
        }
        assert!(!Field::VoxelDimensions.is_volumetric());
        assert!(Field::StructureMasks.is_volumetric());
        assert_eq!(Field::from_name("roi_names"), None);
    }
}
