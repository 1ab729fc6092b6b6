//! Container access - typed reading of converted patients

use crate::array::VolumeArray;
use crate::error::{KbpError, Result};
use crate::io::ContainerFile;
use crate::layout::Group;
use crate::metadata::{ContainerMetadata, Field, PatientEntry, PATIENTS_GROUP};
use std::collections::BTreeMap;
use std::path::Path;

/// One patient's arrays and ordered ROI names, as read back from a container
#[derive(Debug, Clone, PartialEq)]
pub struct PatientData {
    pub id: String,

    /// Every dataset stored for the patient, keyed by dataset name
    pub fields: BTreeMap<String, VolumeArray>,

    /// ROI names aligned to the channels of `structure_masks`
    pub structure_mask_names: Vec<String>,
}

impl PatientData {
    pub fn get(&self, field: Field) -> Option<&VolumeArray> {
        self.fields.get(field.name())
    }

    /// Like [`get`](Self::get) but fails when the dataset was not stored
    pub fn require(&self, field: Field) -> Result<&VolumeArray> {
        self.get(field)
            .ok_or_else(|| KbpError::MissingField(format!("{} of patient {}", field, self.id)))
    }

    pub fn dose(&self) -> Option<&VolumeArray> {
        self.get(Field::Dose)
    }

    pub fn ct(&self) -> Option<&VolumeArray> {
        self.get(Field::Ct)
    }

    pub fn structure_masks(&self) -> Option<&VolumeArray> {
        self.get(Field::StructureMasks)
    }

    pub fn possible_dose_mask(&self) -> Option<&VolumeArray> {
        self.get(Field::PossibleDoseMask)
    }

    pub fn voxel_dimensions(&self) -> Option<&VolumeArray> {
        self.get(Field::VoxelDimensions)
    }

    /// Flatten into the name -> value mapping, with the ROI names under
    /// `structure_mask_names`
    pub fn into_field_map(self) -> BTreeMap<String, PatientValue> {
        let mut map: BTreeMap<String, PatientValue> = self
            .fields
            .into_iter()
            .map(|(name, array)| (name, PatientValue::Array(array)))
            .collect();
        map.insert(
            crate::metadata::STRUCTURE_MASK_NAMES.to_string(),
            PatientValue::Names(self.structure_mask_names),
        );
        map
    }
}

/// A value in the flattened patient mapping
#[derive(Debug, Clone, PartialEq)]
pub enum PatientValue {
    Array(VolumeArray),
    Names(Vec<String>),
}

/// An opened, read-only container
pub struct Container {
    file: ContainerFile,
}

impl Container {
    /// Open a completed container
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            file: ContainerFile::open(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Container-wide attributes
    pub fn metadata(&self) -> Result<ContainerMetadata> {
        ContainerMetadata::from_group(self.file.root())
    }

    fn patients_group(&self) -> Option<&Group> {
        self.file.root().group(PATIENTS_GROUP)
    }

    /// Patient IDs in the order they were written; empty when there are none
    pub fn list_patients(&self) -> Vec<String> {
        self.patients_group()
            .map(|group| group.member_names().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn patient_group(&self, id: &str) -> Result<&Group> {
        self.patients_group()
            .and_then(|group| group.group(id))
            .ok_or_else(|| KbpError::UnknownPatient(id.to_string()))
    }

    /// Metadata-only view of a patient
    pub fn patient(&self, id: &str) -> Result<PatientEntry> {
        PatientEntry::from_group(id, self.patient_group(id)?)
    }

    /// Read every dataset of a patient together with its ROI names
    pub fn read_patient(&self, id: &str) -> Result<PatientData> {
        let entry = self.patient(id)?;

        let mut fields = BTreeMap::new();
        for (name, desc) in &entry.datasets {
            let array = self.file.read_dataset(name, desc)?;
            fields.insert(name.clone(), array);
        }

        Ok(PatientData {
            id: entry.id,
            fields,
            structure_mask_names: entry.structure_mask_names,
        })
    }
}

/// List the patient IDs stored in the container at `path`
pub fn list_patients(path: impl AsRef<Path>) -> Result<Vec<String>> {
    Ok(Container::open(path)?.list_patients())
}

/// Load one patient from the container at `path`
pub fn load_patient(path: impl AsRef<Path>, patient_id: &str) -> Result<PatientData> {
    Container::open(path)?.read_patient(patient_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{CompressionLevel, CompressionMethod};
    use crate::io::ContainerWriter;
    use crate::metadata::{write_roi_names, ATTR_ID, ATTR_NUM_ROIS, ROI_NAMES_GROUP};
    use crate::types::VolumeShape;
    use tempfile::TempDir;

    fn write_patient(writer: &mut ContainerWriter, id: &str, names: &[&str]) {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let masks = VolumeArray::from_shape_vec(
            &[2, 2, 2, names.len()],
            vec![1u8; 8 * names.len()],
        )
        .unwrap();

        let mut group = Group::new();
        group.set_attr(ATTR_ID, id);
        group.set_attr(ATTR_NUM_ROIS, names.len() as i64);
        writer
            .write_dataset(
                &mut group,
                Field::StructureMasks.name(),
                &masks,
                CompressionMethod::Deflate,
                CompressionLevel::best(),
            )
            .unwrap();
        let mut rois = Group::new();
        write_roi_names(&mut rois, &names);
        group.insert_group(ROI_NAMES_GROUP, rois).unwrap();
        writer
            .group_mut(PATIENTS_GROUP)
            .unwrap()
            .insert_group(id, group)
            .unwrap();
    }

    fn new_writer(path: &Path) -> ContainerWriter {
        let mut writer = ContainerWriter::create(path).unwrap();
        ContainerMetadata::new(0, VolumeShape::new([2, 2, 2]).unwrap(), Vec::new())
            .write_to(writer.root_mut());
        writer.root_mut().create_group(PATIENTS_GROUP).unwrap();
        writer
    }

    #[test]
    fn test_empty_container_lists_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.kbp");
        new_writer(&path).finish().unwrap();

        assert!(list_patients(&path).unwrap().is_empty());

        // no "patients" group at all
        let bare = temp_dir.path().join("bare.kbp");
        ContainerWriter::create(&bare).unwrap().finish().unwrap();
        assert!(list_patients(&bare).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_patient() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("one.kbp");
        let mut writer = new_writer(&path);
        write_patient(&mut writer, "pt_1", &["A"]);
        writer.finish().unwrap();

        let err = load_patient(&path, "pt_9").unwrap_err();
        assert!(matches!(err, KbpError::UnknownPatient(id) if id == "pt_9"));
    }

    #[test]
    fn test_removed_roi_attribute_is_recovered() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gap.kbp");
        let mut writer = new_writer(&path);
        write_patient(&mut writer, "pt_1", &["A", "B", "C"]);
        write_patient(&mut writer, "pt_2", &["A", "B", "C"]);
        writer
            .group_mut("patients/pt_1/roi_names")
            .unwrap()
            .remove_attr("roi_1");
        writer.finish().unwrap();

        let container = Container::open(&path).unwrap();
        let damaged = container.read_patient("pt_1").unwrap();
        assert_eq!(damaged.structure_mask_names, vec!["A", "Unknown_1", "C"]);
        let intact = container.read_patient("pt_2").unwrap();
        assert_eq!(intact.structure_mask_names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_field_map_contains_names() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("map.kbp");
        let mut writer = new_writer(&path);
        write_patient(&mut writer, "pt_1", &["A", "B"]);
        writer.finish().unwrap();

        let data = load_patient(&path, "pt_1").unwrap();
        assert!(data.require(Field::Dose).is_err());
        let map = data.into_field_map();
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["structure_mask_names", "structure_masks"]);
        assert_eq!(
            map["structure_mask_names"],
            PatientValue::Names(vec!["A".to_string(), "B".to_string()])
        );
    }
}
