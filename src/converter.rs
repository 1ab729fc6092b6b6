//! Dataset conversion - writes every patient of a loader into one container

use crate::access::{Container, PatientData};
use crate::array::VolumeArray;
use crate::compression::{CompressionLevel, CompressionMethod};
use crate::config::ConverterConfig;
use crate::error::{KbpError, Result};
use crate::io::ContainerWriter;
use crate::layout::Group;
use crate::loader::{DataLoader, PatientBatch};
use crate::metadata::{
    write_roi_names, ContainerMetadata, Field, ATTR_ID, ATTR_NUM_ROIS, PATIENTS_GROUP,
    ROI_NAMES_GROUP,
};
use crate::types::VolumeShape;
use std::fs;
use std::path::{Path, PathBuf};

/// Converts the patients of a [`DataLoader`] into a container file.
///
/// A run that fails part-way leaves the file without its footer index; such a
/// file is rejected by [`Container::open`] and must be regenerated.
pub struct Converter<L: DataLoader> {
    loader: L,
    config: ConverterConfig,
}

impl<L: DataLoader> Converter<L> {
    /// Create a converter, creating the output directory if needed
    pub fn new(loader: L, config: ConverterConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.output_dir)?;
        Ok(Self { loader, config })
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn output_path(&self) -> PathBuf {
        self.config.output_path()
    }

    /// Convert `patient_ids` (all known patients when `None`) in order.
    ///
    /// The first failing patient aborts the run.
    pub fn convert_dataset(&mut self, patient_ids: Option<Vec<String>>) -> Result<PathBuf> {
        let patient_ids = patient_ids.unwrap_or_else(|| self.loader.patient_id_list());
        let path = self.output_path();
        let total = patient_ids.len();

        log::info!(
            "Converting {} patients into {}",
            total,
            path.display()
        );

        let metadata =
            ContainerMetadata::new(total, self.config.patient_shape, self.loader.full_roi_list());
        metadata.check_rois()?;

        let mut writer = ContainerWriter::create(&path)?;
        metadata.write_to(writer.root_mut());
        writer.root_mut().create_group(PATIENTS_GROUP)?;

        for (i, patient_id) in patient_ids.iter().enumerate() {
            self.convert_patient_to_group(patient_id, &mut writer, PATIENTS_GROUP)
                .map_err(|err| {
                    log::error!("Conversion of patient {} failed: {}", patient_id, err);
                    err
                })?;
            log::info!("[{}/{}] converted patient {}", i + 1, total, patient_id);
        }

        let path = writer.finish()?;
        log::info!("Conversion complete. Container saved to {}", path.display());
        Ok(path)
    }

    /// Write one patient as a child group of the group at `parent`.
    ///
    /// Fails with [`KbpError::AlreadyExists`] before writing anything when
    /// `parent` already holds `patient_id`.
    pub fn convert_patient_to_group(
        &mut self,
        patient_id: &str,
        writer: &mut ContainerWriter,
        parent: &str,
    ) -> Result<()> {
        writer.group(parent)?.ensure_vacant(patient_id)?;

        let batch = self
            .loader
            .get_patients(&[patient_id.to_string()], self.config.mode)?;
        check_single_patient(&batch, patient_id)?;

        let fields = self.config.mode.required_fields();
        let names: &[String] = if fields.contains(&Field::StructureMasks) {
            let names = batch.roi_names(0)?;
            check_roi_contract(patient_id, batch.field(Field::StructureMasks, 0)?, names)?;
            names
        } else {
            &[]
        };

        for &field in fields.iter().filter(|f| f.is_volumetric()) {
            check_volume_shape(
                patient_id,
                field,
                batch.field(field, 0)?,
                &self.config.patient_shape,
            )?;
        }

        let mut group = Group::new();
        group.set_attr(ATTR_ID, patient_id);
        group.set_attr(ATTR_NUM_ROIS, names.len() as i64);

        for &field in fields {
            let (method, level) = if field.is_volumetric() {
                (self.config.compression, self.config.compression_level)
            } else {
                (CompressionMethod::None, CompressionLevel::default())
            };
            writer.write_dataset(&mut group, field.name(), batch.field(field, 0)?, method, level)?;
        }

        let mut roi_names = Group::new();
        write_roi_names(&mut roi_names, names);
        group.insert_group(ROI_NAMES_GROUP, roi_names)?;

        writer.group_mut(parent)?.insert_group(patient_id, group)
    }

    /// Patient IDs in the container this converter writes
    pub fn list_patients(&self) -> Result<Vec<String>> {
        Ok(Container::open(self.output_path())?.list_patients())
    }

    /// Load one patient back from the container this converter writes
    pub fn load_patient(&self, patient_id: &str) -> Result<PatientData> {
        Container::open(self.output_path())?.read_patient(patient_id)
    }
}

fn check_single_patient(batch: &PatientBatch, patient_id: &str) -> Result<()> {
    match batch.patient_ids.as_slice() {
        [id] if id == patient_id => Ok(()),
        ids => Err(KbpError::Loader(format!(
            "Requested patient {} but the loader returned {:?}",
            patient_id, ids
        ))),
    }
}

fn check_roi_contract(patient_id: &str, masks: &VolumeArray, names: &[String]) -> Result<()> {
    match masks.channels() {
        Some(channels) if channels == names.len() => Ok(()),
        channels => Err(KbpError::SchemaViolation(format!(
            "Patient {} has {} ROI names but structure_masks has {:?} channels",
            patient_id,
            names.len(),
            channels
        ))),
    }
}

fn check_volume_shape(
    patient_id: &str,
    field: Field,
    array: &VolumeArray,
    shape: &VolumeShape,
) -> Result<()> {
    if shape.matches(array.shape()) {
        Ok(())
    } else {
        Err(KbpError::InvalidDimensions(format!(
            "Patient {} {} has shape {:?}, expected {} with a channel axis",
            patient_id,
            field,
            array.shape(),
            shape
        )))
    }
}

/// Convert the dataset in `input_dir` into `output_dir/output_filename`.
///
/// `open_loader` builds the data loader for the input directory; it is only
/// called once the directory is known to exist.
pub fn convert_directory<L, F>(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    output_filename: Option<&str>,
    open_loader: F,
) -> Result<PathBuf>
where
    L: DataLoader,
    F: FnOnce(&Path) -> Result<L>,
{
    let mut config = ConverterConfig::new(output_dir.as_ref());
    if let Some(filename) = output_filename {
        config = config.with_output_filename(filename);
    }
    convert_directory_with(input_dir, config, open_loader)
}

/// Like [`convert_directory`] with a full configuration
pub fn convert_directory_with<L, F>(
    input_dir: impl AsRef<Path>,
    config: ConverterConfig,
    open_loader: F,
) -> Result<PathBuf>
where
    L: DataLoader,
    F: FnOnce(&Path) -> Result<L>,
{
    let input_dir = input_dir.as_ref();
    if !input_dir.exists() {
        return Err(KbpError::MissingInputDirectory(input_dir.to_path_buf()));
    }

    let loader = open_loader(input_dir)?;
    Converter::new(loader, config)?.convert_dataset(None)
}
