//! Converter configuration

use crate::compression::{CompressionLevel, CompressionMethod};
use crate::error::{KbpError, Result};
use crate::loader::LoaderMode;
use crate::types::VolumeShape;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default container file name
pub const DEFAULT_OUTPUT_FILENAME: &str = "openkbp_dataset.kbp";

/// Settings for one conversion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Directory the container is written into
    pub output_dir: PathBuf,

    /// Container file name inside `output_dir`
    pub output_filename: String,

    /// Compression for the volumetric datasets
    pub compression: CompressionMethod,

    /// Compression level for the volumetric datasets
    pub compression_level: CompressionLevel,

    /// Spatial extent every patient volume must have
    pub patient_shape: VolumeShape,

    /// Fields requested from the loader
    pub mode: LoaderMode,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            output_filename: DEFAULT_OUTPUT_FILENAME.to_string(),
            compression: CompressionMethod::Deflate,
            compression_level: CompressionLevel::best(),
            patient_shape: VolumeShape::OPENKBP,
            mode: LoaderMode::TrainingModel,
        }
    }
}

impl ConverterConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file; absent keys take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_output_filename(mut self, filename: impl Into<String>) -> Self {
        self.output_filename = filename.into();
        self
    }

    pub fn with_compression(mut self, method: CompressionMethod, level: CompressionLevel) -> Self {
        self.compression = method;
        self.compression_level = level;
        self
    }

    pub fn with_patient_shape(mut self, shape: VolumeShape) -> Self {
        self.patient_shape = shape;
        self
    }

    pub fn with_mode(mut self, mode: LoaderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Full path of the container file
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_filename)
    }

    pub fn validate(&self) -> Result<()> {
        let name = Path::new(&self.output_filename);
        if self.output_filename.is_empty() || name.file_name() != Some(name.as_os_str()) {
            return Err(KbpError::Configuration(format!(
                "output_filename must be a bare file name, got '{}'",
                self.output_filename
            )));
        }
        Ok(())
    }
}
