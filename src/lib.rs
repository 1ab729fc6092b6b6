//! kbpack - patient-organized volume containers
//!
//! Converts a directory-per-patient radiotherapy dataset (CT, dose, structure
//! masks, feasible-dose mask and voxel spacing, as in OpenKBP) into a single
//! random-access container file, and reads patients back out of it.
//!
//! # Features
//!
//! - One group per patient under `patients`, keyed by patient ID
//! - Lossless Deflate or Zstd compression of the volumetric datasets
//! - ROI names stored as ordinal `roi_<i>` attributes, recovered with
//!   `Unknown_<i>` placeholders when an attribute is missing
//! - Checksummed blobs and a footer index; an interrupted conversion leaves a
//!   file that is rejected on open
//!
//! # Example
//!
//! ```rust,ignore
//! use kbpack::{Container, Converter, ConverterConfig};
//!
//! # fn example(loader: impl kbpack::DataLoader) -> kbpack::Result<()> {
//! let mut converter = Converter::new(loader, ConverterConfig::new("/data/out"))?;
//! let path = converter.convert_dataset(None)?;
//!
//! let container = Container::open(&path)?;
//! for id in container.list_patients() {
//!     let patient = container.read_patient(&id)?;
//!     println!("{}: {:?}", id, patient.structure_mask_names);
//! }
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod array;
pub mod compression;
pub mod config;
pub mod converter;
pub mod error;
pub mod inspect;
pub mod io;
pub mod layout;
pub mod loader;
pub mod metadata;
pub mod types;
pub mod utils;

// Re-exports
pub use access::{list_patients, load_patient, Container, PatientData, PatientValue};
pub use array::VolumeArray;
pub use compression::{CompressionLevel, CompressionMethod, Compressor};
pub use config::ConverterConfig;
pub use converter::{convert_directory, convert_directory_with, Converter};
pub use error::{KbpError, Result};
pub use inspect::{inspect, InspectOutcome, SliceRenderer, SliceView};
pub use loader::{DataLoader, LoaderMode, MemoryLoader, PatientBatch, PatientSample};
pub use metadata::{ContainerMetadata, Field, PatientEntry};
pub use types::{DataType, VolumeShape};

/// Version of the kbpack implementation
pub const KBPACK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Magic number at the start and end of every container file
pub const KBP_MAGIC: &[u8; 4] = b"KBP\0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!KBPACK_VERSION.is_empty());
    }
}
