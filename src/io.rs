//! Container file I/O
//!
//! A container file is framed as:
//!
//! ```text
//! magic "KBP\0"
//! dataset blobs, appended in write order
//! footer index (bincode of the group tree)
//! index length (u64 LE) | index CRC32 (u32 LE) | magic "KBP\0"
//! ```
//!
//! The footer is written last, so a file whose conversion was interrupted has
//! no trailer and is rejected on open.

use crate::array::VolumeArray;
use crate::compression::{get_compressor, CompressionLevel, CompressionMethod};
use crate::error::{KbpError, Result};
use crate::layout::{ContainerIndex, DatasetDescriptor, Group};
use crate::utils::format_bytes;
use crate::KBP_MAGIC;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const TRAILER_LEN: u64 = 8 + 4 + 4;

/// Sequential writer for a fresh container file
pub struct ContainerWriter {
    path: PathBuf,
    file: BufWriter<File>,
    position: u64,
    index: ContainerIndex,
}

impl ContainerWriter {
    /// Create (truncating) a container file, creating parent directories as needed
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = BufWriter::new(File::create(&path)?);
        file.write_all(KBP_MAGIC)?;

        Ok(Self {
            path,
            file,
            position: KBP_MAGIC.len() as u64,
            index: ContainerIndex::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Group {
        &self.index.root
    }

    pub fn root_mut(&mut self) -> &mut Group {
        &mut self.index.root
    }

    /// Resolve a nested group by `/`-separated path
    pub fn group(&self, path: &str) -> Result<&Group> {
        self.index
            .root
            .resolve(path)
            .ok_or_else(|| KbpError::NotFound(format!("group '{}'", path)))
    }

    pub fn group_mut(&mut self, path: &str) -> Result<&mut Group> {
        self.index
            .root
            .resolve_mut(path)
            .ok_or_else(|| KbpError::NotFound(format!("group '{}'", path)))
    }

    /// Append an array blob and register it as dataset `name` of `group`.
    ///
    /// `group` is usually a group still being built, attached to the tree
    /// once all of its members are written.
    pub fn write_dataset(
        &mut self,
        group: &mut Group,
        name: &str,
        array: &VolumeArray,
        compression: CompressionMethod,
        level: CompressionLevel,
    ) -> Result<()> {
        group.ensure_vacant(name)?;

        let raw = array.to_le_bytes();
        let stored = get_compressor(compression).compress(&raw, level)?;
        let desc = DatasetDescriptor {
            data_type: array.data_type(),
            shape: array.shape().to_vec(),
            compression,
            offset: self.position,
            stored_size: stored.len() as u64,
            raw_size: raw.len() as u64,
            checksum: crc32fast::hash(&stored),
        };

        self.file.write_all(&stored)?;
        self.position += stored.len() as u64;

        log::debug!(
            "wrote dataset '{}' {:?} {}: {} -> {} ({:?})",
            name,
            desc.shape,
            desc.data_type,
            format_bytes(desc.raw_size),
            format_bytes(desc.stored_size),
            compression
        );

        group.insert_dataset(name, desc)
    }

    /// Write the footer index and flush; the container is complete afterwards
    pub fn finish(mut self) -> Result<PathBuf> {
        let index = self.index.to_bytes()?;
        let checksum = crc32fast::hash(&index);

        self.file.write_all(&index)?;
        self.file.write_all(&(index.len() as u64).to_le_bytes())?;
        self.file.write_all(&checksum.to_le_bytes())?;
        self.file.write_all(KBP_MAGIC)?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        log::debug!(
            "finished container {} ({})",
            self.path.display(),
            format_bytes(self.position + index.len() as u64 + TRAILER_LEN)
        );
        Ok(self.path)
    }
}

/// Read-only handle on a completed container file
#[derive(Debug)]
pub struct ContainerFile {
    path: PathBuf,
    file: Mutex<File>,
    index: ContainerIndex,
}

impl ContainerFile {
    /// Open a container and load its footer index
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(KbpError::MissingContainer(path));
        }

        let mut file = File::open(&path)?;
        let len = file.metadata()?.len();
        let header_len = KBP_MAGIC.len() as u64;
        if len < header_len + TRAILER_LEN {
            return Err(KbpError::InvalidFormat(format!(
                "{} is too short to be a container ({} bytes)",
                path.display(),
                len
            )));
        }

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != KBP_MAGIC {
            return Err(KbpError::InvalidFormat(format!(
                "{} does not start with the container magic",
                path.display()
            )));
        }

        let mut trailer = [0u8; TRAILER_LEN as usize];
        file.seek(SeekFrom::End(-(TRAILER_LEN as i64)))?;
        file.read_exact(&mut trailer)?;
        if &trailer[12..16] != KBP_MAGIC {
            return Err(KbpError::InvalidFormat(format!(
                "{} has no footer; the conversion that wrote it did not complete",
                path.display()
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&trailer[..8]);
        let index_len = u64::from_le_bytes(len_bytes);
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&trailer[8..12]);
        let expected = u32::from_le_bytes(crc_bytes);

        if index_len > len - header_len - TRAILER_LEN {
            return Err(KbpError::InvalidFormat(format!(
                "Footer index length {} exceeds file size {}",
                index_len, len
            )));
        }

        let mut index_bytes = vec![0u8; index_len as usize];
        file.seek(SeekFrom::Start(len - TRAILER_LEN - index_len))?;
        file.read_exact(&mut index_bytes)?;
        let actual = crc32fast::hash(&index_bytes);
        if actual != expected {
            return Err(KbpError::ChecksumMismatch {
                name: "footer index".to_string(),
                expected,
                actual,
            });
        }

        let index = ContainerIndex::from_bytes(&index_bytes)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Group {
        &self.index.root
    }

    /// Read the stored bytes of a dataset, verifying its checksum
    pub fn read_blob(&self, name: &str, desc: &DatasetDescriptor) -> Result<Bytes> {
        let mut stored = vec![0u8; desc.stored_size as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(desc.offset))?;
            file.read_exact(&mut stored)?;
        }

        let actual = crc32fast::hash(&stored);
        if actual != desc.checksum {
            return Err(KbpError::ChecksumMismatch {
                name: name.to_string(),
                expected: desc.checksum,
                actual,
            });
        }
        Ok(Bytes::from(stored))
    }

    /// Read and decode a dataset
    pub fn read_dataset(&self, name: &str, desc: &DatasetDescriptor) -> Result<VolumeArray> {
        let stored = self.read_blob(name, desc)?;
        let raw = get_compressor(desc.compression)
            .decompress(&stored, Some(desc.raw_size as usize))?;
        if raw.len() as u64 != desc.raw_size {
            return Err(KbpError::Decompression(format!(
                "Dataset '{}' decoded to {} bytes, expected {}",
                name,
                raw.len(),
                desc.raw_size
            )));
        }
        VolumeArray::from_le_bytes(desc.data_type, &desc.shape, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    fn sample_array() -> VolumeArray {
        VolumeArray::from_shape_vec(&[2, 3, 4, 1], (0..24).map(|v| v as f32 * 0.5).collect())
            .unwrap()
    }

    fn write_sample(path: &Path) -> VolumeArray {
        let array = sample_array();
        let mut writer = ContainerWriter::create(path).unwrap();
        let mut group = Group::new();
        group.set_attr("id", "pt_1");
        writer
            .write_dataset(
                &mut group,
                "dose",
                &array,
                CompressionMethod::Deflate,
                CompressionLevel::best(),
            )
            .unwrap();
        writer
            .write_dataset(
                &mut group,
                "raw",
                &array,
                CompressionMethod::None,
                CompressionLevel::best(),
            )
            .unwrap();
        writer.root_mut().insert_group("pt_1", group).unwrap();
        writer.finish().unwrap();
        array
    }

    #[test]
    fn test_write_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("sample.kbp");
        let array = write_sample(&path);

        let container = ContainerFile::open(&path).unwrap();
        let group = container.root().group("pt_1").unwrap();
        assert_eq!(group.attr("id").and_then(|v| v.as_str()), Some("pt_1"));

        for name in ["dose", "raw"] {
            let desc = group.dataset(name).unwrap();
            let read = container.read_dataset(name, desc).unwrap();
            assert_eq!(read, array);
        }
        let raw = group.dataset("raw").unwrap();
        assert_eq!(raw.stored_size, raw.raw_size);
        let blob = container.read_blob("raw", raw).unwrap();
        assert_eq!(raw.checksum, crc32fast::hash(&blob));
        assert_eq!(blob.as_ref(), array.to_le_bytes().as_slice());
    }

    #[test]
    fn test_duplicate_dataset_name() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ContainerWriter::create(temp_dir.path().join("dup.kbp")).unwrap();
        let mut group = Group::new();
        let array = sample_array();
        writer
            .write_dataset(&mut group, "ct", &array, CompressionMethod::None, CompressionLevel::fast())
            .unwrap();
        let err = writer
            .write_dataset(&mut group, "ct", &array, CompressionMethod::None, CompressionLevel::fast())
            .unwrap_err();
        assert!(matches!(err, KbpError::AlreadyExists(_)));
    }

    #[test]
    fn test_missing_container() {
        let temp_dir = TempDir::new().unwrap();
        let err = ContainerFile::open(temp_dir.path().join("absent.kbp")).unwrap_err();
        assert!(matches!(err, KbpError::MissingContainer(_)));
    }

    #[test]
    fn test_unfinished_container_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("partial.kbp");
        {
            let mut writer = ContainerWriter::create(&path).unwrap();
            let mut group = Group::new();
            writer
                .write_dataset(
                    &mut group,
                    "dose",
                    &sample_array(),
                    CompressionMethod::None,
                    CompressionLevel::best(),
                )
                .unwrap();
            // dropped without finish()
        }
        let err = ContainerFile::open(&path).unwrap_err();
        assert!(matches!(err, KbpError::InvalidFormat(_)));
    }

    #[test]
    fn test_not_a_container() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("other.bin");
        fs::write(&path, vec![7u8; 64]).unwrap();
        let err = ContainerFile::open(&path).unwrap_err();
        assert!(matches!(err, KbpError::InvalidFormat(_)));
    }

    #[test]
    fn test_corrupted_blob_fails_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.kbp");
        write_sample(&path);

        let offset = {
            let container = ContainerFile::open(&path).unwrap();
            container.root().group("pt_1").unwrap().dataset("raw").unwrap().offset
        };
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(offset)).unwrap();
        file.write_all(&[0xAB, 0xCD]).unwrap();
        drop(file);

        let container = ContainerFile::open(&path).unwrap();
        let desc = container.root().group("pt_1").unwrap().dataset("raw").unwrap().clone();
        let err = container.read_dataset("raw", &desc).unwrap_err();
        assert!(matches!(err, KbpError::ChecksumMismatch { .. }));
    }
}
