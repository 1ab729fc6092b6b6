//! Core data types for patient volumes

use crate::error::{KbpError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element types an array dataset can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    /// Unsigned 8-bit integer
    U8 = 1,
    /// Unsigned 16-bit integer
    U16 = 2,
    /// Unsigned 32-bit integer
    U32 = 3,
    /// Unsigned 64-bit integer
    U64 = 4,
    /// Signed 8-bit integer
    I8 = 5,
    /// Signed 16-bit integer
    I16 = 6,
    /// Signed 32-bit integer
    I32 = 7,
    /// Signed 64-bit integer
    I64 = 8,
    /// 32-bit floating point
    F32 = 9,
    /// 64-bit floating point
    F64 = 10,
}

impl DataType {
    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::U64 | DataType::I64 | DataType::F64 => 8,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::U8 => "u8",
            DataType::U16 => "u16",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
            DataType::I8 => "i8",
            DataType::I16 => "i16",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Numeric element that can be stored in a container dataset.
///
/// Elements are always encoded little-endian on disk.
pub trait Element: Copy + Default + PartialEq + fmt::Debug + 'static {
    const DATA_TYPE: DataType;

    /// Append the little-endian encoding of `self` to `out`
    fn write_le(self, out: &mut Vec<u8>);

    /// Decode one element from exactly `size_in_bytes()` bytes
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

impl_element!(u8, U8);
impl_element!(u16, U16);
impl_element!(u32, U32);
impl_element!(u64, U64);
impl_element!(i8, I8);
impl_element!(i16, I16);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(f32, F32);
impl_element!(f64, F64);

/// Fixed spatial extent shared by every patient volume in a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawVolumeShape")]
pub struct VolumeShape {
    dims: [usize; 3],
}

/// Unchecked deserialized form of [`VolumeShape`]
#[derive(Deserialize)]
struct RawVolumeShape {
    dims: [usize; 3],
}

impl TryFrom<RawVolumeShape> for VolumeShape {
    type Error = KbpError;

    fn try_from(raw: RawVolumeShape) -> Result<Self> {
        Self::new(raw.dims)
    }
}

impl VolumeShape {
    /// The 128 x 128 x 128 grid used by the OpenKBP challenge data
    pub const OPENKBP: Self = Self {
        dims: [128, 128, 128],
    };

    /// Create a new volume shape
    pub fn new(dims: [usize; 3]) -> Result<Self> {
        if dims.iter().any(|&d| d == 0) {
            return Err(KbpError::InvalidDimensions(format!(
                "Volume shape must be non-empty, got {:?}",
                dims
            )));
        }
        Ok(Self { dims })
    }

    /// Get all dimensions
    pub fn dims(&self) -> &[usize; 3] {
        &self.dims
    }

    /// Check that an array shape is this volume plus one trailing channel axis
    pub fn matches(&self, shape: &[usize]) -> bool {
        shape.len() == 4 && shape[..3] == self.dims
    }
}

impl Default for VolumeShape {
    fn default() -> Self {
        Self::OPENKBP
    }
}

impl fmt::Display for VolumeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.dims[0], self.dims[1], self.dims[2])
    }
}
