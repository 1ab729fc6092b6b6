//! Type-tagged n-dimensional arrays stored in patient datasets

use crate::error::{KbpError, Result};
use crate::types::{DataType, Element};
use ndarray::{Array2, ArrayD, Axis, Ix2, IxDyn};
use num_traits::ToPrimitive;

/// An n-dimensional numeric array whose element type is known at runtime
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeArray {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

macro_rules! dispatch {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            VolumeArray::U8($arr) => $body,
            VolumeArray::U16($arr) => $body,
            VolumeArray::U32($arr) => $body,
            VolumeArray::U64($arr) => $body,
            VolumeArray::I8($arr) => $body,
            VolumeArray::I16($arr) => $body,
            VolumeArray::I32($arr) => $body,
            VolumeArray::I64($arr) => $body,
            VolumeArray::F32($arr) => $body,
            VolumeArray::F64($arr) => $body,
        }
    };
}

/// Element types that can be wrapped in and extracted from a [`VolumeArray`]
pub trait ArrayElement: Element {
    fn wrap(array: ArrayD<Self>) -> VolumeArray;
    fn unwrap_ref(array: &VolumeArray) -> Option<&ArrayD<Self>>;
}

macro_rules! impl_array_element {
    ($ty:ty, $variant:ident) => {
        impl ArrayElement for $ty {
            fn wrap(array: ArrayD<Self>) -> VolumeArray {
                VolumeArray::$variant(array)
            }

            fn unwrap_ref(array: &VolumeArray) -> Option<&ArrayD<Self>> {
                match array {
                    VolumeArray::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<ArrayD<$ty>> for VolumeArray {
            fn from(array: ArrayD<$ty>) -> Self {
                VolumeArray::$variant(array)
            }
        }
    };
}

impl_array_element!(u8, U8);
impl_array_element!(u16, U16);
impl_array_element!(u32, U32);
impl_array_element!(u64, U64);
impl_array_element!(i8, I8);
impl_array_element!(i16, I16);
impl_array_element!(i32, I32);
impl_array_element!(i64, I64);
impl_array_element!(f32, F32);
impl_array_element!(f64, F64);

impl VolumeArray {
    /// Build an array from a shape and row-major values
    pub fn from_shape_vec<T: ArrayElement>(shape: &[usize], values: Vec<T>) -> Result<Self> {
        Ok(T::wrap(ArrayD::from_shape_vec(IxDyn(shape), values)?))
    }

    /// Element type of the array
    pub fn data_type(&self) -> DataType {
        match self {
            VolumeArray::U8(_) => DataType::U8,
            VolumeArray::U16(_) => DataType::U16,
            VolumeArray::U32(_) => DataType::U32,
            VolumeArray::U64(_) => DataType::U64,
            VolumeArray::I8(_) => DataType::I8,
            VolumeArray::I16(_) => DataType::I16,
            VolumeArray::I32(_) => DataType::I32,
            VolumeArray::I64(_) => DataType::I64,
            VolumeArray::F32(_) => DataType::F32,
            VolumeArray::F64(_) => DataType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    pub fn len(&self) -> usize {
        dispatch!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extent of the trailing (channel) axis
    pub fn channels(&self) -> Option<usize> {
        self.shape().last().copied()
    }

    /// Borrow the inner array when it holds elements of type `T`
    pub fn as_array<T: ArrayElement>(&self) -> Option<&ArrayD<T>> {
        T::unwrap_ref(self)
    }

    /// Size of the raw (uncompressed) encoding in bytes
    pub fn size_in_bytes(&self) -> usize {
        self.len() * self.data_type().size_in_bytes()
    }

    /// Encode elements in row-major order, little-endian
    pub fn to_le_bytes(&self) -> Vec<u8> {
        dispatch!(self, a => encode(a))
    }

    /// Decode a row-major little-endian buffer into an array of `data_type`
    pub fn from_le_bytes(data_type: DataType, shape: &[usize], bytes: &[u8]) -> Result<Self> {
        Ok(match data_type {
            DataType::U8 => VolumeArray::U8(decode(shape, bytes)?),
            DataType::U16 => VolumeArray::U16(decode(shape, bytes)?),
            DataType::U32 => VolumeArray::U32(decode(shape, bytes)?),
            DataType::U64 => VolumeArray::U64(decode(shape, bytes)?),
            DataType::I8 => VolumeArray::I8(decode(shape, bytes)?),
            DataType::I16 => VolumeArray::I16(decode(shape, bytes)?),
            DataType::I32 => VolumeArray::I32(decode(shape, bytes)?),
            DataType::I64 => VolumeArray::I64(decode(shape, bytes)?),
            DataType::F32 => VolumeArray::F32(decode(shape, bytes)?),
            DataType::F64 => VolumeArray::F64(decode(shape, bytes)?),
        })
    }

    /// Extract one channel of one depth slice of a `(depth, rows, cols, channels)` volume
    pub fn depth_slice(&self, depth: usize, channel: usize) -> Result<Array2<f64>> {
        let shape = self.shape();
        if shape.len() != 4 {
            return Err(KbpError::InvalidDimensions(format!(
                "Expected a 4-D volume, got shape {:?}",
                shape
            )));
        }
        if depth >= shape[0] {
            return Err(KbpError::OutOfBounds(format!(
                "Slice index {} outside depth range 0..{}",
                depth, shape[0]
            )));
        }
        if channel >= shape[3] {
            return Err(KbpError::OutOfBounds(format!(
                "Channel {} outside channel range 0..{}",
                channel, shape[3]
            )));
        }

        let plane = dispatch!(self, a => a
            .view()
            .index_axis_move(Axis(0), depth)
            .index_axis_move(Axis(2), channel)
            .mapv(|v| v.to_f64().unwrap_or(f64::NAN)));
        Ok(plane.into_dimensionality::<Ix2>()?)
    }
}

fn encode<T: Element>(array: &ArrayD<T>) -> Vec<u8> {
    let mut out = Vec::with_capacity(array.len() * T::DATA_TYPE.size_in_bytes());
    for &value in array.iter() {
        value.write_le(&mut out);
    }
    out
}

fn decode<T: Element>(shape: &[usize], bytes: &[u8]) -> Result<ArrayD<T>> {
    let size = T::DATA_TYPE.size_in_bytes();
    let expected = shape.iter().product::<usize>() * size;
    if bytes.len() != expected {
        return Err(KbpError::InvalidFormat(format!(
            "Array of shape {:?} ({}) needs {} bytes, got {}",
            shape,
            T::DATA_TYPE,
            expected,
            bytes.len()
        )));
    }

    let values = bytes.chunks_exact(size).map(T::read_le).collect();
    Ok(ArrayD::from_shape_vec(IxDyn(shape), values)?)
}
