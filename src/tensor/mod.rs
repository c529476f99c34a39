//! Tensor triples and zero-copy views
//!
//! A tensor is carried in any codec as the canonical triple
//! `(dtype_code, shape, data)`, either as a flat three-element array or a
//! map with `dtype`/`shape`/`data` keys. [`as_tensor`] adapts a reader
//! positioned at a triple into a [`TensorView`] that aliases the source
//! buffer whenever the blob is span-backed and properly aligned, and
//! transparently copies otherwise - always reporting which path was taken
//! and why in [`TensorViewInfo`].

use std::borrow::Cow;
use std::mem::{align_of, size_of};

use crate::build::Build;
use crate::error::{DeserializationError, SerializationError};
use crate::rw::{Reader, Writer};

#[cfg(feature = "ndarray")]
use ndarray::{ArrayD, ArrayViewD, IxDyn};

/// Canonical tensor element codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Int8 = 0,
    Int16 = 1,
    Int32 = 2,
    Int64 = 3,
    UInt8 = 4,
    UInt16 = 5,
    UInt32 = 6,
    UInt64 = 7,
    Float32 = 10,
    Float64 = 11,
    Complex64 = 12,
    Complex128 = 13,
    Float16 = 14,
}

impl DType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(DType::Int8),
            1 => Some(DType::Int16),
            2 => Some(DType::Int32),
            3 => Some(DType::Int64),
            4 => Some(DType::UInt8),
            5 => Some(DType::UInt16),
            6 => Some(DType::UInt32),
            7 => Some(DType::UInt64),
            10 => Some(DType::Float32),
            11 => Some(DType::Float64),
            12 => Some(DType::Complex64),
            13 => Some(DType::Complex128),
            14 => Some(DType::Float16),
            _ => None,
        }
    }

    /// Size in bytes of a single element.
    pub fn size(self) -> usize {
        match self {
            DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 | DType::Float16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 | DType::Complex64 => 8,
            DType::Complex128 => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
            DType::Float16 => "float16",
        }
    }
}

/// Element types a `TensorView` can be built over.
pub trait Element: Copy + 'static {
    const DTYPE: DType;
}

macro_rules! element {
    ($($t:ty => $d:expr),* $(,)?) => {$(
        impl Element for $t {
            const DTYPE: DType = $d;
        }
    )*};
}

element!(
    i8 => DType::Int8,
    i16 => DType::Int16,
    i32 => DType::Int32,
    i64 => DType::Int64,
    u8 => DType::UInt8,
    u16 => DType::UInt16,
    u32 => DType::UInt32,
    u64 => DType::UInt64,
    f32 => DType::Float32,
    f64 => DType::Float64,
);

/// Why a view did or did not take the zero-copy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewReason {
    /// Span-backed and aligned; the view aliases the source buffer.
    Ok,
    /// The blob accessor returned owning bytes (JSON, chunked CBOR).
    NotSpanBacked,
    /// Span-backed but the payload address is not element-aligned.
    Misaligned,
}

/// Zero-copy accounting attached to every adapted tensor.
#[derive(Debug, Clone, Copy)]
pub struct TensorViewInfo {
    pub zero_copy: bool,
    pub reason: ViewReason,
    pub required_alignment: usize,
    pub address: usize,
    pub byte_size: usize,
}

enum TensorData<'a, T> {
    Borrowed(&'a [T]),
    Owned(Vec<T>),
}

/// Either a borrowed alias of the source buffer or an owning aligned copy,
/// plus shape and the zero-copy report.
pub struct TensorView<'a, T: Element> {
    data: TensorData<'a, T>,
    shape: Vec<usize>,
    info: TensorViewInfo,
}

impl<'a, T: Element> TensorView<'a, T> {
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn info(&self) -> &TensorViewInfo {
        &self.info
    }

    /// Row-major elements.
    pub fn as_slice(&self) -> &[T] {
        match &self.data {
            TensorData::Borrowed(s) => s,
            TensorData::Owned(v) => v,
        }
    }

    /// Multi-dimensional view over the storage.
    #[cfg(feature = "ndarray")]
    pub fn view(&self) -> Result<ArrayViewD<'_, T>, DeserializationError> {
        ArrayViewD::from_shape(IxDyn(&self.shape), self.as_slice())
            .map_err(|_| DeserializationError::new("tensor shape does not match element count"))
    }

    /// Materialize an owned array (copies if this is a borrowed view).
    #[cfg(feature = "ndarray")]
    pub fn to_array(&self) -> Result<ArrayD<T>, DeserializationError> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.as_slice().to_vec())
            .map_err(|_| DeserializationError::new("tensor shape does not match element count"))
    }
}

const DTYPE_KEY: &str = "dtype";
const SHAPE_KEY: &str = "shape";
const DATA_KEY: &str = "data";

fn de(msg: impl Into<Cow<'static, str>>) -> DeserializationError {
    DeserializationError::new(msg)
}

fn triple<'a, R: Reader<'a>>(v: &R) -> Result<(R, R, R), DeserializationError> {
    if v.is_map() {
        return Ok((v.get(DTYPE_KEY)?, v.get(SHAPE_KEY)?, v.get(DATA_KEY)?));
    }
    if v.is_array() {
        if v.array_size()? < 3 {
            return Err(de("tensor: array form needs (dtype, shape, data)"));
        }
        return Ok((v.index(0)?, v.index(1)?, v.index(2)?));
    }
    Err(de("tensor: not a tensor representation"))
}

fn parse_shape<'a, R: Reader<'a>>(shape_ref: &R) -> Result<Vec<usize>, DeserializationError> {
    if !shape_ref.is_array() {
        return Err(de("tensor: shape must be an array"));
    }
    let n = shape_ref.array_size()?;
    let mut shape = Vec::with_capacity(n);
    for i in 0..n {
        let elem = shape_ref.index(i)?;
        let dim = if elem.is_uint() {
            elem.as_u64()?
        } else if elem.is_int() {
            let v = elem.as_i64()?;
            if v < 0 {
                return Err(de("tensor: dimensions must be non-negative"));
            }
            v as u64
        } else {
            return Err(de("tensor: shape contains a non-integer element"));
        };
        shape.push(usize::try_from(dim).map_err(|_| de("tensor: dimension overflow"))?);
    }
    Ok(shape)
}

fn checked_element_count(shape: &[usize]) -> Result<usize, DeserializationError> {
    let mut count = 1usize;
    for &dim in shape {
        if dim == 0 {
            return Ok(0);
        }
        count = count
            .checked_mul(dim)
            .ok_or_else(|| de("tensor: element count overflow"))?;
    }
    Ok(count)
}

/// Whether the reader is positioned at a triple of element type `T`.
pub fn is_tensor<'a, T: Element, R: Reader<'a>>(v: &R) -> bool {
    let Ok((dtype_ref, shape_ref, data_ref)) = triple(v) else {
        return false;
    };
    (dtype_ref.is_int() || dtype_ref.is_uint())
        && dtype_ref.as_i64().ok() == Some(T::DTYPE as i64)
        && shape_ref.is_array()
        && data_ref.is_blob()
}

/// Copy raw little-endian payload bytes into element storage.
fn copy_elements<T: Element>(bytes: &[u8], count: usize) -> Vec<T> {
    bytes
        .chunks_exact(size_of::<T>())
        .take(count)
        .map(|chunk| {
            let mut tmp = [0u8; 16];
            tmp[..chunk.len()].copy_from_slice(chunk);
            // SAFETY: tmp holds a full element's bytes; T is a primitive
            // (Element impls only) with no invalid bit patterns, and
            // read_unaligned has no alignment requirement.
            unsafe { std::ptr::read_unaligned(tmp.as_ptr() as *const T) }
        })
        .collect()
}

/// Adapt a reader positioned at a tensor triple.
pub fn as_tensor<'a, T: Element, R: Reader<'a>>(
    v: &R,
) -> Result<TensorView<'a, T>, DeserializationError> {
    let (dtype_ref, shape_ref, data_ref) = triple(v)?;

    let code = dtype_ref.as_i64()?;
    let dtype = DType::from_code(code).ok_or_else(|| de("tensor: unknown dtype code"))?;
    if dtype != T::DTYPE {
        return Err(de(format!(
            "tensor: requested {} but found {}",
            T::DTYPE.name(),
            dtype.name()
        )));
    }

    let shape = parse_shape(&shape_ref)?;
    let count = checked_element_count(&shape)?;
    let expected = count
        .checked_mul(size_of::<T>())
        .ok_or_else(|| de("tensor: byte size overflow"))?;

    let blob = data_ref.as_blob()?;
    if blob.len() != expected {
        return Err(de(format!(
            "tensor: expected {expected} bytes, found {}",
            blob.len()
        )));
    }

    let mut info = TensorViewInfo {
        zero_copy: false,
        reason: ViewReason::NotSpanBacked,
        required_alignment: align_of::<T>(),
        address: blob.as_ptr() as usize,
        byte_size: blob.len(),
    };

    let data = match blob {
        Cow::Owned(bytes) => {
            tracing::debug!(reason = "not span-backed", "tensor adapter copied payload");
            TensorData::Owned(copy_elements::<T>(&bytes, count))
        }
        Cow::Borrowed(bytes) => {
            if info.address % align_of::<T>() != 0 {
                info.reason = ViewReason::Misaligned;
                tracing::debug!(
                    address = info.address,
                    align = info.required_alignment,
                    "tensor adapter copied misaligned payload"
                );
                TensorData::Owned(copy_elements::<T>(bytes, count))
            } else {
                info.zero_copy = true;
                info.reason = ViewReason::Ok;
                // SAFETY: address alignment checked just above, byte length
                // equals count * size_of::<T>(), and T is a primitive with
                // no invalid bit patterns. Lifetime 'a is the source
                // buffer's borrow carried through Cow::Borrowed.
                let elems =
                    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const T, count) };
                TensorData::Borrowed(elems)
            }
        }
    };

    Ok(TensorView { data, shape, info })
}

/// Builder for the flat `(dtype, shape, data)` triple.
pub struct Tensor<'a, T: Element> {
    pub shape: &'a [usize],
    pub data: &'a [T],
}

impl<'a, T: Element> Tensor<'a, T> {
    pub fn new(shape: &'a [usize], data: &'a [T]) -> Self {
        Tensor { shape, data }
    }
}

fn element_bytes<T: Element>(data: &[T]) -> &[u8] {
    // SAFETY: any primitive slice is readable as bytes; length scales by
    // the element size.
    unsafe { std::slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data)) }
}

impl<T: Element> Build for Tensor<'_, T> {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        let count: usize = self.shape.iter().product();
        if count != self.data.len() {
            return Err(SerializationError::new(
                "tensor: shape does not match element count",
            ));
        }
        w.begin_array(3)?;
        w.int64(T::DTYPE as i64)?;
        w.begin_array(self.shape.len())?;
        for &dim in self.shape {
            w.uint64(dim as u64)?;
        }
        w.end_array()?;
        w.binary(element_bytes(self.data))?;
        w.end_array()
    }
}

#[cfg(feature = "ndarray")]
impl<T: Element> Build for ArrayD<T> {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        let data = self.as_slice().ok_or_else(|| {
            SerializationError::new("tensor: array is not in standard (row-major) layout")
        })?;
        Tensor {
            shape: self.shape(),
            data,
        }
        .build(w)
    }
}
