//! Reader/writer abstractions shared by every codec
//!
//! A [`Reader`] is an immutable borrowed view over encoded bytes: type
//! predicates, scalar accessors, and child access. Subviews are the same
//! type with the same lifetime and must not outlive the root buffer.
//!
//! A [`Writer`] is a stateful sink accepting one root value worth of
//! emission calls; [`RootWriter::finish`] terminates it and yields a
//! [`ZBuffer`]. Inside a map frame every value emission must be preceded
//! by exactly one `key` emission.
//!
//! [`Format`] ties a codec's reader and writer together under a name so
//! that generic code (builder DSL, translator, tensor adapter) is written
//! once against the abstraction.

use std::borrow::Cow;

use crate::buffer::ZBuffer;
use crate::error::{DeserializationError, SerializationError};

/// Immutable view over one encoded value.
///
/// `'a` is the lifetime of the root buffer; `index`/`get` return subviews
/// borrowing the same bytes.
pub trait Reader<'a>: Sized + Clone {
    /// Zero-allocation forward iterator over a map's keys, in the order the
    /// codec exposes them (insertion order everywhere except FlexBuffers,
    /// which stores keys sorted).
    type Keys: Iterator<Item = Result<Cow<'a, str>, DeserializationError>>;

    // ---- type predicates ----
    fn is_null(&self) -> bool;
    fn is_bool(&self) -> bool;
    fn is_int(&self) -> bool;
    fn is_uint(&self) -> bool;
    fn is_float(&self) -> bool;
    fn is_string(&self) -> bool;
    fn is_blob(&self) -> bool;
    fn is_array(&self) -> bool;
    fn is_map(&self) -> bool;

    // ---- scalar accessors ----
    fn as_bool(&self) -> Result<bool, DeserializationError>;

    /// Signed value of any integer representation. Raises when the stored
    /// value does not fit in `i64` (e.g. a u64 above `i64::MAX`).
    fn as_i64(&self) -> Result<i64, DeserializationError>;

    /// Unsigned value of any integer representation. Raises on negatives.
    fn as_u64(&self) -> Result<u64, DeserializationError>;

    fn as_f64(&self) -> Result<f64, DeserializationError>;

    /// String contents. Borrowed wherever the codec stores the bytes
    /// contiguously; owned only for CBOR indefinite-length strings.
    fn as_str(&self) -> Result<Cow<'a, str>, DeserializationError>;

    /// Blob contents. `Cow::Borrowed` signals span-backed storage (the
    /// zero-copy tensor path); `Cow::Owned` signals a materialized copy
    /// (JSON base64, CBOR indefinite chunks).
    fn as_blob(&self) -> Result<Cow<'a, [u8]>, DeserializationError>;

    // ---- width-narrowing accessors ----
    fn as_i8(&self) -> Result<i8, DeserializationError> {
        let v = self.as_i64()?;
        i8::try_from(v).map_err(|_| DeserializationError::new("int8 out of range"))
    }
    fn as_i16(&self) -> Result<i16, DeserializationError> {
        let v = self.as_i64()?;
        i16::try_from(v).map_err(|_| DeserializationError::new("int16 out of range"))
    }
    fn as_i32(&self) -> Result<i32, DeserializationError> {
        let v = self.as_i64()?;
        i32::try_from(v).map_err(|_| DeserializationError::new("int32 out of range"))
    }
    fn as_u8(&self) -> Result<u8, DeserializationError> {
        let v = self.as_u64()?;
        u8::try_from(v).map_err(|_| DeserializationError::new("uint8 out of range"))
    }
    fn as_u16(&self) -> Result<u16, DeserializationError> {
        let v = self.as_u64()?;
        u16::try_from(v).map_err(|_| DeserializationError::new("uint16 out of range"))
    }
    fn as_u32(&self) -> Result<u32, DeserializationError> {
        let v = self.as_u64()?;
        u32::try_from(v).map_err(|_| DeserializationError::new("uint32 out of range"))
    }
    fn as_f32(&self) -> Result<f32, DeserializationError> {
        Ok(self.as_f64()? as f32)
    }

    /// Owned string convenience.
    fn as_string(&self) -> Result<String, DeserializationError> {
        Ok(self.as_str()?.into_owned())
    }

    // ---- map interface ----
    fn map_keys(&self) -> Result<Self::Keys, DeserializationError>;
    fn contains(&self, key: &str) -> bool;
    fn get(&self, key: &str) -> Result<Self, DeserializationError>;

    // ---- array interface ----
    fn array_size(&self) -> Result<usize, DeserializationError>;
    fn index(&self, idx: usize) -> Result<Self, DeserializationError>;

    /// Single human-readable rendering for debugging. Shape may differ per
    /// codec; the default walks the value generically.
    fn render(&self) -> String {
        fn esc(s: &str) -> String {
            s.escape_default().to_string()
        }
        if self.is_null() {
            return "null".to_string();
        }
        if let Ok(b) = self.as_bool() {
            return b.to_string();
        }
        if self.is_int() {
            if let Ok(v) = self.as_i64() {
                return v.to_string();
            }
        }
        if self.is_uint() {
            if let Ok(v) = self.as_u64() {
                return v.to_string();
            }
        }
        if self.is_float() {
            if let Ok(v) = self.as_f64() {
                return v.to_string();
            }
        }
        if self.is_blob() {
            if let Ok(b) = self.as_blob() {
                return format!("blob[size={}]", b.len());
            }
        }
        if self.is_string() {
            if let Ok(s) = self.as_str() {
                return format!("\"{}\"", esc(&s));
            }
        }
        if self.is_map() {
            let mut out = String::from("{");
            if let Ok(keys) = self.map_keys() {
                let mut first = true;
                for key in keys.flatten() {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    out.push_str(&format!("\"{}\": ", esc(&key)));
                    match self.get(&key) {
                        Ok(child) => out.push_str(&child.render()),
                        Err(_) => out.push('?'),
                    }
                }
            }
            out.push('}');
            return out;
        }
        if self.is_array() {
            let mut out = String::from("[");
            if let Ok(n) = self.array_size() {
                for i in 0..n {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    match self.index(i) {
                        Ok(child) => out.push_str(&child.render()),
                        Err(_) => out.push('?'),
                    }
                }
            }
            out.push(']');
            return out;
        }
        "<unknown>".to_string()
    }
}

/// Emission sink for one root value. Object-safe so type-erased builders
/// can drive any codec.
pub trait Writer {
    fn null(&mut self) -> Result<(), SerializationError>;
    fn boolean(&mut self, v: bool) -> Result<(), SerializationError>;
    fn int64(&mut self, v: i64) -> Result<(), SerializationError>;
    fn uint64(&mut self, v: u64) -> Result<(), SerializationError>;
    fn float64(&mut self, v: f64) -> Result<(), SerializationError>;
    fn string(&mut self, s: &str) -> Result<(), SerializationError>;
    fn binary(&mut self, bytes: &[u8]) -> Result<(), SerializationError>;
    fn key(&mut self, k: &str) -> Result<(), SerializationError>;

    /// `n` is a size hint; MessagePack requires it to be exact (the header
    /// carries the count), ZERA patches the actual count at `end_array`.
    fn begin_array(&mut self, n: usize) -> Result<(), SerializationError>;
    fn end_array(&mut self) -> Result<(), SerializationError>;
    fn begin_map(&mut self, n: usize) -> Result<(), SerializationError>;
    fn end_map(&mut self) -> Result<(), SerializationError>;
}

/// A root writer is single-use: default-construct, emit at most one root
/// value, then `finish`. With no root emitted, `finish` encodes null.
pub trait RootWriter: Writer + Default {
    fn finish(self) -> Result<ZBuffer, SerializationError>;
}

/// Owning root reader: retains the buffer and hands out borrowed views.
pub trait RootReader: Sized {
    type View<'a>: Reader<'a>
    where
        Self: 'a;

    /// Validates the buffer's framing (headers, root reference) and takes
    /// ownership. Per-value validation happens lazily at access time.
    fn from_buffer(buf: ZBuffer) -> Result<Self, DeserializationError>;

    fn from_vec(bytes: Vec<u8>) -> Result<Self, DeserializationError> {
        Self::from_buffer(ZBuffer::from(bytes))
    }

    fn root(&self) -> Self::View<'_>;
}

/// A codec: a name plus its reader/writer pair.
pub trait Format {
    const NAME: &'static str;
    type Writer: RootWriter;
    type Reader: RootReader;
}
