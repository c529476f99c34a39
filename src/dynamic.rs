//! Runtime dynamic value
//!
//! `ZValue` covers the full logical domain and builds through the same
//! writer interface as the static DSL. The `Opaque` arm holds a
//! type-erased emitter so tensor types (or any other `Build` impl) can
//! ride along without widening the variant.

use std::fmt;
use std::rc::Rc;

use crate::build::Build;
use crate::error::SerializationError;
use crate::rw::Writer;

/// Type-erased single-value emitter.
#[derive(Clone)]
pub struct Opaque(Rc<dyn Fn(&mut dyn Writer) -> Result<(), SerializationError>>);

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<opaque>")
    }
}

/// Owned dynamic value over the JSON + blob domain.
#[derive(Debug, Clone)]
pub enum ZValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Blob(Vec<u8>),
    Array(Vec<ZValue>),
    Map(Vec<(String, ZValue)>),
    Opaque(Opaque),
}

impl ZValue {
    /// Capture any `Build` value as an opaque emitter.
    pub fn opaque(value: impl Build + 'static) -> Self {
        ZValue::Opaque(Opaque(Rc::new(move |w| value.build(w))))
    }
}

impl Build for ZValue {
    fn build(&self, w: &mut dyn Writer) -> Result<(), SerializationError> {
        match self {
            ZValue::Null => w.null(),
            ZValue::Bool(b) => w.boolean(*b),
            ZValue::Int(v) => w.int64(*v),
            ZValue::UInt(v) => w.uint64(*v),
            ZValue::Float(v) => w.float64(*v),
            ZValue::Str(s) => w.string(s),
            ZValue::Blob(b) => w.binary(b),
            ZValue::Array(items) => {
                w.begin_array(items.len())?;
                for item in items {
                    item.build(w)?;
                }
                w.end_array()
            }
            ZValue::Map(entries) => {
                w.begin_map(entries.len())?;
                for (k, v) in entries {
                    w.key(k)?;
                    v.build(w)?;
                }
                w.end_map()
            }
            ZValue::Opaque(op) => (op.0)(w),
        }
    }
}

impl From<bool> for ZValue {
    fn from(v: bool) -> Self {
        ZValue::Bool(v)
    }
}

impl From<i64> for ZValue {
    fn from(v: i64) -> Self {
        ZValue::Int(v)
    }
}

impl From<u64> for ZValue {
    fn from(v: u64) -> Self {
        ZValue::UInt(v)
    }
}

impl From<f64> for ZValue {
    fn from(v: f64) -> Self {
        ZValue::Float(v)
    }
}

impl From<&str> for ZValue {
    fn from(v: &str) -> Self {
        ZValue::Str(v.to_string())
    }
}

impl From<String> for ZValue {
    fn from(v: String) -> Self {
        ZValue::Str(v)
    }
}

impl From<Vec<u8>> for ZValue {
    fn from(v: Vec<u8>) -> Self {
        ZValue::Blob(v)
    }
}
