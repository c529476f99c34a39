//! FlexBuffers codec
//!
//! Wraps the `flexbuffers` crate for both directions. The crate's builder
//! API is lexically scoped (map/vector builders end when dropped), which
//! does not line up with a streaming `begin_*`/`end_*` writer, so the
//! writer accumulates a node tree under the container-stack protocol and
//! drives the builder recursively at `finish()`. The reader wraps
//! `flexbuffers::Reader`; subviews are plain references and map lookup is
//! the format's binary search over sorted keys.

use std::borrow::Cow;

use flexbuffers::{Builder, FlexBufferType, MapBuilder, MapReader, Reader as FlexRef, VectorBuilder};

use crate::buffer::ZBuffer;
use crate::error::{DeserializationError, SerializationError};
use crate::rw::{Format, Reader, RootReader, RootWriter, Writer};

/// FlexBuffers format marker.
pub struct Flex;

impl Format for Flex {
    const NAME: &'static str = "Flex";
    type Writer = FlexWriter;
    type Reader = FlexReader;
}

fn de(msg: impl Into<Cow<'static, str>>) -> DeserializationError {
    DeserializationError::new(msg)
}

/// Borrowed view over one FlexBuffers value.
#[derive(Clone)]
pub struct FlexView<'a> {
    r: FlexRef<&'a [u8]>,
}

impl<'a> FlexView<'a> {
    fn ty(&self) -> FlexBufferType {
        self.r.flexbuffer_type()
    }

    fn map(&self) -> Result<MapReader<&'a [u8]>, DeserializationError> {
        if !self.is_map() {
            return Err(de("flex: value is not a map"));
        }
        Ok(self.r.as_map())
    }
}

/// Forward iterator over a map's keys in the format's (sorted) order.
pub struct FlexKeys<'a> {
    map: MapReader<&'a [u8]>,
    i: usize,
    len: usize,
}

impl<'a> Iterator for FlexKeys<'a> {
    type Item = Result<Cow<'a, str>, DeserializationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.i >= self.len {
            return None;
        }
        let item = self.map.iter_keys().nth(self.i);
        self.i += 1;
        match item {
            Some(k) => Some(Ok(Cow::Borrowed(k))),
            None => Some(Err(de("flex: malformed keys vector"))),
        }
    }
}

impl<'a> Reader<'a> for FlexView<'a> {
    type Keys = FlexKeys<'a>;

    fn is_null(&self) -> bool {
        self.ty() == FlexBufferType::Null
    }

    fn is_bool(&self) -> bool {
        self.ty() == FlexBufferType::Bool
    }

    fn is_int(&self) -> bool {
        matches!(
            self.ty(),
            FlexBufferType::Int | FlexBufferType::IndirectInt
        )
    }

    fn is_uint(&self) -> bool {
        matches!(
            self.ty(),
            FlexBufferType::UInt | FlexBufferType::IndirectUInt
        )
    }

    fn is_float(&self) -> bool {
        matches!(
            self.ty(),
            FlexBufferType::Float | FlexBufferType::IndirectFloat
        )
    }

    fn is_string(&self) -> bool {
        self.ty() == FlexBufferType::String
    }

    fn is_blob(&self) -> bool {
        self.ty() == FlexBufferType::Blob
    }

    fn is_array(&self) -> bool {
        let t = self.ty();
        t != FlexBufferType::Map && t.is_vector()
    }

    fn is_map(&self) -> bool {
        self.ty() == FlexBufferType::Map
    }

    fn as_bool(&self) -> Result<bool, DeserializationError> {
        if !self.is_bool() {
            return Err(de("flex: value is not a bool"));
        }
        Ok(self.r.as_bool())
    }

    fn as_i64(&self) -> Result<i64, DeserializationError> {
        if self.is_int() {
            return Ok(self.r.as_i64());
        }
        if self.is_uint() {
            let u = self.r.as_u64();
            return i64::try_from(u).map_err(|_| de("flex: uint64 out of range for int64"));
        }
        Err(de("flex: value is not an integer"))
    }

    fn as_u64(&self) -> Result<u64, DeserializationError> {
        if self.is_uint() {
            return Ok(self.r.as_u64());
        }
        if self.is_int() {
            let v = self.r.as_i64();
            return u64::try_from(v).map_err(|_| de("flex: int64 out of range for uint64"));
        }
        Err(de("flex: value is not an integer"))
    }

    fn as_f64(&self) -> Result<f64, DeserializationError> {
        if !self.is_float() {
            return Err(de("flex: value is not a float"));
        }
        Ok(self.r.as_f64())
    }

    fn as_str(&self) -> Result<Cow<'a, str>, DeserializationError> {
        if !self.is_string() {
            return Err(de("flex: value is not a string"));
        }
        self.r
            .get_str()
            .map(Cow::Borrowed)
            .map_err(|e| de(format!("flex: {e:?}")))
    }

    fn as_blob(&self) -> Result<Cow<'a, [u8]>, DeserializationError> {
        if !self.is_blob() {
            return Err(de("flex: value is not a blob"));
        }
        self.r
            .get_blob()
            .map(|b| Cow::Borrowed(b.0))
            .map_err(|e| de(format!("flex: {e:?}")))
    }

    fn map_keys(&self) -> Result<Self::Keys, DeserializationError> {
        let map = self.map()?;
        let len = map.len();
        Ok(FlexKeys { map, i: 0, len })
    }

    fn contains(&self, key: &str) -> bool {
        self.map().map(|m| m.index(key).is_ok()).unwrap_or(false)
    }

    fn get(&self, key: &str) -> Result<Self, DeserializationError> {
        let m = self.map()?;
        m.index(key)
            .map(|r| FlexView { r })
            .map_err(|_| de(format!("flex: key not found: {key}")))
    }

    fn array_size(&self) -> Result<usize, DeserializationError> {
        if !self.is_array() {
            return Err(de("flex: value is not an array"));
        }
        Ok(self.r.as_vector().len())
    }

    fn index(&self, idx: usize) -> Result<Self, DeserializationError> {
        if !self.is_array() {
            return Err(de("flex: value is not an array"));
        }
        let v = self.r.as_vector();
        if idx >= v.len() {
            return Err(de("flex: array index out of bounds"));
        }
        Ok(FlexView { r: v.idx(idx) })
    }
}

/// Owning FlexBuffers reader.
pub struct FlexReader {
    buf: ZBuffer,
}

impl RootReader for FlexReader {
    type View<'a> = FlexView<'a>
    where
        Self: 'a;

    fn from_buffer(buf: ZBuffer) -> Result<Self, DeserializationError> {
        FlexRef::get_root(buf.as_slice()).map_err(|e| de(format!("flex: {e:?}")))?;
        Ok(FlexReader { buf })
    }

    fn root(&self) -> FlexView<'_> {
        // get_root was validated at construction over these same bytes
        FlexView {
            r: FlexRef::get_root(self.buf.as_slice()).unwrap_or_default(),
        }
    }
}

/// Borrowed zero-copy entry point.
pub fn parse(bytes: &[u8]) -> Result<FlexView<'_>, DeserializationError> {
    FlexRef::get_root(bytes)
        .map(|r| FlexView { r })
        .map_err(|e| de(format!("flex: {e:?}")))
}

// ---- writer --------------------------------------------------------------

/// Value tree accumulated before the external builder runs.
enum Node {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Blob(Vec<u8>),
    Array(Vec<Node>),
    Map(Vec<(String, Node)>),
}

enum Frame {
    Array(Vec<Node>),
    Map {
        entries: Vec<(String, Node)>,
        pending_key: Option<String>,
    },
}

/// FlexBuffers writer over the crate's scoped builder.
#[derive(Default)]
pub struct FlexWriter {
    frames: Vec<Frame>,
    root: Option<Node>,
}

impl FlexWriter {
    fn deliver(&mut self, v: Node) -> Result<(), SerializationError> {
        match self.frames.last_mut() {
            None => {
                if self.root.is_some() {
                    return Err(SerializationError::new("flex: multiple root values"));
                }
                self.root = Some(v);
                Ok(())
            }
            Some(Frame::Array(items)) => {
                items.push(v);
                Ok(())
            }
            Some(Frame::Map {
                entries,
                pending_key,
            }) => match pending_key.take() {
                Some(k) => {
                    entries.push((k, v));
                    Ok(())
                }
                None => Err(SerializationError::new(
                    "flex: map value emitted without key()",
                )),
            },
        }
    }
}

impl Writer for FlexWriter {
    fn null(&mut self) -> Result<(), SerializationError> {
        self.deliver(Node::Null)
    }

    fn boolean(&mut self, v: bool) -> Result<(), SerializationError> {
        self.deliver(Node::Bool(v))
    }

    fn int64(&mut self, v: i64) -> Result<(), SerializationError> {
        self.deliver(Node::Int(v))
    }

    fn uint64(&mut self, v: u64) -> Result<(), SerializationError> {
        self.deliver(Node::UInt(v))
    }

    fn float64(&mut self, v: f64) -> Result<(), SerializationError> {
        self.deliver(Node::Float(v))
    }

    fn string(&mut self, s: &str) -> Result<(), SerializationError> {
        self.deliver(Node::Str(s.to_string()))
    }

    fn binary(&mut self, bytes: &[u8]) -> Result<(), SerializationError> {
        self.deliver(Node::Blob(bytes.to_vec()))
    }

    fn key(&mut self, k: &str) -> Result<(), SerializationError> {
        match self.frames.last_mut() {
            Some(Frame::Map { pending_key, .. }) => {
                if pending_key.is_some() {
                    return Err(SerializationError::new(
                        "flex: key() called twice without value",
                    ));
                }
                if k.contains('\0') {
                    // the wire format null-terminates keys
                    return Err(SerializationError::new("flex: key contains NUL"));
                }
                *pending_key = Some(k.to_string());
                Ok(())
            }
            _ => Err(SerializationError::new("flex: key() outside map")),
        }
    }

    fn begin_array(&mut self, n: usize) -> Result<(), SerializationError> {
        self.frames.push(Frame::Array(Vec::with_capacity(n)));
        Ok(())
    }

    fn end_array(&mut self) -> Result<(), SerializationError> {
        match self.frames.pop() {
            Some(Frame::Array(items)) => self.deliver(Node::Array(items)),
            _ => Err(SerializationError::new("flex: end_array outside array")),
        }
    }

    fn begin_map(&mut self, n: usize) -> Result<(), SerializationError> {
        self.frames.push(Frame::Map {
            entries: Vec::with_capacity(n),
            pending_key: None,
        });
        Ok(())
    }

    fn end_map(&mut self) -> Result<(), SerializationError> {
        match self.frames.pop() {
            Some(Frame::Map {
                entries,
                pending_key,
            }) => {
                if pending_key.is_some() {
                    return Err(SerializationError::new("flex: end_map with dangling key()"));
                }
                self.deliver(Node::Map(entries))
            }
            _ => Err(SerializationError::new("flex: end_map outside map")),
        }
    }
}

fn emit_vector_item(vb: &mut VectorBuilder<'_>, node: &Node) {
    match node {
        Node::Null => vb.push(()),
        Node::Bool(v) => vb.push(*v),
        Node::Int(v) => vb.push(*v),
        Node::UInt(v) => vb.push(*v),
        Node::Float(v) => vb.push(*v),
        Node::Str(s) => vb.push(s.as_str()),
        Node::Blob(b) => vb.push(flexbuffers::Blob(b.as_slice())),
        Node::Array(items) => {
            let mut nested = vb.start_vector();
            for item in items {
                emit_vector_item(&mut nested, item);
            }
        }
        Node::Map(entries) => {
            let mut nested = vb.start_map();
            for (k, v) in entries {
                emit_map_entry(&mut nested, k, v);
            }
        }
    }
}

fn emit_map_entry(mb: &mut MapBuilder<'_>, key: &str, node: &Node) {
    match node {
        Node::Null => mb.push(key, ()),
        Node::Bool(v) => mb.push(key, *v),
        Node::Int(v) => mb.push(key, *v),
        Node::UInt(v) => mb.push(key, *v),
        Node::Float(v) => mb.push(key, *v),
        Node::Str(s) => mb.push(key, s.as_str()),
        Node::Blob(b) => mb.push(key, flexbuffers::Blob(b.as_slice())),
        Node::Array(items) => {
            let mut nested = mb.start_vector(key);
            for item in items {
                emit_vector_item(&mut nested, item);
            }
        }
        Node::Map(entries) => {
            let mut nested = mb.start_map(key);
            for (k, v) in entries {
                emit_map_entry(&mut nested, k, v);
            }
        }
    }
}

impl RootWriter for FlexWriter {
    fn finish(self) -> Result<ZBuffer, SerializationError> {
        if !self.frames.is_empty() {
            return Err(SerializationError::new(
                "flex: finish() with unterminated container",
            ));
        }
        let mut builder = Builder::default();
        match self.root.as_ref().unwrap_or(&Node::Null) {
            Node::Null => builder.build_singleton(()),
            Node::Bool(v) => builder.build_singleton(*v),
            Node::Int(v) => builder.build_singleton(*v),
            Node::UInt(v) => builder.build_singleton(*v),
            Node::Float(v) => builder.build_singleton(*v),
            Node::Str(s) => builder.build_singleton(s.as_str()),
            Node::Blob(b) => builder.build_singleton(flexbuffers::Blob(b.as_slice())),
            Node::Array(items) => {
                let mut vb = builder.start_vector();
                for item in items {
                    emit_vector_item(&mut vb, item);
                }
            }
            Node::Map(entries) => {
                let mut mb = builder.start_map();
                for (k, v) in entries {
                    emit_map_entry(&mut mb, k, v);
                }
            }
        }
        Ok(ZBuffer::from(builder.view().to_vec()))
    }
}
