//! JSON codec
//!
//! Standard JSON with one extension: a blob is represented as the
//! three-element array `["~b", "<base64>", "base64"]`, recognized by
//! `is_blob`/`as_blob`. The writer assembles a `serde_json` document under
//! the container-stack protocol; the reader hands out borrowed views into
//! the parsed document. Blob access always materializes (base64 decode),
//! so tensor adaptation over JSON never takes the zero-copy path.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Number, Value};

use crate::buffer::ZBuffer;
use crate::error::{DeserializationError, SerializationError};
use crate::rw::{Format, Reader, RootReader, RootWriter, Writer};

/// JSON format marker.
pub struct Json;

impl Format for Json {
    const NAME: &'static str = "Json";
    type Writer = JsonWriter;
    type Reader = JsonReader;
}

const BLOB_TAG: &str = "~b";
const BLOB_ENCODING: &str = "base64";

fn de(msg: impl Into<Cow<'static, str>>) -> DeserializationError {
    DeserializationError::new(msg)
}

/// Borrowed view into a parsed JSON document.
#[derive(Clone, Copy)]
pub struct JsonView<'a> {
    val: &'a Value,
}

impl<'a> JsonView<'a> {
    fn blob_parts(&self) -> Option<&'a str> {
        let arr = self.val.as_array()?;
        if arr.len() != 3 {
            return None;
        }
        let tag = arr[0].as_str()?;
        let payload = arr[1].as_str()?;
        let encoding = arr[2].as_str()?;
        (tag == BLOB_TAG && encoding == BLOB_ENCODING).then_some(payload)
    }
}

type KeyFn<'a> = fn(&'a String) -> Result<Cow<'a, str>, DeserializationError>;

impl<'a> Reader<'a> for JsonView<'a> {
    type Keys = std::iter::Map<serde_json::map::Keys<'a>, KeyFn<'a>>;

    fn is_null(&self) -> bool {
        self.val.is_null()
    }

    fn is_bool(&self) -> bool {
        self.val.is_boolean()
    }

    fn is_int(&self) -> bool {
        matches!(self.val, Value::Number(n) if n.is_i64())
    }

    fn is_uint(&self) -> bool {
        matches!(self.val, Value::Number(n) if n.is_u64())
    }

    fn is_float(&self) -> bool {
        matches!(self.val, Value::Number(n) if n.is_f64())
    }

    fn is_string(&self) -> bool {
        self.val.is_string()
    }

    fn is_blob(&self) -> bool {
        self.blob_parts().is_some()
    }

    fn is_array(&self) -> bool {
        self.val.is_array()
    }

    fn is_map(&self) -> bool {
        self.val.is_object()
    }

    fn as_bool(&self) -> Result<bool, DeserializationError> {
        self.val
            .as_bool()
            .ok_or_else(|| de("json: value is not a bool"))
    }

    fn as_i64(&self) -> Result<i64, DeserializationError> {
        self.val
            .as_i64()
            .ok_or_else(|| de("json: value is not a signed integer"))
    }

    fn as_u64(&self) -> Result<u64, DeserializationError> {
        self.val
            .as_u64()
            .ok_or_else(|| de("json: value is not an unsigned integer"))
    }

    fn as_f64(&self) -> Result<f64, DeserializationError> {
        match self.val {
            Value::Number(n) if n.is_f64() => {
                n.as_f64().ok_or_else(|| de("json: value is not a float"))
            }
            _ => Err(de("json: value is not a float")),
        }
    }

    fn as_str(&self) -> Result<Cow<'a, str>, DeserializationError> {
        self.val
            .as_str()
            .map(Cow::Borrowed)
            .ok_or_else(|| de("json: value is not a string"))
    }

    fn as_blob(&self) -> Result<Cow<'a, [u8]>, DeserializationError> {
        let payload = self
            .blob_parts()
            .ok_or_else(|| de("json: value is not a blob"))?;
        BASE64
            .decode(payload)
            .map(Cow::Owned)
            .map_err(|_| de("json: invalid base64 in blob"))
    }

    fn map_keys(&self) -> Result<Self::Keys, DeserializationError> {
        let obj = self
            .val
            .as_object()
            .ok_or_else(|| de("json: value is not a map"))?;
        Ok(obj.keys().map((|k| Ok(Cow::Borrowed(k.as_str()))) as KeyFn<'a>))
    }

    fn contains(&self, key: &str) -> bool {
        self.val
            .as_object()
            .is_some_and(|obj| obj.contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Self, DeserializationError> {
        let obj = self
            .val
            .as_object()
            .ok_or_else(|| de("json: value is not a map"))?;
        obj.get(key)
            .map(|val| JsonView { val })
            .ok_or_else(|| de(format!("json: key not found: {key}")))
    }

    fn array_size(&self) -> Result<usize, DeserializationError> {
        self.val
            .as_array()
            .map(Vec::len)
            .ok_or_else(|| de("json: value is not an array"))
    }

    fn index(&self, idx: usize) -> Result<Self, DeserializationError> {
        let arr = self
            .val
            .as_array()
            .ok_or_else(|| de("json: value is not an array"))?;
        arr.get(idx)
            .map(|val| JsonView { val })
            .ok_or_else(|| de("json: array index out of range"))
    }
}

/// Owning JSON reader (parses the document up-front).
pub struct JsonReader {
    doc: Value,
}

impl RootReader for JsonReader {
    type View<'a> = JsonView<'a>
    where
        Self: 'a;

    fn from_buffer(buf: ZBuffer) -> Result<Self, DeserializationError> {
        let doc: Value = serde_json::from_slice(buf.as_slice())
            .map_err(|e| de(format!("json: parse failed: {e}")))?;
        Ok(JsonReader { doc })
    }

    fn root(&self) -> JsonView<'_> {
        JsonView { val: &self.doc }
    }
}

/// Parse a JSON document; the returned reader owns the parsed tree.
pub fn parse(bytes: &[u8]) -> Result<JsonReader, DeserializationError> {
    JsonReader::from_buffer(ZBuffer::from(bytes.to_vec()))
}

// ---- writer --------------------------------------------------------------

enum Frame {
    Array(Vec<Value>),
    Object {
        map: Map<String, Value>,
        pending_key: Option<String>,
    },
}

/// JSON writer; assembles the document tree, serializes at `finish()`.
#[derive(Default)]
pub struct JsonWriter {
    frames: Vec<Frame>,
    root: Option<Value>,
}

impl JsonWriter {
    fn deliver(&mut self, v: Value) -> Result<(), SerializationError> {
        match self.frames.last_mut() {
            None => {
                if self.root.is_some() {
                    return Err(SerializationError::new("json: multiple root values"));
                }
                self.root = Some(v);
                Ok(())
            }
            Some(Frame::Array(items)) => {
                items.push(v);
                Ok(())
            }
            Some(Frame::Object { map, pending_key }) => match pending_key.take() {
                Some(k) => {
                    map.insert(k, v);
                    Ok(())
                }
                None => Err(SerializationError::new(
                    "json: map value emitted without key()",
                )),
            },
        }
    }
}

impl Writer for JsonWriter {
    fn null(&mut self) -> Result<(), SerializationError> {
        self.deliver(Value::Null)
    }

    fn boolean(&mut self, v: bool) -> Result<(), SerializationError> {
        self.deliver(Value::Bool(v))
    }

    fn int64(&mut self, v: i64) -> Result<(), SerializationError> {
        self.deliver(Value::Number(Number::from(v)))
    }

    fn uint64(&mut self, v: u64) -> Result<(), SerializationError> {
        self.deliver(Value::Number(Number::from(v)))
    }

    fn float64(&mut self, v: f64) -> Result<(), SerializationError> {
        let n = Number::from_f64(v)
            .ok_or_else(|| SerializationError::new("json: non-finite float is unrepresentable"))?;
        self.deliver(Value::Number(n))
    }

    fn string(&mut self, s: &str) -> Result<(), SerializationError> {
        self.deliver(Value::String(s.to_string()))
    }

    fn binary(&mut self, bytes: &[u8]) -> Result<(), SerializationError> {
        self.deliver(Value::Array(vec![
            Value::String(BLOB_TAG.to_string()),
            Value::String(BASE64.encode(bytes)),
            Value::String(BLOB_ENCODING.to_string()),
        ]))
    }

    fn key(&mut self, k: &str) -> Result<(), SerializationError> {
        match self.frames.last_mut() {
            Some(Frame::Object { pending_key, .. }) => {
                if pending_key.is_some() {
                    return Err(SerializationError::new(
                        "json: key() called twice without value",
                    ));
                }
                *pending_key = Some(k.to_string());
                Ok(())
            }
            _ => Err(SerializationError::new("json: key() outside map")),
        }
    }

    fn begin_array(&mut self, n: usize) -> Result<(), SerializationError> {
        self.frames.push(Frame::Array(Vec::with_capacity(n)));
        Ok(())
    }

    fn end_array(&mut self) -> Result<(), SerializationError> {
        match self.frames.pop() {
            Some(Frame::Array(items)) => self.deliver(Value::Array(items)),
            _ => Err(SerializationError::new("json: end_array outside array")),
        }
    }

    fn begin_map(&mut self, _n: usize) -> Result<(), SerializationError> {
        self.frames.push(Frame::Object {
            map: Map::new(),
            pending_key: None,
        });
        Ok(())
    }

    fn end_map(&mut self) -> Result<(), SerializationError> {
        match self.frames.pop() {
            Some(Frame::Object { map, pending_key }) => {
                if pending_key.is_some() {
                    return Err(SerializationError::new("json: end_map with dangling key()"));
                }
                self.deliver(Value::Object(map))
            }
            _ => Err(SerializationError::new("json: end_map outside map")),
        }
    }
}

impl RootWriter for JsonWriter {
    fn finish(self) -> Result<ZBuffer, SerializationError> {
        if !self.frames.is_empty() {
            return Err(SerializationError::new(
                "json: finish() with unterminated container",
            ));
        }
        let root = self.root.unwrap_or(Value::Null);
        let out = serde_json::to_vec(&root)
            .map_err(|e| SerializationError::new(format!("json: encode failed: {e}")))?;
        Ok(ZBuffer::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_wire_form() {
        let mut w = JsonWriter::default();
        w.binary(&[1, 2, 3]).unwrap();
        let buf = w.finish().unwrap();
        assert_eq!(
            std::str::from_utf8(buf.as_slice()).unwrap(),
            r#"["~b","AQID","base64"]"#
        );

        let reader = parse(buf.as_slice()).unwrap();
        let v = reader.root();
        assert!(v.is_blob());
        assert!(v.is_array());
        assert_eq!(v.as_blob().unwrap().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let reader = parse(br#"["~b","!!!","base64"]"#).unwrap();
        assert!(reader.root().as_blob().is_err());
    }

    #[test]
    fn integer_predicates_split_on_sign() {
        let reader = parse(b"[42, -5, 1.5]").unwrap();
        let root = reader.root();
        let pos = root.index(0).unwrap();
        assert!(pos.is_int() && pos.is_uint());
        let neg = root.index(1).unwrap();
        assert!(neg.is_int() && !neg.is_uint());
        assert!(neg.as_u64().is_err());
        let real = root.index(2).unwrap();
        assert!(real.is_float() && !real.is_int());
    }

    #[test]
    fn key_order_is_preserved() {
        let reader = parse(br#"{"z":1,"a":2,"m":3}"#).unwrap();
        let keys: Vec<String> = reader
            .root()
            .map_keys()
            .unwrap()
            .map(|k| k.unwrap().into_owned())
            .collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }
}
