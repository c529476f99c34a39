//! CBOR codec
//!
//! The writer accumulates a `ciborium` value tree under the usual
//! container-stack protocol and lets ciborium's encoder produce the bytes
//! at `finish()` (definite lengths only). The reader is hand-written over
//! the wire format: each value decodes a `Head` from the major type and
//! additional-info bits, then either reports a scalar or scans children.
//! Indefinite-length strings, byte strings, arrays, and maps are
//! supported on read; indefinite strings and byte strings materialize
//! into owned storage on access.

use std::borrow::Cow;

use ciborium::value::Value as CborValue;

use crate::buffer::ZBuffer;
use crate::error::{DeserializationError, SerializationError};
use crate::rw::{Format, Reader, RootReader, RootWriter, Writer};

/// CBOR format marker.
pub struct Cbor;

impl Format for Cbor {
    const NAME: &'static str = "CBOR";
    type Writer = CborWriter;
    type Reader = CborReader;
}

fn de(msg: impl Into<Cow<'static, str>>) -> DeserializationError {
    DeserializationError::new(msg)
}

const BREAK: u8 = 0xff;

/// Decoded value header: major type, additional info, definite
/// length/value, header byte count, indefinite flag.
#[derive(Clone, Copy)]
struct Head {
    major: u8,
    addl: u8,
    val: u64,
    hlen: usize,
    indefinite: bool,
}

/// Overflow-safe `buf[at..at + len]`.
fn span(buf: &[u8], at: usize, len: u64) -> Option<&[u8]> {
    let len = usize::try_from(len).ok()?;
    let end = at.checked_add(len)?;
    buf.get(at..end)
}

fn get_be(buf: &[u8], at: usize, n: usize) -> Result<u64, DeserializationError> {
    let bytes = buf
        .get(at..at + n)
        .ok_or_else(|| de("cbor: truncated header"))?;
    let mut v = 0u64;
    for &b in bytes {
        v = (v << 8) | u64::from(b);
    }
    Ok(v)
}

fn read_head(buf: &[u8], p: usize) -> Result<Head, DeserializationError> {
    let b = *buf.get(p).ok_or_else(|| de("cbor: truncated input"))?;
    let mut h = Head {
        major: b >> 5,
        addl: b & 0x1f,
        val: 0,
        hlen: 1,
        indefinite: false,
    };
    if h.major == 7 {
        match h.addl {
            25 => h.val = 2,
            26 => h.val = 4,
            27 => h.val = 8,
            24 => {
                if p + 2 > buf.len() {
                    return Err(de("cbor: truncated simple(24)"));
                }
                h.hlen = 2;
            }
            31 => h.indefinite = true,
            28..=30 => return Err(de("cbor: reserved additional info")),
            _ => {}
        }
        return Ok(h);
    }
    match h.addl {
        0..=23 => h.val = u64::from(h.addl),
        24 => {
            h.val = get_be(buf, p + 1, 1)?;
            h.hlen = 2;
        }
        25 => {
            h.val = get_be(buf, p + 1, 2)?;
            h.hlen = 3;
        }
        26 => {
            h.val = get_be(buf, p + 1, 4)?;
            h.hlen = 5;
        }
        27 => {
            h.val = get_be(buf, p + 1, 8)?;
            h.hlen = 9;
        }
        31 => h.indefinite = true,
        _ => return Err(de("cbor: reserved additional info")),
    }
    Ok(h)
}

/// Offset just past the value starting at `p`.
fn skip(buf: &[u8], p: usize) -> Result<usize, DeserializationError> {
    let h = read_head(buf, p)?;
    let mut q = p + h.hlen;
    match h.major {
        0 | 1 => Ok(q),
        2 | 3 => {
            if !h.indefinite {
                let end = q
                    .checked_add(usize::try_from(h.val).map_err(|_| de("cbor: length overflow"))?)
                    .ok_or_else(|| de("cbor: length overflow"))?;
                if end > buf.len() {
                    return Err(de("cbor: truncated string"));
                }
                Ok(end)
            } else {
                loop {
                    let b = *buf.get(q).ok_or_else(|| de("cbor: truncated chunks"))?;
                    if b == BREAK {
                        return Ok(q + 1);
                    }
                    let ch = read_head(buf, q)?;
                    if ch.major != h.major || ch.indefinite {
                        return Err(de("cbor: bad indefinite chunk"));
                    }
                    let body =
                        usize::try_from(ch.val).map_err(|_| de("cbor: length overflow"))?;
                    q = q
                        .checked_add(ch.hlen)
                        .and_then(|x| x.checked_add(body))
                        .ok_or_else(|| de("cbor: length overflow"))?;
                    if q > buf.len() {
                        return Err(de("cbor: truncated chunk"));
                    }
                }
            }
        }
        4 => {
            if !h.indefinite {
                for _ in 0..h.val {
                    q = skip(buf, q)?;
                }
                Ok(q)
            } else {
                loop {
                    let b = *buf.get(q).ok_or_else(|| de("cbor: truncated array"))?;
                    if b == BREAK {
                        return Ok(q + 1);
                    }
                    q = skip(buf, q)?;
                }
            }
        }
        5 => {
            if !h.indefinite {
                for _ in 0..h.val {
                    q = skip(buf, q)?;
                    q = skip(buf, q)?;
                }
                Ok(q)
            } else {
                loop {
                    let b = *buf.get(q).ok_or_else(|| de("cbor: truncated map"))?;
                    if b == BREAK {
                        return Ok(q + 1);
                    }
                    q = skip(buf, q)?;
                    q = skip(buf, q)?;
                }
            }
        }
        6 => skip(buf, q),
        _ => {
            // major 7: floats and simples, body length precomputed in val
            let end = q + h.val as usize;
            if end > buf.len() {
                return Err(de("cbor: truncated float"));
            }
            Ok(end)
        }
    }
}

fn decode_f16(h: u16) -> f64 {
    let sign = if h >> 15 & 1 == 1 { -1.0 } else { 1.0 };
    let exp = (h >> 10) & 0x1f;
    let frac = h & 0x3ff;
    if exp == 0 {
        if frac == 0 {
            return sign * 0.0;
        }
        return sign * f64::from(frac) * (2.0f64).powi(-24);
    }
    if exp == 31 {
        return if frac != 0 {
            f64::NAN
        } else {
            sign * f64::INFINITY
        };
    }
    let mant = 1.0 + f64::from(frac) / 1024.0;
    sign * mant * (2.0f64).powi(i32::from(exp) - 15)
}

/// Borrowed view over one CBOR value.
#[derive(Clone, Copy)]
pub struct CborView<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> CborView<'a> {
    fn head(&self) -> Result<Head, DeserializationError> {
        read_head(self.buf, self.pos)
    }

    fn body(&self, h: &Head) -> usize {
        self.pos + h.hlen
    }

    fn text(&self) -> Result<Cow<'a, str>, DeserializationError> {
        let h = self.head()?;
        if h.major != 3 {
            return Err(de("cbor: value is not a string"));
        }
        if !h.indefinite {
            let q = self.body(&h);
            let bytes = span(self.buf, q, h.val).ok_or_else(|| de("cbor: truncated string"))?;
            return std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|_| de("cbor: invalid UTF-8 in string"));
        }
        let mut out = String::new();
        let mut q = self.body(&h);
        loop {
            let b = *self.buf.get(q).ok_or_else(|| de("cbor: truncated chunks"))?;
            if b == BREAK {
                return Ok(Cow::Owned(out));
            }
            let ch = read_head(self.buf, q)?;
            if ch.major != 3 || ch.indefinite {
                return Err(de("cbor: bad text chunk"));
            }
            q += ch.hlen;
            let bytes = span(self.buf, q, ch.val).ok_or_else(|| de("cbor: truncated chunk"))?;
            out.push_str(
                std::str::from_utf8(bytes).map_err(|_| de("cbor: invalid UTF-8 in string"))?,
            );
            q += bytes.len();
        }
    }

    fn child_at(&self, q: usize) -> CborView<'a> {
        CborView {
            buf: self.buf,
            pos: q,
        }
    }

    fn map_head(&self) -> Result<Head, DeserializationError> {
        let h = self.head()?;
        if h.major != 5 {
            return Err(de("cbor: value is not a map"));
        }
        Ok(h)
    }
}

/// Forward iterator over a map's keys.
pub struct CborKeys<'a> {
    view: CborView<'a>,
    q: usize,
    remaining: u64,
    indefinite: bool,
    done: bool,
}

impl<'a> Iterator for CborKeys<'a> {
    type Item = Result<Cow<'a, str>, DeserializationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.indefinite {
            match self.view.buf.get(self.q) {
                Some(&BREAK) => {
                    self.done = true;
                    return None;
                }
                None => {
                    self.done = true;
                    return Some(Err(de("cbor: truncated indefinite map")));
                }
                Some(_) => {}
            }
        } else {
            if self.remaining == 0 {
                self.done = true;
                return None;
            }
            self.remaining -= 1;
        }
        let step = || -> Result<(Cow<'a, str>, usize), DeserializationError> {
            let key = self.view.child_at(self.q).text()?;
            let after_key = skip(self.view.buf, self.q)?;
            let after_val = skip(self.view.buf, after_key)?;
            Ok((key, after_val))
        };
        match step() {
            Ok((key, next_q)) => {
                self.q = next_q;
                Some(Ok(key))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<'a> Reader<'a> for CborView<'a> {
    type Keys = CborKeys<'a>;

    fn is_null(&self) -> bool {
        matches!(self.head(), Ok(h) if h.major == 7 && h.addl == 22)
    }

    fn is_bool(&self) -> bool {
        matches!(self.head(), Ok(h) if h.major == 7 && (h.addl == 20 || h.addl == 21))
    }

    fn is_int(&self) -> bool {
        // major 0 values above i64::MAX are unsigned-only, so the
        // int/uint predicates stay consistent with the accessors
        matches!(self.head(), Ok(h) if h.major == 1 || (h.major == 0 && h.val <= i64::MAX as u64))
    }

    fn is_uint(&self) -> bool {
        matches!(self.head(), Ok(h) if h.major == 0)
    }

    fn is_float(&self) -> bool {
        matches!(self.head(), Ok(h) if h.major == 7 && matches!(h.addl, 25 | 26 | 27))
    }

    fn is_string(&self) -> bool {
        matches!(self.head(), Ok(h) if h.major == 3)
    }

    fn is_blob(&self) -> bool {
        matches!(self.head(), Ok(h) if h.major == 2)
    }

    fn is_array(&self) -> bool {
        matches!(self.head(), Ok(h) if h.major == 4)
    }

    fn is_map(&self) -> bool {
        matches!(self.head(), Ok(h) if h.major == 5)
    }

    fn as_bool(&self) -> Result<bool, DeserializationError> {
        let h = self.head()?;
        match (h.major, h.addl) {
            (7, 20) => Ok(false),
            (7, 21) => Ok(true),
            _ => Err(de("cbor: value is not a bool")),
        }
    }

    fn as_i64(&self) -> Result<i64, DeserializationError> {
        let h = self.head()?;
        match h.major {
            0 => i64::try_from(h.val).map_err(|_| de("cbor: uint64 out of range for int64")),
            1 => {
                // negative: -1 - n
                let n = i64::try_from(h.val).map_err(|_| de("cbor: int64 underflow"))?;
                Ok(-1 - n)
            }
            _ => Err(de("cbor: value is not an integer")),
        }
    }

    fn as_u64(&self) -> Result<u64, DeserializationError> {
        let h = self.head()?;
        match h.major {
            0 => Ok(h.val),
            1 => Err(de("cbor: negative out of range for uint64")),
            _ => Err(de("cbor: value is not an integer")),
        }
    }

    fn as_f64(&self) -> Result<f64, DeserializationError> {
        let h = self.head()?;
        if h.major != 7 {
            return Err(de("cbor: value is not a float"));
        }
        let q = self.body(&h);
        match h.addl {
            25 => Ok(decode_f16(get_be(self.buf, q, 2)? as u16)),
            26 => Ok(f64::from(f32::from_bits(get_be(self.buf, q, 4)? as u32))),
            27 => Ok(f64::from_bits(get_be(self.buf, q, 8)?)),
            _ => Err(de("cbor: value is not a float")),
        }
    }

    fn as_str(&self) -> Result<Cow<'a, str>, DeserializationError> {
        self.text()
    }

    fn as_blob(&self) -> Result<Cow<'a, [u8]>, DeserializationError> {
        let h = self.head()?;
        if h.major != 2 {
            return Err(de("cbor: value is not a byte string"));
        }
        if !h.indefinite {
            let q = self.body(&h);
            let bytes = span(self.buf, q, h.val).ok_or_else(|| de("cbor: truncated byte string"))?;
            return Ok(Cow::Borrowed(bytes));
        }
        // indefinite: stream chunks into an owning vector
        let mut out = Vec::new();
        let mut q = self.body(&h);
        loop {
            let b = *self.buf.get(q).ok_or_else(|| de("cbor: truncated chunks"))?;
            if b == BREAK {
                return Ok(Cow::Owned(out));
            }
            let ch = read_head(self.buf, q)?;
            if ch.major != 2 || ch.indefinite {
                return Err(de("cbor: bad byte string chunk"));
            }
            q += ch.hlen;
            let bytes = span(self.buf, q, ch.val).ok_or_else(|| de("cbor: truncated chunk"))?;
            out.extend_from_slice(bytes);
            q += bytes.len();
        }
    }

    fn map_keys(&self) -> Result<Self::Keys, DeserializationError> {
        let h = self.map_head()?;
        Ok(CborKeys {
            view: *self,
            q: self.body(&h),
            remaining: h.val,
            indefinite: h.indefinite,
            done: false,
        })
    }

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_ok()
    }

    fn get(&self, key: &str) -> Result<Self, DeserializationError> {
        let h = self.map_head()?;
        let mut q = self.body(&h);
        let mut remaining = h.val;
        loop {
            if h.indefinite {
                match self.buf.get(q) {
                    Some(&BREAK) => break,
                    None => return Err(de("cbor: truncated indefinite map")),
                    Some(_) => {}
                }
            } else {
                if remaining == 0 {
                    break;
                }
                remaining -= 1;
            }
            let k = self.child_at(q).text()?;
            q = skip(self.buf, q)?;
            if k == key {
                return Ok(self.child_at(q));
            }
            q = skip(self.buf, q)?;
        }
        Err(de(format!("cbor: key not found: {key}")))
    }

    fn array_size(&self) -> Result<usize, DeserializationError> {
        let h = self.head()?;
        if h.major != 4 {
            return Err(de("cbor: value is not an array"));
        }
        if !h.indefinite {
            return usize::try_from(h.val).map_err(|_| de("cbor: array length overflow"));
        }
        let mut q = self.body(&h);
        let mut count = 0usize;
        loop {
            match self.buf.get(q) {
                Some(&BREAK) => return Ok(count),
                None => return Err(de("cbor: truncated indefinite array")),
                Some(_) => {
                    q = skip(self.buf, q)?;
                    count += 1;
                }
            }
        }
    }

    fn index(&self, idx: usize) -> Result<Self, DeserializationError> {
        let h = self.head()?;
        if h.major != 4 {
            return Err(de("cbor: value is not an array"));
        }
        let mut q = self.body(&h);
        if !h.indefinite {
            if (idx as u64) >= h.val {
                return Err(de("cbor: array index out of bounds"));
            }
            for _ in 0..idx {
                q = skip(self.buf, q)?;
            }
            return Ok(self.child_at(q));
        }
        let mut i = 0usize;
        loop {
            match self.buf.get(q) {
                Some(&BREAK) | None => return Err(de("cbor: array index out of bounds")),
                Some(_) => {
                    if i == idx {
                        return Ok(self.child_at(q));
                    }
                    q = skip(self.buf, q)?;
                    i += 1;
                }
            }
        }
    }
}

/// Owning CBOR reader.
pub struct CborReader {
    buf: ZBuffer,
}

impl RootReader for CborReader {
    type View<'a> = CborView<'a>
    where
        Self: 'a;

    fn from_buffer(buf: ZBuffer) -> Result<Self, DeserializationError> {
        let consumed = skip(buf.as_slice(), 0)?;
        if consumed != buf.len() {
            return Err(de("cbor: trailing bytes after root value"));
        }
        Ok(CborReader { buf })
    }

    fn root(&self) -> CborView<'_> {
        CborView {
            buf: self.buf.as_slice(),
            pos: 0,
        }
    }
}

/// Borrowed zero-copy entry point.
pub fn parse(bytes: &[u8]) -> Result<CborView<'_>, DeserializationError> {
    let consumed = skip(bytes, 0)?;
    if consumed != bytes.len() {
        return Err(de("cbor: trailing bytes after root value"));
    }
    Ok(CborView { buf: bytes, pos: 0 })
}

// ---- writer --------------------------------------------------------------

enum Frame {
    Array(Vec<CborValue>),
    Map {
        entries: Vec<(CborValue, CborValue)>,
        pending_key: Option<String>,
    },
}

/// CBOR writer over the `ciborium` encoder.
#[derive(Default)]
pub struct CborWriter {
    frames: Vec<Frame>,
    root: Option<CborValue>,
}

impl CborWriter {
    fn deliver(&mut self, v: CborValue) -> Result<(), SerializationError> {
        match self.frames.last_mut() {
            None => {
                if self.root.is_some() {
                    return Err(SerializationError::new("cbor: multiple root values"));
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
                    entries.push((CborValue::Text(k), v));
                    Ok(())
                }
                None => Err(SerializationError::new(
                    "cbor: map value emitted without key()",
                )),
            },
        }
    }
}

impl Writer for CborWriter {
    fn null(&mut self) -> Result<(), SerializationError> {
        self.deliver(CborValue::Null)
    }

    fn boolean(&mut self, v: bool) -> Result<(), SerializationError> {
        self.deliver(CborValue::Bool(v))
    }

    fn int64(&mut self, v: i64) -> Result<(), SerializationError> {
        self.deliver(CborValue::Integer(v.into()))
    }

    fn uint64(&mut self, v: u64) -> Result<(), SerializationError> {
        self.deliver(CborValue::Integer(v.into()))
    }

    fn float64(&mut self, v: f64) -> Result<(), SerializationError> {
        self.deliver(CborValue::Float(v))
    }

    fn string(&mut self, s: &str) -> Result<(), SerializationError> {
        self.deliver(CborValue::Text(s.to_string()))
    }

    fn binary(&mut self, bytes: &[u8]) -> Result<(), SerializationError> {
        self.deliver(CborValue::Bytes(bytes.to_vec()))
    }

    fn key(&mut self, k: &str) -> Result<(), SerializationError> {
        match self.frames.last_mut() {
            Some(Frame::Map { pending_key, .. }) => {
                if pending_key.is_some() {
                    return Err(SerializationError::new(
                        "cbor: key() called twice without value",
                    ));
                }
                *pending_key = Some(k.to_string());
                Ok(())
            }
            _ => Err(SerializationError::new("cbor: key() outside map")),
        }
    }

    fn begin_array(&mut self, n: usize) -> Result<(), SerializationError> {
        self.frames.push(Frame::Array(Vec::with_capacity(n)));
        Ok(())
    }

    fn end_array(&mut self) -> Result<(), SerializationError> {
        match self.frames.pop() {
            Some(Frame::Array(items)) => self.deliver(CborValue::Array(items)),
            _ => Err(SerializationError::new("cbor: end_array outside array")),
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
                    return Err(SerializationError::new("cbor: end_map with dangling key()"));
                }
                self.deliver(CborValue::Map(entries))
            }
            _ => Err(SerializationError::new("cbor: end_map outside map")),
        }
    }
}

impl RootWriter for CborWriter {
    fn finish(self) -> Result<ZBuffer, SerializationError> {
        if !self.frames.is_empty() {
            return Err(SerializationError::new(
                "cbor: finish() with unterminated container",
            ));
        }
        let root = self.root.unwrap_or(CborValue::Null);
        let mut out = Vec::new();
        ciborium::ser::into_writer(&root, &mut out)
            .map_err(|e| SerializationError::new(format!("cbor: encode failed: {e}")))?;
        Ok(ZBuffer::from(out))
    }
}
