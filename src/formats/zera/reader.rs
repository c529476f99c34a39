//! Lazy ZERA reader
//!
//! The root reader validates the header and region bounds once; every
//! view after that is (envelope, arena, ValueRef offset) and decodes on
//! access. Array children sit at `payload + 4 + 16*i`; object entries
//! advance by `4 + key_len + 16` bytes each.

use std::borrow::Cow;

use crate::buffer::ZBuffer;
use crate::error::DeserializationError;
use crate::rw::{Reader, RootReader};

use super::layout::{
    parse_header, read_u16_le, read_u32_le, read_u64_le, Tag, ValueRef, WireDType, ARENA_ALIGN,
    HEADER_SIZE, INLINE_MAX, MAGIC, RANK_MAX, VERSION,
};

fn de(msg: impl Into<Cow<'static, str>>) -> DeserializationError {
    DeserializationError::new(msg)
}

/// Borrowed view over one ZERA value.
#[derive(Clone, Copy)]
pub struct ZeraView<'a> {
    env: &'a [u8],
    arena: &'a [u8],
    vr_ofs: usize,
}

impl<'a> ZeraView<'a> {
    fn vr(&self) -> Result<ValueRef, DeserializationError> {
        let vr = ValueRef::decode(self.env, self.vr_ofs)?;
        // only String uses flag bit 0 (inline); everything else reserved
        let ok = match vr.tag {
            Tag::String => vr.flags & !1 == 0,
            _ => vr.flags == 0,
        };
        if !ok {
            return Err(de("zera: unknown ValueRef flags"));
        }
        Ok(vr)
    }

    fn tag(&self) -> Option<Tag> {
        self.vr().ok().map(|vr| vr.tag)
    }

    fn env_slice(&self, ofs: usize, len: usize) -> Result<&'a [u8], DeserializationError> {
        let end = ofs
            .checked_add(len)
            .ok_or_else(|| de("zera: envelope span overflow"))?;
        self.env
            .get(ofs..end)
            .ok_or_else(|| de("zera: envelope span out of bounds"))
    }

    fn arena_slice(&self, ofs: usize, len: usize) -> Result<&'a [u8], DeserializationError> {
        let end = ofs
            .checked_add(len)
            .ok_or_else(|| de("zera: arena span overflow"))?;
        self.arena
            .get(ofs..end)
            .ok_or_else(|| de("zera: arena span out of bounds"))
    }

    fn at(&self, vr_ofs: usize) -> ZeraView<'a> {
        ZeraView {
            env: self.env,
            arena: self.arena,
            vr_ofs,
        }
    }

    /// (count, offset of first element record) of an array payload.
    fn array_payload(&self) -> Result<(u32, usize), DeserializationError> {
        let vr = self.vr()?;
        if vr.tag != Tag::Array {
            return Err(de("zera: value is not an array"));
        }
        let ofs = vr.a as usize;
        let count = read_u32_le(self.env, ofs)?;
        // whole element table must be in bounds
        self.env_slice(ofs + 4, 16 * count as usize)?;
        Ok((count, ofs + 4))
    }

    /// (count, offset of first entry) of an object payload.
    fn object_payload(&self) -> Result<(u32, usize), DeserializationError> {
        let vr = self.vr()?;
        if vr.tag != Tag::Object {
            return Err(de("zera: value is not a map"));
        }
        let ofs = vr.a as usize;
        let count = read_u32_le(self.env, ofs)?;
        Ok((count, ofs + 4))
    }

    /// Key bytes, value record offset, and next entry offset at `entry_ofs`.
    fn entry(&self, entry_ofs: usize) -> Result<(&'a [u8], usize, usize), DeserializationError> {
        let key_len = read_u16_le(self.env, entry_ofs)? as usize;
        let key = self.env_slice(entry_ofs + 4, key_len)?;
        let value_ofs = entry_ofs + 4 + key_len;
        self.env_slice(value_ofs, 16)?;
        Ok((key, value_ofs, value_ofs + 16))
    }
}

/// Forward iterator over an object's keys, in insertion order.
pub struct ZeraKeys<'a> {
    view: ZeraView<'a>,
    entry_ofs: usize,
    remaining: u32,
}

impl<'a> Iterator for ZeraKeys<'a> {
    type Item = Result<Cow<'a, str>, DeserializationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match self.view.entry(self.entry_ofs) {
            Ok((key, _, next)) => {
                self.entry_ofs = next;
                match std::str::from_utf8(key) {
                    Ok(s) => Some(Ok(Cow::Borrowed(s))),
                    Err(_) => {
                        self.remaining = 0;
                        Some(Err(de("zera: invalid UTF-8 in key")))
                    }
                }
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

impl<'a> Reader<'a> for ZeraView<'a> {
    type Keys = ZeraKeys<'a>;

    fn is_null(&self) -> bool {
        self.tag() == Some(Tag::Null)
    }

    fn is_bool(&self) -> bool {
        self.tag() == Some(Tag::Bool)
    }

    fn is_int(&self) -> bool {
        self.tag() == Some(Tag::I64)
    }

    fn is_uint(&self) -> bool {
        self.tag() == Some(Tag::U64)
    }

    fn is_float(&self) -> bool {
        self.tag() == Some(Tag::F64)
    }

    fn is_string(&self) -> bool {
        self.tag() == Some(Tag::String)
    }

    fn is_blob(&self) -> bool {
        matches!(self.vr(), Ok(vr) if vr.tag == Tag::TypedArray && vr.aux == WireDType::U8 as u16)
    }

    fn is_array(&self) -> bool {
        self.tag() == Some(Tag::Array)
    }

    fn is_map(&self) -> bool {
        self.tag() == Some(Tag::Object)
    }

    fn as_bool(&self) -> Result<bool, DeserializationError> {
        let vr = self.vr()?;
        if vr.tag != Tag::Bool {
            return Err(de("zera: value is not a bool"));
        }
        match vr.aux {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(de("zera: invalid bool aux")),
        }
    }

    fn as_i64(&self) -> Result<i64, DeserializationError> {
        let vr = self.vr()?;
        let bits = vr.wide();
        match vr.tag {
            Tag::I64 => Ok(bits as i64),
            Tag::U64 => {
                i64::try_from(bits).map_err(|_| de("zera: uint64 out of range for int64"))
            }
            _ => Err(de("zera: value is not an integer")),
        }
    }

    fn as_u64(&self) -> Result<u64, DeserializationError> {
        let vr = self.vr()?;
        let bits = vr.wide();
        match vr.tag {
            Tag::U64 => Ok(bits),
            Tag::I64 => {
                u64::try_from(bits as i64).map_err(|_| de("zera: int64 out of range for uint64"))
            }
            _ => Err(de("zera: value is not an integer")),
        }
    }

    fn as_f64(&self) -> Result<f64, DeserializationError> {
        let vr = self.vr()?;
        if vr.tag != Tag::F64 {
            return Err(de("zera: value is not a float"));
        }
        Ok(f64::from_bits(vr.wide()))
    }

    fn as_str(&self) -> Result<Cow<'a, str>, DeserializationError> {
        let vr = self.vr()?;
        if vr.tag != Tag::String {
            return Err(de("zera: value is not a string"));
        }
        let bytes = if vr.flags & 1 != 0 {
            let len = vr.aux as usize;
            if len > INLINE_MAX {
                return Err(de("zera: inline string length too large"));
            }
            self.env_slice(self.vr_ofs + 4, len)?
        } else {
            self.arena_slice(vr.a as usize, vr.b as usize)?
        };
        std::str::from_utf8(bytes)
            .map(Cow::Borrowed)
            .map_err(|_| de("zera: invalid UTF-8 in string"))
    }

    fn as_blob(&self) -> Result<Cow<'a, [u8]>, DeserializationError> {
        let vr = self.vr()?;
        if !(vr.tag == Tag::TypedArray && vr.aux == WireDType::U8 as u16) {
            return Err(de("zera: value is not a blob"));
        }
        // validate the rank-1 shape descriptor against the byte length
        let shape_ofs = vr.c as usize;
        let rank = read_u32_le(self.env, shape_ofs)?;
        if rank > RANK_MAX {
            return Err(de("zera: blob rank too large"));
        }
        if rank != 1 {
            return Err(de("zera: blob must be rank 1"));
        }
        let dim0 = read_u64_le(self.env, shape_ofs + 4)?;
        if dim0 != u64::from(vr.b) {
            return Err(de("zera: blob shape length mismatch"));
        }
        Ok(Cow::Borrowed(
            self.arena_slice(vr.a as usize, vr.b as usize)?,
        ))
    }

    fn map_keys(&self) -> Result<Self::Keys, DeserializationError> {
        let (count, entry_ofs) = self.object_payload()?;
        Ok(ZeraKeys {
            view: *self,
            entry_ofs,
            remaining: count,
        })
    }

    fn contains(&self, key: &str) -> bool {
        let Ok((count, mut ofs)) = self.object_payload() else {
            return false;
        };
        for _ in 0..count {
            match self.entry(ofs) {
                Ok((k, _, next)) => {
                    if k == key.as_bytes() {
                        return true;
                    }
                    ofs = next;
                }
                Err(_) => return false,
            }
        }
        false
    }

    fn get(&self, key: &str) -> Result<Self, DeserializationError> {
        let (count, mut ofs) = self.object_payload()?;
        for _ in 0..count {
            let (k, value_ofs, next) = self.entry(ofs)?;
            if k == key.as_bytes() {
                return Ok(self.at(value_ofs));
            }
            ofs = next;
        }
        Err(de(format!("zera: key not found: {key}")))
    }

    fn array_size(&self) -> Result<usize, DeserializationError> {
        Ok(self.array_payload()?.0 as usize)
    }

    fn index(&self, idx: usize) -> Result<Self, DeserializationError> {
        let (count, base) = self.array_payload()?;
        if idx >= count as usize {
            return Err(de("zera: array index out of bounds"));
        }
        Ok(self.at(base + 16 * idx))
    }
}

/// Owning ZERA reader; validates header and region bounds up-front.
pub struct ZeraReader {
    buf: ZBuffer,
    root_ofs: u32,
    env_size: u32,
    arena_ofs: u32,
}

fn validate(buf: &[u8]) -> Result<(u32, u32, u32), DeserializationError> {
    let h = parse_header(buf)?;
    if h.magic != MAGIC {
        return Err(de("zera: bad magic"));
    }
    if h.version != VERSION {
        return Err(de("zera: unsupported version"));
    }
    if h.flags != 1 {
        return Err(de("zera: invalid flags (expected little-endian bit 0)"));
    }
    let env_size = h.env_size as usize;
    let arena_ofs = h.arena_ofs as usize;
    if env_size > buf.len() {
        return Err(de("zera: envelope size out of bounds"));
    }
    if arena_ofs > buf.len() {
        return Err(de("zera: arena offset out of bounds"));
    }
    if arena_ofs % ARENA_ALIGN != 0 {
        return Err(de("zera: arena offset not aligned"));
    }
    if arena_ofs < HEADER_SIZE + env_size {
        return Err(de("zera: arena overlaps envelope"));
    }
    if env_size < 16 || h.root_ofs as usize > env_size - 16 {
        return Err(de("zera: root ValueRef out of bounds"));
    }
    tracing::trace!(
        env_size,
        arena_len = buf.len() - arena_ofs,
        root_ofs = h.root_ofs,
        "parsed zera header"
    );
    Ok((h.root_ofs, h.env_size, h.arena_ofs))
}

impl RootReader for ZeraReader {
    type View<'a> = ZeraView<'a>
    where
        Self: 'a;

    fn from_buffer(buf: ZBuffer) -> Result<Self, DeserializationError> {
        let (root_ofs, env_size, arena_ofs) = validate(buf.as_slice())?;
        Ok(ZeraReader {
            buf,
            root_ofs,
            env_size,
            arena_ofs,
        })
    }

    fn root(&self) -> ZeraView<'_> {
        let bytes = self.buf.as_slice();
        ZeraView {
            env: &bytes[HEADER_SIZE..HEADER_SIZE + self.env_size as usize],
            arena: &bytes[self.arena_ofs as usize..],
            vr_ofs: self.root_ofs as usize,
        }
    }
}

/// Borrowed zero-copy entry point.
pub fn parse(bytes: &[u8]) -> Result<ZeraView<'_>, DeserializationError> {
    let (root_ofs, env_size, arena_ofs) = validate(bytes)?;
    Ok(ZeraView {
        env: &bytes[HEADER_SIZE..HEADER_SIZE + env_size as usize],
        arena: &bytes[arena_ofs as usize..],
        vr_ofs: root_ofs as usize,
    })
}
