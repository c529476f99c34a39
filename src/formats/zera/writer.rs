//! ZERA writer
//!
//! Two growable regions (envelope, arena) plus a stack of in-progress
//! container frames. Each frame accumulates its own payload buffer which
//! is appended to the envelope only when the container closes; a map
//! frame additionally tracks the 16-byte hole reserved by `key()` that
//! the next value must patch.

use crate::buffer::ZBuffer;
use crate::error::SerializationError;
use crate::rw::{RootWriter, Writer};

use super::layout::{
    align_up, Tag, ValueRef, WireDType, ARENA_ALIGN, HEADER_SIZE, INLINE_MAX, MAGIC, VERSION,
};

fn ser(msg: impl Into<std::borrow::Cow<'static, str>>) -> SerializationError {
    SerializationError::new(msg)
}

enum Frame {
    Array {
        payload: Vec<u8>,
        count: u32,
    },
    Map {
        payload: Vec<u8>,
        count: u32,
        pending_patch: Option<usize>,
    },
}

/// ZERA root writer.
pub struct ZeraWriter {
    frames: Vec<Frame>,
    env: Vec<u8>,
    arena: Vec<u8>,
    root_ofs: Option<u32>,
    inline_threshold: usize,
}

impl Default for ZeraWriter {
    fn default() -> Self {
        ZeraWriter {
            frames: Vec::new(),
            env: Vec::new(),
            arena: Vec::new(),
            root_ofs: None,
            inline_threshold: INLINE_MAX,
        }
    }
}

impl ZeraWriter {
    /// Strings at or below `t` bytes are stored inline in the ValueRef
    /// instead of the arena. `t` must not exceed 12.
    pub fn set_inline_threshold(&mut self, t: usize) -> Result<(), SerializationError> {
        if t > INLINE_MAX {
            return Err(ser("zera: inline string threshold must be <= 12"));
        }
        self.inline_threshold = t;
        Ok(())
    }

    fn append_env(&mut self, bytes: &[u8]) -> Result<u32, SerializationError> {
        let ofs = self.env.len();
        if ofs > u32::MAX as usize {
            return Err(ser("zera: envelope offset overflow"));
        }
        self.env.extend_from_slice(bytes);
        Ok(ofs as u32)
    }

    /// Reserve `len` bytes in the arena at the requested alignment.
    fn arena_alloc(&mut self, len: usize, align: usize) -> Result<u32, SerializationError> {
        let aligned = align_up(self.arena.len(), align.max(1));
        self.arena.resize(aligned, 0);
        let ofs = self.arena.len();
        if ofs > u32::MAX as usize || len > u32::MAX as usize {
            return Err(ser("zera: arena overflow"));
        }
        self.arena.resize(ofs + len, 0);
        Ok(ofs as u32)
    }

    fn emit_shape_rank1(&mut self, dim0: u64) -> Result<u32, SerializationError> {
        let mut tmp = [0u8; 12];
        tmp[0..4].copy_from_slice(&1u32.to_le_bytes());
        tmp[4..12].copy_from_slice(&dim0.to_le_bytes());
        self.append_env(&tmp)
    }

    /// Hand a finished ValueRef to the open container, or make it the root.
    fn deliver(&mut self, vr: ValueRef) -> Result<(), SerializationError> {
        self.deliver_raw(vr.encode())
    }

    /// Deliver a pre-encoded 16-byte record (inline strings carry payload
    /// bytes where the a/b/c words normally sit).
    fn deliver_raw(&mut self, rec: [u8; 16]) -> Result<(), SerializationError> {
        match self.frames.last_mut() {
            None => {
                if self.root_ofs.is_some() {
                    return Err(ser("zera: multiple root values"));
                }
                let ofs = self.append_env(&rec)?;
                self.root_ofs = Some(ofs);
                Ok(())
            }
            Some(Frame::Array { payload, count }) => {
                payload.extend_from_slice(&rec);
                *count += 1;
                Ok(())
            }
            Some(Frame::Map {
                payload,
                pending_patch,
                ..
            }) => match pending_patch.take() {
                Some(at) => {
                    if at + 16 > payload.len() {
                        return Err(ser("zera: internal map patch out of bounds"));
                    }
                    payload[at..at + 16].copy_from_slice(&rec);
                    Ok(())
                }
                None => Err(ser("zera: map value emitted without key()")),
            },
        }
    }
}

impl Writer for ZeraWriter {
    fn null(&mut self) -> Result<(), SerializationError> {
        self.deliver(ValueRef::new(Tag::Null, 0, 0, 0, 0, 0))
    }

    fn boolean(&mut self, v: bool) -> Result<(), SerializationError> {
        self.deliver(ValueRef::new(Tag::Bool, 0, u16::from(v), 0, 0, 0))
    }

    fn int64(&mut self, v: i64) -> Result<(), SerializationError> {
        let bits = v as u64;
        self.deliver(ValueRef::new(
            Tag::I64,
            0,
            0,
            (bits & 0xffff_ffff) as u32,
            (bits >> 32) as u32,
            0,
        ))
    }

    fn uint64(&mut self, v: u64) -> Result<(), SerializationError> {
        self.deliver(ValueRef::new(
            Tag::U64,
            0,
            0,
            (v & 0xffff_ffff) as u32,
            (v >> 32) as u32,
            0,
        ))
    }

    fn float64(&mut self, v: f64) -> Result<(), SerializationError> {
        let bits = v.to_bits();
        self.deliver(ValueRef::new(
            Tag::F64,
            0,
            0,
            (bits & 0xffff_ffff) as u32,
            (bits >> 32) as u32,
            0,
        ))
    }

    fn string(&mut self, s: &str) -> Result<(), SerializationError> {
        let bytes = s.as_bytes();
        if bytes.len() <= self.inline_threshold {
            let mut vr = ValueRef::new(Tag::String, 1, bytes.len() as u16, 0, 0, 0).encode();
            vr[4..4 + bytes.len()].copy_from_slice(bytes);
            // deliver pre-encoded: inline payload occupies the a/b/c words
            return self.deliver_raw(vr);
        }
        if bytes.len() > u32::MAX as usize {
            return Err(ser("zera: string too large"));
        }
        let ofs = self.arena_alloc(bytes.len(), 1)?;
        self.arena[ofs as usize..ofs as usize + bytes.len()].copy_from_slice(bytes);
        self.deliver(ValueRef::new(
            Tag::String,
            0,
            0,
            ofs,
            bytes.len() as u32,
            0,
        ))
    }

    fn binary(&mut self, bytes: &[u8]) -> Result<(), SerializationError> {
        if bytes.len() > u32::MAX as usize {
            return Err(ser("zera: blob too large"));
        }
        let byte_len = bytes.len() as u32;
        let arena_ofs = self.arena_alloc(bytes.len(), ARENA_ALIGN)?;
        self.arena[arena_ofs as usize..arena_ofs as usize + bytes.len()].copy_from_slice(bytes);
        let shape_ofs = self.emit_shape_rank1(u64::from(byte_len))?;
        self.deliver(ValueRef::new(
            Tag::TypedArray,
            0,
            WireDType::U8 as u16,
            arena_ofs,
            byte_len,
            shape_ofs,
        ))
    }

    fn key(&mut self, k: &str) -> Result<(), SerializationError> {
        let kb = k.as_bytes();
        if kb.len() > u16::MAX as usize {
            return Err(ser("zera: key too long"));
        }
        match self.frames.last_mut() {
            Some(Frame::Map {
                payload,
                count,
                pending_patch,
            }) => {
                if pending_patch.is_some() {
                    return Err(ser("zera: key() called twice without value"));
                }
                payload.extend_from_slice(&(kb.len() as u16).to_le_bytes());
                payload.extend_from_slice(&0u16.to_le_bytes());
                payload.extend_from_slice(kb);
                let patch = payload.len();
                payload.resize(patch + 16, 0);
                *pending_patch = Some(patch);
                *count += 1;
                Ok(())
            }
            _ => Err(ser("zera: key() outside map")),
        }
    }

    fn begin_array(&mut self, reserve: usize) -> Result<(), SerializationError> {
        let mut payload = Vec::with_capacity(4 + reserve.saturating_mul(16));
        payload.extend_from_slice(&0u32.to_le_bytes());
        self.frames.push(Frame::Array { payload, count: 0 });
        Ok(())
    }

    fn end_array(&mut self) -> Result<(), SerializationError> {
        match self.frames.pop() {
            Some(Frame::Array { mut payload, count }) => {
                payload[0..4].copy_from_slice(&count.to_le_bytes());
                let ofs = self.append_env(&payload)?;
                self.deliver(ValueRef::new(Tag::Array, 0, 0, ofs, 0, 0))
            }
            other => {
                if let Some(frame) = other {
                    self.frames.push(frame);
                }
                Err(ser("zera: end_array outside array"))
            }
        }
    }

    fn begin_map(&mut self, reserve: usize) -> Result<(), SerializationError> {
        let mut payload = Vec::with_capacity(4 + reserve.saturating_mul(4 + 8 + 16));
        payload.extend_from_slice(&0u32.to_le_bytes());
        self.frames.push(Frame::Map {
            payload,
            count: 0,
            pending_patch: None,
        });
        Ok(())
    }

    fn end_map(&mut self) -> Result<(), SerializationError> {
        match self.frames.pop() {
            Some(Frame::Map {
                mut payload,
                count,
                pending_patch,
            }) => {
                if pending_patch.is_some() {
                    return Err(ser("zera: end_map with dangling key()"));
                }
                payload[0..4].copy_from_slice(&count.to_le_bytes());
                let ofs = self.append_env(&payload)?;
                self.deliver(ValueRef::new(Tag::Object, 0, 0, ofs, 0, 0))
            }
            other => {
                if let Some(frame) = other {
                    self.frames.push(frame);
                }
                Err(ser("zera: end_map outside map"))
            }
        }
    }
}

impl RootWriter for ZeraWriter {
    fn finish(mut self) -> Result<ZBuffer, SerializationError> {
        if !self.frames.is_empty() {
            return Err(ser("zera: finish() with unterminated container"));
        }
        if self.root_ofs.is_none() {
            self.deliver(ValueRef::new(Tag::Null, 0, 0, 0, 0, 0))?;
        }
        let root_ofs = self.root_ofs.unwrap_or(0);

        if self.env.len() > u32::MAX as usize {
            return Err(ser("zera: envelope too large"));
        }
        let env_size = self.env.len() as u32;
        let arena_ofs = align_up(HEADER_SIZE + self.env.len(), ARENA_ALIGN);
        if arena_ofs > u32::MAX as usize {
            return Err(ser("zera: arena offset overflow"));
        }

        tracing::debug!(
            env_size,
            arena_len = self.arena.len(),
            arena_ofs,
            "assembling zera buffer"
        );

        let mut out = vec![0u8; arena_ofs + self.arena.len()];
        out[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        out[4..6].copy_from_slice(&VERSION.to_le_bytes());
        out[6..8].copy_from_slice(&1u16.to_le_bytes()); // flags: bit 0 little-endian
        out[8..12].copy_from_slice(&root_ofs.to_le_bytes());
        out[12..16].copy_from_slice(&env_size.to_le_bytes());
        out[16..20].copy_from_slice(&(arena_ofs as u32).to_le_bytes());
        out[HEADER_SIZE..HEADER_SIZE + self.env.len()].copy_from_slice(&self.env);
        out[arena_ofs..].copy_from_slice(&self.arena);
        Ok(ZBuffer::from(out))
    }
}
