//! `ZBuffer` - the owning byte region produced by every writer's `finish()`
//!
//! A `ZBuffer` either owns a `Vec<u8>` or a raw allocation with a custom
//! deleter (for bytes handed over by foreign allocators). Unique ownership,
//! move only.

use std::fmt;
use std::ptr::NonNull;

enum Repr {
    Owned(Vec<u8>),
    Raw {
        ptr: NonNull<u8>,
        len: usize,
        deleter: Option<Box<dyn FnMut(*mut u8)>>,
    },
}

/// Contiguous owned byte region with either vector or pointer+deleter backing.
pub struct ZBuffer {
    repr: Repr,
}

impl ZBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        ZBuffer {
            repr: Repr::Owned(Vec::new()),
        }
    }

    /// Take ownership of a raw allocation. The deleter is invoked exactly once
    /// with `ptr` when the buffer is dropped.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes for the buffer's lifetime,
    /// and the deleter must correctly release it.
    pub unsafe fn from_raw_parts(
        ptr: NonNull<u8>,
        len: usize,
        deleter: impl FnMut(*mut u8) + 'static,
    ) -> Self {
        ZBuffer {
            repr: Repr::Raw {
                ptr,
                len,
                deleter: Some(Box::new(deleter)),
            },
        }
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Owned(v) => v.len(),
            Repr::Raw { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the backing storage is a plain vector.
    pub fn owned(&self) -> bool {
        matches!(self.repr, Repr::Owned(_))
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.repr {
            Repr::Owned(v) => v.as_slice(),
            // SAFETY: from_raw_parts guarantees ptr valid for len bytes
            Repr::Raw { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    /// Copy the contents into a fresh vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// `hexdump -C`-style rendering: offset, hex bytes, ASCII column.
    pub fn hexdump(&self) -> String {
        const ROW: usize = 16;
        let bytes = self.as_slice();
        if bytes.is_empty() {
            return "(empty)\n".to_string();
        }
        let mut out = String::new();
        for (row, chunk) in bytes.chunks(ROW).enumerate() {
            out.push_str(&format!("{:08x}  ", row * ROW));
            for i in 0..ROW {
                match chunk.get(i) {
                    Some(b) => out.push_str(&format!("{:02x} ", b)),
                    None => out.push_str("   "),
                }
                if i == 7 {
                    out.push(' ');
                }
            }
            out.push_str(" |");
            for &b in chunk {
                out.push(if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                });
            }
            out.push_str("|\n");
        }
        out
    }
}

impl Default for ZBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<u8>> for ZBuffer {
    fn from(v: Vec<u8>) -> Self {
        ZBuffer {
            repr: Repr::Owned(v),
        }
    }
}

impl AsRef<[u8]> for ZBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for ZBuffer {
    fn drop(&mut self) {
        if let Repr::Raw { ptr, deleter, .. } = &mut self.repr {
            if let Some(mut del) = deleter.take() {
                del(ptr.as_ptr());
            }
        }
    }
}

impl fmt::Debug for ZBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ZBuffer {} bytes, owned={}>", self.len(), self.owned())
    }
}
