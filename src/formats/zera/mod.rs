//! ZERA v1 - lazy envelope + aligned arena
//!
//! A ZERA buffer has three regions in order: a 20-byte little-endian
//! header, a variable-size *envelope* holding structural records
//! (ValueRefs, array/object payloads, shape descriptors), and a
//! variable-size *arena* holding bulk bytes (long strings, typed-array
//! payloads). The arena base is aligned to 16 so typed-array payloads
//! satisfy any natural scalar alignment, which is what makes zero-copy
//! tensor views possible straight off the wire.
//!
//! Child access is O(1) for arrays (fixed 16-byte records) and a linear
//! entry walk for objects; nothing is parsed until it is looked at.

mod layout;
mod reader;
mod writer;

pub use layout::{Tag, WireDType, ARENA_ALIGN, HEADER_SIZE, INLINE_MAX, MAGIC, RANK_MAX, VERSION};
pub use reader::{parse, ZeraKeys, ZeraReader, ZeraView};
pub use writer::ZeraWriter;

use crate::rw::Format;

/// ZERA format marker.
pub struct Zera;

impl Format for Zera {
    const NAME: &'static str = "Zera";
    type Writer = ZeraWriter;
    type Reader = ZeraReader;
}
