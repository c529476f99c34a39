//! zerabuf - polyglot binary serialization with zero-copy tensor views
//!
//! One builder DSL and one reader surface over five self-describing
//! encodings: FlexBuffers, MessagePack, CBOR, JSON, and the custom lazy
//! ZERA format (envelope + 16-aligned arena, O(1) child access). A
//! generic translator converts losslessly between any pair of formats,
//! and a tensor adapter returns views that alias the encoded buffer
//! whenever alignment permits.
//!
//! # Features
//!
//! - Identical reader/writer contracts across all five codecs
//! - Lazy ZERA buffers: nothing is decoded until it is looked at
//! - Blob accessors that distinguish borrowed from owning bytes, so the
//!   tensor adapter can prove (and report) the zero-copy path
//! - `zvec!`/`zmap!` builder combinators plus a runtime dynamic value
//! - Optional `ndarray` integration for multi-dimensional views
//!
//! # Example
//!
//! ```rust
//! use zerabuf::{serialize, translate, zmap, zvec, MsgPack, Reader, RootReader, Zera};
//!
//! // Build a ZERA buffer
//! let buf = serialize::<Zera>(&zmap! {
//!     "version" => 1i64,
//!     "tags" => zvec!["fast", "aligned"],
//! })
//! .unwrap();
//!
//! // Lazy, zero-copy reads
//! let root = zerabuf::formats::zera::parse(buf.as_slice()).unwrap();
//! assert_eq!(root.get("version").unwrap().as_i64().unwrap(), 1);
//! assert_eq!(root.get("tags").unwrap().index(1).unwrap().as_str().unwrap(), "aligned");
//!
//! // Translate into MessagePack and read it back
//! let mp = translate::<MsgPack, _>(&root).unwrap();
//! assert_eq!(mp.root().get("version").unwrap().as_i64().unwrap(), 1);
//! ```

pub mod buffer;
pub mod build;
pub mod dynamic;
pub mod error;
pub mod formats;
pub mod rw;
pub mod tensor;
pub mod translate;

// Re-export the common surface at the crate root
pub use buffer::ZBuffer;
pub use build::{serialize, zmap, Bin, Build};
pub use dynamic::ZValue;
pub use error::{DeserializationError, Error, SerializationError};
pub use formats::{Cbor, Flex, Json, MsgPack, Zera};
pub use rw::{Format, Reader, RootReader, RootWriter, Writer};
pub use tensor::{
    as_tensor, is_tensor, DType, Element, Tensor, TensorView, TensorViewInfo, ViewReason,
};
pub use translate::{translate, translate_bytes, write_value};
