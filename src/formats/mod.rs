//! The five codecs

pub mod cbor;
pub mod flex;
pub mod json;
pub mod msgpack;
pub mod zera;

pub use cbor::Cbor;
pub use flex::Flex;
pub use json::Json;
pub use msgpack::MsgPack;
pub use zera::Zera;
