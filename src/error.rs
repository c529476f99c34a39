//! Error types for zerabuf

use std::borrow::Cow;
use thiserror::Error;

/// Raised by writers when the caller violates the container/key protocol
/// (value without key, dangling key, count mismatch, multiple roots, ...).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SerializationError(Cow<'static, str>);

impl SerializationError {
    pub fn new(msg: impl Into<Cow<'static, str>>) -> Self {
        SerializationError(msg.into())
    }
}

/// Raised by readers on malformed input, type mismatches, width-narrowing
/// overflow, and missing keys or out-of-range indices.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DeserializationError(Cow<'static, str>);

impl DeserializationError {
    pub fn new(msg: impl Into<Cow<'static, str>>) -> Self {
        DeserializationError(msg.into())
    }
}

/// Either error class. Operations that both read and write (the translator)
/// surface this.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Serialize(#[from] SerializationError),
    #[error(transparent)]
    Deserialize(#[from] DeserializationError),
}
