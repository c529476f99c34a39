//! Reader-to-writer bridge
//!
//! Walks any reader and replays it into any writer, preserving structure,
//! values, and source key order. Representation changes only where the
//! destination requires one (blob bytes become base64 in JSON and back).
//! Lossless whenever the destination supports every value class present
//! in the source.

use crate::error::Error;
use crate::rw::{Format, Reader, RootReader, RootWriter, Writer};

/// Emit the value under `v` into `w`.
pub fn write_value<'a, R, W>(v: &R, w: &mut W) -> Result<(), Error>
where
    R: Reader<'a>,
    W: Writer + ?Sized,
{
    if v.is_null() {
        w.null()?;
        return Ok(());
    }
    if v.is_bool() {
        w.boolean(v.as_bool()?)?;
        return Ok(());
    }
    if v.is_int() {
        w.int64(v.as_i64()?)?;
        return Ok(());
    }
    if v.is_uint() {
        w.uint64(v.as_u64()?)?;
        return Ok(());
    }
    if v.is_float() {
        w.float64(v.as_f64()?)?;
        return Ok(());
    }
    if v.is_string() {
        w.string(&v.as_str()?)?;
        return Ok(());
    }
    if v.is_blob() {
        w.binary(&v.as_blob()?)?;
        return Ok(());
    }
    if v.is_map() {
        // two passes: counted header first, then entries in source order
        let count = v.map_keys()?.count();
        w.begin_map(count)?;
        for key in v.map_keys()? {
            let key = key?;
            w.key(&key)?;
            write_value(&v.get(&key)?, w)?;
        }
        w.end_map()?;
        return Ok(());
    }
    if v.is_array() {
        let n = v.array_size()?;
        w.begin_array(n)?;
        for i in 0..n {
            write_value(&v.index(i)?, w)?;
        }
        w.end_array()?;
        return Ok(());
    }
    Err(crate::error::SerializationError::new("translate: unsupported source value").into())
}

/// Convert any reader into an owning reader of the destination format.
pub fn translate<'a, Dst, R>(src: &R) -> Result<Dst::Reader, Error>
where
    Dst: Format,
    R: Reader<'a>,
{
    let mut w = Dst::Writer::default();
    write_value(src, &mut w)?;
    let buf = w.finish()?;
    Ok(Dst::Reader::from_buffer(buf)?)
}

/// Convert encoded bytes of format `Src` into an owning reader of `Dst`.
pub fn translate_bytes<Src, Dst>(bytes: Vec<u8>) -> Result<Dst::Reader, Error>
where
    Src: Format,
    Dst: Format,
{
    let src = Src::Reader::from_vec(bytes)?;
    let root = src.root();
    translate::<Dst, _>(&root)
}
