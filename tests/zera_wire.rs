//! ZERA v1 wire-layout checks: exact header bytes, region bounds,
//! malformed-input rejection, and O(1) access arithmetic.

use zerabuf::formats::zera::{self, ARENA_ALIGN, HEADER_SIZE, MAGIC, VERSION};
use zerabuf::{serialize, zmap, zvec, Bin, Reader, RootReader, RootWriter, Writer, Zera};

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap())
}

#[test]
fn header_layout_is_exact() {
    let buf = serialize::<Zera>(&zmap! { "k" => 1i64 }).unwrap();
    let bytes = buf.as_slice();

    assert_eq!(u32_at(bytes, 0), MAGIC);
    assert_eq!(&bytes[0..4], b"ZENV");
    assert_eq!(u16_at(bytes, 4), VERSION);
    assert_eq!(u16_at(bytes, 6), 1); // flags: little-endian bit
    let root_ofs = u32_at(bytes, 8) as usize;
    let env_size = u32_at(bytes, 12) as usize;
    let arena_ofs = u32_at(bytes, 16) as usize;

    assert!(root_ofs + 16 <= env_size);
    assert_eq!(arena_ofs % ARENA_ALIGN, 0);
    assert!(arena_ofs >= HEADER_SIZE + env_size);
    assert!(arena_ofs <= bytes.len());
}

#[test]
fn scalar_root_is_a_single_record() {
    let buf = serialize::<Zera>(&7i64).unwrap();
    let bytes = buf.as_slice();
    // envelope holds exactly one ValueRef
    assert_eq!(u32_at(bytes, 12), 16);
    assert_eq!(bytes[HEADER_SIZE], 2); // Tag::I64
    assert_eq!(u32_at(bytes, HEADER_SIZE + 4), 7);
}

#[test]
fn inline_string_bytes_live_in_the_record() {
    let buf = serialize::<Zera>(&"tiny").unwrap();
    let bytes = buf.as_slice();
    assert_eq!(bytes[HEADER_SIZE], 4); // Tag::String
    assert_eq!(bytes[HEADER_SIZE + 1] & 1, 1); // inline flag
    assert_eq!(u16_at(bytes, HEADER_SIZE + 2), 4); // aux = length
    assert_eq!(&bytes[HEADER_SIZE + 4..HEADER_SIZE + 8], b"tiny");
}

#[test]
fn thirteen_byte_string_goes_to_the_arena() {
    let buf = serialize::<Zera>(&"thirteen-byte").unwrap();
    let bytes = buf.as_slice();
    assert_eq!(bytes[HEADER_SIZE + 1] & 1, 0);
    let arena_ofs = u32_at(bytes, 16) as usize;
    let ofs = u32_at(bytes, HEADER_SIZE + 4) as usize;
    let len = u32_at(bytes, HEADER_SIZE + 8) as usize;
    assert_eq!(len, 13);
    assert_eq!(&bytes[arena_ofs + ofs..arena_ofs + ofs + len], b"thirteen-byte");
}

#[test]
fn object_entries_advance_by_key_length() {
    let buf = serialize::<Zera>(&zmap! { "ab" => 1i64, "cdef" => 2i64 }).unwrap();
    let v = zera::parse(buf.as_slice()).unwrap();
    let keys: Vec<String> = v
        .map_keys()
        .unwrap()
        .map(|k| k.unwrap().into_owned())
        .collect();
    assert_eq!(keys, ["ab", "cdef"]);
    assert_eq!(v.get("cdef").unwrap().as_i64().unwrap(), 2);
}

#[test]
fn array_elements_are_fixed_stride() {
    let buf = serialize::<Zera>(&zvec![10i64, 20i64, 30i64]).unwrap();
    let bytes = buf.as_slice();
    let v = zera::parse(bytes).unwrap();
    assert_eq!(v.array_size().unwrap(), 3);

    // element i sits at payload + 4 + 16*i
    let root_ofs = u32_at(bytes, 8) as usize;
    let payload_ofs = u32_at(bytes, HEADER_SIZE + root_ofs + 4) as usize;
    let count = u32_at(bytes, HEADER_SIZE + payload_ofs);
    assert_eq!(count, 3);
    for i in 0..3 {
        let rec = HEADER_SIZE + payload_ofs + 4 + 16 * i;
        assert_eq!(bytes[rec], 2); // Tag::I64
        assert_eq!(u32_at(bytes, rec + 4), (10 * (i + 1)) as u32);
    }
}

#[test]
fn blob_is_rank1_u8_typed_array() {
    let buf = serialize::<Zera>(&Bin(&[5, 6, 7])).unwrap();
    let bytes = buf.as_slice();
    let rec = HEADER_SIZE + u32_at(bytes, 8) as usize;
    assert_eq!(bytes[rec], 7); // Tag::TypedArray
    assert_eq!(u16_at(bytes, rec + 2), 2); // aux = wire dtype u8
    assert_eq!(u32_at(bytes, rec + 8), 3); // byte length

    // shape descriptor: rank 1, dim0 == length
    let shape_ofs = HEADER_SIZE + u32_at(bytes, rec + 12) as usize;
    assert_eq!(u32_at(bytes, shape_ofs), 1);
    assert_eq!(
        u64::from_le_bytes(bytes[shape_ofs + 4..shape_ofs + 12].try_into().unwrap()),
        3
    );

    let v = zera::parse(bytes).unwrap();
    assert_eq!(v.as_blob().unwrap().as_ref(), &[5, 6, 7]);
}

#[test]
fn bad_magic_version_flags_are_rejected() {
    let good = serialize::<Zera>(&1i64).unwrap().to_vec();

    let mut bad = good.clone();
    bad[0] ^= 0xff;
    assert!(zera::parse(&bad).is_err());

    let mut bad = good.clone();
    bad[4] = 9;
    assert!(zera::parse(&bad).is_err());

    let mut bad = good.clone();
    bad[6] = 0; // flags without little-endian bit
    assert!(zera::parse(&bad).is_err());

    let mut bad = good.clone();
    bad[6] = 3; // reserved flag bit set
    assert!(zera::parse(&bad).is_err());
}

#[test]
fn truncation_and_bad_offsets_are_rejected() {
    let good = serialize::<Zera>(&zvec![1i64]).unwrap().to_vec();

    assert!(zera::parse(&good[..10]).is_err());
    assert!(zera::parse(&[]).is_err());

    // root offset past the envelope
    let mut bad = good.clone();
    bad[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(zera::parse(&bad).is_err());

    // arena offset unaligned
    let mut bad = good.clone();
    let arena = u32_at(&bad, 16);
    bad[16..20].copy_from_slice(&(arena + 1).to_le_bytes());
    assert!(zera::parse(&bad).is_err());

    // envelope larger than the buffer
    let mut bad = good.clone();
    bad[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(zera::parse(&bad).is_err());
}

#[test]
fn subview_validation_happens_at_access_time() {
    // corrupt an interior record's tag; parsing the root still succeeds
    let buf = serialize::<Zera>(&zvec![1i64]).unwrap();
    let mut bytes = buf.to_vec();
    let root_ofs = u32_at(&bytes, 8) as usize;
    let payload_ofs = u32_at(&bytes, HEADER_SIZE + root_ofs + 4) as usize;
    bytes[HEADER_SIZE + payload_ofs + 4] = 0xee; // element 0 tag

    let v = zera::parse(&bytes).unwrap();
    assert_eq!(v.array_size().unwrap(), 1);
    let child = v.index(0).unwrap();
    assert!(child.as_i64().is_err());
}

#[test]
fn owning_reader_matches_borrowed_parse() {
    let bytes = serialize::<Zera>(&zmap! { "x" => 5i64 }).unwrap().to_vec();
    let reader = zerabuf::formats::zera::ZeraReader::from_vec(bytes.clone()).unwrap();
    assert_eq!(reader.root().get("x").unwrap().as_i64().unwrap(), 5);
    let view = zera::parse(&bytes).unwrap();
    assert_eq!(view.get("x").unwrap().as_i64().unwrap(), 5);
}

#[test]
fn writer_protocol_violations() {
    let mut w = zerabuf::formats::zera::ZeraWriter::default();
    assert!(w.end_array().is_err());

    let mut w = zerabuf::formats::zera::ZeraWriter::default();
    w.begin_map(1).unwrap();
    w.key("a").unwrap();
    assert!(w.key("b").is_err());

    let mut w = zerabuf::formats::zera::ZeraWriter::default();
    w.begin_map(0).unwrap();
    assert!(w.end_array().is_err());

    let mut w = zerabuf::formats::zera::ZeraWriter::default();
    w.begin_array(0).unwrap();
    w.end_array().unwrap();
    let buf = RootWriter::finish(w).unwrap();
    let v = zera::parse(buf.as_slice()).unwrap();
    assert_eq!(v.array_size().unwrap(), 0);
}
