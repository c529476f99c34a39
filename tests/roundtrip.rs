//! Cross-format round-trip coverage
//!
//! Every scenario runs against all five codecs through the same generic
//! helpers; format-specific quirks (FlexBuffers key sorting, JSON owning
//! blobs) are covered where they diverge.

use zerabuf::{
    serialize, zmap, zvec, Bin, Cbor, Flex, Format, Json, MsgPack, Reader, RootReader, Writer,
    ZValue, Zera,
};

fn encode<F: Format>(
    emit: impl Fn(&mut F::Writer) -> Result<(), zerabuf::SerializationError>,
) -> Vec<u8> {
    let mut w = F::Writer::default();
    emit(&mut w).unwrap();
    zerabuf::RootWriter::finish(w).unwrap().to_vec()
}

macro_rules! with_root {
    ($fmt:ty, $bytes:expr, |$v:ident| $body:block) => {{
        let reader = <$fmt as Format>::Reader::from_vec($bytes).unwrap();
        let $v = reader.root();
        $body
    }};
}

macro_rules! for_all_formats {
    ($scenario:ident) => {
        $scenario::<Flex>();
        $scenario::<MsgPack>();
        $scenario::<Cbor>();
        $scenario::<Json>();
        $scenario::<Zera>();
    };
}

// flat map of scalars
fn scenario_map<F: Format>() {
    let bytes = serialize::<F>(&zmap! { "key1" => 42i64, "key2" => "yo" })
        .unwrap()
        .to_vec();
    with_root!(F, bytes, |v| {
        assert!(v.is_map());
        assert!(v.contains("key1"));
        assert!(!v.contains("nope"));
        assert_eq!(v.get("key1").unwrap().as_i64().unwrap(), 42);
        assert_eq!(v.get("key2").unwrap().as_str().unwrap(), "yo");
        assert!(v.get("missing").is_err());
    });
}

#[test]
fn map_of_scalars_roundtrips() {
    for_all_formats!(scenario_map);
}

// flat array
fn scenario_array<F: Format>() {
    let bytes = serialize::<F>(&zvec![1i64, 2i64, 3i64]).unwrap().to_vec();
    with_root!(F, bytes, |v| {
        assert!(v.is_array());
        assert_eq!(v.array_size().unwrap(), 3);
        for i in 0..3 {
            assert_eq!(v.index(i).unwrap().as_i64().unwrap(), (i + 1) as i64);
        }
        assert!(v.index(3).is_err());
    });
}

#[test]
fn array_order_is_preserved() {
    for_all_formats!(scenario_array);
}

// nested containers
fn scenario_nested<F: Format>() {
    let bytes = serialize::<F>(&zmap! {
        "a" => 7i64,
        "b" => zvec!["x", zmap! { "n" => 44i64 }],
    })
    .unwrap()
    .to_vec();
    with_root!(F, bytes, |v| {
        assert_eq!(
            v.get("b")
                .unwrap()
                .index(1)
                .unwrap()
                .get("n")
                .unwrap()
                .as_i64()
                .unwrap(),
            44
        );
    });
}

#[test]
fn nested_subviews_resolve() {
    for_all_formats!(scenario_nested);
}

// booleans and null
fn scenario_bools<F: Format>() {
    let bytes = serialize::<F>(&zmap! { "t" => true, "f" => false, "n" => () })
        .unwrap()
        .to_vec();
    with_root!(F, bytes, |v| {
        let t = v.get("t").unwrap();
        assert!(t.is_bool());
        assert!(t.as_bool().unwrap());
        assert!(!v.get("f").unwrap().as_bool().unwrap());
        let n = v.get("n").unwrap();
        assert!(n.is_null());
        assert!(!n.is_bool());
        // asBool on a non-bool is a hard error
        assert!(n.as_bool().is_err());
        assert!(t.as_i64().is_err());
    });
}

#[test]
fn bool_and_null_predicates() {
    for_all_formats!(scenario_bools);
}

// unsigned range and width narrowing
fn scenario_widths<F: Format>() {
    let big = (1u64 << 63) + 5;
    let bytes = serialize::<F>(&zmap! {
        "big" => big,
        "small" => 200i64,
        "neg" => -7i64,
    })
    .unwrap()
    .to_vec();
    with_root!(F, bytes, |v| {
        let b = v.get("big").unwrap();
        assert_eq!(b.as_u64().unwrap(), big);
        assert!(b.as_i64().is_err());
        assert!(b.as_u32().is_err());

        let s = v.get("small").unwrap();
        assert_eq!(s.as_i64().unwrap(), 200);
        assert_eq!(s.as_u8().unwrap(), 200);
        assert!(s.as_i8().is_err());

        let n = v.get("neg").unwrap();
        assert_eq!(n.as_i8().unwrap(), -7);
        assert!(n.as_u64().is_err());
    });
}

#[test]
fn width_narrowing_raises_out_of_range() {
    for_all_formats!(scenario_widths);
}

// floats and doubles
fn scenario_floats<F: Format>() {
    let bytes = serialize::<F>(&zvec![1.5f64, -0.25f64, 1e300f64])
        .unwrap()
        .to_vec();
    with_root!(F, bytes, |v| {
        assert!(v.index(0).unwrap().is_float());
        assert_eq!(v.index(0).unwrap().as_f64().unwrap(), 1.5);
        assert_eq!(v.index(1).unwrap().as_f64().unwrap(), -0.25);
        assert_eq!(v.index(2).unwrap().as_f64().unwrap(), 1e300);
        assert_eq!(v.index(0).unwrap().as_f32().unwrap(), 1.5f32);
    });
}

#[test]
fn float_roundtrip_is_exact() {
    for_all_formats!(scenario_floats);
}

// blob fidelity
fn scenario_blob<F: Format>() {
    let payload: Vec<u8> = (0u8..=255).collect();
    let bytes = serialize::<F>(&zmap! { "data" => Bin(&payload) })
        .unwrap()
        .to_vec();
    with_root!(F, bytes, |v| {
        let b = v.get("data").unwrap();
        assert!(b.is_blob());
        assert_eq!(b.as_blob().unwrap().as_ref(), payload.as_slice());
    });
}

#[test]
fn blob_bytes_are_faithful() {
    for_all_formats!(scenario_blob);
}

// strings: UTF-8 and embedded NUL
fn scenario_strings<F: Format>() {
    let tricky = "héllo \u{1F980} wörld";
    let with_nul = "nul\0inside";
    let bytes = serialize::<F>(&zvec![tricky, with_nul, ""]).unwrap().to_vec();
    with_root!(F, bytes, |v| {
        assert_eq!(v.index(0).unwrap().as_str().unwrap(), tricky);
        assert_eq!(v.index(1).unwrap().as_str().unwrap(), with_nul);
        assert_eq!(v.index(2).unwrap().as_str().unwrap(), "");
        assert_eq!(v.index(0).unwrap().as_string().unwrap(), tricky);
    });
}

#[test]
fn strings_keep_utf8_and_nul() {
    for_all_formats!(scenario_strings);
}

// key sequences: insertion order, except FlexBuffers which sorts
fn keys_of<F: Format>(bytes: Vec<u8>) -> Vec<String> {
    let reader = F::Reader::from_vec(bytes).unwrap();
    let root = reader.root();
    root.map_keys()
        .unwrap()
        .map(|k| k.unwrap().into_owned())
        .collect()
}

#[test]
fn key_sequences_match_the_format_order() {
    fn built<F: Format>() -> Vec<u8> {
        serialize::<F>(&zmap! { "zeta" => 1i64, "alpha" => 2i64, "mid" => 3i64 })
            .unwrap()
            .to_vec()
    }
    let insertion = ["zeta", "alpha", "mid"];
    assert_eq!(keys_of::<MsgPack>(built::<MsgPack>()), insertion);
    assert_eq!(keys_of::<Cbor>(built::<Cbor>()), insertion);
    assert_eq!(keys_of::<Json>(built::<Json>()), insertion);
    assert_eq!(keys_of::<Zera>(built::<Zera>()), insertion);
    // FlexBuffers physically sorts keys
    assert_eq!(keys_of::<Flex>(built::<Flex>()), ["alpha", "mid", "zeta"]);
}

// keys with embedded NUL (all formats except FlexBuffers, which rejects them)
fn scenario_nul_keys<F: Format>() {
    let bytes = encode::<F>(|w| {
        w.begin_map(1)?;
        w.key("a\0b")?;
        w.int64(9)?;
        w.end_map()
    });
    with_root!(F, bytes, |v| {
        assert!(v.contains("a\0b"));
        assert_eq!(v.get("a\0b").unwrap().as_i64().unwrap(), 9);
    });
}

#[test]
fn nul_keys_roundtrip_where_supported() {
    scenario_nul_keys::<MsgPack>();
    scenario_nul_keys::<Cbor>();
    scenario_nul_keys::<Json>();
    scenario_nul_keys::<Zera>();
}

// dynamic values drive the same writers
fn scenario_dynamic<F: Format>() {
    let value = ZValue::Map(vec![
        ("n".into(), ZValue::Null),
        (
            "xs".into(),
            ZValue::Array(vec![ZValue::Int(-1), ZValue::UInt(2)]),
        ),
        ("blob".into(), ZValue::Blob(vec![9, 8, 7])),
        ("opaque".into(), ZValue::opaque(3.5f64)),
    ]);
    let bytes = serialize::<F>(&value).unwrap().to_vec();
    with_root!(F, bytes, |v| {
        assert!(v.get("n").unwrap().is_null());
        assert_eq!(v.get("xs").unwrap().index(0).unwrap().as_i64().unwrap(), -1);
        assert_eq!(v.get("xs").unwrap().index(1).unwrap().as_u64().unwrap(), 2);
        assert_eq!(
            v.get("blob").unwrap().as_blob().unwrap().as_ref(),
            &[9, 8, 7]
        );
        assert_eq!(v.get("opaque").unwrap().as_f64().unwrap(), 3.5);
    });
}

#[test]
fn dynamic_values_emit_through_any_writer() {
    for_all_formats!(scenario_dynamic);
}

// default root is null
fn scenario_default_root<F: Format>() {
    let bytes = zerabuf::RootWriter::finish(F::Writer::default())
        .unwrap()
        .to_vec();
    with_root!(F, bytes, |v| {
        assert!(v.is_null());
    });
}

#[test]
fn empty_finish_encodes_null() {
    for_all_formats!(scenario_default_root);
}

// render() produces something for every class
fn scenario_render<F: Format>() {
    let bytes = serialize::<F>(&zmap! {
        "s" => "txt",
        "xs" => zvec![1i64, true],
        "b" => Bin(&[1, 2]),
    })
    .unwrap()
    .to_vec();
    with_root!(F, bytes, |v| {
        let text = v.render();
        assert!(text.contains("txt"));
        assert!(text.contains("blob[size=2]"));
    });
}

#[test]
fn render_is_total() {
    for_all_formats!(scenario_render);
}

// default serializers: sequences and mappings
#[test]
fn standard_containers_serialize() {
    use std::collections::BTreeMap;

    let mut m = BTreeMap::new();
    m.insert("one", vec![1i64, 2, 3]);
    m.insert("two", vec![4i64]);
    let bytes = serialize::<Zera>(&m).unwrap().to_vec();
    with_root!(Zera, bytes, |v| {
        assert!(v.is_map());
        assert_eq!(v.get("one").unwrap().array_size().unwrap(), 3);
        assert_eq!(v.get("two").unwrap().index(0).unwrap().as_i64().unwrap(), 4);
    });

    let opt: Option<i64> = None;
    let bytes = serialize::<Json>(&zvec![opt, Some(5i64), [1u8, 2u8]])
        .unwrap()
        .to_vec();
    with_root!(Json, bytes, |v| {
        assert!(v.index(0).unwrap().is_null());
        assert_eq!(v.index(1).unwrap().as_i64().unwrap(), 5);
        // bare u8 sequences are arrays of uints, not blobs
        assert!(v.index(2).unwrap().is_array());
    });
}

// runtime-keyed zmap()
#[test]
fn runtime_zmap_builds_maps() {
    let entries = vec![("k1".to_string(), 10i64), ("k2".to_string(), 20i64)];
    let bytes = serialize::<MsgPack>(&zmap(entries)).unwrap().to_vec();
    with_root!(MsgPack, bytes, |v| {
        assert_eq!(v.get("k1").unwrap().as_i64().unwrap(), 10);
        assert_eq!(v.get("k2").unwrap().as_i64().unwrap(), 20);
    });
}
