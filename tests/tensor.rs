//! Tensor adapter: fidelity, dtype/shape/size validation, and the
//! zero-copy contract (alignment sweep over shifted buffers).

use std::borrow::Cow;

use zerabuf::{
    as_tensor, is_tensor, serialize, zmap, zvec, Bin, Cbor, Flex, Format, Json, MsgPack, Reader,
    RootReader, Tensor, ViewReason, Zera,
};

fn doubles() -> Vec<f64> {
    vec![1.0, 2.0, 3.0, 4.0]
}

fn tensor_bytes<F: Format>() -> Vec<u8> {
    let data = doubles();
    serialize::<F>(&Tensor::new(&[2, 2], &data)).unwrap().to_vec()
}

fn check_elements<'a>(v: &impl Reader<'a>) {
    let t = as_tensor::<f64, _>(v).unwrap();
    assert_eq!(t.shape(), &[2, 2]);
    assert_eq!(t.rank(), 2);
    assert_eq!(t.as_slice(), doubles().as_slice());
    let info = t.info();
    assert_eq!(info.required_alignment, std::mem::align_of::<f64>());
    assert_eq!(info.byte_size, 32);
}

fn scenario_fidelity<F: Format>() {
    let reader = F::Reader::from_vec(tensor_bytes::<F>()).unwrap();
    let root = reader.root();
    assert!(is_tensor::<f64, _>(&root));
    assert!(!is_tensor::<f32, _>(&root));
    check_elements(&root);
}

// elements come back exactly, in every codec
#[test]
fn tensor_roundtrips_in_every_codec() {
    scenario_fidelity::<Flex>();
    scenario_fidelity::<MsgPack>();
    scenario_fidelity::<Cbor>();
    scenario_fidelity::<Json>();
    scenario_fidelity::<Zera>();
}

#[test]
fn map_form_is_accepted() {
    let data = doubles();
    let bytes = serialize::<MsgPack>(&zmap! {
        "dtype" => 11i64,
        "shape" => zvec![2u64, 2u64],
        "data" => Bin(bytemuck_bytes(&data)),
    })
    .unwrap()
    .to_vec();
    let reader = <MsgPack as Format>::Reader::from_vec(bytes).unwrap();
    let root = reader.root();
    assert!(is_tensor::<f64, _>(&root));
    check_elements(&root);
}

fn bytemuck_bytes(data: &[f64]) -> &[u8] {
    // SAFETY: f64 slices are plain bytes at 8x the length
    unsafe { std::slice::from_raw_parts(data.as_ptr() as *const u8, data.len() * 8) }
}

#[cfg(feature = "ndarray")]
#[test]
fn element_access_via_ndarray_view() {
    let reader = <Zera as Format>::Reader::from_vec(tensor_bytes::<Zera>()).unwrap();
    let t = as_tensor::<f64, _>(&reader.root()).unwrap();
    let view = t.view().unwrap();
    assert_eq!(view[[1, 1]], 4.0);
    assert_eq!(view[[0, 1]], 2.0);
    let owned = t.to_array().unwrap();
    assert_eq!(owned[[1, 0]], 3.0);
}

#[test]
fn dtype_rank_and_size_mismatches_raise() {
    // wrong dtype
    let reader = <Zera as Format>::Reader::from_vec(tensor_bytes::<Zera>()).unwrap();
    assert!(as_tensor::<f32, _>(&reader.root()).is_err());

    // size mismatch: shape says 2x2 but payload holds 3 elements
    let data = [1.0f64, 2.0, 3.0];
    let bytes = serialize::<Zera>(&zvec![
        11i64,
        zvec![2u64, 2u64],
        Bin(bytemuck_bytes(&data))
    ])
    .unwrap()
    .to_vec();
    let reader = <Zera as Format>::Reader::from_vec(bytes).unwrap();
    assert!(as_tensor::<f64, _>(&reader.root()).is_err());

    // negative dimension
    let bytes = serialize::<Zera>(&zvec![
        11i64,
        zvec![-2i64, 2i64],
        Bin(bytemuck_bytes(&data))
    ])
    .unwrap()
    .to_vec();
    let reader = <Zera as Format>::Reader::from_vec(bytes).unwrap();
    assert!(as_tensor::<f64, _>(&reader.root()).is_err());

    // unknown dtype code
    let bytes = serialize::<Zera>(&zvec![9i64, zvec![3u64], Bin(bytemuck_bytes(&data))])
        .unwrap()
        .to_vec();
    let reader = <Zera as Format>::Reader::from_vec(bytes).unwrap();
    assert!(as_tensor::<f64, _>(&reader.root()).is_err());

    // not a tensor at all
    let bytes = serialize::<Zera>(&zvec![1i64, 2i64]).unwrap().to_vec();
    let reader = <Zera as Format>::Reader::from_vec(bytes).unwrap();
    assert!(!is_tensor::<f64, _>(&reader.root()));
    assert!(as_tensor::<f64, _>(&reader.root()).is_err());
}

/// Copy `bytes` into 16-aligned storage at byte offset `shift` and run
/// `check` over the shifted slice.
fn with_shifted(bytes: &[u8], shift: usize, check: impl FnOnce(&[u8])) {
    let words = (shift + bytes.len()) / 16 + 2;
    let mut store = vec![0u128; words];
    // SAFETY: the u128 allocation is 16-aligned and sized to hold
    // shift + bytes.len() bytes; it is only reinterpreted as bytes.
    let raw =
        unsafe { std::slice::from_raw_parts_mut(store.as_mut_ptr() as *mut u8, words * 16) };
    raw[shift..shift + bytes.len()].copy_from_slice(bytes);
    check(&raw[shift..shift + bytes.len()]);
}

// the zero-copy decision is exactly the alignment predicate.
// The sweep must read through the borrowed parse entry points - owning
// readers copy the bytes and would erase the controlled base address.
macro_rules! alignment_sweep {
    ($fmt:ty, $parse:path) => {{
        let encoded = tensor_bytes::<$fmt>();
        let align = std::mem::align_of::<f64>();
        let mut zero_copy_hits = 0usize;

        for shift in 0..16 {
            with_shifted(&encoded, shift, |slice| {
                let v = $parse(slice).unwrap();
                let t = as_tensor::<f64, _>(&v).unwrap();
                let info = t.info();
                assert_eq!(info.zero_copy, info.address % align == 0);
                assert_eq!(
                    info.reason,
                    if info.zero_copy {
                        ViewReason::Ok
                    } else {
                        ViewReason::Misaligned
                    }
                );
                assert_eq!(t.as_slice(), doubles().as_slice());
                if info.zero_copy {
                    zero_copy_hits += 1;
                }
            });
        }
        // 16 shifts against an 8-byte element alignment: exactly two land
        assert_eq!(zero_copy_hits, 16 / align);
    }};
}

#[test]
fn span_backed_codecs_follow_the_alignment_predicate() {
    alignment_sweep!(Flex, zerabuf::formats::flex::parse);
    alignment_sweep!(MsgPack, zerabuf::formats::msgpack::parse);
    alignment_sweep!(Cbor, zerabuf::formats::cbor::parse);
    alignment_sweep!(Zera, zerabuf::formats::zera::parse);
}

#[test]
fn json_is_never_zero_copy() {
    let encoded = tensor_bytes::<Json>();
    for shift in 0..16 {
        with_shifted(&encoded, shift, |slice| {
            let reader = <Json as Format>::Reader::from_vec(slice.to_vec()).unwrap();
            let t = as_tensor::<f64, _>(&reader.root()).unwrap();
            assert!(!t.info().zero_copy);
            assert_eq!(t.info().reason, ViewReason::NotSpanBacked);
            assert_eq!(t.as_slice(), doubles().as_slice());
        });
    }
}

#[test]
fn blob_cow_tracks_backing() {
    // span-backed codecs hand out borrowed blobs
    let bytes = serialize::<MsgPack>(&Bin(&[1, 2, 3])).unwrap().to_vec();
    let reader = <MsgPack as Format>::Reader::from_vec(bytes).unwrap();
    assert!(matches!(
        reader.root().as_blob().unwrap(),
        Cow::Borrowed(_)
    ));

    // JSON decodes base64 into owned bytes
    let bytes = serialize::<Json>(&Bin(&[1, 2, 3])).unwrap().to_vec();
    let reader = <Json as Format>::Reader::from_vec(bytes).unwrap();
    assert!(matches!(reader.root().as_blob().unwrap(), Cow::Owned(_)));
}

#[cfg(feature = "ndarray")]
#[test]
fn ndarray_values_build_directly() {
    use ndarray::ArrayD;
    let arr = ArrayD::from_shape_vec(ndarray::IxDyn(&[2, 3]), (0..6).map(f64::from).collect())
        .unwrap();
    let bytes = serialize::<Cbor>(&arr).unwrap().to_vec();
    let reader = <Cbor as Format>::Reader::from_vec(bytes).unwrap();
    let t = as_tensor::<f64, _>(&reader.root()).unwrap();
    assert_eq!(t.shape(), &[2, 3]);
    assert_eq!(t.view().unwrap()[[1, 2]], 5.0);
}
