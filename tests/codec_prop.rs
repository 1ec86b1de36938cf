use proptest::prelude::*;
use tabagg::processor::{
    composite_key::{append_key_field, key_fields},
    varint::{MAX_VARINT32_LEN, encode_varint32, parse_varint32},
};

fn composite(fields: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for field in fields {
        append_key_field(field, &mut out).unwrap();
    }
    out
}

fn field() -> impl Strategy<Value = Vec<u8>> {
    // Biased toward a few bytes so that distinct tuples often share bytes.
    proptest::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(0u8), any::<u8>()], 0..200)
}

fn same_length_tuples() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    (1usize..4).prop_flat_map(|n| {
        (
            proptest::collection::vec(field(), n),
            proptest::collection::vec(field(), n),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 1024,
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn varint_round_trip(x in any::<u32>(), trailing in proptest::collection::vec(any::<u8>(), 0..4)) {
        let mut buf = [0u8; MAX_VARINT32_LEN];
        let len = encode_varint32(x, &mut buf);
        prop_assert!(len <= MAX_VARINT32_LEN);

        let mut encoded = buf[..len].to_vec();
        encoded.extend_from_slice(&trailing);
        prop_assert_eq!(parse_varint32(&encoded), (x, len));
    }

    #[test]
    fn composite_key_round_trip(fields in proptest::collection::vec(field(), 1..6)) {
        let encoded = composite(&fields);
        let decoded: Vec<Vec<u8>> = key_fields(&encoded).map(<[u8]>::to_vec).collect();
        prop_assert_eq!(decoded, fields);
    }

    #[test]
    fn composite_key_injective((a, b) in same_length_tuples()) {
        prop_assert_eq!(composite(&a) == composite(&b), a == b);
    }

    #[test]
    fn composite_key_split_points_differ(joined in field(), split in 0usize..200) {
        let split = split.min(joined.len());
        let (left, right) = joined.split_at(split);
        let shifted = split.saturating_sub(1);
        prop_assume!(shifted != split);
        let (left2, right2) = joined.split_at(shifted);
        prop_assert_ne!(
            composite(&[left.to_vec(), right.to_vec()]),
            composite(&[left2.to_vec(), right2.to_vec()])
        );
    }
}
