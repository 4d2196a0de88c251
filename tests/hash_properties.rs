//! Property tests for content hashing and fingerprints.

use offload_rs::{rolling_hash, ContentHash, Fingerprint};
use proptest::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const MULTIPLIER: u64 = 100_000_007;

fn hasher_value(fp: &Fingerprint) -> u64 {
    let mut h = DefaultHasher::new();
    fp.hash(&mut h);
    h.finish()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: hashing is a pure function of the text
    #[test]
    fn prop_hash_is_deterministic(text in ".{0,128}") {
        prop_assert_eq!(ContentHash::of_text(&text), ContentHash::of_text(&text));
        prop_assert_eq!(ContentHash::of_text(&text).value(), rolling_hash(text.as_bytes()));
    }

    /// Property: h(a ++ b) = h(a) * M^|b| + h(b), wrapping
    #[test]
    fn prop_hash_composes_over_concatenation(
        a in prop::collection::vec(any::<u8>(), 0..64),
        b in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut joined = a.clone();
        joined.extend_from_slice(&b);

        let expected = rolling_hash(&a)
            .wrapping_mul(MULTIPLIER.wrapping_pow(b.len() as u32))
            .wrapping_add(rolling_hash(&b));
        prop_assert_eq!(rolling_hash(&joined), expected);
    }

    /// Property: high bytes fold in as unsigned values
    #[test]
    fn prop_single_byte_hashes_to_itself(byte in any::<u8>()) {
        prop_assert_eq!(rolling_hash(&[byte]), byte as u64);
    }

    /// Property: short distinct canonical texts get distinct keys
    #[test]
    fn prop_distinct_texts_distinct_hashes(
        a in "[a-z0-9 _(){}=+*.]{1,32}",
        b in "[a-z0-9 _(){}=+*.]{1,32}",
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(ContentHash::of_text(&a), ContentHash::of_text(&b));
    }

    /// Property: fingerprints are equal exactly when their texts are
    #[test]
    fn prop_fingerprint_eq_iff_text_eq(
        a in "[a-z]{0,16}",
        b in "[a-z]{0,16}",
    ) {
        let fa = Fingerprint::from_text(a.as_str());
        let fb = Fingerprint::from_text(b.as_str());

        prop_assert_eq!(fa == fb, a == b);
        if fa == fb {
            prop_assert_eq!(hasher_value(&fa), hasher_value(&fb));
        }
        prop_assert_eq!(fa.content_hash(), ContentHash::of_text(&a));
        prop_assert_eq!(fa.canonical(), a.as_str());
    }
}

#[test]
fn test_known_values() {
    assert_eq!(rolling_hash(b""), 0);
    assert_eq!(rolling_hash(b"a"), 97);
    assert_eq!(rolling_hash(b"ab"), 97 * MULTIPLIER + 98);
    assert_eq!(ContentHash(0xff).to_string(), "00000000000000ff");
}
