/// XORs `payload` in place with the repeating 4-byte `mask_key`.
///
/// Masking is its own inverse, so the same call masks outgoing client frames and
/// unmasks incoming ones.
pub(crate) fn mask(payload: &mut [u8], mask_key: [u8; 4]) {
    let key = u32::from_ne_bytes(mask_key);
    let mut words = payload.chunks_exact_mut(4);
    for word in &mut words {
        let x = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]) ^ key;
        word.copy_from_slice(&x.to_ne_bytes());
    }
    // tail is at most 3 bytes and always starts on a key boundary
    for (b, k) in words.into_remainder().iter_mut().zip(mask_key) {
        *b ^= k;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn mask_bytewise(payload: &mut [u8], mask_key: [u8; 4]) {
        for (i, b) in payload.iter_mut().enumerate() {
            *b ^= mask_key[i % 4];
        }
    }

    #[test]
    fn masks_rfc_example() {
        // RFC 6455 5.7: masked "Hello"
        let mut payload = *b"Hello";
        mask(&mut payload, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(payload, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    proptest! {
        #[test]
        fn matches_bytewise_mask(mut payload in proptest::collection::vec(any::<u8>(), 0..300), key in any::<[u8; 4]>()) {
            let mut expected = payload.clone();
            mask_bytewise(&mut expected, key);
            mask(&mut payload, key);
            prop_assert_eq!(payload, expected);
        }
    }
}
