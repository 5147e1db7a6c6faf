// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for the at-rest encryption.

use dbot_vault::{Vault, decrypt, encrypt};
use proptest::prelude::*;

fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 16),
        prop::collection::vec(any::<u8>(), 24),
        prop::collection::vec(any::<u8>(), 32),
    ]
}

proptest! {
    #[test]
    fn decrypt_inverts_encrypt(text in ".*", key in key_strategy()) {
        let sealed = encrypt(&text, &key).unwrap();
        prop_assert_eq!(decrypt(&sealed, &key).unwrap(), text);
    }

    #[test]
    fn other_key_fails(text in ".{0,64}", key in key_strategy(), flip in 0usize..16) {
        let sealed = encrypt(&text, &key).unwrap();
        let mut other = key.clone();
        other[flip] ^= 0x01;
        let err = decrypt(&sealed, &other).unwrap_err();
        prop_assert!(err.to_string().contains("could not validate cleartext"));
    }

    #[test]
    fn ciphertext_length_is_block_aligned(text in ".{0,100}") {
        let vault = Vault::new("0123456789abcdef0123456789abcdef").unwrap();
        let sealed = vault.encrypt(&text).unwrap();
        let raw_len = sealed.len() / 4 * 3
            - sealed.bytes().rev().take_while(|b| *b == b'=').count();
        prop_assert_eq!(raw_len % 16, 0);
        prop_assert!(raw_len >= 16 + text.len() + 32 + 1);
    }
}
