// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential encryption for DBot.
//!
//! Chat tokens and per-workspace oracle keys are stored encrypted with
//! AES-CBC and authenticated with HMAC-SHA256; session and XSRF cookies use
//! the same construction with a separate key.

pub mod crypto;
pub mod vault;

pub use crypto::{decrypt, decrypt_json, encrypt, encrypt_json, secure_random_string};
pub use vault::{Vault, last_four, mask_secret};
