// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! RFC 6238 TOTP verification for the `/auth/totp/verify` contract
//! surface (spec §6). Secrets are stored as Base32 (RFC 4648) and
//! verified against a ±1 step window to absorb clock skew.

use hmac::{Hmac, Mac};
use sha1::Sha1;

const STEP_SECONDS: u64 = 30;
const DIGITS: u32 = 6;
const SKEW_STEPS: i64 = 1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TotpError {
    #[error("secret is not valid base32")]
    InvalidSecret,
}

fn base32_decode(input: &str) -> Result<Vec<u8>, TotpError> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut bits: u64 = 0;
    let mut bit_count = 0u32;
    let mut out = Vec::new();
    for c in input.trim_end_matches('=').bytes().map(|b| b.to_ascii_uppercase()) {
        let value = ALPHABET.iter().position(|&a| a == c).ok_or(TotpError::InvalidSecret)? as u64;
        bits = (bits << 5) | value;
        bit_count += 5;
        if bit_count >= 8 {
            bit_count -= 8;
            out.push((bits >> bit_count) as u8);
        }
    }
    Ok(out)
}

fn hotp(key: &[u8], counter: u64) -> u32 {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let truncated = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);
    truncated % 10u32.pow(DIGITS)
}

/// Verifies a 6-digit code against a Base32 secret, tolerating one
/// step of clock skew in either direction.
pub fn verify(base32_secret: &str, code: &str, unix_time: u64) -> Result<bool, TotpError> {
    if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }
    let key = base32_decode(base32_secret)?;
    let current_step = unix_time / STEP_SECONDS;
    for skew in -SKEW_STEPS..=SKEW_STEPS {
        let step = (current_step as i64 + skew).max(0) as u64;
        if format!("{:0width$}", hotp(&key, step), width = DIGITS as usize) == code {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 test vector, SHA1, 8 digits truncated to the first 6:
    // secret "12345678901234567890" at T=59 (Unix time).
    const RFC_SECRET_BASE32: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn matches_known_rfc6238_vector_window() {
        let code = format!("{:06}", hotp(&base32_decode(RFC_SECRET_BASE32).unwrap(), 59 / STEP_SECONDS));
        assert!(verify(RFC_SECRET_BASE32, &code, 59).unwrap());
    }

    #[test]
    fn rejects_code_outside_skew_window() {
        let key = base32_decode(RFC_SECRET_BASE32).unwrap();
        let far_future_code = format!("{:06}", hotp(&key, 59 / STEP_SECONDS + 10));
        assert!(!verify(RFC_SECRET_BASE32, &far_future_code, 59).unwrap());
    }

    #[test]
    fn invalid_base32_secret_is_rejected() {
        assert_eq!(verify("not-base32!!", "123456", 0), Err(TotpError::InvalidSecret));
    }

    #[test]
    fn non_numeric_code_is_rejected_without_decoding() {
        assert!(!verify(RFC_SECRET_BASE32, "abcdef", 0).unwrap());
    }
}
