//! # Key Generation
//!
//! Purpose: Produce random record keys and confirm they are unused before a
//! record is created under them.
//!
//! Keys look like `<hex of N random bytes>-<unix seconds>`. Byte 6 carries a
//! version nibble and byte 8 a variant marker, UUID v4 style, but the result is
//! longer than a UUID and suffixed with its creation time so keys sort roughly
//! by age when listed.

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::warn;

use crate::error::{ClientError, ClientResult};

/// Random bytes per key used by `create`.
pub const DEFAULT_KEY_LENGTH: usize = 32;

/// Probe attempts before giving up on finding an unused key.
pub const DEFAULT_MAX_ATTEMPTS: usize = 100;

/// Smallest length that still has room for the version and variant bytes.
pub const MIN_KEY_LENGTH: usize = 9;

/// Generates one candidate key from `length` random bytes.
///
/// # Errors
/// `InvalidKeyLength` below [`MIN_KEY_LENGTH`]; `Entropy` when the OS random
/// source fails.
pub fn generate_key(length: usize) -> ClientResult<String> {
    if length < MIN_KEY_LENGTH {
        return Err(ClientError::InvalidKeyLength(length));
    }

    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| ClientError::Entropy(err.to_string()))?;

    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & !0x40) | 0x80;

    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);

    let mut key = String::with_capacity(length * 2 + 12);
    for byte in &bytes {
        let _ = write!(key, "{:02x}", byte);
    }
    let _ = write!(key, "-{}", seconds);
    Ok(key)
}

/// Bounded search for a key that is not yet stored.
#[derive(Debug, Clone, Copy)]
pub struct KeyGenerator {
    max_attempts: usize,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        KeyGenerator {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl KeyGenerator {
    /// Creates a generator that tries at most `max_attempts` candidates.
    pub fn new(max_attempts: usize) -> Self {
        KeyGenerator {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Maximum candidates tried per call.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Returns the first candidate for which `exists` reports `false`.
    ///
    /// `exists` is the backend probe. Any error it returns, and any
    /// generation error, ends the search immediately.
    ///
    /// # Errors
    /// `KeyGenerationExhausted` when every attempt collided.
    pub fn unused_key<F>(&self, bucket: &str, length: usize, mut exists: F) -> ClientResult<String>
    where
        F: FnMut(&str) -> ClientResult<bool>,
    {
        for attempt in 1..=self.max_attempts {
            let candidate = generate_key(length)?;
            if !exists(&candidate)? {
                return Ok(candidate);
            }
            warn!(bucket, attempt, key = %candidate, "generated key already in use");
        }
        Err(ClientError::KeyGenerationExhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hex_part(key: &str) -> &str {
        key.split_once('-').map(|(hex, _)| hex).unwrap()
    }

    #[test]
    fn rejects_short_lengths() {
        assert!(matches!(generate_key(8), Err(ClientError::InvalidKeyLength(8))));
        assert!(generate_key(MIN_KEY_LENGTH).is_ok());
    }

    #[test]
    fn suffix_is_current_unix_time() {
        let before = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let key = generate_key(DEFAULT_KEY_LENGTH).unwrap();
        let after = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();

        let (_, suffix) = key.split_once('-').unwrap();
        let stamp: u64 = suffix.parse().unwrap();
        assert!(stamp >= before && stamp <= after);
    }

    #[test]
    fn consecutive_keys_differ() {
        let a = generate_key(DEFAULT_KEY_LENGTH).unwrap();
        let b = generate_key(DEFAULT_KEY_LENGTH).unwrap();
        assert_ne!(hex_part(&a), hex_part(&b));
    }

    #[test]
    fn retries_past_collisions() {
        let mut probes = 0;
        let key = KeyGenerator::new(5)
            .unused_key("users", 16, |_| {
                probes += 1;
                Ok(probes < 3)
            })
            .unwrap();
        assert_eq!(probes, 3);
        assert_eq!(hex_part(&key).len(), 32);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut probes = 0;
        let err = KeyGenerator::new(4)
            .unused_key("users", 16, |_| {
                probes += 1;
                Ok(true)
            })
            .unwrap_err();
        assert!(matches!(err, ClientError::KeyGenerationExhausted { attempts: 4 }));
        assert_eq!(probes, 4);
    }

    #[test]
    fn probe_errors_end_the_search() {
        let mut probes = 0;
        let err = KeyGenerator::default()
            .unused_key("users", 16, |_| {
                probes += 1;
                Err(ClientError::Protocol)
            })
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol));
        assert_eq!(probes, 1);
    }

    #[test]
    fn generation_errors_skip_the_probe() {
        let err = KeyGenerator::default()
            .unused_key("users", 4, |_| panic!("probe must not run"))
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidKeyLength(4)));
    }

    proptest! {
        #[test]
        fn version_and_variant_bits_are_fixed(length in MIN_KEY_LENGTH..64usize) {
            let key = generate_key(length).unwrap();
            let hex = hex_part(&key);
            prop_assert_eq!(hex.len(), length * 2);
            prop_assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));

            let byte = |idx: usize| u8::from_str_radix(&hex[idx * 2..idx * 2 + 2], 16).unwrap();
            prop_assert_eq!(byte(6) & 0xF0, 0x40);
            prop_assert_eq!(byte(8) & 0xC0, 0x80);
        }
    }
}
