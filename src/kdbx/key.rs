/*
   Copyright 2021 Rustam Kulenov

   Licensed under the Apache License, Version 2.0 (the "License");
   you may not use this file except in compliance with the License.
   You may obtain a copy of the License at

       http://www.apache.org/licenses/LICENSE-2.0

   Unless required by applicable law or agreed to in writing, software
   distributed under the License is distributed on an "AS IS" BASIS,
   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
   See the License for the specific language governing permissions and
   limitations under the License.
*/

use std::fmt;

use sha2::{Digest, Sha256, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::result::{Error, Result};

/// Key material that is wiped from memory when dropped.
#[derive(Clone, PartialEq, Eq, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(bytes: Vec<u8>) -> SecretKey {
        SecretKey(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> SecretKey {
        SecretKey(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED; {}])", self.0.len())
    }
}

/// One credential factor of a composite key.
pub trait Key {
    /// 32-byte digest contributed to the composite key.
    fn raw_key(&self) -> SecretKey;
}

pub struct PasswordKey {
    passw: SecretKey,
}

impl PasswordKey {
    pub fn new(passw: &str) -> PasswordKey {
        PasswordKey {
            passw: SecretKey::from_slice(passw.as_bytes()),
        }
    }
}

impl Key for PasswordKey {
    fn raw_key(&self) -> SecretKey {
        SecretKey::new(Sha256::digest(self.passw.as_bytes()).to_vec())
    }
}

/// Key file contents. A 32-byte file is used as is, a 64 character hex file is decoded,
/// anything else is hashed.
pub struct KeyFileKey {
    contents: SecretKey,
}

impl KeyFileKey {
    pub fn new(contents: &[u8]) -> KeyFileKey {
        KeyFileKey {
            contents: SecretKey::from_slice(contents),
        }
    }
}

impl Key for KeyFileKey {
    fn raw_key(&self) -> SecretKey {
        let bytes = self.contents.as_bytes();
        if bytes.len() == 32 {
            return SecretKey::from_slice(bytes);
        }
        if bytes.len() == 64 {
            if let Some(decoded) = decode_hex(bytes) {
                return SecretKey::new(decoded);
            }
        }
        SecretKey::new(Sha256::digest(bytes).to_vec())
    }
}

fn decode_hex(bytes: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(bytes).ok()?;
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

/// The combined user credentials, reduced to the 32 bytes fed into the KDF.
#[derive(Default)]
pub struct CompositeKey {
    parts: Vec<SecretKey>,
    digest: Option<SecretKey>,
}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeKey")
            .field("parts", &self.parts.len())
            .finish()
    }
}

impl CompositeKey {
    pub fn new() -> CompositeKey {
        CompositeKey::default()
    }

    pub fn from_password(passw: &str) -> CompositeKey {
        let mut key = CompositeKey::new();
        key.add(PasswordKey::new(passw));
        key
    }

    /// Wraps an already computed 32-byte composite key.
    pub fn from_raw(raw: &[u8]) -> Result<CompositeKey> {
        if raw.len() != 32 {
            return Err(Error::CryptoParameterError(format!(
                "composite key must be 32 bytes, got {}",
                raw.len()
            )));
        }
        Ok(CompositeKey {
            parts: Vec::new(),
            digest: Some(SecretKey::from_slice(raw)),
        })
    }

    pub fn add(&mut self, key: impl Key) {
        if let Some(digest) = self.digest.take() {
            self.parts.push(digest);
        }
        self.parts.push(key.raw_key());
    }

    pub fn add_password(&mut self, passw: &str) {
        self.add(PasswordKey::new(passw));
    }

    pub fn add_key_file_bytes(&mut self, contents: &[u8]) {
        self.add(KeyFileKey::new(contents));
    }

    pub fn raw(&self) -> Result<SecretKey> {
        if let Some(digest) = &self.digest {
            return Ok(digest.clone());
        }
        if self.parts.is_empty() {
            return Err(Error::CryptoParameterError(
                "composite key has no credentials".into(),
            ));
        }
        let mut hasher = Sha256::new();
        for part in &self.parts {
            hasher.update(part.as_bytes());
        }
        Ok(SecretKey::new(hasher.finalize().to_vec()))
    }
}

/// Keys derived from the KDF output and the header master seed.
pub(crate) struct MasterKeys {
    /// SHA-256(master seed ‖ transformed key)
    pub encryption: SecretKey,
    /// SHA-512(master seed ‖ transformed key ‖ 0x01), only used by format 4.
    pub hmac: SecretKey,
}

impl MasterKeys {
    pub fn derive(master_seed: &[u8], transformed_key: &SecretKey) -> MasterKeys {
        let mut digest = Sha256::new();
        digest.update(master_seed);
        digest.update(transformed_key.as_bytes());
        let encryption = SecretKey::new(digest.finalize().to_vec());

        let mut digest = Sha512::new();
        digest.update(master_seed);
        digest.update(transformed_key.as_bytes());
        digest.update(&[1u8]);
        let hmac = SecretKey::new(digest.finalize().to_vec());

        MasterKeys { encryption, hmac }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_composite_is_double_sha256() {
        let key = CompositeKey::from_password("secret");
        let expected = Sha256::digest(&Sha256::digest(b"secret"));
        assert_eq!(key.raw().unwrap().as_bytes(), expected.as_slice());
    }

    #[test]
    fn key_file_formats() {
        let raw = [7u8; 32];
        assert_eq!(KeyFileKey::new(&raw).raw_key().as_bytes(), &raw[..]);

        let hex = "0f".repeat(32);
        assert_eq!(KeyFileKey::new(hex.as_bytes()).raw_key().as_bytes(), &[0x0fu8; 32][..]);

        let other = b"some arbitrary key file";
        assert_eq!(
            KeyFileKey::new(other).raw_key().as_bytes(),
            Sha256::digest(other).as_slice()
        );
    }

    #[test]
    fn raw_key_is_passed_through() {
        let raw = [9u8; 32];
        let key = CompositeKey::from_raw(&raw).unwrap();
        assert_eq!(key.raw().unwrap().as_bytes(), &raw[..]);
        assert!(CompositeKey::from_raw(&raw[..31]).is_err());
    }

    #[test]
    fn empty_composite_key_is_rejected() {
        assert!(CompositeKey::new().raw().is_err());
    }

    #[test]
    fn master_keys_depend_on_seed() {
        let transformed = SecretKey::new(vec![1u8; 32]);
        let a = MasterKeys::derive(&[0u8; 32], &transformed);
        let b = MasterKeys::derive(&[1u8; 32], &transformed);
        assert_eq!(a.encryption.len(), 32);
        assert_eq!(a.hmac.len(), 64);
        assert_ne!(a.encryption, b.encryption);
        assert_ne!(a.hmac, b.hmac);
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = SecretKey::new(vec![0xAB; 4]);
        assert_eq!(format!("{:?}", key), "SecretKey([REDACTED; 4])");
    }
}
