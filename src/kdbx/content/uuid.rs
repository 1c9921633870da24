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

use rand::RngCore;

use crate::kdbx::result::{Error, Result};

/// 16 byte identifier of groups, entries and custom icons.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KdbxUuid([u8; 16]);

impl KdbxUuid {
    pub fn random() -> KdbxUuid {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        KdbxUuid(bytes)
    }

    pub fn nil() -> KdbxUuid {
        KdbxUuid([0u8; 16])
    }

    pub fn from_bytes(bytes: [u8; 16]) -> KdbxUuid {
        KdbxUuid(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<KdbxUuid> {
        if bytes.len() != 16 {
            return Err(Error::CryptoParameterError(format!(
                "uuid must be 16 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 16];
        out.copy_from_slice(bytes);
        Ok(KdbxUuid(out))
    }

    pub fn from_base64(text: &str) -> Result<KdbxUuid> {
        KdbxUuid::from_slice(&base64::decode(text.trim())?)
    }

    pub fn to_base64(&self) -> String {
        base64::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

impl fmt::Display for KdbxUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for KdbxUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KdbxUuid({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn base64_and_display() {
        let uuid = KdbxUuid::from_bytes([0xab; 16]);
        assert_eq!(uuid.to_base64(), "q6urq6urq6urq6urq6urqw==");
        assert_eq!(KdbxUuid::from_base64("q6urq6urq6urq6urq6urqw==").unwrap(), uuid);
        assert_eq!(uuid.to_string(), "ab".repeat(16));
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(matches!(
            KdbxUuid::from_slice(&[0u8; 15]),
            Err(Error::CryptoParameterError(_))
        ));
        assert!(KdbxUuid::from_base64("AAAA").is_err());
    }

    #[test]
    fn random_uuids_are_distinct_and_hashable() {
        let set: HashSet<KdbxUuid> = (0..32).map(|_| KdbxUuid::random()).collect();
        assert_eq!(set.len(), 32);
        assert!(KdbxUuid::nil().is_nil());
    }
}
