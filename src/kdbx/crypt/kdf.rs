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

use std::convert::TryFrom;

use aes::Aes256;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, NewBlockCipher};
use sha2::{Digest, Sha256};

use super::random_bytes;
use crate::kdbx::consts::*;
use crate::kdbx::key::SecretKey;
use crate::kdbx::result::{hex_id, Error, Result};
use crate::kdbx::variant_dictionary::{VariantDictionary, VariantDictionaryValue};

/// Turns the 32-byte composite key into the 32-byte transformed key.
pub trait Kdf {
    fn transform_key(&self, composite_key: &SecretKey) -> Result<SecretKey>;

    /// Serializes the parameters as a KDBX 4 variant dictionary.
    fn kdf_params(&self) -> VariantDictionary;

    /// Drops the seed/salt so a new one is generated before the next save.
    fn reset_crypto_keys(&mut self);

    /// Generates the seed/salt if it is missing.
    fn ensure_seed(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AesKdfId {
    Kdbx3,
    Kdbx4,
}

impl AesKdfId {
    fn uuid(self) -> [u8; 16] {
        match self {
            AesKdfId::Kdbx3 => KDF_AES_KDBX3,
            AesKdfId::Kdbx4 => KDF_AES_KDBX4,
        }
    }
}

/// Legacy AES-KDF: both halves of the key are AES-256-ECB encrypted `rounds` times with the seed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AesKdf {
    pub id: AesKdfId,
    pub seed: Vec<u8>,
    pub rounds: u64,
}

impl AesKdf {
    pub fn new(rounds: u64) -> AesKdf {
        AesKdf {
            id: AesKdfId::Kdbx3,
            seed: Vec::new(),
            rounds,
        }
    }
}

impl Kdf for AesKdf {
    fn transform_key(&self, composite_key: &SecretKey) -> Result<SecretKey> {
        if self.seed.len() != SEED_LEN {
            return Err(Error::CryptoParameterError(format!(
                "AES-KDF seed must be {} bytes, got {}",
                SEED_LEN,
                self.seed.len()
            )));
        }
        if composite_key.len() != 32 {
            return Err(Error::CryptoParameterError(format!(
                "composite key must be 32 bytes, got {}",
                composite_key.len()
            )));
        }

        tracing::debug!(rounds = self.rounds, "transforming key with AES-KDF");

        let key = composite_key.as_bytes();
        let cipher = Aes256::new(GenericArray::from_slice(&self.seed));
        let mut block1 = GenericArray::clone_from_slice(&key[..16]);
        let mut block2 = GenericArray::clone_from_slice(&key[16..]);
        for _ in 0..self.rounds {
            cipher.encrypt_block(&mut block1);
            cipher.encrypt_block(&mut block2);
        }

        let mut digest = Sha256::new();

        digest.update(&block1);
        digest.update(&block2);

        let hash = digest.finalize();

        for b in block1.iter_mut().chain(block2.iter_mut()) {
            *b = 0;
        }

        Ok(SecretKey::new(hash.to_vec()))
    }

    fn kdf_params(&self) -> VariantDictionary {
        let mut vd = VariantDictionary::empty();
        vd.add(KDF_UUID_KEY, VariantDictionaryValue::ByteArray(self.id.uuid().to_vec()));
        vd.add(KDF_ROUNDS_KEY, VariantDictionaryValue::UInt64(self.rounds));
        vd.add(KDF_SEED_KEY, VariantDictionaryValue::ByteArray(self.seed.clone()));
        vd
    }

    fn reset_crypto_keys(&mut self) {
        self.seed.clear();
    }

    fn ensure_seed(&mut self) {
        if self.seed.is_empty() {
            self.seed = random_bytes(SEED_LEN);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Argon2Type {
    Argon2d,
    Argon2id,
}

impl Argon2Type {
    fn uuid(self) -> [u8; 16] {
        match self {
            Argon2Type::Argon2d => KDF_ARGON2D,
            Argon2Type::Argon2id => KDF_ARGON2ID,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Argon2Kdf {
    pub variant: Argon2Type,
    pub iterations: u64,
    /// Memory in bytes, as stored in the file.
    pub memory: u64,
    pub parallelism: u32,
    pub version: u32,
    pub salt: Vec<u8>,
    pub secret: Option<Vec<u8>>,
    pub associated_data: Option<Vec<u8>>,
}

impl Argon2Kdf {
    pub fn new(variant: Argon2Type, iterations: u64, memory: u64, parallelism: u32) -> Argon2Kdf {
        Argon2Kdf {
            variant,
            iterations,
            memory,
            parallelism,
            version: ARGON2_VERSION_13,
            salt: Vec::new(),
            secret: None,
            associated_data: None,
        }
    }
}

impl Kdf for Argon2Kdf {
    fn transform_key(&self, composite_key: &SecretKey) -> Result<SecretKey> {
        if self.salt.len() < 8 {
            return Err(Error::CryptoParameterError(format!(
                "Argon2 salt must be at least 8 bytes, got {}",
                self.salt.len()
            )));
        }

        let version = argon2::Version::from_u32(self.version).map_err(|_| {
            Error::CryptoParameterError(format!("unsupported Argon2 version {:#x}", self.version))
        })?;
        let time_cost = u32::try_from(self.iterations).map_err(|_| {
            Error::CryptoParameterError(format!("Argon2 iterations {} out of range", self.iterations))
        })?;
        let mem_cost = u32::try_from(self.memory / 1024).map_err(|_| {
            Error::CryptoParameterError(format!("Argon2 memory {}B out of range", self.memory))
        })?;

        let config = argon2::Config {
            variant: match self.variant {
                Argon2Type::Argon2d => argon2::Variant::Argon2d,
                Argon2Type::Argon2id => argon2::Variant::Argon2id,
            },
            version,
            mem_cost,
            time_cost,
            lanes: self.parallelism,
            thread_mode: argon2::ThreadMode::Sequential,
            secret: self.secret.as_deref().unwrap_or(&[]),
            ad: self.associated_data.as_deref().unwrap_or(&[]),
            hash_length: 32,
        };

        tracing::debug!(
            variant = ?self.variant,
            iterations = time_cost,
            memory_kib = mem_cost,
            lanes = self.parallelism,
            "transforming key with Argon2"
        );

        let hash = argon2::hash_raw(composite_key.as_bytes(), &self.salt, &config)
            .map_err(|e| Error::CryptoParameterError(format!("Argon2: {}", e)))?;

        Ok(SecretKey::new(hash))
    }

    fn kdf_params(&self) -> VariantDictionary {
        let mut vd = VariantDictionary::empty();
        vd.add(KDF_UUID_KEY, VariantDictionaryValue::ByteArray(self.variant.uuid().to_vec()));
        vd.add(KDF_SEED_KEY, VariantDictionaryValue::ByteArray(self.salt.clone()));
        vd.add(KDF_PARALLELISM_KEY, VariantDictionaryValue::UInt32(self.parallelism));
        vd.add(KDF_MEMORY_KEY, VariantDictionaryValue::UInt64(self.memory));
        vd.add(KDF_ITERATIONS_KEY, VariantDictionaryValue::UInt64(self.iterations));
        vd.add(KDF_VERSION_KEY, VariantDictionaryValue::UInt32(self.version));
        if let Some(secret) = &self.secret {
            vd.add(KDF_SECRET_KEY, VariantDictionaryValue::ByteArray(secret.clone()));
        }
        if let Some(ad) = &self.associated_data {
            vd.add(KDF_ASSOCIATED_DATA_KEY, VariantDictionaryValue::ByteArray(ad.clone()));
        }
        vd
    }

    fn reset_crypto_keys(&mut self) {
        self.salt.clear();
    }

    fn ensure_seed(&mut self) {
        if self.salt.is_empty() {
            self.salt = random_bytes(SEED_LEN);
        }
    }
}

/// KDF selection carried by a KDBX 4 header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KdfParameters {
    Aes(AesKdf),
    Argon2(Argon2Kdf),
}

impl KdfParameters {
    /// Selects the KDF by its `$UUID` parameter and reads the matching settings.
    pub fn from_variant_dictionary(vd: &VariantDictionary) -> Result<KdfParameters> {
        let uuid: Vec<u8> = vd.get(KDF_UUID_KEY)?;

        let params = if uuid == KDF_AES_KDBX3 || uuid == KDF_AES_KDBX4 {
            KdfParameters::Aes(AesKdf {
                id: if uuid == KDF_AES_KDBX3 {
                    AesKdfId::Kdbx3
                } else {
                    AesKdfId::Kdbx4
                },
                seed: vd.get(KDF_SEED_KEY)?,
                rounds: vd.get(KDF_ROUNDS_KEY)?,
            })
        } else if uuid == KDF_ARGON2D || uuid == KDF_ARGON2ID {
            KdfParameters::Argon2(Argon2Kdf {
                variant: if uuid == KDF_ARGON2D {
                    Argon2Type::Argon2d
                } else {
                    Argon2Type::Argon2id
                },
                iterations: vd.get(KDF_ITERATIONS_KEY)?,
                memory: vd.get(KDF_MEMORY_KEY)?,
                parallelism: vd.get(KDF_PARALLELISM_KEY)?,
                version: vd.get_opt(KDF_VERSION_KEY)?.unwrap_or(ARGON2_VERSION_13),
                salt: vd.get(KDF_SEED_KEY)?,
                secret: vd.get_opt(KDF_SECRET_KEY)?,
                associated_data: vd.get_opt(KDF_ASSOCIATED_DATA_KEY)?,
            })
        } else {
            return Err(Error::UnsupportedKdf(hex_id(&uuid)));
        };

        tracing::debug!(kdf = params.name(), "selected key derivation function");
        Ok(params)
    }

    pub fn name(&self) -> &'static str {
        match self {
            KdfParameters::Aes(_) => "AES-KDF",
            KdfParameters::Argon2(a) if a.variant == Argon2Type::Argon2d => "Argon2d",
            KdfParameters::Argon2(_) => "Argon2id",
        }
    }

    fn inner(&self) -> &dyn Kdf {
        match self {
            KdfParameters::Aes(kdf) => kdf,
            KdfParameters::Argon2(kdf) => kdf,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Kdf {
        match self {
            KdfParameters::Aes(kdf) => kdf,
            KdfParameters::Argon2(kdf) => kdf,
        }
    }
}

impl Kdf for KdfParameters {
    fn transform_key(&self, composite_key: &SecretKey) -> Result<SecretKey> {
        self.inner().transform_key(composite_key)
    }

    fn kdf_params(&self) -> VariantDictionary {
        self.inner().kdf_params()
    }

    fn reset_crypto_keys(&mut self) {
        self.inner_mut().reset_crypto_keys()
    }

    fn ensure_seed(&mut self) {
        self.inner_mut().ensure_seed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composite() -> SecretKey {
        SecretKey::new(Sha256::digest(b"password").to_vec())
    }

    fn small_argon2(variant: Argon2Type) -> Argon2Kdf {
        let mut kdf = Argon2Kdf::new(variant, 2, 1024 * 1024, 2);
        kdf.salt = vec![3u8; 32];
        kdf
    }

    #[test]
    fn aes_kdf_is_deterministic() {
        let mut kdf = AesKdf::new(1000);
        kdf.seed = vec![5u8; 32];

        let k1 = kdf.transform_key(&composite()).unwrap();
        let k2 = kdf.transform_key(&composite()).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 32);

        kdf.rounds = 1001;
        assert_ne!(kdf.transform_key(&composite()).unwrap(), k1);
    }

    #[test]
    fn aes_kdf_zero_rounds_hashes_the_input() {
        let mut kdf = AesKdf::new(0);
        kdf.seed = vec![5u8; 32];
        let out = kdf.transform_key(&composite()).unwrap();
        assert_eq!(out.as_bytes(), Sha256::digest(composite().as_bytes()).as_slice());
    }

    #[test]
    fn aes_kdf_requires_seed() {
        let kdf = AesKdf::new(10);
        let err = kdf.transform_key(&composite()).unwrap_err();
        assert!(matches!(err, Error::CryptoParameterError(_)));
    }

    #[test]
    fn argon2_is_deterministic_and_32_bytes() {
        for variant in [Argon2Type::Argon2d, Argon2Type::Argon2id] {
            let kdf = small_argon2(variant);
            let k1 = kdf.transform_key(&composite()).unwrap();
            let k2 = kdf.transform_key(&composite()).unwrap();
            assert_eq!(k1, k2);
            assert_eq!(k1.len(), 32);
        }
    }

    #[test]
    fn argon2_variants_differ() {
        let d = small_argon2(Argon2Type::Argon2d).transform_key(&composite()).unwrap();
        let id = small_argon2(Argon2Type::Argon2id).transform_key(&composite()).unwrap();
        assert_ne!(d, id);
    }

    #[test]
    fn argon2_rejects_short_salt_and_bad_version() {
        let mut kdf = small_argon2(Argon2Type::Argon2id);
        kdf.salt = vec![1u8; 4];
        assert!(matches!(
            kdf.transform_key(&composite()),
            Err(Error::CryptoParameterError(_))
        ));

        let mut kdf = small_argon2(Argon2Type::Argon2id);
        kdf.version = 0x11;
        assert!(matches!(
            kdf.transform_key(&composite()),
            Err(Error::CryptoParameterError(_))
        ));
    }

    #[test]
    fn parameters_survive_variant_dictionary() {
        let mut argon = small_argon2(Argon2Type::Argon2id);
        argon.secret = Some(vec![1, 2, 3]);
        let params = KdfParameters::Argon2(argon);
        let parsed = KdfParameters::from_variant_dictionary(&params.kdf_params()).unwrap();
        assert_eq!(parsed, params);

        let mut aes = AesKdf::new(6000);
        aes.id = AesKdfId::Kdbx4;
        aes.ensure_seed();
        let params = KdfParameters::Aes(aes);
        let parsed = KdfParameters::from_variant_dictionary(&params.kdf_params()).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn unknown_kdf_uuid_is_unsupported() {
        let mut vd = VariantDictionary::empty();
        vd.add(KDF_UUID_KEY, VariantDictionaryValue::ByteArray(vec![0u8; 16]));
        let err = KdfParameters::from_variant_dictionary(&vd).unwrap_err();
        assert!(matches!(err, Error::UnsupportedKdf(_)));
    }

    #[test]
    fn reset_forces_a_new_seed() {
        let mut params = KdfParameters::Argon2(small_argon2(Argon2Type::Argon2d));
        let before = params.kdf_params().get::<Vec<u8>>(KDF_SEED_KEY).unwrap();
        params.reset_crypto_keys();
        params.ensure_seed();
        let after = params.kdf_params().get::<Vec<u8>>(KDF_SEED_KEY).unwrap();
        assert_eq!(after.len(), SEED_LEN);
        assert_ne!(before, after);
    }
}
