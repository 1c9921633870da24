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

use aes::{Aes128, Aes256};
use block_modes::block_padding::Pkcs7;
use block_modes::{BlockMode, Cbc};
use chacha20::{ChaCha20, Key, Nonce};
use cipher::{BlockCipher, NewBlockCipher, NewCipher, StreamCipher};
use twofish::Twofish;

use crate::kdbx::consts::*;
use crate::kdbx::result::{hex_id, Error, Result};

type Aes128Cbc = Cbc<Aes128, Pkcs7>;
type Aes256Cbc = Cbc<Aes256, Pkcs7>;
type TwofishCbc = Cbc<Twofish, Pkcs7>;

/// Payload encryption algorithm, identified in the outer header by its UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OuterCipherSuite {
    AES128,
    AES256,
    ChaCha20,
    Twofish,
}

impl OuterCipherSuite {
    pub fn from_uuid(uuid: &[u8]) -> Result<OuterCipherSuite> {
        if uuid == CIPHERSUITE_AES256 {
            Ok(OuterCipherSuite::AES256)
        } else if uuid == CIPHERSUITE_AES128 {
            Ok(OuterCipherSuite::AES128)
        } else if uuid == CIPHERSUITE_CHACHA20 {
            Ok(OuterCipherSuite::ChaCha20)
        } else if uuid == CIPHERSUITE_TWOFISH {
            Ok(OuterCipherSuite::Twofish)
        } else {
            Err(Error::UnsupportedCipher(hex_id(uuid)))
        }
    }

    pub fn uuid(&self) -> [u8; 16] {
        match self {
            OuterCipherSuite::AES128 => CIPHERSUITE_AES128,
            OuterCipherSuite::AES256 => CIPHERSUITE_AES256,
            OuterCipherSuite::ChaCha20 => CIPHERSUITE_CHACHA20,
            OuterCipherSuite::Twofish => CIPHERSUITE_TWOFISH,
        }
    }

    pub fn iv_len(&self) -> usize {
        match self {
            OuterCipherSuite::ChaCha20 => CHACHA20_IV_LEN,
            _ => BLOCK_CIPHER_IV_LEN,
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            OuterCipherSuite::AES128 => 16,
            _ => 32,
        }
    }

    /// Builds a cipher from the 32-byte master key; AES-128 uses its first 16 bytes.
    pub fn build(&self, key: &[u8], iv: &[u8]) -> Result<Box<dyn Cipher>> {
        if key.len() < self.key_len() {
            return Err(Error::CryptoParameterError(format!(
                "{:?} needs a {}B key, got {}B",
                self,
                self.key_len(),
                key.len()
            )));
        }
        if iv.len() != self.iv_len() {
            return Err(Error::CryptoParameterError(format!(
                "{:?} needs a {}B IV, got {}B",
                self,
                self.iv_len(),
                iv.len()
            )));
        }

        let key = key[..self.key_len()].to_vec();
        let iv = iv.to_vec();
        let cipher: Box<dyn Cipher> = match self {
            OuterCipherSuite::AES128 => Box::new(CbcCipher::<Aes128, Aes128Cbc>::new(key, iv)),
            OuterCipherSuite::AES256 => Box::new(CbcCipher::<Aes256, Aes256Cbc>::new(key, iv)),
            OuterCipherSuite::Twofish => Box::new(CbcCipher::<Twofish, TwofishCbc>::new(key, iv)),
            OuterCipherSuite::ChaCha20 => Box::new(ChaCha20Cipher { key, iv }),
        };
        Ok(cipher)
    }
}

pub trait Cipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

struct CbcCipher<C, M> {
    key: Vec<u8>,
    iv: Vec<u8>,
    _mode: std::marker::PhantomData<(C, M)>,
}

impl<C, M> CbcCipher<C, M> {
    fn new(key: Vec<u8>, iv: Vec<u8>) -> Self {
        CbcCipher {
            key,
            iv,
            _mode: std::marker::PhantomData,
        }
    }
}

impl<C, M> CbcCipher<C, M>
where
    C: BlockCipher + NewBlockCipher,
    M: BlockMode<C, Pkcs7>,
{
    fn mode(&self) -> Result<M> {
        M::new_from_slices(&self.key, &self.iv)
            .map_err(|_| Error::CryptoParameterError("invalid CBC key or IV length".into()))
    }
}

impl<C, M> Cipher for CbcCipher<C, M>
where
    C: BlockCipher + NewBlockCipher,
    M: BlockMode<C, Pkcs7>,
{
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(self.mode()?.encrypt_vec(plaintext))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        // A padding error can only come from a wrong key or damaged ciphertext.
        self.mode()?.decrypt_vec(ciphertext).map_err(|_| {
            Error::IntegrityFailure("payload decryption failed: wrong credentials or corrupted data".into())
        })
    }
}

struct ChaCha20Cipher {
    key: Vec<u8>,
    iv: Vec<u8>,
}

impl ChaCha20Cipher {
    fn apply(&self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        let mut cipher = ChaCha20::new(Key::from_slice(&self.key), Nonce::from_slice(&self.iv));
        cipher.apply_keystream(&mut out);
        out
    }
}

impl Cipher for ChaCha20Cipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(self.apply(plaintext))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(self.apply(ciphertext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OuterCipherSuite; 4] = [
        OuterCipherSuite::AES128,
        OuterCipherSuite::AES256,
        OuterCipherSuite::ChaCha20,
        OuterCipherSuite::Twofish,
    ];

    #[test]
    fn every_suite_decrypts_what_it_encrypts() {
        let key = [0x42u8; 32];
        let plaintext = b"The quick brown fox jumps over the lazy dog".repeat(3);
        for suite in ALL.iter() {
            let iv = vec![7u8; suite.iv_len()];
            let cipher = suite.build(&key, &iv).unwrap();
            let ciphertext = cipher.encrypt(&plaintext).unwrap();
            assert_ne!(ciphertext, plaintext);
            assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext, "{:?}", suite);
        }
    }

    #[test]
    fn uuid_lookup_matches() {
        for suite in ALL.iter() {
            assert_eq!(OuterCipherSuite::from_uuid(&suite.uuid()).unwrap(), *suite);
        }
        assert!(matches!(
            OuterCipherSuite::from_uuid(&[0u8; 16]),
            Err(Error::UnsupportedCipher(_))
        ));
    }

    #[test]
    fn iv_length_is_checked() {
        let key = [0u8; 32];
        assert!(matches!(
            OuterCipherSuite::ChaCha20.build(&key, &[0u8; 16]),
            Err(Error::CryptoParameterError(_))
        ));
        assert!(matches!(
            OuterCipherSuite::AES256.build(&key, &[0u8; 12]),
            Err(Error::CryptoParameterError(_))
        ));
        assert!(matches!(
            OuterCipherSuite::AES256.build(&key[..16], &[0u8; 16]),
            Err(Error::CryptoParameterError(_))
        ));
    }

    #[test]
    fn aes256_cbc_known_answer() {
        // NIST SP 800-38A F.2.5, first block, followed by one block of PKCS#7 padding
        let key = hex_literal::hex!("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4");
        let iv = hex_literal::hex!("000102030405060708090a0b0c0d0e0f");
        let plaintext = hex_literal::hex!("6bc1bee22e409f96e93d7e117393172a");
        let cipher = OuterCipherSuite::AES256.build(&key, &iv).unwrap();
        let ciphertext = cipher.encrypt(&plaintext).unwrap();
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(&ciphertext[..16], &hex_literal::hex!("f58c4c04d6e5f1ba779eabfb5f7bfbd6")[..]);
    }

    #[test]
    fn wrong_key_fails_integrity() {
        let iv = [1u8; 16];
        let ciphertext = OuterCipherSuite::AES256
            .build(&[1u8; 32], &iv)
            .unwrap()
            .encrypt(b"some payload that spans blocks")
            .unwrap();
        let result = OuterCipherSuite::AES256.build(&[2u8; 32], &iv).unwrap().decrypt(&ciphertext);
        // A wrong key almost always breaks the padding; when it does not, the payload is garbage.
        if let Ok(garbage) = result {
            assert_ne!(garbage, b"some payload that spans blocks".to_vec());
        } else {
            assert!(matches!(result, Err(Error::IntegrityFailure(_))));
        }
    }
}
