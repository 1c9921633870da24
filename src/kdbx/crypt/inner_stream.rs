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

//! Keystream protecting individual field values inside the decrypted payload.
//!
//! One stream is created per document and consumed strictly in document order: each
//! protected value takes the next `len` keystream bytes, so decoding values out of order
//! garbles every value after the first misplaced one.

use std::convert::TryFrom;

use chacha20::ChaCha20;
use cipher::{NewCipher, StreamCipher};
use salsa20::Salsa20;
use sha2::{Digest, Sha256, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::kdbx::consts::SALSA20_IV;
use crate::kdbx::result::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InnerStreamAlgorithm {
    None = 0,
    ArcFourVariant = 1,
    Salsa20 = 2,
    ChaCha20 = 3,
}

impl InnerStreamAlgorithm {
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Length of the random key generated for new databases.
    pub fn default_key_len(self) -> usize {
        match self {
            InnerStreamAlgorithm::ChaCha20 => 64,
            _ => 32,
        }
    }
}

impl TryFrom<u32> for InnerStreamAlgorithm {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(InnerStreamAlgorithm::None),
            1 => Ok(InnerStreamAlgorithm::ArcFourVariant),
            2 => Ok(InnerStreamAlgorithm::Salsa20),
            3 => Ok(InnerStreamAlgorithm::ChaCha20),
            _ => Err(Error::UnsupportedInnerStream(value)),
        }
    }
}

pub struct InnerStream {
    state: StreamState,
}

enum StreamState {
    None,
    ArcFour(ArcFour),
    Salsa20(Box<Salsa20>),
    ChaCha20(Box<ChaCha20>),
}

impl InnerStream {
    pub fn new(algorithm: InnerStreamAlgorithm, key: &[u8]) -> Result<InnerStream> {
        if algorithm != InnerStreamAlgorithm::None && key.is_empty() {
            return Err(Error::CryptoParameterError(
                "inner random stream key is empty".into(),
            ));
        }

        let state = match algorithm {
            InnerStreamAlgorithm::None => StreamState::None,
            InnerStreamAlgorithm::ArcFourVariant => StreamState::ArcFour(ArcFour::new(key)),
            InnerStreamAlgorithm::Salsa20 => {
                let mut hash = Sha256::digest(key);
                let cipher = Salsa20::new(&hash, salsa20::Nonce::from_slice(&SALSA20_IV));
                hash.as_mut_slice().zeroize();
                StreamState::Salsa20(Box::new(cipher))
            }
            InnerStreamAlgorithm::ChaCha20 => {
                let mut hash = Sha512::digest(key);
                let cipher = ChaCha20::new(
                    chacha20::Key::from_slice(&hash[..32]),
                    chacha20::Nonce::from_slice(&hash[32..44]),
                );
                hash.as_mut_slice().zeroize();
                StreamState::ChaCha20(Box::new(cipher))
            }
        };

        Ok(InnerStream { state })
    }

    /// XORs the next `data.len()` keystream bytes into `data`.
    pub fn apply(&mut self, data: &mut [u8]) {
        match &mut self.state {
            StreamState::None => {}
            StreamState::ArcFour(rc4) => rc4.apply(data),
            StreamState::Salsa20(cipher) => cipher.apply_keystream(data),
            StreamState::ChaCha20(cipher) => cipher.apply_keystream(data),
        }
    }

    /// Protects a field value for the XML body.
    pub fn encrypt_to_base64(&mut self, plaintext: &str) -> String {
        let mut buf = plaintext.as_bytes().to_vec();
        self.apply(&mut buf);
        base64::encode(&buf)
    }

    /// Recovers a protected field value from the XML body.
    pub fn decrypt_from_base64(&mut self, encoded: &str) -> Result<String> {
        let mut buf = base64::decode(encoded.trim())?;
        self.apply(&mut buf);
        String::from_utf8(buf).map_err(|e| {
            Error::IntegrityFailure(format!(
                "protected value does not decode to text (keystream out of sync?): {}",
                e
            ))
        })
    }
}

/// RC4 keyed with the raw inner key, with the first 512 keystream bytes thrown away.
#[derive(Zeroize, ZeroizeOnDrop)]
struct ArcFour {
    s: Vec<u8>,
    i: u8,
    j: u8,
}

impl ArcFour {
    fn new(key: &[u8]) -> ArcFour {
        let mut s: Vec<u8> = (0..=255u8).collect();
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }

        let mut rc4 = ArcFour { s, i: 0, j: 0 };
        let mut discard = [0u8; 512];
        rc4.apply(&mut discard);
        rc4
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let idx = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
            *byte ^= self.s[idx as usize];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALGORITHMS: [InnerStreamAlgorithm; 3] = [
        InnerStreamAlgorithm::ArcFourVariant,
        InnerStreamAlgorithm::Salsa20,
        InnerStreamAlgorithm::ChaCha20,
    ];

    #[test]
    fn values_decode_in_write_order() {
        let key = [0x5Au8; 64];
        for alg in ALGORITHMS.iter() {
            let mut writer = InnerStream::new(*alg, &key).unwrap();
            let a = writer.encrypt_to_base64("first secret");
            let b = writer.encrypt_to_base64("second secret");
            assert_ne!(a, base64::encode("first secret"));

            let mut reader = InnerStream::new(*alg, &key).unwrap();
            assert_eq!(reader.decrypt_from_base64(&a).unwrap(), "first secret");
            assert_eq!(reader.decrypt_from_base64(&b).unwrap(), "second secret");
        }
    }

    #[test]
    fn out_of_order_decoding_desynchronizes_the_stream() {
        let key = [0x33u8; 32];
        for alg in ALGORITHMS.iter() {
            let mut writer = InnerStream::new(*alg, &key).unwrap();
            let mut first = b"aaaaaaaaaaaa".to_vec();
            let mut second = b"bbbbbbbbbbbb".to_vec();
            writer.apply(&mut first);
            writer.apply(&mut second);

            let mut reader = InnerStream::new(*alg, &key).unwrap();
            let mut second_read = second.clone();
            let mut first_read = first.clone();
            reader.apply(&mut second_read);
            reader.apply(&mut first_read);
            assert_ne!(second_read, b"bbbbbbbbbbbb".to_vec(), "{:?}", alg);
            assert_ne!(first_read, b"aaaaaaaaaaaa".to_vec(), "{:?}", alg);
        }
    }

    #[test]
    fn rc4_matches_reference_after_discard() {
        // RFC 6229, key 0x0102030405, keystream at offset 512 (after the 512 discarded bytes)
        let mut rc4 = ArcFour::new(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        let mut block = [0u8; 16];
        rc4.apply(&mut block);
        assert_eq!(
            block,
            hex_literal::hex!("6459844432a7da923cfb3eb4980661f6")
        );
    }

    #[test]
    fn none_is_the_identity() {
        let mut stream = InnerStream::new(InnerStreamAlgorithm::None, &[]).unwrap();
        assert_eq!(stream.encrypt_to_base64("plain"), base64::encode("plain"));
    }

    #[test]
    fn unknown_id_is_rejected() {
        assert!(matches!(
            InnerStreamAlgorithm::try_from(9),
            Err(Error::UnsupportedInnerStream(9))
        ));
        assert_eq!(InnerStreamAlgorithm::try_from(3).unwrap(), InnerStreamAlgorithm::ChaCha20);
    }
}
