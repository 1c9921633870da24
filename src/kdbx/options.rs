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

use super::compression::Compression;
use super::consts::HMAC_BLOCK_SIZE;
use super::crypt::ciphers::OuterCipherSuite;
use super::crypt::inner_stream::InnerStreamAlgorithm;
use super::crypt::kdf::{AesKdf, Argon2Kdf, Argon2Type, KdfParameters};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatVersion {
    Kdbx3,
    Kdbx4,
}

/// Settings used when creating a new database.
#[derive(Clone, Debug)]
pub struct DatabaseOptions {
    pub version: FormatVersion,
    pub cipher: OuterCipherSuite,
    pub compression: Compression,
    /// Format 3 only supports AES-KDF; other choices are rejected when the header is built.
    pub kdf: KdfParameters,
    pub inner_stream: InnerStreamAlgorithm,
    pub block_size: usize,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        DatabaseOptions {
            version: FormatVersion::Kdbx4,
            cipher: OuterCipherSuite::AES256,
            compression: Compression::GZip,
            kdf: KdfParameters::Argon2(Argon2Kdf::new(
                Argon2Type::Argon2id,
                2,
                64 * 1024 * 1024,
                2,
            )),
            inner_stream: InnerStreamAlgorithm::ChaCha20,
            block_size: HMAC_BLOCK_SIZE,
        }
    }
}

impl DatabaseOptions {
    /// KeePass 2.x compatible format 3.1 defaults.
    pub fn kdbx3() -> Self {
        DatabaseOptions {
            version: FormatVersion::Kdbx3,
            kdf: KdfParameters::Aes(AesKdf::new(60_000)),
            inner_stream: InnerStreamAlgorithm::Salsa20,
            ..DatabaseOptions::default()
        }
    }
}
