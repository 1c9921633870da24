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

use hex_literal::hex;

use super::result::{Error, Result};

pub const KDBX_PREFIX: u32 = 0x9AA2D903;
pub const VER_SIGNATURE_1X: u32 = 0xB54BFB65;
pub const VER_SIGNATURE_2XPRE: u32 = 0xB54BFB66;
pub const VER_SIGNATURE_2XPOST: u32 = 0xB54BFB67;

pub const FILE_VERSION_MAJOR_3: u16 = 3;
pub const FILE_VERSION_MAJOR_4: u16 = 4;
pub const FILE_VERSION_MINOR_3: u16 = 1;
pub const FILE_VERSION_MINOR_4: u16 = 0;

/// Payload of the outer header terminator record.
pub const END_OF_HEADER: [u8; 4] = [0x0d, 0x0a, 0x0d, 0x0a];

pub const CIPHERSUITE_AES128: [u8; 16] = hex!("61ab05a1946441c38d743a563df8dd35");
pub const CIPHERSUITE_AES256: [u8; 16] = hex!("31c1f2e6bf714350be5805216afc5aff");
pub const CIPHERSUITE_TWOFISH: [u8; 16] = hex!("ad68f29f576f4bb9a36ad47af965346c");
pub const CIPHERSUITE_CHACHA20: [u8; 16] = hex!("d6038a2b8b6f4cb5a524339a31dbb59a");

pub const KDF_AES_KDBX3: [u8; 16] = hex!("c9d9f39a628a4460bf740d08c18a4fea");
pub const KDF_AES_KDBX4: [u8; 16] = hex!("7c02bb8279a74ac0927d114a00648238");
pub const KDF_ARGON2D: [u8; 16] = hex!("ef636ddf8c29444b91f7a9a403e30a0c");
pub const KDF_ARGON2ID: [u8; 16] = hex!("9e298b1956db4773b23dfc3ec6f0a1e6");

// VariantDictionary keys, see https://keepass.info/help/kb/kdbx_4.html#extkdf
pub const KDF_UUID_KEY: &str = "$UUID";
pub const KDF_ROUNDS_KEY: &str = "R";
pub const KDF_SEED_KEY: &str = "S";
pub const KDF_PARALLELISM_KEY: &str = "P";
pub const KDF_MEMORY_KEY: &str = "M";
pub const KDF_ITERATIONS_KEY: &str = "I";
pub const KDF_VERSION_KEY: &str = "V";
pub const KDF_SECRET_KEY: &str = "K";
pub const KDF_ASSOCIATED_DATA_KEY: &str = "A";

pub const VARDICT_VERSION: u16 = 0x0100;
pub const VARDICT_VERSION_CRITICAL_MASK: u16 = 0xFF00;

pub const ARGON2_VERSION_10: u32 = 0x10;
pub const ARGON2_VERSION_13: u32 = 0x13;

pub const SALSA20_IV: [u8; 8] = hex!("e830094b97205d2a");

pub const SEED_LEN: usize = 32;
pub const STREAM_START_BYTES_LEN: usize = 32;
pub const BLOCK_CIPHER_IV_LEN: usize = 16;
pub const CHACHA20_IV_LEN: usize = 12;
pub const HMAC_BLOCK_SIZE: usize = 1024 * 1024;

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, PartialOrd, Eq, Hash, Debug)]
pub enum HeaderFieldId {
    EndOfHeader = 0,
    Comment = 1,
    CipherID = 2,         // 16 bytes
    CompressionFlags = 3, // 4 bytes
    MasterSeed = 4,       // 32 bytes
    TransformSeed = 5,    // For v3.1. Obsolete for v4
    TransformRounds = 6,  // For v3.1. Obsolete for v4
    EncryptionIV = 7,     // 16 bytes, 12 for ChaCha20
    ProtectedStreamKey = 8,
    StreamStartBytes = 9,
    InnerRandomStreamID = 10, // 4 bytes
    KdfParameters = 11, // Serialized as VariantDictionary. See https://keepass.info/help/kb/kdbx_4.html#extkdf
    PluginData = 12,    // Serialized as VariantDictionary.
}

impl TryFrom<u8> for HeaderFieldId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(HeaderFieldId::EndOfHeader),
            1 => Ok(HeaderFieldId::Comment),
            2 => Ok(HeaderFieldId::CipherID),
            3 => Ok(HeaderFieldId::CompressionFlags),
            4 => Ok(HeaderFieldId::MasterSeed),
            5 => Ok(HeaderFieldId::TransformSeed),
            6 => Ok(HeaderFieldId::TransformRounds),
            7 => Ok(HeaderFieldId::EncryptionIV),
            8 => Ok(HeaderFieldId::ProtectedStreamKey),
            9 => Ok(HeaderFieldId::StreamStartBytes),
            10 => Ok(HeaderFieldId::InnerRandomStreamID),
            11 => Ok(HeaderFieldId::KdfParameters),
            12 => Ok(HeaderFieldId::PluginData),
            _ => Err(Error::MalformedHeader(format!(
                "unknown header field id {}",
                value
            ))),
        }
    }
}

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum InnerHeaderFieldId {
    EndOfHeader = 0,
    InnerRandomStreamID = 1,  // 4 bytes
    InnerRandomStreamKey = 2, // 32 or 64 bytes
    Binary = 3,               // 1 flag byte + data
}

impl TryFrom<u8> for InnerHeaderFieldId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(InnerHeaderFieldId::EndOfHeader),
            1 => Ok(InnerHeaderFieldId::InnerRandomStreamID),
            2 => Ok(InnerHeaderFieldId::InnerRandomStreamKey),
            3 => Ok(InnerHeaderFieldId::Binary),
            _ => Err(Error::MalformedHeader(format!(
                "unknown inner header field id {}",
                value
            ))),
        }
    }
}

/// Flag bit of an inner header binary record reserved for per-attachment protection.
pub const BINARY_FLAG_PROTECTED: u8 = 0x01;
