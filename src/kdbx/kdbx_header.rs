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

//! Outer header: signatures, version and the per-version TLV field set.
//!
//! ```text
//!  | 4b     | 4b      | 2b    | 2b    | n                          |
//!  | prefix | family  | minor | major | fields: [id | size | data]* |
//! ```
//! Format 3 uses a 2 byte size field and stores the AES-KDF settings, inner stream key and
//! stream start bytes directly in the header. Format 4 uses a 4 byte size field, moves the
//! KDF into a variant dictionary and keeps the inner stream key in the encrypted inner header.

use std::convert::TryFrom;

use byteorder::{ByteOrder, LittleEndian};

use super::compression::Compression;
use super::consts::*;
use super::crypt::ciphers::OuterCipherSuite;
use super::crypt::inner_stream::InnerStreamAlgorithm;
use super::crypt::kdf::{AesKdf, AesKdfId, Kdf, KdfParameters};
use super::crypt::random_bytes;
use super::key::SecretKey;
use super::options::{DatabaseOptions, FormatVersion};
use super::result::{Error, Result};
use super::tlv::{self, LengthWidth};
use super::variant_dictionary::VariantDictionary;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdbxVersion {
    pub major: u16,
    pub minor: u16,
}

impl std::fmt::Display for KdbxVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Kdbx3Header {
    pub minor_version: u16,
    pub cipher: OuterCipherSuite,
    pub compression: Compression,
    pub master_seed: Vec<u8>,
    /// Transform seed and rounds (fields 5 and 6).
    pub kdf: AesKdf,
    pub iv: Vec<u8>,
    pub protected_stream_key: SecretKey,
    pub stream_start_bytes: Vec<u8>,
    pub inner_stream: InnerStreamAlgorithm,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Kdbx4Header {
    pub minor_version: u16,
    pub cipher: OuterCipherSuite,
    pub compression: Compression,
    pub master_seed: Vec<u8>,
    pub iv: Vec<u8>,
    pub kdf: KdfParameters,
    pub public_custom_data: Option<VariantDictionary>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KdbxHeader {
    Kdbx3(Kdbx3Header),
    Kdbx4(Kdbx4Header),
}

impl KdbxHeader {
    pub fn new(options: &DatabaseOptions) -> Result<KdbxHeader> {
        let header = match options.version {
            FormatVersion::Kdbx3 => {
                let kdf = match &options.kdf {
                    KdfParameters::Aes(aes) => AesKdf {
                        id: AesKdfId::Kdbx3,
                        ..aes.clone()
                    },
                    other => {
                        return Err(Error::UnsupportedKdf(format!(
                            "{} cannot be stored in a format 3 header",
                            other.name()
                        )))
                    }
                };
                KdbxHeader::Kdbx3(Kdbx3Header {
                    minor_version: FILE_VERSION_MINOR_3,
                    cipher: options.cipher,
                    compression: options.compression,
                    master_seed: Vec::new(),
                    kdf,
                    iv: Vec::new(),
                    protected_stream_key: SecretKey::default(),
                    stream_start_bytes: Vec::new(),
                    inner_stream: options.inner_stream,
                })
            }
            FormatVersion::Kdbx4 => KdbxHeader::Kdbx4(Kdbx4Header {
                minor_version: FILE_VERSION_MINOR_4,
                cipher: options.cipher,
                compression: options.compression,
                master_seed: Vec::new(),
                iv: Vec::new(),
                kdf: options.kdf.clone(),
                public_custom_data: None,
            }),
        };
        Ok(header)
    }

    // Bytes 0-3: Primary identifier, common across all kdbx versions
    // Bytes 4-7: Secondary identifier (0x67 is latest, 0x66 is the KeePass 2 pre-release
    // format and 0x65 is KeePass 1)
    // Bytes 8-9: LE WORD, file version (minor)
    // Bytes 10-11: LE WORD, file version (major)
    pub fn read_version(buf: &[u8], idx: &mut usize) -> Result<KdbxVersion> {
        if buf.len() < *idx + 4 {
            return Err(Error::MalformedHeader("file too short for a KDBX signature".into()));
        }

        let prefix = LittleEndian::read_u32(&buf[*idx..*idx + 4]);
        if prefix != KDBX_PREFIX {
            return Err(Error::MagicNumberMismatch { found: prefix });
        }

        if buf.len() < *idx + 12 {
            return Err(Error::MalformedHeader("file too short for a KDBX version".into()));
        }

        let version_format = LittleEndian::read_u32(&buf[*idx + 4..*idx + 8]);
        match version_format {
            VER_SIGNATURE_2XPOST => {}
            VER_SIGNATURE_1X => {
                return Err(Error::UnsupportedVersion("KeePass 1.x databases".into()))
            }
            VER_SIGNATURE_2XPRE => {
                return Err(Error::UnsupportedVersion(
                    "KeePass 2.x pre-release databases".into(),
                ))
            }
            other => {
                return Err(Error::UnsupportedVersion(format!(
                    "unknown format family {:#010X}",
                    other
                )))
            }
        }

        let minor = LittleEndian::read_u16(&buf[*idx + 8..*idx + 10]);
        let major = LittleEndian::read_u16(&buf[*idx + 10..*idx + 12]);
        *idx += 12;

        tracing::debug!(major, minor, "file version");

        Ok(KdbxVersion { major, minor })
    }

    /// Reads signatures, version and header fields, leaving `idx` just past the end marker.
    pub fn read(buf: &[u8], idx: &mut usize) -> Result<KdbxHeader> {
        let version = KdbxHeader::read_version(buf, idx)?;
        match version.major {
            FILE_VERSION_MAJOR_3 => Kdbx3Header::read_fields(buf, idx, version.minor).map(KdbxHeader::Kdbx3),
            FILE_VERSION_MAJOR_4 => Kdbx4Header::read_fields(buf, idx, version.minor).map(KdbxHeader::Kdbx4),
            _ => Err(Error::UnsupportedVersion(format!("KDBX {}", version))),
        }
    }

    /// Serializes the header. Random material must already be present.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(512);
        let version = self.version();

        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, KDBX_PREFIX);
        out.extend_from_slice(&buf);
        LittleEndian::write_u32(&mut buf, VER_SIGNATURE_2XPOST);
        out.extend_from_slice(&buf);
        out.extend_from_slice(&version.minor.to_le_bytes());
        out.extend_from_slice(&version.major.to_le_bytes());

        match self {
            KdbxHeader::Kdbx3(h) => h.write_fields(&mut out)?,
            KdbxHeader::Kdbx4(h) => h.write_fields(&mut out)?,
        }
        Ok(out)
    }

    /// Generates any missing seed, IV or key. Existing material is left untouched.
    pub fn ensure_random_material(&mut self) {
        match self {
            KdbxHeader::Kdbx3(h) => {
                fill_if_empty(&mut h.master_seed, SEED_LEN);
                fill_iv(&mut h.iv, h.cipher);
                h.kdf.ensure_seed();
                if h.protected_stream_key.is_empty() {
                    h.protected_stream_key = SecretKey::new(random_bytes(SEED_LEN));
                }
                fill_if_empty(&mut h.stream_start_bytes, STREAM_START_BYTES_LEN);
            }
            KdbxHeader::Kdbx4(h) => {
                fill_if_empty(&mut h.master_seed, SEED_LEN);
                fill_iv(&mut h.iv, h.cipher);
                h.kdf.ensure_seed();
            }
        }
    }

    /// Drops all random material so that it is regenerated on the next save.
    pub fn reset_crypto_keys(&mut self) {
        match self {
            KdbxHeader::Kdbx3(h) => {
                h.master_seed.clear();
                h.iv.clear();
                h.kdf.reset_crypto_keys();
                h.protected_stream_key = SecretKey::default();
                h.stream_start_bytes.clear();
            }
            KdbxHeader::Kdbx4(h) => {
                h.master_seed.clear();
                h.iv.clear();
                h.kdf.reset_crypto_keys();
            }
        }
    }

    pub fn version(&self) -> KdbxVersion {
        match self {
            KdbxHeader::Kdbx3(h) => KdbxVersion {
                major: FILE_VERSION_MAJOR_3,
                minor: h.minor_version,
            },
            KdbxHeader::Kdbx4(h) => KdbxVersion {
                major: FILE_VERSION_MAJOR_4,
                minor: h.minor_version,
            },
        }
    }

    pub fn format(&self) -> FormatVersion {
        match self {
            KdbxHeader::Kdbx3(_) => FormatVersion::Kdbx3,
            KdbxHeader::Kdbx4(_) => FormatVersion::Kdbx4,
        }
    }

    pub fn cipher(&self) -> OuterCipherSuite {
        match self {
            KdbxHeader::Kdbx3(h) => h.cipher,
            KdbxHeader::Kdbx4(h) => h.cipher,
        }
    }

    /// Switches the outer cipher. The IV is dropped when its length no longer fits.
    pub fn set_cipher(&mut self, cipher: OuterCipherSuite) {
        let (current, iv) = match self {
            KdbxHeader::Kdbx3(h) => (&mut h.cipher, &mut h.iv),
            KdbxHeader::Kdbx4(h) => (&mut h.cipher, &mut h.iv),
        };
        *current = cipher;
        if iv.len() != cipher.iv_len() {
            iv.clear();
        }
    }

    pub fn compression(&self) -> Compression {
        match self {
            KdbxHeader::Kdbx3(h) => h.compression,
            KdbxHeader::Kdbx4(h) => h.compression,
        }
    }

    pub fn set_compression(&mut self, compression: Compression) {
        match self {
            KdbxHeader::Kdbx3(h) => h.compression = compression,
            KdbxHeader::Kdbx4(h) => h.compression = compression,
        }
    }

    pub fn master_seed(&self) -> &[u8] {
        match self {
            KdbxHeader::Kdbx3(h) => &h.master_seed,
            KdbxHeader::Kdbx4(h) => &h.master_seed,
        }
    }

    pub fn iv(&self) -> &[u8] {
        match self {
            KdbxHeader::Kdbx3(h) => &h.iv,
            KdbxHeader::Kdbx4(h) => &h.iv,
        }
    }

    pub fn kdf(&self) -> &dyn Kdf {
        match self {
            KdbxHeader::Kdbx3(h) => &h.kdf,
            KdbxHeader::Kdbx4(h) => &h.kdf,
        }
    }

    pub fn kdf_name(&self) -> &'static str {
        match self {
            KdbxHeader::Kdbx3(_) => "AES-KDF",
            KdbxHeader::Kdbx4(h) => h.kdf.name(),
        }
    }
}

fn fill_if_empty(field: &mut Vec<u8>, len: usize) {
    if field.is_empty() {
        *field = random_bytes(len);
    }
}

fn fill_iv(iv: &mut Vec<u8>, cipher: OuterCipherSuite) {
    if iv.len() != cipher.iv_len() {
        *iv = random_bytes(cipher.iv_len());
    }
}

fn require<T>(field: Option<T>, name: &str) -> Result<T> {
    field.ok_or_else(|| Error::MalformedHeader(format!("missing header field {}", name)))
}

fn read_u32_field(data: &[u8], name: &str) -> Result<u32> {
    if data.len() != 4 {
        return Err(Error::MalformedHeader(format!("{} must be 4 bytes", name)));
    }
    Ok(LittleEndian::read_u32(data))
}

fn read_seed_field(data: &[u8], name: &str) -> Result<Vec<u8>> {
    if data.len() != SEED_LEN {
        return Err(Error::CryptoParameterError(format!(
            "{} must be {} bytes, got {}",
            name,
            SEED_LEN,
            data.len()
        )));
    }
    Ok(data.to_vec())
}

fn check_iv(iv: &[u8], cipher: OuterCipherSuite) -> Result<()> {
    if iv.len() != cipher.iv_len() {
        return Err(Error::CryptoParameterError(format!(
            "{:?} needs a {}B IV, header has {}B",
            cipher,
            cipher.iv_len(),
            iv.len()
        )));
    }
    Ok(())
}

fn write_field(out: &mut Vec<u8>, id: HeaderFieldId, data: &[u8], width: LengthWidth) -> Result<()> {
    tlv::write_record(out, id as u8, data, width)
}

fn missing_material(name: &str) -> Error {
    Error::CryptoParameterError(format!("{} has not been generated", name))
}

impl Kdbx3Header {
    fn read_fields(buf: &[u8], idx: &mut usize, minor_version: u16) -> Result<Kdbx3Header> {
        let mut cipher = None;
        let mut compression = None;
        let mut master_seed = None;
        let mut transform_seed = None;
        let mut transform_rounds = None;
        let mut iv = None;
        let mut stream_key = None;
        let mut stream_start_bytes = None;
        let mut inner_stream = None;

        loop {
            let record = tlv::read_record(buf, idx, LengthWidth::U16)?;
            let field_id = HeaderFieldId::try_from(record.id)?;
            tracing::trace!(field = ?field_id, len = record.data.len(), "header field");

            match field_id {
                HeaderFieldId::EndOfHeader => break,
                HeaderFieldId::CipherID => {
                    cipher = Some(OuterCipherSuite::from_uuid(record.data)?)
                }
                HeaderFieldId::CompressionFlags => {
                    compression = Some(Compression::from_flag(read_u32_field(
                        record.data,
                        "compression flags",
                    )?)?)
                }
                HeaderFieldId::MasterSeed => {
                    master_seed = Some(read_seed_field(record.data, "master seed")?)
                }
                HeaderFieldId::TransformSeed => {
                    transform_seed = Some(read_seed_field(record.data, "transform seed")?)
                }
                HeaderFieldId::TransformRounds => {
                    if record.data.len() != 8 {
                        return Err(Error::MalformedHeader("transform rounds must be 8 bytes".into()));
                    }
                    transform_rounds = Some(LittleEndian::read_u64(record.data))
                }
                HeaderFieldId::EncryptionIV => iv = Some(record.data.to_vec()),
                HeaderFieldId::ProtectedStreamKey => {
                    stream_key = Some(SecretKey::from_slice(record.data))
                }
                HeaderFieldId::StreamStartBytes => {
                    if record.data.len() != STREAM_START_BYTES_LEN {
                        return Err(Error::MalformedHeader(format!(
                            "stream start bytes must be {} bytes",
                            STREAM_START_BYTES_LEN
                        )));
                    }
                    stream_start_bytes = Some(record.data.to_vec())
                }
                HeaderFieldId::InnerRandomStreamID => {
                    inner_stream = Some(InnerStreamAlgorithm::try_from(read_u32_field(
                        record.data,
                        "inner random stream id",
                    )?)?)
                }
                other => {
                    return Err(Error::MalformedHeader(format!(
                        "field {:?} is not valid in a format 3 header",
                        other
                    )))
                }
            }
        }

        let header = Kdbx3Header {
            minor_version,
            cipher: require(cipher, "CipherID")?,
            compression: require(compression, "CompressionFlags")?,
            master_seed: require(master_seed, "MasterSeed")?,
            kdf: AesKdf {
                id: AesKdfId::Kdbx3,
                seed: require(transform_seed, "TransformSeed")?,
                rounds: require(transform_rounds, "TransformRounds")?,
            },
            iv: require(iv, "EncryptionIV")?,
            protected_stream_key: require(stream_key, "ProtectedStreamKey")?,
            stream_start_bytes: require(stream_start_bytes, "StreamStartBytes")?,
            inner_stream: require(inner_stream, "InnerRandomStreamID")?,
        };
        check_iv(&header.iv, header.cipher)?;

        tracing::debug!(cipher = ?header.cipher, rounds = header.kdf.rounds, "read format 3 header");
        Ok(header)
    }

    fn write_fields(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.master_seed.is_empty() {
            return Err(missing_material("master seed"));
        }
        if self.kdf.seed.is_empty() {
            return Err(missing_material("transform seed"));
        }
        if self.protected_stream_key.is_empty() {
            return Err(missing_material("protected stream key"));
        }
        if self.stream_start_bytes.is_empty() {
            return Err(missing_material("stream start bytes"));
        }
        check_iv(&self.iv, self.cipher)?;

        let w = LengthWidth::U16;
        write_field(out, HeaderFieldId::CipherID, &self.cipher.uuid(), w)?;
        write_field(out, HeaderFieldId::CompressionFlags, &self.compression.flag().to_le_bytes(), w)?;
        write_field(out, HeaderFieldId::MasterSeed, &self.master_seed, w)?;
        write_field(out, HeaderFieldId::TransformSeed, &self.kdf.seed, w)?;
        write_field(out, HeaderFieldId::TransformRounds, &self.kdf.rounds.to_le_bytes(), w)?;
        write_field(out, HeaderFieldId::EncryptionIV, &self.iv, w)?;
        write_field(out, HeaderFieldId::ProtectedStreamKey, self.protected_stream_key.as_bytes(), w)?;
        write_field(out, HeaderFieldId::StreamStartBytes, &self.stream_start_bytes, w)?;
        write_field(out, HeaderFieldId::InnerRandomStreamID, &self.inner_stream.id().to_le_bytes(), w)?;
        tlv::write_end(out, &END_OF_HEADER, w)
    }
}

impl Kdbx4Header {
    fn read_fields(buf: &[u8], idx: &mut usize, minor_version: u16) -> Result<Kdbx4Header> {
        let mut cipher = None;
        let mut compression = None;
        let mut master_seed = None;
        let mut iv = None;
        let mut kdf = None;
        let mut public_custom_data = None;

        loop {
            let record = tlv::read_record(buf, idx, LengthWidth::U32)?;
            let field_id = HeaderFieldId::try_from(record.id)?;
            tracing::trace!(field = ?field_id, len = record.data.len(), "header field");

            match field_id {
                HeaderFieldId::EndOfHeader => break,
                HeaderFieldId::CipherID => {
                    cipher = Some(OuterCipherSuite::from_uuid(record.data)?)
                }
                HeaderFieldId::CompressionFlags => {
                    compression = Some(Compression::from_flag(read_u32_field(
                        record.data,
                        "compression flags",
                    )?)?)
                }
                HeaderFieldId::MasterSeed => {
                    master_seed = Some(read_seed_field(record.data, "master seed")?)
                }
                HeaderFieldId::EncryptionIV => iv = Some(record.data.to_vec()),
                HeaderFieldId::KdfParameters => {
                    let vd = VariantDictionary::parse(record.data)?;
                    kdf = Some(KdfParameters::from_variant_dictionary(&vd)?);
                }
                HeaderFieldId::PluginData => {
                    public_custom_data = Some(VariantDictionary::parse(record.data)?)
                }
                other => {
                    return Err(Error::MalformedHeader(format!(
                        "field {:?} is not valid in a format 4 header",
                        other
                    )))
                }
            }
        }

        let header = Kdbx4Header {
            minor_version,
            cipher: require(cipher, "CipherID")?,
            compression: require(compression, "CompressionFlags")?,
            master_seed: require(master_seed, "MasterSeed")?,
            iv: require(iv, "EncryptionIV")?,
            kdf: require(kdf, "KdfParameters")?,
            public_custom_data,
        };
        check_iv(&header.iv, header.cipher)?;

        tracing::debug!(cipher = ?header.cipher, kdf = header.kdf.name(), "read format 4 header");
        Ok(header)
    }

    fn write_fields(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.master_seed.is_empty() {
            return Err(missing_material("master seed"));
        }
        check_iv(&self.iv, self.cipher)?;

        let w = LengthWidth::U32;
        write_field(out, HeaderFieldId::CipherID, &self.cipher.uuid(), w)?;
        write_field(out, HeaderFieldId::CompressionFlags, &self.compression.flag().to_le_bytes(), w)?;
        write_field(out, HeaderFieldId::MasterSeed, &self.master_seed, w)?;
        write_field(out, HeaderFieldId::EncryptionIV, &self.iv, w)?;
        write_field(out, HeaderFieldId::KdfParameters, &self.kdf.kdf_params().to_bytes(), w)?;
        if let Some(data) = &self.public_custom_data {
            write_field(out, HeaderFieldId::PluginData, &data.to_bytes(), w)?;
        }
        tlv::write_end(out, &END_OF_HEADER, w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdbx::crypt::kdf::{Argon2Kdf, Argon2Type};
    use crate::kdbx::variant_dictionary::VariantDictionaryValue;

    fn kdbx4_options() -> DatabaseOptions {
        DatabaseOptions {
            kdf: KdfParameters::Argon2(Argon2Kdf::new(Argon2Type::Argon2id, 2, 1024 * 1024, 2)),
            ..DatabaseOptions::default()
        }
    }

    fn written(options: &DatabaseOptions) -> (KdbxHeader, Vec<u8>) {
        let mut header = KdbxHeader::new(options).unwrap();
        header.ensure_random_material();
        let bytes = header.to_bytes().unwrap();
        (header, bytes)
    }

    /// Checks writing and reading of base signature and version fields.
    #[test]
    fn version_write_read_test() {
        let (_, bytes) = written(&kdbx4_options());
        assert_eq!(&bytes[..8], &[0x03, 0xd9, 0xa2, 0x9a, 0x67, 0xfb, 0x4b, 0xb5]);

        let mut idx = 0;
        let version = KdbxHeader::read_version(&bytes, &mut idx).unwrap();
        assert_eq!(version, KdbxVersion { major: 4, minor: 0 });
        assert_eq!(idx, 12);
    }

    #[test]
    fn kdbx4_header_reads_back() {
        let (header, bytes) = written(&kdbx4_options());
        let mut idx = 0;
        let parsed = KdbxHeader::read(&bytes, &mut idx).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(idx, bytes.len());
        assert_eq!(&bytes[bytes.len() - 4..], &END_OF_HEADER);
    }

    #[test]
    fn kdbx3_header_reads_back() {
        let (header, bytes) = written(&DatabaseOptions::kdbx3());
        let mut idx = 0;
        let parsed = KdbxHeader::read(&bytes, &mut idx).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.version(), KdbxVersion { major: 3, minor: 1 });
        assert_eq!(idx, bytes.len());
    }

    #[test]
    fn public_custom_data_is_kept() {
        let mut header = KdbxHeader::new(&kdbx4_options()).unwrap();
        header.ensure_random_material();
        if let KdbxHeader::Kdbx4(h) = &mut header {
            let mut vd = VariantDictionary::empty();
            vd.add("plugin", VariantDictionaryValue::String("value".into()));
            h.public_custom_data = Some(vd);
        }
        let bytes = header.to_bytes().unwrap();
        let parsed = KdbxHeader::read(&bytes, &mut 0).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn random_material_is_generated_once() {
        let mut header = KdbxHeader::new(&kdbx4_options()).unwrap();
        assert!(header.to_bytes().is_err());

        header.ensure_random_material();
        let first = header.to_bytes().unwrap();
        header.ensure_random_material();
        assert_eq!(header.to_bytes().unwrap(), first);

        header.reset_crypto_keys();
        header.ensure_random_material();
        assert_ne!(header.to_bytes().unwrap(), first);
    }

    #[test]
    fn iv_follows_the_cipher() {
        let mut header = KdbxHeader::new(&kdbx4_options()).unwrap();
        header.ensure_random_material();
        assert_eq!(header.iv().len(), 16);

        header.set_cipher(OuterCipherSuite::ChaCha20);
        assert!(header.iv().is_empty());
        header.ensure_random_material();
        assert_eq!(header.iv().len(), 12);
    }

    #[test]
    fn kdbx3_rejects_argon2() {
        let options = DatabaseOptions {
            version: FormatVersion::Kdbx3,
            ..kdbx4_options()
        };
        assert!(matches!(KdbxHeader::new(&options), Err(Error::UnsupportedKdf(_))));
    }

    #[test]
    fn short_input_reports_magic_first() {
        assert!(matches!(
            KdbxHeader::read_version(&[1, 2, 3, 4, 5, 6], &mut 0),
            Err(Error::MagicNumberMismatch { .. })
        ));
        assert!(matches!(
            KdbxHeader::read_version(&[0x03, 0xd9], &mut 0),
            Err(Error::MalformedHeader(_))
        ));

        let (_, bytes) = written(&kdbx4_options());
        assert!(matches!(
            KdbxHeader::read_version(&bytes[..8], &mut 0),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn bad_signatures() {
        let (_, mut bytes) = written(&kdbx4_options());
        bytes[0] = 0;
        assert!(matches!(
            KdbxHeader::read(&bytes, &mut 0),
            Err(Error::MagicNumberMismatch { .. })
        ));

        let (_, mut bytes) = written(&kdbx4_options());
        LittleEndian::write_u32(&mut bytes[4..8], VER_SIGNATURE_1X);
        assert!(matches!(
            KdbxHeader::read(&bytes, &mut 0),
            Err(Error::UnsupportedVersion(_))
        ));

        let (_, mut bytes) = written(&kdbx4_options());
        LittleEndian::write_u32(&mut bytes[4..8], VER_SIGNATURE_2XPRE);
        assert!(matches!(
            KdbxHeader::read(&bytes, &mut 0),
            Err(Error::UnsupportedVersion(_))
        ));

        let (_, mut bytes) = written(&kdbx4_options());
        LittleEndian::write_u16(&mut bytes[10..12], 5);
        assert!(matches!(
            KdbxHeader::read(&bytes, &mut 0),
            Err(Error::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn field_from_the_other_version_is_malformed() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&KDBX_PREFIX.to_le_bytes());
        bytes.extend_from_slice(&VER_SIGNATURE_2XPOST.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        tlv::write_record(&mut bytes, HeaderFieldId::TransformRounds as u8, &[0u8; 8], LengthWidth::U32)
            .unwrap();

        assert!(matches!(
            KdbxHeader::read(&bytes, &mut 0),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn missing_field_is_malformed_not_defaulted() {
        let (_, bytes) = written(&kdbx4_options());
        // drop the cipher id record (first record after the 12 byte prefix)
        let mut idx = 12;
        tlv::read_record(&bytes, &mut idx, LengthWidth::U32).unwrap();
        let mut stripped = bytes[..12].to_vec();
        stripped.extend_from_slice(&bytes[idx..]);

        assert!(matches!(
            KdbxHeader::read(&stripped, &mut 0),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn truncated_header_is_malformed() {
        let (_, bytes) = written(&DatabaseOptions::kdbx3());
        for cut in [5, 20, bytes.len() - 3] {
            assert!(matches!(
                KdbxHeader::read(&bytes[..cut], &mut 0),
                Err(Error::MalformedHeader(_))
            ));
        }
    }
}
