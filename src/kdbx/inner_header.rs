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

//! Format 4 inner header, found at the start of the decrypted payload.

use std::convert::TryFrom;

use byteorder::{ByteOrder, LittleEndian};

use super::consts::{InnerHeaderFieldId, BINARY_FLAG_PROTECTED};
use super::content::binary::{BinaryPool, KdbxBinary};
use super::crypt::inner_stream::InnerStreamAlgorithm;
use super::crypt::random_bytes;
use super::key::SecretKey;
use super::result::{Error, Result};
use super::tlv::{self, LengthWidth};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InnerHeader {
    pub stream: InnerStreamAlgorithm,
    pub stream_key: SecretKey,
}

impl InnerHeader {
    pub fn new(stream: InnerStreamAlgorithm) -> InnerHeader {
        InnerHeader {
            stream,
            stream_key: SecretKey::default(),
        }
    }

    pub fn ensure_random_material(&mut self) {
        if self.stream_key.is_empty() && self.stream != InnerStreamAlgorithm::None {
            self.stream_key = SecretKey::new(random_bytes(self.stream.default_key_len()));
        }
    }

    pub fn reset_crypto_keys(&mut self) {
        self.stream_key = SecretKey::default();
    }

    /// Parses the inner header at the start of `buf`, returning it, the attachments in arrival
    /// order and the offset of the document body.
    pub(crate) fn read(buf: &[u8]) -> Result<(InnerHeader, Vec<KdbxBinary>, usize)> {
        let mut idx = 0;
        let mut stream = None;
        let mut stream_key = None;
        let mut binaries = Vec::new();

        loop {
            let record = tlv::read_record(buf, &mut idx, LengthWidth::U32)?;
            match InnerHeaderFieldId::try_from(record.id)? {
                InnerHeaderFieldId::EndOfHeader => break,
                InnerHeaderFieldId::InnerRandomStreamID => {
                    if record.data.len() != 4 {
                        return Err(Error::MalformedHeader(
                            "inner random stream id must be 4 bytes".into(),
                        ));
                    }
                    stream = Some(InnerStreamAlgorithm::try_from(LittleEndian::read_u32(
                        record.data,
                    ))?);
                }
                InnerHeaderFieldId::InnerRandomStreamKey => {
                    stream_key = Some(SecretKey::from_slice(record.data));
                }
                InnerHeaderFieldId::Binary => {
                    let (flags, data) = record.data.split_first().ok_or_else(|| {
                        Error::MalformedHeader("binary record without flags".into())
                    })?;
                    if flags & BINARY_FLAG_PROTECTED != 0 {
                        return Err(Error::MalformedHeader(format!(
                            "binary {} uses unsupported protection flag",
                            binaries.len()
                        )));
                    }
                    binaries.push(KdbxBinary::new(binaries.len(), false, data.to_vec()));
                }
            }
        }

        let header = InnerHeader {
            stream: stream.ok_or_else(|| {
                Error::MalformedHeader("inner header lacks the random stream id".into())
            })?,
            stream_key: stream_key.ok_or_else(|| {
                Error::MalformedHeader("inner header lacks the random stream key".into())
            })?,
        };

        tracing::debug!(stream = ?header.stream, binaries = binaries.len(), "read inner header");
        Ok((header, binaries, idx))
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>, binaries: &BinaryPool) -> Result<()> {
        tlv::write_record(
            out,
            InnerHeaderFieldId::InnerRandomStreamID as u8,
            &self.stream.id().to_le_bytes(),
            LengthWidth::U32,
        )?;
        tlv::write_record(
            out,
            InnerHeaderFieldId::InnerRandomStreamKey as u8,
            self.stream_key.as_bytes(),
            LengthWidth::U32,
        )?;
        for binary in binaries.iter() {
            let mut record = Vec::with_capacity(binary.data().len() + 1);
            record.push(0);
            record.extend_from_slice(binary.data());
            tlv::write_record(out, InnerHeaderFieldId::Binary as u8, &record, LengthWidth::U32)?;
        }
        tlv::write_end(out, &[], LengthWidth::U32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_header_reads_back_with_binaries() {
        let mut header = InnerHeader::new(InnerStreamAlgorithm::ChaCha20);
        header.ensure_random_material();
        assert_eq!(header.stream_key.len(), 64);

        let mut pool = BinaryPool::default();
        pool.add(b"first".to_vec(), false);
        pool.add(b"second".to_vec(), true);

        let mut buf = Vec::new();
        header.write(&mut buf, &pool).unwrap();
        buf.extend_from_slice(b"<KeePassFile/>");

        let (parsed, binaries, body) = InnerHeader::read(&buf).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(binaries.len(), 2);
        assert_eq!(binaries[0].id(), 0);
        assert_eq!(binaries[1].id(), 1);
        assert_eq!(binaries[1].data(), b"second");
        assert_eq!(&buf[body..], b"<KeePassFile/>");
    }

    #[test]
    fn protected_binary_flag_is_rejected() {
        let mut buf = Vec::new();
        tlv::write_record(&mut buf, 1, &3u32.to_le_bytes(), LengthWidth::U32).unwrap();
        tlv::write_record(&mut buf, 2, &[1u8; 64], LengthWidth::U32).unwrap();
        tlv::write_record(&mut buf, 3, &[BINARY_FLAG_PROTECTED, 1, 2], LengthWidth::U32).unwrap();
        tlv::write_end(&mut buf, &[], LengthWidth::U32).unwrap();

        assert!(matches!(InnerHeader::read(&buf), Err(Error::MalformedHeader(_))));
    }

    #[test]
    fn missing_stream_key_is_rejected() {
        let mut buf = Vec::new();
        tlv::write_record(&mut buf, 1, &3u32.to_le_bytes(), LengthWidth::U32).unwrap();
        tlv::write_end(&mut buf, &[], LengthWidth::U32).unwrap();

        assert!(matches!(InnerHeader::read(&buf), Err(Error::MalformedHeader(_))));
    }

    #[test]
    fn unknown_inner_field_is_rejected() {
        let mut buf = Vec::new();
        tlv::write_record(&mut buf, 9, &[0u8; 4], LengthWidth::U32).unwrap();
        assert!(matches!(InnerHeader::read(&buf), Err(Error::MalformedHeader(_))));
    }
}
