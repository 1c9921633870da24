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

use std::io::Read;

use sha2::{Digest, Sha256};

use super::consts::STREAM_START_BYTES_LEN;
use super::content::binary::BinaryPool;
use super::content::body_reader::{Body, BodyReader};
use super::crypt::hashed_block_stream::read_hashed_block_stream;
use super::crypt::hmac_block_stream::{read_hmac_block_stream, verify_header_hmac};
use super::crypt::inner_stream::InnerStream;
use super::database::KdbxDatabase;
use super::inner_header::InnerHeader;
use super::kdbx_header::{Kdbx3Header, KdbxHeader};
use super::key::{CompositeKey, MasterKeys};
use super::result::{Error, Result};

const HEADER_HASH_LEN: usize = 32;
const HEADER_HMAC_LEN: usize = 32;

pub(crate) struct KdbxReader {}

impl KdbxReader {
    pub fn read_from<T: Read>(stream: &mut T, key: &CompositeKey) -> Result<KdbxDatabase> {
        let mut buf: Vec<u8> = Vec::with_capacity(1024 * 1024);
        stream.read_to_end(&mut buf)?;
        tracing::debug!(bytes = buf.len(), "read database file");

        let mut idx: usize = 0;
        let header = KdbxHeader::read(&buf, &mut idx)?;

        let transformed = header.kdf().transform_key(&key.raw()?)?;
        let keys = MasterKeys::derive(header.master_seed(), &transformed);

        match &header {
            KdbxHeader::Kdbx3(h) => {
                let (body, binaries) = Self::read_kdbx3_payload(&buf, idx, h, &keys)?;
                Ok(KdbxDatabase::from_parts(header, None, body, binaries))
            }
            KdbxHeader::Kdbx4(_) => {
                let (inner_header, body, binaries) =
                    Self::read_kdbx4_payload(&buf, idx, &header, &keys)?;
                Ok(KdbxDatabase::from_parts(header, Some(inner_header), body, binaries))
            }
        }
    }

    /// Parses only the unencrypted outer header.
    pub fn read_header<T: Read>(stream: &mut T) -> Result<KdbxHeader> {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        KdbxHeader::read(&buf, &mut 0)
    }

    // KDBX v3 File format:
    //  | 12b    | n      [1b      |2b  |size]  | encrypted:                                |
    //  | Header | Fields:[field_id|size|data]* | stream start bytes | hashed blocks(body) |
    fn read_kdbx3_payload(
        buf: &[u8],
        header_end: usize,
        header: &Kdbx3Header,
        keys: &MasterKeys,
    ) -> Result<(Body, BinaryPool)> {
        let cipher = header.cipher.build(keys.encryption.as_bytes(), &header.iv)?;
        let plain = cipher.decrypt(&buf[header_end..])?;

        // checked before anything else in the payload is looked at
        if plain.len() < STREAM_START_BYTES_LEN
            || plain[..STREAM_START_BYTES_LEN] != header.stream_start_bytes[..]
        {
            return Err(Error::IntegrityFailure(
                "stream start bytes mismatch: wrong credentials or corrupted file".into(),
            ));
        }

        let framed = read_hashed_block_stream(&plain[STREAM_START_BYTES_LEN..])?;
        let xml = header.compression.decompress(&framed)?;
        tracing::debug!(bytes = xml.len(), "decrypted format 3 body");

        let mut inner_stream = InnerStream::new(
            header.inner_stream,
            header.protected_stream_key.as_bytes(),
        )?;
        let mut binaries = BinaryPool::default();
        let body = BodyReader::new(&mut inner_stream, &mut binaries).read(&xml)?;

        if let Some(stored) = &body.meta.header_hash {
            let actual = Sha256::digest(&buf[..header_end]);
            if actual.as_slice() != stored.as_slice() {
                return Err(Error::IntegrityFailure(
                    "header hash stored in the body does not match the header".into(),
                ));
            }
        }

        Ok((body, binaries))
    }

    // KDBX v4 File format:
    //  | 12b    | n      [1b      |4b  |size]  | 32b              | 32b                   |
    //  | Header | Fields:[field_id|size|data]* | SHA256 of header | HMAC SHA256 of header | HMAC blocks
    fn read_kdbx4_payload(
        buf: &[u8],
        header_end: usize,
        header: &KdbxHeader,
        keys: &MasterKeys,
    ) -> Result<(InnerHeader, Body, BinaryPool)> {
        if buf.len() < header_end + HEADER_HASH_LEN + HEADER_HMAC_LEN {
            return Err(Error::MalformedHeader("file ends inside the header checksum".into()));
        }
        let header_bytes = &buf[..header_end];
        let stored_hash = &buf[header_end..header_end + HEADER_HASH_LEN];
        let stored_hmac =
            &buf[header_end + HEADER_HASH_LEN..header_end + HEADER_HASH_LEN + HEADER_HMAC_LEN];

        if Sha256::digest(header_bytes).as_slice() != stored_hash {
            return Err(Error::IntegrityFailure("header SHA-256 mismatch: file is corrupted".into()));
        }
        verify_header_hmac(header_bytes, stored_hmac, &keys.hmac)?;

        let payload_start = header_end + HEADER_HASH_LEN + HEADER_HMAC_LEN;
        let payload_encrypted = read_hmac_block_stream(&buf[payload_start..], &keys.hmac)?;

        let cipher = header.cipher().build(keys.encryption.as_bytes(), header.iv())?;
        let payload_compressed = cipher.decrypt(&payload_encrypted)?;
        let payload = header.compression().decompress(&payload_compressed)?;

        let (inner_header, attachments, body_start) = InnerHeader::read(&payload)?;
        let mut binaries = BinaryPool::default();
        for binary in attachments {
            binaries.push(false, binary.data().to_vec());
        }

        let mut inner_stream =
            InnerStream::new(inner_header.stream, inner_header.stream_key.as_bytes())?;
        let body = BodyReader::new(&mut inner_stream, &mut binaries).read(&payload[body_start..])?;
        tracing::debug!(bytes = payload.len() - body_start, "decrypted format 4 body");

        Ok((inner_header, body, binaries))
    }
}
