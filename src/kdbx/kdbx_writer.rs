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

use std::io::Write;

use sha2::{Digest, Sha256};

use super::content::body_writer::BodyWriter;
use super::crypt::hashed_block_stream::write_hashed_block_stream;
use super::crypt::hmac_block_stream::{header_hmac, write_hmac_block_stream};
use super::crypt::inner_stream::InnerStream;
use super::database::KdbxDatabase;
use super::kdbx_header::{Kdbx3Header, KdbxHeader};
use super::key::{CompositeKey, MasterKeys};
use super::options::FormatVersion;
use super::result::{Error, Result};

pub(crate) struct KdbxWriter {}

impl KdbxWriter {
    /// Serializes `db`. Random header material must already be generated.
    pub(crate) fn write<S: Write>(stream: &mut S, db: &KdbxDatabase, key: &CompositeKey) -> Result<()> {
        let header_bytes = db.header.to_bytes()?;
        let transformed = db.header.kdf().transform_key(&key.raw()?)?;
        let keys = MasterKeys::derive(db.header.master_seed(), &transformed);

        let out = match &db.header {
            KdbxHeader::Kdbx3(h) => Self::write_kdbx3(db, h, header_bytes, &keys)?,
            KdbxHeader::Kdbx4(_) => Self::write_kdbx4(db, header_bytes, &keys)?,
        };

        stream.write_all(&out)?;
        stream.flush()?;
        tracing::debug!(bytes = out.len(), version = %db.header.version(), "wrote database");
        Ok(())
    }

    fn write_kdbx3(
        db: &KdbxDatabase,
        header: &Kdbx3Header,
        mut out: Vec<u8>,
        keys: &MasterKeys,
    ) -> Result<Vec<u8>> {
        let header_hash = Sha256::digest(&out);

        let mut inner_stream =
            InnerStream::new(header.inner_stream, header.protected_stream_key.as_bytes())?;
        let xml = BodyWriter::new(FormatVersion::Kdbx3, &mut inner_stream)
            .with_meta_binaries(&db.binaries)
            .with_header_hash(header_hash.as_slice())
            .write(&db.meta, &db.root, &db.deleted_objects)?;

        let compressed = header.compression.compress(&xml)?;
        let mut plain = header.stream_start_bytes.clone();
        plain.extend_from_slice(&write_hashed_block_stream(&compressed, db.block_size));

        let cipher = header.cipher.build(keys.encryption.as_bytes(), &header.iv)?;
        out.extend_from_slice(&cipher.encrypt(&plain)?);
        Ok(out)
    }

    fn write_kdbx4(db: &KdbxDatabase, mut out: Vec<u8>, keys: &MasterKeys) -> Result<Vec<u8>> {
        let inner_header = db.inner_header.as_ref().ok_or_else(|| {
            Error::CryptoParameterError("format 4 database has no inner header".into())
        })?;

        let hash = Sha256::digest(&out);
        let hmac = header_hmac(&out, &keys.hmac)?;
        out.extend_from_slice(&hash);
        out.extend_from_slice(&hmac);

        let mut payload = Vec::new();
        inner_header.write(&mut payload, &db.binaries.inflated()?)?;

        let mut inner_stream =
            InnerStream::new(inner_header.stream, inner_header.stream_key.as_bytes())?;
        let xml = BodyWriter::new(FormatVersion::Kdbx4, &mut inner_stream).write(
            &db.meta,
            &db.root,
            &db.deleted_objects,
        )?;
        payload.extend_from_slice(&xml);

        let compressed = db.header.compression().compress(&payload)?;
        let cipher = db
            .header
            .cipher()
            .build(keys.encryption.as_bytes(), db.header.iv())?;
        let encrypted = cipher.encrypt(&compressed)?;
        out.extend_from_slice(&write_hmac_block_stream(&encrypted, &keys.hmac, db.block_size)?);
        Ok(out)
    }
}
