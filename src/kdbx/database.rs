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

use std::io::{Read, Write};

use super::consts::HMAC_BLOCK_SIZE;
use super::content::binary::{BinaryPool, KdbxEntryBinary};
use super::content::body_reader::Body;
use super::content::entry::KdbxEntry;
use super::content::group::{DeletedObject, KdbxGroup};
use super::content::meta::KdbxMeta;
use super::content::times::now;
use super::content::uuid::KdbxUuid;
use super::crypt::ciphers::OuterCipherSuite;
use super::crypt::inner_stream::InnerStreamAlgorithm;
use super::inner_header::InnerHeader;
use super::kdbx_header::{KdbxHeader, KdbxVersion};
use super::kdbx_reader::KdbxReader;
use super::kdbx_writer::KdbxWriter;
use super::key::{CompositeKey, SecretKey};
use super::options::{DatabaseOptions, FormatVersion};
use super::result::Result;

const RECYCLE_BIN_NAME: &str = "Recycle Bin";
const RECYCLE_BIN_ICON: u32 = 43;

/// An open KDBX database: outer header, optional format 4 inner header and the document.
#[derive(Debug)]
pub struct KdbxDatabase {
    pub(crate) header: KdbxHeader,
    pub(crate) inner_header: Option<InnerHeader>,
    pub(crate) meta: KdbxMeta,
    pub(crate) root: KdbxGroup,
    pub(crate) binaries: BinaryPool,
    pub(crate) deleted_objects: Vec<DeletedObject>,
    pub(crate) block_size: usize,
}

impl KdbxDatabase {
    /// Creates an empty database with a root group named `Root`.
    pub fn new(options: DatabaseOptions) -> Result<KdbxDatabase> {
        let header = KdbxHeader::new(&options)?;
        let inner_header = match options.version {
            FormatVersion::Kdbx3 => None,
            FormatVersion::Kdbx4 => Some(InnerHeader::new(options.inner_stream)),
        };
        tracing::debug!(version = %header.version(), cipher = ?options.cipher, kdf = header.kdf_name(), "created database");

        Ok(KdbxDatabase {
            header,
            inner_header,
            meta: KdbxMeta::default(),
            root: KdbxGroup::new("Root"),
            binaries: BinaryPool::default(),
            deleted_objects: Vec::new(),
            block_size: options.block_size,
        })
    }

    pub(crate) fn from_parts(
        header: KdbxHeader,
        inner_header: Option<InnerHeader>,
        body: Body,
        binaries: BinaryPool,
    ) -> KdbxDatabase {
        KdbxDatabase {
            header,
            inner_header,
            meta: body.meta,
            root: body.root,
            binaries,
            deleted_objects: body.deleted_objects,
            block_size: HMAC_BLOCK_SIZE,
        }
    }

    pub fn open<R: Read>(reader: &mut R, key: &CompositeKey) -> Result<KdbxDatabase> {
        KdbxReader::read_from(reader, key)
    }

    /// Reads the outer header only; no credentials are needed.
    pub fn read_header<R: Read>(reader: &mut R) -> Result<KdbxHeader> {
        KdbxReader::read_header(reader)
    }

    /// Writes the database, generating any missing seeds, IV and keys first.
    pub fn save<W: Write>(&mut self, writer: &mut W, key: &CompositeKey) -> Result<()> {
        self.header.ensure_random_material();
        if let Some(inner) = &mut self.inner_header {
            inner.ensure_random_material();
        }
        KdbxWriter::write(writer, self, key)
    }

    /// Drops master seed, IV, KDF salt and inner stream key so new ones are generated on the
    /// next save.
    pub fn reset_crypto_keys(&mut self) {
        self.header.reset_crypto_keys();
        if let Some(inner) = &mut self.inner_header {
            inner.reset_crypto_keys();
        }
    }

    pub fn header(&self) -> &KdbxHeader {
        &self.header
    }

    pub fn version(&self) -> KdbxVersion {
        self.header.version()
    }

    pub fn set_cipher(&mut self, cipher: OuterCipherSuite) {
        self.header.set_cipher(cipher);
    }

    pub fn inner_stream(&self) -> InnerStreamAlgorithm {
        if let Some(inner) = &self.inner_header {
            return inner.stream;
        }
        match &self.header {
            KdbxHeader::Kdbx3(h) => h.inner_stream,
            KdbxHeader::Kdbx4(_) => InnerStreamAlgorithm::None,
        }
    }

    /// Switches the protected value stream; a new key is generated on the next save.
    pub fn set_inner_stream(&mut self, stream: InnerStreamAlgorithm) {
        if let Some(inner) = &mut self.inner_header {
            inner.stream = stream;
            inner.reset_crypto_keys();
            return;
        }
        match &mut self.header {
            KdbxHeader::Kdbx3(h) => {
                h.inner_stream = stream;
                h.protected_stream_key = SecretKey::default();
            }
            KdbxHeader::Kdbx4(_) => self.inner_header = Some(InnerHeader::new(stream)),
        }
    }

    pub fn inner_header(&self) -> Option<&InnerHeader> {
        self.inner_header.as_ref()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn set_block_size(&mut self, block_size: usize) {
        self.block_size = block_size.max(1);
    }

    pub fn meta(&self) -> &KdbxMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut KdbxMeta {
        &mut self.meta
    }

    pub fn root(&self) -> &KdbxGroup {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut KdbxGroup {
        &mut self.root
    }

    pub fn binaries(&self) -> &BinaryPool {
        &self.binaries
    }

    pub fn deleted_objects(&self) -> &[DeletedObject] {
        &self.deleted_objects
    }

    /// Stores attachment bytes in the shared pool, returning the id of an identical
    /// binary when one already exists.
    pub fn add_binary(&mut self, data: Vec<u8>) -> usize {
        self.binaries.add(data, false)
    }

    pub fn binary_content(&self, binary: &KdbxEntryBinary) -> Result<Vec<u8>> {
        binary.content(&self.binaries)
    }

    pub fn find_entry(&self, uuid: &KdbxUuid) -> Option<&KdbxEntry> {
        self.root.find_entry(uuid)
    }

    pub fn find_entry_mut(&mut self, uuid: &KdbxUuid) -> Option<&mut KdbxEntry> {
        self.root.find_entry_mut(uuid)
    }

    pub fn find_group(&self, uuid: &KdbxUuid) -> Option<&KdbxGroup> {
        self.root.find_group(uuid)
    }

    pub fn recycle_bin(&self) -> Option<&KdbxGroup> {
        if self.meta.recycle_bin_uuid.is_nil() {
            return None;
        }
        self.root.find_group(&self.meta.recycle_bin_uuid)
    }

    /// Entry with the standard fields, protected as the memory protection settings ask.
    pub fn new_entry(&self) -> KdbxEntry {
        let mut entry = KdbxEntry::with_standard_fields();
        let keys: Vec<String> = entry.fields().map(|(k, _)| k.to_string()).collect();
        for key in keys {
            let protect = self.meta.protects(&key);
            entry.set(&key, "", protect);
        }
        entry
    }

    /// Moves an entry to the recycle bin, or deletes it for good when the bin is disabled or
    /// the entry is already in it. Returns false when no entry has this uuid.
    pub fn delete_entry(&mut self, uuid: &KdbxUuid) -> bool {
        let in_bin = self
            .recycle_bin()
            .map_or(false, |bin| bin.find_entry(uuid).is_some());

        let mut entry = match self.root.remove_entry(uuid) {
            Some(entry) => entry,
            None => return false,
        };

        if !self.meta.recycle_bin_enabled || in_bin {
            self.deleted_objects.push(DeletedObject {
                uuid: *uuid,
                deletion_time: now(),
            });
            tracing::debug!(%uuid, "deleted entry");
            return true;
        }

        entry.times.location_changed = now();
        let bin_uuid = self.ensure_recycle_bin();
        if let Some(bin) = self.root.find_group_mut(&bin_uuid) {
            bin.add_entry(entry);
        }
        tracing::debug!(%uuid, "moved entry to the recycle bin");
        true
    }

    fn ensure_recycle_bin(&mut self) -> KdbxUuid {
        if let Some(bin) = self.recycle_bin() {
            return bin.uuid;
        }
        let mut bin = KdbxGroup::new(RECYCLE_BIN_NAME);
        bin.icon_id = RECYCLE_BIN_ICON;
        bin.enable_auto_type = Some(false);
        bin.enable_searching = Some(false);
        let uuid = bin.uuid;
        self.root.add_group(bin);
        self.meta.recycle_bin_uuid = uuid;
        self.meta.recycle_bin_changed = now();
        uuid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdbx::crypt::kdf::{AesKdf, Argon2Kdf, Argon2Type, KdfParameters};
    use crate::kdbx::result::Error;

    fn fast_options() -> DatabaseOptions {
        DatabaseOptions {
            kdf: KdfParameters::Argon2(Argon2Kdf::new(Argon2Type::Argon2d, 1, 64 * 1024, 1)),
            ..DatabaseOptions::default()
        }
    }

    #[test]
    fn new_database_layout() {
        let db = KdbxDatabase::new(fast_options()).unwrap();
        assert_eq!(db.version(), KdbxVersion { major: 4, minor: 0 });
        assert_eq!(db.root().name, "Root");
        assert_eq!(db.inner_stream(), InnerStreamAlgorithm::ChaCha20);
        assert!(db.recycle_bin().is_none());

        let db3 = KdbxDatabase::new(DatabaseOptions {
            kdf: KdfParameters::Aes(AesKdf::new(10)),
            ..DatabaseOptions::kdbx3()
        })
        .unwrap();
        assert!(db3.inner_header().is_none());
        assert_eq!(db3.inner_stream(), InnerStreamAlgorithm::Salsa20);
    }

    #[test]
    fn format3_requires_aes_kdf() {
        let options = DatabaseOptions {
            version: FormatVersion::Kdbx3,
            ..fast_options()
        };
        assert!(matches!(KdbxDatabase::new(options), Err(Error::UnsupportedKdf(_))));
    }

    #[test]
    fn delete_moves_to_recycle_bin_then_removes() {
        let mut db = KdbxDatabase::new(fast_options()).unwrap();
        let uuid = db.root_mut().add_entry(KdbxEntry::new()).uuid;

        assert!(db.delete_entry(&uuid));
        let bin = db.recycle_bin().unwrap();
        assert_eq!(bin.name, RECYCLE_BIN_NAME);
        assert_eq!(bin.entries()[0].uuid, uuid);
        assert!(db.deleted_objects().is_empty());

        assert!(db.delete_entry(&uuid));
        assert!(db.find_entry(&uuid).is_none());
        assert_eq!(db.deleted_objects()[0].uuid, uuid);
        assert!(!db.delete_entry(&uuid));
    }

    #[test]
    fn delete_without_recycle_bin() {
        let mut db = KdbxDatabase::new(fast_options()).unwrap();
        db.meta_mut().recycle_bin_enabled = false;
        let uuid = db.root_mut().add_entry(KdbxEntry::new()).uuid;

        assert!(db.delete_entry(&uuid));
        assert!(db.recycle_bin().is_none());
        assert_eq!(db.deleted_objects().len(), 1);
    }

    #[test]
    fn new_entry_follows_memory_protection() {
        let mut db = KdbxDatabase::new(fast_options()).unwrap();
        db.meta_mut().memory_protection.protect_username = true;
        let entry = db.new_entry();
        assert!(entry.value("UserName").unwrap().is_protected());
        assert!(entry.value("Password").unwrap().is_protected());
        assert!(!entry.value("Title").unwrap().is_protected());
    }

    #[test]
    fn switching_inner_stream_drops_the_key() {
        let mut db = KdbxDatabase::new(fast_options()).unwrap();
        db.set_inner_stream(InnerStreamAlgorithm::Salsa20);
        assert_eq!(db.inner_stream(), InnerStreamAlgorithm::Salsa20);
        assert!(db.inner_header().unwrap().stream_key.is_empty());
    }
}
