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

//! Attachment storage: a deduplicated pool shared by all entries, and per-entry references
//! that point into the pool or carry their own compressed copy.

use crate::kdbx::compression::{gunzip, gzip};
use crate::kdbx::result::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdbxBinary {
    id: usize,
    compressed: bool,
    data: Vec<u8>,
}

impl KdbxBinary {
    pub fn new(id: usize, compressed: bool, data: Vec<u8>) -> KdbxBinary {
        KdbxBinary {
            id,
            compressed,
            data,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether `data` is held gzip compressed (format 3 `Compressed="True"` binaries).
    pub fn compressed(&self) -> bool {
        self.compressed
    }

    /// Stored bytes, possibly compressed.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Attachment bytes with any compression removed.
    pub fn content(&self) -> Result<Vec<u8>> {
        if self.compressed {
            gunzip(&self.data)
        } else {
            Ok(self.data.clone())
        }
    }
}

/// Shared attachment table. Pool ids are ordinal positions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BinaryPool {
    binaries: Vec<KdbxBinary>,
}

impl BinaryPool {
    /// Stores `data` unless an identical binary is already present, returning its id.
    pub fn add(&mut self, data: Vec<u8>, compressed: bool) -> usize {
        if let Some(existing) = self
            .binaries
            .iter()
            .find(|b| b.compressed == compressed && b.data == data)
        {
            return existing.id;
        }
        let id = self.binaries.len();
        self.binaries.push(KdbxBinary::new(id, compressed, data));
        id
    }

    /// Appends a binary read from a file, keeping its position as id even when the content repeats.
    pub(crate) fn push(&mut self, compressed: bool, data: Vec<u8>) -> usize {
        let id = self.binaries.len();
        self.binaries.push(KdbxBinary::new(id, compressed, data));
        id
    }

    /// Copy of the pool with every binary decompressed, ids unchanged. Format 4 stores
    /// attachments uncompressed in the inner header.
    pub fn inflated(&self) -> Result<BinaryPool> {
        let binaries = self
            .binaries
            .iter()
            .map(|b| Ok(KdbxBinary::new(b.id, false, b.content()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(BinaryPool { binaries })
    }

    pub fn get(&self, id: usize) -> Option<&KdbxBinary> {
        self.binaries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KdbxBinary> {
        self.binaries.iter()
    }

    pub fn len(&self) -> usize {
        self.binaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binaries.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryBinaryData {
    /// Id in the database binary pool.
    Ref(usize),
    /// Private gzip compressed copy.
    Inline(Vec<u8>),
}

/// Named attachment of an entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdbxEntryBinary {
    pub name: String,
    data: EntryBinaryData,
}

impl KdbxEntryBinary {
    pub fn pooled(name: &str, id: usize) -> KdbxEntryBinary {
        KdbxEntryBinary {
            name: name.to_string(),
            data: EntryBinaryData::Ref(id),
        }
    }

    pub fn inline(name: &str, content: &[u8]) -> Result<KdbxEntryBinary> {
        Ok(KdbxEntryBinary {
            name: name.to_string(),
            data: EntryBinaryData::Inline(gzip(content)?),
        })
    }

    pub(crate) fn from_compressed(name: &str, compressed: Vec<u8>) -> KdbxEntryBinary {
        KdbxEntryBinary {
            name: name.to_string(),
            data: EntryBinaryData::Inline(compressed),
        }
    }

    pub fn data(&self) -> &EntryBinaryData {
        &self.data
    }

    pub fn ref_id(&self) -> Option<usize> {
        match self.data {
            EntryBinaryData::Ref(id) => Some(id),
            EntryBinaryData::Inline(_) => None,
        }
    }

    /// Points the attachment at a pool binary, dropping any inline copy.
    pub fn set_ref(&mut self, id: usize) {
        self.data = EntryBinaryData::Ref(id);
    }

    /// Stores a private compressed copy, dropping any pool reference.
    pub fn set_inline(&mut self, content: &[u8]) -> Result<()> {
        self.data = EntryBinaryData::Inline(gzip(content)?);
        Ok(())
    }

    /// Resolves the attachment bytes against `pool`.
    pub fn content(&self, pool: &BinaryPool) -> Result<Vec<u8>> {
        match &self.data {
            EntryBinaryData::Ref(id) => pool
                .get(*id)
                .ok_or_else(|| Error::Xml(format!("attachment {:?} references missing binary {}", self.name, id)))?
                .content(),
            EntryBinaryData::Inline(compressed) => gunzip(compressed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_deduplicates_by_content() {
        let mut pool = BinaryPool::default();
        let a = pool.add(b"same".to_vec(), false);
        let b = pool.add(b"other".to_vec(), false);
        let c = pool.add(b"same".to_vec(), false);
        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(1).unwrap().data(), b"other");
    }

    #[test]
    fn ref_and_inline_are_exclusive() {
        let mut pool = BinaryPool::default();
        let id = pool.add(b"pooled".to_vec(), false);

        let mut binary = KdbxEntryBinary::inline("a.txt", b"private").unwrap();
        assert_eq!(binary.ref_id(), None);
        assert_eq!(binary.content(&pool).unwrap(), b"private");

        binary.set_ref(id);
        assert_eq!(binary.ref_id(), Some(id));
        assert_eq!(binary.data(), &EntryBinaryData::Ref(id));
        assert_eq!(binary.content(&pool).unwrap(), b"pooled");

        binary.set_inline(b"again").unwrap();
        assert!(matches!(binary.data(), EntryBinaryData::Inline(_)));
        assert_eq!(binary.content(&pool).unwrap(), b"again");
    }

    #[test]
    fn compressed_pool_binary_is_inflated() {
        let mut pool = BinaryPool::default();
        let id = pool.add(gzip(b"zipped").unwrap(), true);
        let binary = KdbxEntryBinary::pooled("z", id);
        assert_eq!(binary.content(&pool).unwrap(), b"zipped");
    }

    #[test]
    fn inflated_pool_keeps_ids() {
        let mut pool = BinaryPool::default();
        pool.add(b"plain".to_vec(), false);
        pool.add(gzip(b"zipped").unwrap(), true);

        let inflated = pool.inflated().unwrap();
        assert_eq!(inflated.len(), 2);
        assert_eq!(inflated.get(1).unwrap().data(), b"zipped");
        assert!(!inflated.get(1).unwrap().compressed());
    }

    #[test]
    fn dangling_ref_is_an_error() {
        let binary = KdbxEntryBinary::pooled("x", 3);
        assert!(binary.content(&BinaryPool::default()).is_err());
    }
}
