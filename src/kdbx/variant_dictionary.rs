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

use byteorder::{ByteOrder, LittleEndian};

use super::consts::{VARDICT_VERSION, VARDICT_VERSION_CRITICAL_MASK};
use super::result::{Error, Result};

const TYPE_UINT32: u8 = 0x04;
const TYPE_UINT64: u8 = 0x05;
const TYPE_BOOL: u8 = 0x08;
const TYPE_INT32: u8 = 0x0c;
const TYPE_INT64: u8 = 0x0d;
const TYPE_STRING: u8 = 0x18;
const TYPE_BYTE_ARRAY: u8 = 0x42;

/// Typed key/value map serialized in the KDBX 4 header (KDF parameters, public custom data).
///
/// Keys keep their insertion order so that a parsed dictionary writes back byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantDictionary {
    data: Vec<(String, VariantDictionaryValue)>,
}

impl VariantDictionary {
    pub fn empty() -> VariantDictionary {
        VariantDictionary { data: Vec::new() }
    }

    pub fn parse(buffer: &[u8]) -> Result<VariantDictionary> {
        let mut pos = 0;
        let version = LittleEndian::read_u16(take(buffer, &mut pos, 2, "version")?);

        if version & VARDICT_VERSION_CRITICAL_MASK != VARDICT_VERSION & VARDICT_VERSION_CRITICAL_MASK
        {
            return Err(Error::DefinitionError(format!(
                "unsupported variant dictionary version {:#06x}",
                version
            )));
        }

        let mut dict = VariantDictionary::empty();

        loop {
            let value_type = take(buffer, &mut pos, 1, "value type")?[0];

            if value_type == 0 {
                // Null terminator
                break;
            };

            let key_length = LittleEndian::read_u32(take(buffer, &mut pos, 4, "key length")?);
            let key = std::str::from_utf8(take(buffer, &mut pos, key_length as usize, "key")?)
                .map_err(|e| Error::DefinitionError(format!("key is not UTF-8: {}", e)))?
                .to_owned();

            let value_length = LittleEndian::read_u32(take(buffer, &mut pos, 4, "value length")?);
            let value_buffer = take(buffer, &mut pos, value_length as usize, &key)?;

            tracing::trace!(key = %key, len = value_length, "variant dictionary item");

            let value = VariantDictionaryValue::decode(value_type, value_buffer, &key)?;
            dict.add(&key, value);
        }

        Ok(dict)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        let mut u16_buf = [0u8; 2];
        LittleEndian::write_u16(&mut u16_buf, VARDICT_VERSION);
        out.extend_from_slice(&u16_buf);

        for (key, value) in &self.data {
            let keybuf = key.as_bytes();
            let valbuf = value.encode();
            let mut len = [0u8; 4];

            out.push(value.type_tag());
            LittleEndian::write_u32(&mut len, keybuf.len() as u32);
            out.extend_from_slice(&len);
            out.extend_from_slice(keybuf);
            LittleEndian::write_u32(&mut len, valbuf.len() as u32);
            out.extend_from_slice(&len);
            out.extend_from_slice(&valbuf);
        }

        out.push(0); // Null terminator byte
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(&mut out);
        out
    }

    /// Inserts `value`, replacing an existing value for `key` in place.
    pub fn add(&mut self, key: &str, value: VariantDictionaryValue) {
        match self.data.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.data.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<VariantDictionaryValue> {
        let pos = self.data.iter().position(|(k, _)| k == key)?;
        Some(self.data.remove(pos).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.iter().any(|(k, _)| k == key)
    }

    pub fn raw(&self, key: &str) -> Option<&VariantDictionaryValue> {
        self.data.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: FromVariantDictionaryValue<T>,
    {
        let vdv = self
            .raw(key)
            .ok_or_else(|| Error::DefinitionError(format!("missing parameter '{}'", key)))?;

        T::from_variant_dictionary_value(vdv).ok_or_else(|| {
            Error::DefinitionError(format!(
                "parameter '{}' has type {:#04x}",
                key,
                vdv.type_tag()
            ))
        })
    }

    /// Like [`get`](Self::get) but a missing key yields `None`; a mistyped one is still an error.
    pub fn get_opt<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromVariantDictionaryValue<T>,
    {
        if self.contains_key(key) {
            self.get(key).map(Some)
        } else {
            Ok(None)
        }
    }
}

fn take<'a>(buffer: &'a [u8], pos: &mut usize, len: usize, what: &str) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= buffer.len())
        .ok_or_else(|| {
            Error::DefinitionError(format!("variant dictionary truncated while reading {}", what))
        })?;
    let slice = &buffer[*pos..end];
    *pos = end;
    Ok(slice)
}

pub trait FromVariantDictionaryValue<T> {
    fn from_variant_dictionary_value(vdv: &VariantDictionaryValue) -> Option<T>;
}

impl FromVariantDictionaryValue<u32> for u32 {
    fn from_variant_dictionary_value(vdv: &VariantDictionaryValue) -> Option<u32> {
        if let VariantDictionaryValue::UInt32(v) = vdv {
            Some(*v)
        } else {
            None
        }
    }
}

impl FromVariantDictionaryValue<u64> for u64 {
    fn from_variant_dictionary_value(vdv: &VariantDictionaryValue) -> Option<u64> {
        if let VariantDictionaryValue::UInt64(v) = vdv {
            Some(*v)
        } else {
            None
        }
    }
}

impl FromVariantDictionaryValue<bool> for bool {
    fn from_variant_dictionary_value(vdv: &VariantDictionaryValue) -> Option<bool> {
        if let VariantDictionaryValue::Bool(v) = vdv {
            Some(*v)
        } else {
            None
        }
    }
}

impl FromVariantDictionaryValue<i32> for i32 {
    fn from_variant_dictionary_value(vdv: &VariantDictionaryValue) -> Option<i32> {
        if let VariantDictionaryValue::Int32(v) = vdv {
            Some(*v)
        } else {
            None
        }
    }
}

impl FromVariantDictionaryValue<i64> for i64 {
    fn from_variant_dictionary_value(vdv: &VariantDictionaryValue) -> Option<i64> {
        if let VariantDictionaryValue::Int64(v) = vdv {
            Some(*v)
        } else {
            None
        }
    }
}

impl FromVariantDictionaryValue<String> for String {
    fn from_variant_dictionary_value(vdv: &VariantDictionaryValue) -> Option<String> {
        if let VariantDictionaryValue::String(v) = vdv {
            Some(v.clone())
        } else {
            None
        }
    }
}

impl FromVariantDictionaryValue<Vec<u8>> for Vec<u8> {
    fn from_variant_dictionary_value(vdv: &VariantDictionaryValue) -> Option<Vec<u8>> {
        if let VariantDictionaryValue::ByteArray(v) = vdv {
            Some(v.clone())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantDictionaryValue {
    UInt32(u32),
    UInt64(u64),
    Bool(bool),
    Int32(i32),
    Int64(i64),
    String(String),
    ByteArray(Vec<u8>),
}

impl VariantDictionaryValue {
    pub fn type_tag(&self) -> u8 {
        match self {
            VariantDictionaryValue::UInt32(_) => TYPE_UINT32,
            VariantDictionaryValue::UInt64(_) => TYPE_UINT64,
            VariantDictionaryValue::Bool(_) => TYPE_BOOL,
            VariantDictionaryValue::Int32(_) => TYPE_INT32,
            VariantDictionaryValue::Int64(_) => TYPE_INT64,
            VariantDictionaryValue::String(_) => TYPE_STRING,
            VariantDictionaryValue::ByteArray(_) => TYPE_BYTE_ARRAY,
        }
    }

    fn decode(value_type: u8, buf: &[u8], key: &str) -> Result<VariantDictionaryValue> {
        let expect = |len: usize| -> Result<()> {
            if buf.len() == len {
                Ok(())
            } else {
                Err(Error::DefinitionError(format!(
                    "parameter '{}' of type {:#04x} must be {}B, got {}B",
                    key,
                    value_type,
                    len,
                    buf.len()
                )))
            }
        };

        let value = match value_type {
            TYPE_UINT32 => {
                expect(4)?;
                VariantDictionaryValue::UInt32(LittleEndian::read_u32(buf))
            }
            TYPE_UINT64 => {
                expect(8)?;
                VariantDictionaryValue::UInt64(LittleEndian::read_u64(buf))
            }
            TYPE_BOOL => {
                expect(1)?;
                VariantDictionaryValue::Bool(buf[0] != 0)
            }
            TYPE_INT32 => {
                expect(4)?;
                VariantDictionaryValue::Int32(LittleEndian::read_i32(buf))
            }
            TYPE_INT64 => {
                expect(8)?;
                VariantDictionaryValue::Int64(LittleEndian::read_i64(buf))
            }
            TYPE_STRING => VariantDictionaryValue::String(
                std::str::from_utf8(buf)
                    .map_err(|e| {
                        Error::DefinitionError(format!("parameter '{}' is not UTF-8: {}", key, e))
                    })?
                    .into(),
            ),
            TYPE_BYTE_ARRAY => VariantDictionaryValue::ByteArray(buf.to_vec()),
            _ => {
                return Err(Error::DefinitionError(format!(
                    "parameter '{}' has unknown type {:#04x}",
                    key, value_type
                )));
            }
        };
        Ok(value)
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            VariantDictionaryValue::UInt32(v) => v.to_le_bytes().to_vec(),
            VariantDictionaryValue::UInt64(v) => v.to_le_bytes().to_vec(),
            VariantDictionaryValue::Bool(v) => vec![*v as u8],
            VariantDictionaryValue::Int32(v) => v.to_le_bytes().to_vec(),
            VariantDictionaryValue::Int64(v) => v.to_le_bytes().to_vec(),
            VariantDictionaryValue::String(v) => v.as_bytes().to_vec(),
            VariantDictionaryValue::ByteArray(v) => v.clone(),
        }
    }
}
