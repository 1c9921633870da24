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

//! Parses the decrypted XML body into the document model.
//!
//! Protected values are decoded with the inner stream strictly in document order, so the whole
//! tree is walked front to back, including history entries and elements whose content is
//! otherwise ignored.

use std::collections::HashMap;

use minidom::Element;

use super::binary::{BinaryPool, KdbxEntryBinary};
use super::entry::{AutoTypeAssociation, EntryValue, KdbxEntry};
use super::group::{DeletedObject, KdbxGroup};
use super::meta::{CustomIcon, KdbxMeta, MemoryProtection};
use super::times::{parse_time, KdbxTimes};
use super::uuid::KdbxUuid;
use super::NS;
use crate::kdbx::compression::gzip;
use crate::kdbx::crypt::inner_stream::InnerStream;
use crate::kdbx::result::{Error, Result};

/// Document parsed from the body.
#[derive(Debug)]
pub(crate) struct Body {
    pub meta: KdbxMeta,
    pub root: KdbxGroup,
    pub deleted_objects: Vec<DeletedObject>,
}

pub(crate) struct BodyReader<'a> {
    stream: &'a mut InnerStream,
    binaries: &'a mut BinaryPool,
    // Format 3 binary ID attribute -> pool id
    binary_ids: HashMap<String, usize>,
}

impl<'a> BodyReader<'a> {
    /// `binaries` already holds any format 4 inner header attachments; format 3 attachments
    /// found in the meta section are appended to it.
    pub fn new(stream: &'a mut InnerStream, binaries: &'a mut BinaryPool) -> BodyReader<'a> {
        BodyReader {
            stream,
            binaries,
            binary_ids: HashMap::new(),
        }
    }

    pub fn read(mut self, xml: &[u8]) -> Result<Body> {
        let doc = parse_document(xml)?;
        if doc.name() != "KeePassFile" {
            return Err(Error::Xml(format!("unexpected root element {}", doc.name())));
        }

        let mut meta = None;
        let mut root = None;
        let mut deleted_objects = Vec::new();

        for child in doc.children() {
            match child.name() {
                "Meta" => meta = Some(self.read_meta(child)?),
                "Root" => {
                    for item in child.children() {
                        match item.name() {
                            "Group" if root.is_none() => root = Some(self.read_group(item)?),
                            "DeletedObjects" => deleted_objects = read_deleted_objects(item)?,
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        let root = root.ok_or_else(|| Error::Xml("document has no root group".into()))?;
        tracing::debug!(
            entries = root.entry_count(),
            binaries = self.binaries.len(),
            "parsed body"
        );

        Ok(Body {
            meta: meta.unwrap_or_default(),
            root,
            deleted_objects,
        })
    }

    fn read_meta(&mut self, el: &Element) -> Result<KdbxMeta> {
        let mut meta = KdbxMeta::default();

        for child in el.children() {
            let text = child.text();
            match child.name() {
                "Generator" => meta.generator = text,
                "HeaderHash" => meta.header_hash = Some(base64::decode(text.trim())?),
                "DatabaseName" => meta.database_name = text,
                "DatabaseNameChanged" => meta.database_name_changed = parse_time(&text)?,
                "DatabaseDescription" => meta.database_description = text,
                "DatabaseDescriptionChanged" => {
                    meta.database_description_changed = parse_time(&text)?
                }
                "DefaultUserName" => meta.default_username = text,
                "DefaultUserNameChanged" => meta.default_username_changed = parse_time(&text)?,
                "MaintenanceHistoryDays" => meta.maintenance_history_days = parse_number(&text)?,
                "Color" => meta.color = text,
                "MasterKeyChanged" => meta.master_key_changed = parse_time(&text)?,
                "MemoryProtection" => meta.memory_protection = read_memory_protection(child)?,
                "CustomIcons" => {
                    for icon in child.children().filter(|c| c.name() == "Icon") {
                        meta.custom_icons.push(CustomIcon {
                            uuid: KdbxUuid::from_base64(&required_text(icon, "UUID")?)?,
                            data: base64::decode(required_text(icon, "Data")?.trim())?,
                        });
                    }
                }
                "RecycleBinEnabled" => meta.recycle_bin_enabled = parse_bool(&text)?,
                "RecycleBinUUID" => meta.recycle_bin_uuid = KdbxUuid::from_base64(&text)?,
                "RecycleBinChanged" => meta.recycle_bin_changed = parse_time(&text)?,
                "EntryTemplatesGroup" => meta.entry_templates_group = KdbxUuid::from_base64(&text)?,
                "HistoryMaxItems" => meta.history_max_items = parse_number(&text)?,
                "HistoryMaxSize" => meta.history_max_size = parse_number(&text)?,
                "LastSelectedGroup" => meta.last_selected_group = KdbxUuid::from_base64(&text)?,
                "LastTopVisibleGroup" => {
                    meta.last_top_visible_group = KdbxUuid::from_base64(&text)?
                }
                "Binaries" => self.read_meta_binaries(child)?,
                "CustomData" => {
                    for item in child.children().filter(|c| c.name() == "Item") {
                        meta.custom_data
                            .push((required_text(item, "Key")?, required_text(item, "Value")?));
                    }
                }
                _ => {}
            }
        }

        Ok(meta)
    }

    fn read_meta_binaries(&mut self, el: &Element) -> Result<()> {
        for binary in el.children().filter(|c| c.name() == "Binary") {
            let id = binary
                .attr("ID")
                .ok_or_else(|| Error::Xml("meta binary without ID".into()))?
                .to_string();
            let compressed = is_true(binary.attr("Compressed"));
            let data = self.read_binary_data(binary)?;
            let pool_id = self.binaries.push(compressed, data);
            self.binary_ids.insert(id, pool_id);
        }
        Ok(())
    }

    fn read_binary_data(&mut self, el: &Element) -> Result<Vec<u8>> {
        let mut data = base64::decode(el.text().trim())?;
        if is_true(el.attr("Protected")) {
            self.stream.apply(&mut data);
        }
        Ok(data)
    }

    fn read_group(&mut self, el: &Element) -> Result<KdbxGroup> {
        let mut group = KdbxGroup::new("");

        for child in el.children() {
            let text = child.text();
            match child.name() {
                "UUID" => group.uuid = KdbxUuid::from_base64(&text)?,
                "Name" => group.name = text,
                "Notes" => group.notes = text,
                "IconID" => group.icon_id = parse_number(&text)?,
                "CustomIconUUID" => group.custom_icon_uuid = Some(KdbxUuid::from_base64(&text)?),
                "Times" => group.times = read_times(child)?,
                "IsExpanded" => group.is_expanded = parse_bool(&text)?,
                "DefaultAutoTypeSequence" => group.default_auto_type_sequence = text,
                "EnableAutoType" => group.enable_auto_type = parse_optional_bool(&text)?,
                "EnableSearching" => group.enable_searching = parse_optional_bool(&text)?,
                "LastTopVisibleEntry" => {
                    group.last_top_visible_entry = KdbxUuid::from_base64(&text)?
                }
                "Entry" => {
                    let entry = self.read_entry(child)?;
                    group.add_entry(entry);
                }
                "Group" => {
                    let sub = self.read_group(child)?;
                    group.add_group(sub);
                }
                _ => {}
            }
        }

        Ok(group)
    }

    fn read_entry(&mut self, el: &Element) -> Result<KdbxEntry> {
        let mut entry = KdbxEntry::new();

        for child in el.children() {
            let text = child.text();
            match child.name() {
                "UUID" => entry.uuid = KdbxUuid::from_base64(&text)?,
                "IconID" => entry.icon_id = parse_number(&text)?,
                "CustomIconUUID" => entry.custom_icon_uuid = Some(KdbxUuid::from_base64(&text)?),
                "ForegroundColor" => entry.foreground_color = text,
                "BackgroundColor" => entry.background_color = text,
                "OverrideURL" => entry.override_url = text,
                "Tags" => entry.tags = text,
                "Times" => entry.times = read_times(child)?,
                "String" => {
                    let key = required_text(child, "Key")?;
                    let value = match child.get_child("Value", NS) {
                        Some(value) => self.read_value(value)?,
                        None => EntryValue::default(),
                    };
                    entry.insert(&key, value);
                }
                "Binary" => {
                    let binary = self.read_entry_binary(child)?;
                    entry.binaries_mut().push(binary);
                }
                "AutoType" => read_auto_type(child, &mut entry)?,
                "History" => {
                    for old in child.children().filter(|c| c.name() == "Entry") {
                        let snapshot = self.read_entry(old)?;
                        entry.push_history(snapshot);
                    }
                }
                _ => {}
            }
        }

        Ok(entry)
    }

    fn read_value(&mut self, el: &Element) -> Result<EntryValue> {
        if is_true(el.attr("Protected")) {
            let plain = self.stream.decrypt_from_base64(&el.text())?;
            return Ok(EntryValue::new(&plain, true));
        }
        Ok(EntryValue::new(&el.text(), is_true(el.attr("ProtectInMemory"))))
    }

    fn read_entry_binary(&mut self, el: &Element) -> Result<KdbxEntryBinary> {
        let name = required_text(el, "Key")?;
        let value = el
            .get_child("Value", NS)
            .ok_or_else(|| Error::Xml(format!("attachment {:?} has no value", name)))?;

        if let Some(reference) = value.attr("Ref") {
            let id = match self.binary_ids.get(reference) {
                Some(id) => *id,
                None => parse_number::<usize>(reference)?,
            };
            if self.binaries.get(id).is_none() {
                return Err(Error::Xml(format!(
                    "attachment {:?} references missing binary {}",
                    name, reference
                )));
            }
            return Ok(KdbxEntryBinary::pooled(&name, id));
        }

        let data = self.read_binary_data(value)?;
        if is_true(value.attr("Compressed")) {
            Ok(KdbxEntryBinary::from_compressed(&name, data))
        } else {
            Ok(KdbxEntryBinary::from_compressed(&name, gzip(&data)?))
        }
    }
}

/// Parses body bytes, attaching the working namespace to the root element when missing.
pub(crate) fn parse_document(xml: &[u8]) -> Result<Element> {
    let text = std::str::from_utf8(xml)?;
    let text = text.trim_start_matches('\u{feff}');

    let start = text
        .find("<KeePassFile")
        .ok_or_else(|| Error::Xml("missing KeePassFile element".into()))?;
    let tag_end = text[start..]
        .find('>')
        .map(|i| start + i)
        .ok_or_else(|| Error::Xml("unterminated KeePassFile element".into()))?;

    if text[start..tag_end].contains("xmlns=") {
        return Ok(text.parse::<Element>()?);
    }

    let insert_at = start + "<KeePassFile".len();
    let mut with_ns = String::with_capacity(text.len() + NS.len() + 10);
    with_ns.push_str(&text[..insert_at]);
    with_ns.push_str(&format!(" xmlns=\"{}\"", NS));
    with_ns.push_str(&text[insert_at..]);
    Ok(with_ns.parse::<Element>()?)
}

fn read_times(el: &Element) -> Result<KdbxTimes> {
    let mut times = KdbxTimes::now();
    for child in el.children() {
        let text = child.text();
        match child.name() {
            "CreationTime" => times.creation_time = parse_time(&text)?,
            "LastModificationTime" => times.last_modification_time = parse_time(&text)?,
            "LastAccessTime" => times.last_access_time = parse_time(&text)?,
            "ExpiryTime" => times.expiry_time = parse_time(&text)?,
            "Expires" => times.expires = parse_bool(&text)?,
            "UsageCount" => times.usage_count = parse_number(&text)?,
            "LocationChanged" => times.location_changed = parse_time(&text)?,
            _ => {}
        }
    }
    Ok(times)
}

fn read_memory_protection(el: &Element) -> Result<MemoryProtection> {
    let mut mp = MemoryProtection::default();
    for child in el.children() {
        let flag = parse_bool(&child.text())?;
        match child.name() {
            "ProtectTitle" => mp.protect_title = flag,
            "ProtectUserName" => mp.protect_username = flag,
            "ProtectPassword" => mp.protect_password = flag,
            "ProtectURL" => mp.protect_url = flag,
            "ProtectNotes" => mp.protect_notes = flag,
            _ => {}
        }
    }
    Ok(mp)
}

fn read_auto_type(el: &Element, entry: &mut KdbxEntry) -> Result<()> {
    for child in el.children() {
        let text = child.text();
        match child.name() {
            "Enabled" => entry.auto_type.enabled = parse_bool(&text)?,
            "DataTransferObfuscation" => entry.auto_type.obfuscation = parse_number(&text)?,
            "DefaultSequence" => entry.auto_type.default_sequence = text,
            "Association" => entry.auto_type.associations.push(AutoTypeAssociation {
                window: child_text(child, "Window").unwrap_or_default(),
                sequence: child_text(child, "KeystrokeSequence").unwrap_or_default(),
            }),
            _ => {}
        }
    }
    Ok(())
}

fn read_deleted_objects(el: &Element) -> Result<Vec<DeletedObject>> {
    el.children()
        .filter(|c| c.name() == "DeletedObject")
        .map(|obj| {
            Ok(DeletedObject {
                uuid: KdbxUuid::from_base64(&required_text(obj, "UUID")?)?,
                deletion_time: parse_time(&required_text(obj, "DeletionTime")?)?,
            })
        })
        .collect()
}

fn child_text(el: &Element, name: &str) -> Option<String> {
    el.get_child(name, NS).map(Element::text)
}

fn required_text(el: &Element, name: &str) -> Result<String> {
    child_text(el, name)
        .ok_or_else(|| Error::Xml(format!("<{}> lacks a <{}> child", el.name(), name)))
}

fn is_true(attr: Option<&str>) -> bool {
    attr.map_or(false, |v| v.eq_ignore_ascii_case("true"))
}

fn parse_bool(text: &str) -> Result<bool> {
    match text.trim() {
        t if t.eq_ignore_ascii_case("true") => Ok(true),
        t if t.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(Error::Xml(format!("invalid boolean {:?}", other))),
    }
}

fn parse_optional_bool(text: &str) -> Result<Option<bool>> {
    match text.trim() {
        t if t.eq_ignore_ascii_case("null") || t.is_empty() => Ok(None),
        other => parse_bool(other).map(Some),
    }
}

fn parse_number<T: std::str::FromStr>(text: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| Error::Xml(format!("invalid number {:?}", text)))
}
