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

//! Serializes the document model into the XML body.

use minidom::Element;

use super::binary::{BinaryPool, EntryBinaryData, KdbxEntryBinary};
use super::entry::KdbxEntry;
use super::group::{DeletedObject, KdbxGroup};
use super::meta::{KdbxMeta, MemoryProtection};
use super::times::{format_time, KdbxTimes};
use super::NS;
use crate::kdbx::crypt::inner_stream::InnerStream;
use crate::kdbx::options::FormatVersion;
use crate::kdbx::result::Result;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"yes\"?>\n";

pub(crate) struct BodyWriter<'a> {
    version: FormatVersion,
    stream: &'a mut InnerStream,
    /// Format 3 keeps attachments in the meta section.
    binaries: Option<&'a BinaryPool>,
    header_hash: Option<&'a [u8]>,
}

impl<'a> BodyWriter<'a> {
    pub fn new(version: FormatVersion, stream: &'a mut InnerStream) -> BodyWriter<'a> {
        BodyWriter {
            version,
            stream,
            binaries: None,
            header_hash: None,
        }
    }

    pub fn with_meta_binaries(mut self, binaries: &'a BinaryPool) -> Self {
        self.binaries = Some(binaries);
        self
    }

    pub fn with_header_hash(mut self, hash: &'a [u8]) -> Self {
        self.header_hash = Some(hash);
        self
    }

    pub fn write(
        mut self,
        meta: &KdbxMeta,
        root: &KdbxGroup,
        deleted_objects: &[DeletedObject],
    ) -> Result<Vec<u8>> {
        let meta_el = self.meta(meta);
        let root_group = self.group(root);
        let mut deleted = Element::builder("DeletedObjects", NS);
        for obj in deleted_objects {
            deleted = deleted.append(
                Element::builder("DeletedObject", NS)
                    .append(node("UUID", &obj.uuid.to_base64()))
                    .append(node("DeletionTime", &self.time(&obj.deletion_time)))
                    .build(),
            );
        }

        let doc = Element::builder("KeePassFile", NS)
            .append(meta_el)
            .append(
                Element::builder("Root", NS)
                    .append(root_group)
                    .append(deleted.build())
                    .build(),
            )
            .build();

        let mut raw = Vec::new();
        doc.write_to(&mut raw)?;
        let xml = String::from_utf8(raw)?.replace(&format!(" xmlns=\"{}\"", NS), "");

        let mut out = Vec::with_capacity(XML_DECLARATION.len() + xml.len());
        out.extend_from_slice(XML_DECLARATION.as_bytes());
        out.extend_from_slice(xml.as_bytes());
        tracing::debug!(bytes = out.len(), "serialized body");
        Ok(out)
    }

    fn time(&self, time: &chrono::DateTime<chrono::Utc>) -> String {
        format_time(time, self.version)
    }

    fn meta(&mut self, meta: &KdbxMeta) -> Element {
        let mut el = Element::builder("Meta", NS).append(node("Generator", &meta.generator));
        if let Some(hash) = self.header_hash {
            el = el.append(node("HeaderHash", &base64::encode(hash)));
        }

        el = el
            .append(node("DatabaseName", &meta.database_name))
            .append(node("DatabaseNameChanged", &self.time(&meta.database_name_changed)))
            .append(node("DatabaseDescription", &meta.database_description))
            .append(node(
                "DatabaseDescriptionChanged",
                &self.time(&meta.database_description_changed),
            ))
            .append(node("DefaultUserName", &meta.default_username))
            .append(node(
                "DefaultUserNameChanged",
                &self.time(&meta.default_username_changed),
            ))
            .append(node(
                "MaintenanceHistoryDays",
                &meta.maintenance_history_days.to_string(),
            ))
            .append(node("Color", &meta.color))
            .append(node("MasterKeyChanged", &self.time(&meta.master_key_changed)))
            .append(memory_protection(&meta.memory_protection));

        let mut icons = Element::builder("CustomIcons", NS);
        for icon in &meta.custom_icons {
            icons = icons.append(
                Element::builder("Icon", NS)
                    .append(node("UUID", &icon.uuid.to_base64()))
                    .append(node("Data", &base64::encode(&icon.data)))
                    .build(),
            );
        }

        el = el
            .append(icons.build())
            .append(node("RecycleBinEnabled", bool_text(meta.recycle_bin_enabled)))
            .append(node("RecycleBinUUID", &meta.recycle_bin_uuid.to_base64()))
            .append(node("RecycleBinChanged", &self.time(&meta.recycle_bin_changed)))
            .append(node("EntryTemplatesGroup", &meta.entry_templates_group.to_base64()))
            .append(node("HistoryMaxItems", &meta.history_max_items.to_string()))
            .append(node("HistoryMaxSize", &meta.history_max_size.to_string()))
            .append(node("LastSelectedGroup", &meta.last_selected_group.to_base64()))
            .append(node("LastTopVisibleGroup", &meta.last_top_visible_group.to_base64()));

        if let Some(pool) = self.binaries {
            let mut binaries = Element::builder("Binaries", NS);
            for binary in pool.iter() {
                let mut b = Element::builder("Binary", NS).attr("ID", binary.id().to_string());
                if binary.compressed() {
                    b = b.attr("Compressed", "True");
                }
                binaries = binaries.append(with_text(b, &base64::encode(binary.data())).build());
            }
            el = el.append(binaries.build());
        }

        let mut custom_data = Element::builder("CustomData", NS);
        for (key, value) in &meta.custom_data {
            custom_data = custom_data.append(
                Element::builder("Item", NS)
                    .append(node("Key", key))
                    .append(node("Value", value))
                    .build(),
            );
        }
        el.append(custom_data.build()).build()
    }

    fn group(&mut self, group: &KdbxGroup) -> Element {
        let mut el = Element::builder("Group", NS)
            .append(node("UUID", &group.uuid.to_base64()))
            .append(node("Name", &group.name))
            .append(node("Notes", &group.notes))
            .append(node("IconID", &group.icon_id.to_string()));
        if let Some(icon) = &group.custom_icon_uuid {
            el = el.append(node("CustomIconUUID", &icon.to_base64()));
        }
        el = el
            .append(self.times(&group.times))
            .append(node("IsExpanded", bool_text(group.is_expanded)))
            .append(node("DefaultAutoTypeSequence", &group.default_auto_type_sequence))
            .append(node("EnableAutoType", optional_bool_text(group.enable_auto_type)))
            .append(node("EnableSearching", optional_bool_text(group.enable_searching)))
            .append(node("LastTopVisibleEntry", &group.last_top_visible_entry.to_base64()));

        for entry in group.entries() {
            el = el.append(self.entry(entry, true));
        }
        for sub in group.groups() {
            el = el.append(self.group(sub));
        }
        el.build()
    }

    fn entry(&mut self, entry: &KdbxEntry, with_history: bool) -> Element {
        let mut el = Element::builder("Entry", NS)
            .append(node("UUID", &entry.uuid.to_base64()))
            .append(node("IconID", &entry.icon_id.to_string()));
        if let Some(icon) = &entry.custom_icon_uuid {
            el = el.append(node("CustomIconUUID", &icon.to_base64()));
        }
        el = el
            .append(node("ForegroundColor", &entry.foreground_color))
            .append(node("BackgroundColor", &entry.background_color))
            .append(node("OverrideURL", &entry.override_url))
            .append(node("Tags", &entry.tags))
            .append(self.times(&entry.times));

        for (key, value) in entry.fields() {
            let value_el = if value.is_protected() {
                let cipher_text = self.stream.encrypt_to_base64(value.as_str());
                with_text(Element::builder("Value", NS).attr("Protected", "True"), &cipher_text)
            } else {
                with_text(Element::builder("Value", NS), value.as_str())
            };
            el = el.append(
                Element::builder("String", NS)
                    .append(node("Key", key))
                    .append(value_el.build())
                    .build(),
            );
        }

        for binary in entry.binaries() {
            el = el.append(entry_binary(binary));
        }

        let auto_type = &entry.auto_type;
        let mut auto_type_el = Element::builder("AutoType", NS)
            .append(node("Enabled", bool_text(auto_type.enabled)))
            .append(node(
                "DataTransferObfuscation",
                &auto_type.obfuscation.to_string(),
            ));
        if !auto_type.default_sequence.is_empty() {
            auto_type_el = auto_type_el.append(node("DefaultSequence", &auto_type.default_sequence));
        }
        for association in &auto_type.associations {
            auto_type_el = auto_type_el.append(
                Element::builder("Association", NS)
                    .append(node("Window", &association.window))
                    .append(node("KeystrokeSequence", &association.sequence))
                    .build(),
            );
        }
        el = el.append(auto_type_el.build());

        if with_history {
            let mut history = Element::builder("History", NS);
            for old in entry.history() {
                history = history.append(self.entry(old, false));
            }
            el = el.append(history.build());
        }
        el.build()
    }

    fn times(&self, times: &KdbxTimes) -> Element {
        Element::builder("Times", NS)
            .append(node("CreationTime", &self.time(&times.creation_time)))
            .append(node("LastModificationTime", &self.time(&times.last_modification_time)))
            .append(node("LastAccessTime", &self.time(&times.last_access_time)))
            .append(node("ExpiryTime", &self.time(&times.expiry_time)))
            .append(node("Expires", bool_text(times.expires)))
            .append(node("UsageCount", &times.usage_count.to_string()))
            .append(node("LocationChanged", &self.time(&times.location_changed)))
            .build()
    }
}

fn entry_binary(binary: &KdbxEntryBinary) -> Element {
    let value = match binary.data() {
        EntryBinaryData::Ref(id) => Element::builder("Value", NS).attr("Ref", id.to_string()),
        EntryBinaryData::Inline(compressed) => with_text(
            Element::builder("Value", NS).attr("Compressed", "True"),
            &base64::encode(compressed),
        ),
    };
    Element::builder("Binary", NS)
        .append(node("Key", &binary.name))
        .append(value.build())
        .build()
}

fn memory_protection(mp: &MemoryProtection) -> Element {
    Element::builder("MemoryProtection", NS)
        .append(node("ProtectTitle", bool_text(mp.protect_title)))
        .append(node("ProtectUserName", bool_text(mp.protect_username)))
        .append(node("ProtectPassword", bool_text(mp.protect_password)))
        .append(node("ProtectURL", bool_text(mp.protect_url)))
        .append(node("ProtectNotes", bool_text(mp.protect_notes)))
        .build()
}

fn with_text(builder: minidom::ElementBuilder, text: &str) -> minidom::ElementBuilder {
    if text.is_empty() {
        builder
    } else {
        builder.append(text.to_string())
    }
}

fn node(name: &str, text: &str) -> Element {
    with_text(Element::builder(name, NS), text).build()
}

fn bool_text(flag: bool) -> &'static str {
    if flag {
        "True"
    } else {
        "False"
    }
}

fn optional_bool_text(flag: Option<bool>) -> &'static str {
    match flag {
        Some(flag) => bool_text(flag),
        None => "null",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdbx::content::body_reader::BodyReader;
    use crate::kdbx::content::entry::AutoTypeAssociation;
    use crate::kdbx::content::uuid::KdbxUuid;
    use crate::kdbx::crypt::inner_stream::InnerStreamAlgorithm;

    fn sample_tree() -> (KdbxMeta, KdbxGroup) {
        let mut meta = KdbxMeta::default();
        meta.database_name = "Tests & <Stuff>".into();
        meta.set_custom_data("plugin", "on");
        meta.add_custom_icon(vec![0x89, 0x50, 0x4e, 0x47]);

        let mut root = KdbxGroup::new("Root");
        root.enable_searching = Some(false);

        let mut entry = KdbxEntry::with_standard_fields();
        entry.set_title("Example");
        entry.set_password("secret");
        entry.set("Multi", "a\nb\tc", false);
        entry.set("PIN", "1234", true);
        entry.auto_type.associations.push(AutoTypeAssociation {
            window: "Login*".into(),
            sequence: "{USERNAME}{TAB}{PASSWORD}".into(),
        });
        entry.add_binary(KdbxEntryBinary::inline("note.txt", b"inline data").unwrap());
        entry.create_backup(10);
        entry.set_password("newer");
        root.add_entry(entry);

        let sub = root.add_group(KdbxGroup::new("Sub"));
        sub.add_entry(KdbxEntry::with_standard_fields());
        (meta, root)
    }

    fn reread(version: FormatVersion, alg: InnerStreamAlgorithm, key: &[u8]) {
        let (meta, root) = sample_tree();
        let deleted = vec![DeletedObject {
            uuid: KdbxUuid::random(),
            deletion_time: crate::kdbx::content::times::now(),
        }];

        let mut stream = InnerStream::new(alg, key).unwrap();
        let xml = BodyWriter::new(version, &mut stream)
            .write(&meta, &root, &deleted)
            .unwrap();
        let text = String::from_utf8(xml.clone()).unwrap();
        assert!(text.starts_with("<?xml"));
        assert!(!text.contains("xmlns"));
        assert!(!text.contains("secret"));

        let mut stream = InnerStream::new(alg, key).unwrap();
        let mut pool = BinaryPool::default();
        let body = BodyReader::new(&mut stream, &mut pool).read(&xml).unwrap();
        assert_eq!(body.meta, meta);
        assert_eq!(body.root, root);
        assert_eq!(body.deleted_objects, deleted);
    }

    #[test]
    fn format4_body_reads_back() {
        reread(FormatVersion::Kdbx4, InnerStreamAlgorithm::ChaCha20, &[3u8; 64]);
    }

    #[test]
    fn format3_body_reads_back() {
        reread(FormatVersion::Kdbx3, InnerStreamAlgorithm::Salsa20, &[4u8; 32]);
    }

    #[test]
    fn meta_binaries_and_header_hash() {
        let mut pool = BinaryPool::default();
        pool.add(b"raw".to_vec(), false);
        pool.add(crate::kdbx::compression::gzip(b"zipped").unwrap(), true);

        let meta = KdbxMeta::default();
        let mut root = KdbxGroup::new("Root");
        let mut entry = KdbxEntry::new();
        entry.add_binary(KdbxEntryBinary::pooled("z", 1));
        root.add_entry(entry);

        let hash = [9u8; 32];
        let mut stream = InnerStream::new(InnerStreamAlgorithm::None, &[]).unwrap();
        let xml = BodyWriter::new(FormatVersion::Kdbx3, &mut stream)
            .with_meta_binaries(&pool)
            .with_header_hash(&hash)
            .write(&meta, &root, &[])
            .unwrap();

        let mut stream = InnerStream::new(InnerStreamAlgorithm::None, &[]).unwrap();
        let mut read_pool = BinaryPool::default();
        let body = BodyReader::new(&mut stream, &mut read_pool).read(&xml).unwrap();
        assert_eq!(body.meta.header_hash.as_deref(), Some(&hash[..]));
        assert_eq!(read_pool, pool);
        let binary = &body.root.entries()[0].binaries()[0];
        assert_eq!(binary.content(&read_pool).unwrap(), b"zipped");
    }
}
