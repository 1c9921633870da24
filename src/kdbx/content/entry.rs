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

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::binary::KdbxEntryBinary;
use super::times::KdbxTimes;
use super::uuid::KdbxUuid;
use super::{NOTES, PASSWORD, TITLE, URL, USERNAME};

/// Field value. Protected values are obfuscated with the inner stream when written.
#[derive(Clone, PartialEq, Eq, Default, Zeroize, ZeroizeOnDrop)]
pub struct EntryValue {
    value: String,
    protected: bool,
}

impl EntryValue {
    pub fn new(value: &str, protected: bool) -> EntryValue {
        EntryValue {
            value: value.to_string(),
            protected,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub fn set_protected(&mut self, protected: bool) {
        self.protected = protected;
    }
}

impl fmt::Debug for EntryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.protected {
            f.write_str("EntryValue(<protected>)")
        } else {
            write!(f, "EntryValue({:?})", self.value)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoTypeAssociation {
    pub window: String,
    pub sequence: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoType {
    pub enabled: bool,
    pub obfuscation: u32,
    pub default_sequence: String,
    pub associations: Vec<AutoTypeAssociation>,
}

impl Default for AutoType {
    fn default() -> Self {
        AutoType {
            enabled: true,
            obfuscation: 0,
            default_sequence: String::new(),
            associations: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdbxEntry {
    pub uuid: KdbxUuid,
    pub icon_id: u32,
    pub custom_icon_uuid: Option<KdbxUuid>,
    pub foreground_color: String,
    pub background_color: String,
    pub override_url: String,
    pub tags: String,
    pub times: KdbxTimes,
    pub auto_type: AutoType,
    fields: Vec<(String, EntryValue)>,
    binaries: Vec<KdbxEntryBinary>,
    history: Vec<KdbxEntry>,
}

impl Default for KdbxEntry {
    fn default() -> Self {
        KdbxEntry::new()
    }
}

impl KdbxEntry {
    pub fn new() -> KdbxEntry {
        KdbxEntry {
            uuid: KdbxUuid::random(),
            icon_id: 0,
            custom_icon_uuid: None,
            foreground_color: String::new(),
            background_color: String::new(),
            override_url: String::new(),
            tags: String::new(),
            times: KdbxTimes::now(),
            auto_type: AutoType::default(),
            fields: Vec::new(),
            binaries: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Entry with the standard fields present but empty, as KeePass creates them.
    pub fn with_standard_fields() -> KdbxEntry {
        let mut entry = KdbxEntry::new();
        for key in [TITLE, USERNAME, PASSWORD, URL, NOTES] {
            entry.insert(key, EntryValue::new("", key == PASSWORD));
        }
        entry
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.value(key).map(EntryValue::as_str)
    }

    pub fn value(&self, key: &str) -> Option<&EntryValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Sets a field, keeping its position when it already exists, and marks the entry modified.
    pub fn set(&mut self, key: &str, value: &str, protected: bool) {
        self.insert(key, EntryValue::new(value, protected));
        self.times.modify();
    }

    pub fn remove(&mut self, key: &str) -> Option<EntryValue> {
        let pos = self.fields.iter().position(|(k, _)| k == key)?;
        self.times.modify();
        Some(self.fields.remove(pos).1)
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &EntryValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn insert(&mut self, key: &str, value: EntryValue) {
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    pub fn title(&self) -> &str {
        self.get(TITLE).unwrap_or_default()
    }

    pub fn set_title(&mut self, title: &str) {
        self.set(TITLE, title, false)
    }

    pub fn username(&self) -> &str {
        self.get(USERNAME).unwrap_or_default()
    }

    pub fn set_username(&mut self, username: &str) {
        self.set(USERNAME, username, false)
    }

    pub fn password(&self) -> &str {
        self.get(PASSWORD).unwrap_or_default()
    }

    pub fn set_password(&mut self, password: &str) {
        self.set(PASSWORD, password, true)
    }

    pub fn url(&self) -> &str {
        self.get(URL).unwrap_or_default()
    }

    pub fn set_url(&mut self, url: &str) {
        self.set(URL, url, false)
    }

    pub fn notes(&self) -> &str {
        self.get(NOTES).unwrap_or_default()
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.set(NOTES, notes, false)
    }

    pub fn binaries(&self) -> &[KdbxEntryBinary] {
        &self.binaries
    }

    pub fn binaries_mut(&mut self) -> &mut Vec<KdbxEntryBinary> {
        &mut self.binaries
    }

    /// Attaches a binary, replacing an attachment with the same name.
    pub fn add_binary(&mut self, binary: KdbxEntryBinary) {
        match self.binaries.iter_mut().find(|b| b.name == binary.name) {
            Some(existing) => *existing = binary,
            None => self.binaries.push(binary),
        }
    }

    pub fn history(&self) -> &[KdbxEntry] {
        &self.history
    }

    pub(crate) fn push_history(&mut self, mut snapshot: KdbxEntry) {
        snapshot.history.clear();
        self.history.push(snapshot);
    }

    /// Stores a snapshot of the current state in the history, dropping the oldest
    /// snapshots beyond `max_items`.
    pub fn create_backup(&mut self, max_items: usize) {
        let mut snapshot = self.clone();
        snapshot.history.clear();
        self.history.push(snapshot);

        if self.history.len() > max_items {
            let excess = self.history.len() - max_items;
            self.history.drain(..excess);
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_fields() {
        let mut entry = KdbxEntry::with_standard_fields();
        assert_eq!(entry.title(), "");
        assert!(entry.value(PASSWORD).unwrap().is_protected());

        entry.set_title("Example");
        entry.set_password("secret");
        assert_eq!(entry.title(), "Example");
        assert_eq!(entry.password(), "secret");
        assert!(entry.value(PASSWORD).unwrap().is_protected());
        assert!(!entry.value(TITLE).unwrap().is_protected());

        let keys: Vec<&str> = entry.fields().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![TITLE, USERNAME, PASSWORD, URL, NOTES]);
    }

    #[test]
    fn custom_fields_keep_order() {
        let mut entry = KdbxEntry::new();
        entry.set("b", "1", false);
        entry.set("a", "2", true);
        entry.set("b", "3", false);

        let fields: Vec<(&str, &str)> = entry.fields().map(|(k, v)| (k, v.as_str())).collect();
        assert_eq!(fields, vec![("b", "3"), ("a", "2")]);

        assert_eq!(entry.remove("b").unwrap().as_str(), "3");
        assert!(entry.remove("b").is_none());
        assert_eq!(entry.get("missing"), None);
    }

    #[test]
    fn history_is_bounded_and_flat() {
        let mut entry = KdbxEntry::new();
        for i in 0..5 {
            entry.set_title(&i.to_string());
            entry.create_backup(3);
        }

        assert_eq!(entry.history().len(), 3);
        assert_eq!(entry.history()[0].title(), "2");
        assert_eq!(entry.history()[2].title(), "4");
        assert!(entry.history().iter().all(|h| h.history().is_empty()));
        assert!(entry.history().iter().all(|h| h.uuid == entry.uuid));

        entry.create_backup(0);
        assert!(entry.history().is_empty());
    }

    #[test]
    fn binary_names_are_unique() {
        let mut entry = KdbxEntry::new();
        entry.add_binary(KdbxEntryBinary::pooled("a", 0));
        entry.add_binary(KdbxEntryBinary::pooled("a", 1));
        entry.add_binary(KdbxEntryBinary::pooled("b", 1));
        assert_eq!(entry.binaries().len(), 2);
        assert_eq!(entry.binaries()[0].ref_id(), Some(1));
    }

    #[test]
    fn protected_value_is_redacted_in_debug() {
        let value = EntryValue::new("hunter2", true);
        assert!(!format!("{:?}", value).contains("hunter2"));
    }
}
