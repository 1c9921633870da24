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

use chrono::{DateTime, Utc};

use super::times::now;
use super::uuid::KdbxUuid;
use super::{NOTES, PASSWORD, TITLE, URL, USERNAME};

pub const GENERATOR: &str = "kdbx-codec";

/// Which standard fields are written as protected values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryProtection {
    pub protect_title: bool,
    pub protect_username: bool,
    pub protect_password: bool,
    pub protect_url: bool,
    pub protect_notes: bool,
}

impl Default for MemoryProtection {
    fn default() -> Self {
        MemoryProtection {
            protect_title: false,
            protect_username: false,
            protect_password: true,
            protect_url: false,
            protect_notes: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomIcon {
    pub uuid: KdbxUuid,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdbxMeta {
    pub generator: String,
    /// SHA-256 of the outer header as stored by format 3 writers.
    pub header_hash: Option<Vec<u8>>,
    pub database_name: String,
    pub database_name_changed: DateTime<Utc>,
    pub database_description: String,
    pub database_description_changed: DateTime<Utc>,
    pub default_username: String,
    pub default_username_changed: DateTime<Utc>,
    pub maintenance_history_days: u32,
    pub color: String,
    pub master_key_changed: DateTime<Utc>,
    pub memory_protection: MemoryProtection,
    pub custom_icons: Vec<CustomIcon>,
    pub recycle_bin_enabled: bool,
    pub recycle_bin_uuid: KdbxUuid,
    pub recycle_bin_changed: DateTime<Utc>,
    pub entry_templates_group: KdbxUuid,
    /// Negative means unlimited.
    pub history_max_items: i32,
    pub history_max_size: i64,
    pub last_selected_group: KdbxUuid,
    pub last_top_visible_group: KdbxUuid,
    pub custom_data: Vec<(String, String)>,
}

impl Default for KdbxMeta {
    fn default() -> Self {
        let now = now();
        KdbxMeta {
            generator: GENERATOR.to_string(),
            header_hash: None,
            database_name: String::new(),
            database_name_changed: now,
            database_description: String::new(),
            database_description_changed: now,
            default_username: String::new(),
            default_username_changed: now,
            maintenance_history_days: 365,
            color: String::new(),
            master_key_changed: now,
            memory_protection: MemoryProtection::default(),
            custom_icons: Vec::new(),
            recycle_bin_enabled: true,
            recycle_bin_uuid: KdbxUuid::nil(),
            recycle_bin_changed: now,
            entry_templates_group: KdbxUuid::nil(),
            history_max_items: 10,
            history_max_size: 6 * 1024 * 1024,
            last_selected_group: KdbxUuid::nil(),
            last_top_visible_group: KdbxUuid::nil(),
            custom_data: Vec::new(),
        }
    }
}

impl KdbxMeta {
    /// Whether a standard field is protected by policy. Custom fields carry their own flag.
    pub fn protects(&self, field_key: &str) -> bool {
        let mp = &self.memory_protection;
        match field_key {
            TITLE => mp.protect_title,
            USERNAME => mp.protect_username,
            PASSWORD => mp.protect_password,
            URL => mp.protect_url,
            NOTES => mp.protect_notes,
            _ => false,
        }
    }

    pub fn custom_icon(&self, uuid: &KdbxUuid) -> Option<&CustomIcon> {
        self.custom_icons.iter().find(|i| i.uuid == *uuid)
    }

    /// Adds an icon and returns its uuid.
    pub fn add_custom_icon(&mut self, data: Vec<u8>) -> KdbxUuid {
        let uuid = KdbxUuid::random();
        self.custom_icons.push(CustomIcon { uuid, data });
        uuid
    }

    pub fn custom_data(&self, key: &str) -> Option<&str> {
        self.custom_data
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_custom_data(&mut self, key: &str, value: &str) {
        match self.custom_data.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.custom_data.push((key.to_string(), value.to_string())),
        }
    }

    /// History limit usable with `KdbxEntry::create_backup`.
    pub fn history_limit(&self) -> usize {
        usize::try_from(self.history_max_items).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let meta = KdbxMeta::default();
        assert_eq!(meta.generator, GENERATOR);
        assert!(meta.protects(PASSWORD));
        assert!(!meta.protects(TITLE));
        assert!(!meta.protects("custom"));
        assert!(meta.recycle_bin_enabled);
        assert!(meta.recycle_bin_uuid.is_nil());
        assert_eq!(meta.history_limit(), 10);
    }

    #[test]
    fn unlimited_history() {
        let meta = KdbxMeta {
            history_max_items: -1,
            ..KdbxMeta::default()
        };
        assert_eq!(meta.history_limit(), usize::MAX);
    }

    #[test]
    fn custom_data_and_icons() {
        let mut meta = KdbxMeta::default();
        meta.set_custom_data("k", "1");
        meta.set_custom_data("k", "2");
        assert_eq!(meta.custom_data("k"), Some("2"));
        assert_eq!(meta.custom_data.len(), 1);

        let uuid = meta.add_custom_icon(vec![1, 2, 3]);
        assert_eq!(meta.custom_icon(&uuid).unwrap().data, vec![1, 2, 3]);
    }
}
