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

use super::entry::KdbxEntry;
use super::times::KdbxTimes;
use super::uuid::KdbxUuid;

/// Tombstone of a removed group or entry, kept for synchronization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeletedObject {
    pub uuid: KdbxUuid,
    pub deletion_time: DateTime<Utc>,
}

/// Tree node owning its entries and sub-groups. Other groups are referenced by uuid only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdbxGroup {
    pub uuid: KdbxUuid,
    pub name: String,
    pub notes: String,
    pub icon_id: u32,
    pub custom_icon_uuid: Option<KdbxUuid>,
    pub times: KdbxTimes,
    pub is_expanded: bool,
    pub default_auto_type_sequence: String,
    /// `None` inherits the parent setting.
    pub enable_auto_type: Option<bool>,
    pub enable_searching: Option<bool>,
    pub last_top_visible_entry: KdbxUuid,
    groups: Vec<KdbxGroup>,
    entries: Vec<KdbxEntry>,
}

impl KdbxGroup {
    pub fn new(name: &str) -> KdbxGroup {
        KdbxGroup {
            uuid: KdbxUuid::random(),
            name: name.to_string(),
            notes: String::new(),
            icon_id: 48,
            custom_icon_uuid: None,
            times: KdbxTimes::now(),
            is_expanded: true,
            default_auto_type_sequence: String::new(),
            enable_auto_type: None,
            enable_searching: None,
            last_top_visible_entry: KdbxUuid::nil(),
            groups: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn groups(&self) -> &[KdbxGroup] {
        &self.groups
    }

    pub fn entries(&self) -> &[KdbxEntry] {
        &self.entries
    }

    pub fn groups_mut(&mut self) -> &mut Vec<KdbxGroup> {
        &mut self.groups
    }

    pub fn entries_mut(&mut self) -> &mut Vec<KdbxEntry> {
        &mut self.entries
    }

    /// Adds a sub-group and returns a handle to it.
    pub fn add_group(&mut self, group: KdbxGroup) -> &mut KdbxGroup {
        self.groups.push(group);
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    pub fn add_entry(&mut self, entry: KdbxEntry) -> &mut KdbxEntry {
        self.entries.push(entry);
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    /// Searches this group and all descendants, including itself.
    pub fn find_group(&self, uuid: &KdbxUuid) -> Option<&KdbxGroup> {
        if self.uuid == *uuid {
            return Some(self);
        }
        self.groups.iter().find_map(|g| g.find_group(uuid))
    }

    pub fn find_group_mut(&mut self, uuid: &KdbxUuid) -> Option<&mut KdbxGroup> {
        if self.uuid == *uuid {
            return Some(self);
        }
        self.groups.iter_mut().find_map(|g| g.find_group_mut(uuid))
    }

    pub fn find_entry(&self, uuid: &KdbxUuid) -> Option<&KdbxEntry> {
        self.entries
            .iter()
            .find(|e| e.uuid == *uuid)
            .or_else(|| self.groups.iter().find_map(|g| g.find_entry(uuid)))
    }

    pub fn find_entry_mut(&mut self, uuid: &KdbxUuid) -> Option<&mut KdbxEntry> {
        if let Some(pos) = self.entries.iter().position(|e| e.uuid == *uuid) {
            return Some(&mut self.entries[pos]);
        }
        self.groups.iter_mut().find_map(|g| g.find_entry_mut(uuid))
    }

    /// Detaches the entry from wherever it lives below this group.
    pub fn remove_entry(&mut self, uuid: &KdbxUuid) -> Option<KdbxEntry> {
        if let Some(pos) = self.entries.iter().position(|e| e.uuid == *uuid) {
            return Some(self.entries.remove(pos));
        }
        self.groups.iter_mut().find_map(|g| g.remove_entry(uuid))
    }

    /// Detaches a descendant group with its whole subtree. A group cannot remove itself.
    pub fn remove_group(&mut self, uuid: &KdbxUuid) -> Option<KdbxGroup> {
        if let Some(pos) = self.groups.iter().position(|g| g.uuid == *uuid) {
            return Some(self.groups.remove(pos));
        }
        self.groups.iter_mut().find_map(|g| g.remove_group(uuid))
    }

    /// Entries of this group and its descendants, depth first.
    pub fn all_entries(&self) -> Vec<&KdbxEntry> {
        let mut out = Vec::new();
        self.collect_entries(&mut out);
        out
    }

    fn collect_entries<'a>(&'a self, out: &mut Vec<&'a KdbxEntry>) {
        out.extend(self.entries.iter());
        for group in &self.groups {
            group.collect_entries(out);
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len() + self.groups.iter().map(KdbxGroup::entry_count).sum::<usize>()
    }

    /// Finds an entry by title, depth first.
    pub fn find_entry_by_title(&self, title: &str) -> Option<&KdbxEntry> {
        self.all_entries().into_iter().find(|e| e.title() == title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str) -> KdbxEntry {
        let mut e = KdbxEntry::new();
        e.set_title(title);
        e
    }

    fn tree() -> (KdbxGroup, KdbxUuid, KdbxUuid) {
        let mut root = KdbxGroup::new("Root");
        root.add_entry(entry("top"));
        let sub = root.add_group(KdbxGroup::new("Sub"));
        let sub_uuid = sub.uuid;
        let deep = sub.add_group(KdbxGroup::new("Deep"));
        let nested = deep.add_entry(entry("nested"));
        let nested_uuid = nested.uuid;
        (root, sub_uuid, nested_uuid)
    }

    #[test]
    fn lookup_walks_the_tree() {
        let (root, sub, nested) = tree();
        assert_eq!(root.find_group(&sub).unwrap().name, "Sub");
        assert_eq!(root.find_group(&root.uuid).unwrap().name, "Root");
        assert_eq!(root.find_entry(&nested).unwrap().title(), "nested");
        assert!(root.find_entry(&KdbxUuid::random()).is_none());
        assert_eq!(root.find_entry_by_title("nested").unwrap().uuid, nested);
    }

    #[test]
    fn depth_first_listing() {
        let (root, _, _) = tree();
        let titles: Vec<&str> = root.all_entries().iter().map(|e| e.title()).collect();
        assert_eq!(titles, vec!["top", "nested"]);
        assert_eq!(root.entry_count(), 2);
    }

    #[test]
    fn mutate_and_remove() {
        let (mut root, sub, nested) = tree();
        root.find_entry_mut(&nested).unwrap().set_username("me");
        assert_eq!(root.find_entry(&nested).unwrap().username(), "me");

        root.find_group_mut(&sub).unwrap().name = "Renamed".into();
        assert_eq!(root.groups()[0].name, "Renamed");

        let removed = root.remove_entry(&nested).unwrap();
        assert_eq!(removed.title(), "nested");
        assert_eq!(root.entry_count(), 1);

        let group = root.remove_group(&sub).unwrap();
        assert_eq!(group.groups().len(), 1);
        assert!(root.groups().is_empty());

        let own = root.uuid;
        assert!(root.remove_group(&own).is_none());
    }
}
