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

//! Decrypted document model: groups, entries, meta data and the binary pool, plus the XML
//! body codec that maps them to and from the plaintext payload.

pub mod binary;
pub mod body_reader;
pub mod body_writer;
pub mod entry;
pub mod group;
pub mod meta;
pub mod times;
pub mod uuid;

/// Namespace attached to every element while the body is held in `minidom`.
/// KeePass files carry no namespace, so it is added on parse and stripped on write.
pub(crate) const NS: &str = "urn:kdbx";

// Standard entry field keys
pub const TITLE: &str = "Title";
pub const USERNAME: &str = "UserName";
pub const PASSWORD: &str = "Password";
pub const URL: &str = "URL";
pub const NOTES: &str = "Notes";
