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

//! Reader and writer for KeePass KDBX 3.1 and 4.x database files.
//!
//! ```no_run
//! use std::fs::File;
//! use kdbx_codec::{CompositeKey, KdbxDatabase};
//!
//! let key = CompositeKey::from_password("secret");
//! let db = KdbxDatabase::open(&mut File::open("db.kdbx")?, &key)?;
//! for entry in db.root().all_entries() {
//!     println!("{}", entry.title());
//! }
//! # Ok::<(), kdbx_codec::Error>(())
//! ```

pub mod kdbx;

pub use kdbx::compression::Compression;
pub use kdbx::content::binary::{BinaryPool, EntryBinaryData, KdbxBinary, KdbxEntryBinary};
pub use kdbx::content::entry::{EntryValue, KdbxEntry};
pub use kdbx::content::group::{DeletedObject, KdbxGroup};
pub use kdbx::content::meta::KdbxMeta;
pub use kdbx::content::times::KdbxTimes;
pub use kdbx::content::uuid::KdbxUuid;
pub use kdbx::crypt::ciphers::OuterCipherSuite;
pub use kdbx::crypt::inner_stream::InnerStreamAlgorithm;
pub use kdbx::crypt::kdf::{AesKdf, AesKdfId, Argon2Kdf, Argon2Type, Kdf, KdfParameters};
pub use kdbx::database::KdbxDatabase;
pub use kdbx::kdbx_header::{KdbxHeader, KdbxVersion};
pub use kdbx::key::{CompositeKey, Key, KeyFileKey, PasswordKey};
pub use kdbx::options::{DatabaseOptions, FormatVersion};
pub use kdbx::result::{Error, Result};
