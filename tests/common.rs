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

#![allow(dead_code)]

use kdbx_codec::{
    AesKdf, AesKdfId, Argon2Kdf, Argon2Type, CompositeKey, DatabaseOptions, FormatVersion,
    KdbxDatabase, KdfParameters, Result,
};

pub fn small_argon2(variant: Argon2Type) -> KdfParameters {
    KdfParameters::Argon2(Argon2Kdf::new(variant, 1, 64 * 1024, 1))
}

pub fn small_aes(id: AesKdfId) -> KdfParameters {
    KdfParameters::Aes(AesKdf {
        id,
        ..AesKdf::new(100)
    })
}

pub fn fast_kdbx4() -> DatabaseOptions {
    DatabaseOptions {
        kdf: small_argon2(Argon2Type::Argon2id),
        ..DatabaseOptions::default()
    }
}

pub fn fast_kdbx3() -> DatabaseOptions {
    DatabaseOptions {
        version: FormatVersion::Kdbx3,
        kdf: small_aes(AesKdfId::Kdbx3),
        ..DatabaseOptions::kdbx3()
    }
}

pub fn save_to_vec(db: &mut KdbxDatabase, key: &CompositeKey) -> Vec<u8> {
    let mut out = Vec::new();
    db.save(&mut out, key).unwrap();
    out
}

pub fn open_bytes(bytes: &[u8], key: &CompositeKey) -> Result<KdbxDatabase> {
    KdbxDatabase::open(&mut &bytes[..], key)
}
