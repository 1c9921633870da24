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

pub mod compression;
pub mod consts;
pub mod content;
pub mod crypt;
pub mod database;
pub mod inner_header;
pub mod kdbx_header;
pub(crate) mod kdbx_reader;
pub(crate) mod kdbx_writer;
pub mod key;
pub mod options;
pub mod result;
pub(crate) mod tlv;
pub mod variant_dictionary;
