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

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading or writing a KDBX container.
///
/// Every variant is fatal. A failure in the outer layers means either wrong credentials or
/// corrupted/tampered bytes, so no partially decoded document is ever returned alongside it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unexpected file signature {found:#010X}, not a KDBX file")]
    MagicNumberMismatch { found: u32 },

    #[error("Unsupported file version: {0}")]
    UnsupportedVersion(String),

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Unsupported cipher {0}")]
    UnsupportedCipher(String),

    #[error("Unsupported key derivation function {0}")]
    UnsupportedKdf(String),

    #[error("Unsupported inner random stream id {0}")]
    UnsupportedInnerStream(u32),

    #[error("Integrity check failed: {0}")]
    IntegrityFailure(String),

    #[error("Invalid crypto parameter: {0}")]
    CryptoParameterError(String),

    /// Variant dictionary misuse: wrong value type, truncated value or missing key.
    #[error("Definition error: {0}")]
    DefinitionError(String),

    #[error("Malformed document body: {0}")]
    Xml(String),

    #[error("Invalid base64 data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid UTF-8 data: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<minidom::Error> for Error {
    fn from(err: minidom::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Error::Xml(err.to_string())
    }
}

/// Renders a 16-byte identifier for error messages.
pub(crate) fn hex_id(id: &[u8]) -> String {
    id.iter().map(|b| format!("{:02x}", b)).collect()
}
