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

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use super::result::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    GZip,
}

impl Compression {
    pub fn from_flag(flag: u32) -> Result<Compression> {
        match flag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::GZip),
            _ => Err(Error::MalformedHeader(format!(
                "unknown compression algorithm {}",
                flag
            ))),
        }
    }

    pub fn flag(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::GZip => 1,
        }
    }

    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::GZip => gzip(data),
        }
    }

    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::GZip => gunzip(data),
        }
    }
}

pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut zip = GzEncoder::new(Vec::new(), flate2::Compression::default());
    zip.write_all(data)?;
    Ok(zip.finish()?)
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    let mut zip = GzDecoder::new(data);
    zip.read_to_end(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_restores_original_bytes() {
        let data = b"<KeePassFile>".repeat(100);
        let packed = Compression::GZip.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(&packed[..2], &[0x1f, 0x8b]);
        assert_eq!(Compression::GZip.decompress(&packed).unwrap(), data);
    }

    #[test]
    fn flags() {
        assert_eq!(Compression::from_flag(1).unwrap(), Compression::GZip);
        assert_eq!(Compression::from_flag(0).unwrap().flag(), 0);
        assert!(Compression::from_flag(2).is_err());
    }

    #[test]
    fn garbage_is_not_gzip() {
        assert!(gunzip(b"definitely not gzip").is_err());
    }
}
