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

//! KDBX 4 payload framing: `[HMAC-SHA-256 (32) | size (u32 LE) | data]*`, ending with an
//! authenticated zero-size block.

use byteorder::{ByteOrder, LittleEndian};
use hmac::{Hmac, Mac, NewMac};
use sha2::{Digest, Sha256, Sha512};

use crate::kdbx::key::SecretKey;
use crate::kdbx::result::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

const HMAC_LEN: usize = 32;
const BLOCK_PREFIX_LEN: usize = HMAC_LEN + 4;

/// Block index used to authenticate the outer header.
pub(crate) const HEADER_BLOCK_INDEX: u64 = u64::MAX;

pub(crate) fn read_hmac_block_stream(data: &[u8], key: &SecretKey) -> Result<Vec<u8>> {
    // keepassxc src/streams/HmacBlockStream.cpp

    let mut out = Vec::new();

    let mut pos = 0;
    let mut block_index: u64 = 0;

    loop {
        if data.len() < pos + BLOCK_PREFIX_LEN {
            return Err(Error::IntegrityFailure(format!(
                "block stream truncated before block {}",
                block_index
            )));
        }
        let hmac = &data[pos..(pos + HMAC_LEN)];
        let size_bytes = &data[(pos + HMAC_LEN)..(pos + BLOCK_PREFIX_LEN)];
        let size = LittleEndian::read_u32(size_bytes) as usize;
        if data.len() - pos - BLOCK_PREFIX_LEN < size {
            return Err(Error::IntegrityFailure(format!(
                "block {} declares {}B past the end of the stream",
                block_index, size
            )));
        }
        let block = &data[(pos + BLOCK_PREFIX_LEN)..(pos + BLOCK_PREFIX_LEN + size)];

        // verify block hmac before trusting its contents
        let mut mac = block_mac(block_index, key)?;
        mac.update(&block_index.to_le_bytes());
        mac.update(size_bytes);
        mac.update(block);

        if mac.verify(hmac).is_err() {
            return Err(Error::IntegrityFailure(format!(
                "HMAC mismatch in block {}",
                block_index
            )));
        }

        pos += BLOCK_PREFIX_LEN + size;

        if size == 0 {
            break;
        }

        block_index += 1;
        out.extend_from_slice(block);
    }

    tracing::debug!(blocks = block_index, bytes = out.len(), "read HMAC block stream");
    Ok(out)
}

pub(crate) fn write_hmac_block_stream(
    data: &[u8],
    key: &SecretKey,
    block_size: usize,
) -> Result<Vec<u8>> {
    let block_size = block_size.max(1);
    let mut out = Vec::with_capacity(data.len() + BLOCK_PREFIX_LEN * (data.len() / block_size + 2));
    let mut block_index: u64 = 0;

    let mut chunks: Vec<&[u8]> = data.chunks(block_size).collect();
    chunks.push(&[]);

    for block in chunks {
        let mut size_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut size_bytes, block.len() as u32);

        let mut mac = block_mac(block_index, key)?;
        mac.update(&block_index.to_le_bytes());
        mac.update(&size_bytes);
        mac.update(block);

        out.extend_from_slice(&mac.finalize().into_bytes());
        out.extend_from_slice(&size_bytes);
        out.extend_from_slice(block);
        block_index += 1;
    }

    tracing::debug!(blocks = block_index, "wrote HMAC block stream");
    Ok(out)
}

/// HMAC-SHA-256 of the outer header bytes, keyed with the header block key.
pub(crate) fn header_hmac(header: &[u8], key: &SecretKey) -> Result<Vec<u8>> {
    let mut mac = block_mac(HEADER_BLOCK_INDEX, key)?;
    mac.update(header);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub(crate) fn verify_header_hmac(header: &[u8], expected: &[u8], key: &SecretKey) -> Result<()> {
    let mut mac = block_mac(HEADER_BLOCK_INDEX, key)?;
    mac.update(header);
    mac.verify(expected).map_err(|_| {
        Error::IntegrityFailure("header HMAC mismatch: wrong credentials or tampered header".into())
    })
}

pub(crate) fn get_hmac_block_key(block_index: u64, key: &SecretKey) -> SecretKey {
    let mut digest = Sha512::new();
    digest.update(block_index.to_le_bytes());
    digest.update(key.as_bytes());

    SecretKey::new(digest.finalize().to_vec())
}

fn block_mac(block_index: u64, key: &SecretKey) -> Result<HmacSha256> {
    let block_key = get_hmac_block_key(block_index, key);
    HmacSha256::new_from_slice(block_key.as_bytes())
        .map_err(|_| Error::CryptoParameterError("invalid HMAC key length".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretKey {
        SecretKey::new(vec![0x11u8; 64])
    }

    #[test]
    fn blocks_read_back() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let stream = write_hmac_block_stream(&data, &key(), 4096).unwrap();
        // three data blocks plus the terminator
        assert_eq!(stream.len(), data.len() + 4 * BLOCK_PREFIX_LEN);
        assert_eq!(read_hmac_block_stream(&stream, &key()).unwrap(), data);
    }

    #[test]
    fn empty_payload_is_a_single_terminator() {
        let stream = write_hmac_block_stream(&[], &key(), 4096).unwrap();
        assert_eq!(stream.len(), BLOCK_PREFIX_LEN);
        assert!(read_hmac_block_stream(&stream, &key()).unwrap().is_empty());
    }

    #[test]
    fn any_flipped_byte_is_detected() {
        let data = vec![0xA5u8; 300];
        let stream = write_hmac_block_stream(&data, &key(), 128).unwrap();
        for i in 0..stream.len() {
            let mut tampered = stream.clone();
            tampered[i] ^= 0x01;
            assert!(
                matches!(
                    read_hmac_block_stream(&tampered, &key()),
                    Err(Error::IntegrityFailure(_))
                ),
                "flip at {} went unnoticed",
                i
            );
        }
    }

    #[test]
    fn missing_terminator_is_detected() {
        let data = vec![1u8; 100];
        let stream = write_hmac_block_stream(&data, &key(), 64).unwrap();
        let truncated = &stream[..stream.len() - BLOCK_PREFIX_LEN];
        assert!(matches!(
            read_hmac_block_stream(truncated, &key()),
            Err(Error::IntegrityFailure(_))
        ));
    }

    #[test]
    fn wrong_key_is_detected() {
        let stream = write_hmac_block_stream(b"payload", &key(), 64).unwrap();
        let other = SecretKey::new(vec![0x12u8; 64]);
        assert!(matches!(
            read_hmac_block_stream(&stream, &other),
            Err(Error::IntegrityFailure(_))
        ));
    }

    #[test]
    fn header_hmac_verifies() {
        let tag = header_hmac(b"header bytes", &key()).unwrap();
        verify_header_hmac(b"header bytes", &tag, &key()).unwrap();
        assert!(verify_header_hmac(b"header bytez", &tag, &key()).is_err());
    }
}
