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

//! KDBX 3 payload framing: `[index (u32 LE) | SHA-256 (32) | size (u32 LE) | data]*`,
//! terminated by a zero-size block with an all-zero hash.

use byteorder::{ByteOrder, LittleEndian};
use sha2::{Digest, Sha256};

use crate::kdbx::result::{Error, Result};

const BLOCK_PREFIX_LEN: usize = 4 + 32 + 4;

pub(crate) fn read_hashed_block_stream(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0;
    let mut expected_index: u32 = 0;

    loop {
        if data.len() < pos + BLOCK_PREFIX_LEN {
            return Err(Error::IntegrityFailure(format!(
                "hashed block stream truncated before block {}",
                expected_index
            )));
        }
        let index = LittleEndian::read_u32(&data[pos..pos + 4]);
        let hash = &data[pos + 4..pos + 36];
        let size = LittleEndian::read_u32(&data[pos + 36..pos + 40]) as usize;
        pos += BLOCK_PREFIX_LEN;

        if index != expected_index {
            return Err(Error::IntegrityFailure(format!(
                "expected block {}, found block {}",
                expected_index, index
            )));
        }

        if size == 0 {
            if hash.iter().any(|b| *b != 0) {
                return Err(Error::IntegrityFailure(
                    "final block carries a non-zero hash".into(),
                ));
            }
            break;
        }

        if data.len() - pos < size {
            return Err(Error::IntegrityFailure(format!(
                "block {} declares {}B past the end of the stream",
                index, size
            )));
        }
        let block = &data[pos..pos + size];
        if Sha256::digest(block).as_slice() != hash {
            return Err(Error::IntegrityFailure(format!("hash mismatch in block {}", index)));
        }

        out.extend_from_slice(block);
        pos += size;
        expected_index += 1;
    }

    tracing::debug!(blocks = expected_index, bytes = out.len(), "read hashed block stream");
    Ok(out)
}

pub(crate) fn write_hashed_block_stream(data: &[u8], block_size: usize) -> Vec<u8> {
    let block_size = block_size.max(1);
    let mut out = Vec::with_capacity(data.len() + BLOCK_PREFIX_LEN * (data.len() / block_size + 2));
    let mut index: u32 = 0;
    let mut u32_buf = [0u8; 4];

    for block in data.chunks(block_size) {
        LittleEndian::write_u32(&mut u32_buf, index);
        out.extend_from_slice(&u32_buf);
        out.extend_from_slice(&Sha256::digest(block));
        LittleEndian::write_u32(&mut u32_buf, block.len() as u32);
        out.extend_from_slice(&u32_buf);
        out.extend_from_slice(block);
        index += 1;
    }

    LittleEndian::write_u32(&mut u32_buf, index);
    out.extend_from_slice(&u32_buf);
    out.extend_from_slice(&[0u8; 32]);
    out.extend_from_slice(&[0u8; 4]);
    out
}
