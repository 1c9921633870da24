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

//! Type-length-value records used by the outer and inner headers.
//!
//! Each record is a one byte type id, a little-endian length field (2 bytes in the
//! format 3 outer header, 4 bytes everywhere else) and that many data bytes. Type id 0
//! terminates a record sequence.

use byteorder::{ByteOrder, LittleEndian};

use super::result::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum LengthWidth {
    U16,
    U32,
}

impl LengthWidth {
    fn size(self) -> usize {
        match self {
            LengthWidth::U16 => 2,
            LengthWidth::U32 => 4,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct TlvRecord<'a> {
    pub id: u8,
    pub data: &'a [u8],
}

impl TlvRecord<'_> {
    pub fn is_end(&self) -> bool {
        self.id == 0
    }
}

/// Reads the record starting at `*idx` and moves `idx` past it.
pub(crate) fn read_record<'a>(
    buf: &'a [u8],
    idx: &mut usize,
    width: LengthWidth,
) -> Result<TlvRecord<'a>> {
    let prefix_len = 1 + width.size();
    if buf.len() < *idx + prefix_len {
        return Err(Error::MalformedHeader(format!(
            "truncated record prefix at offset {}",
            *idx
        )));
    }

    let id = buf[*idx];
    let len_field = &buf[*idx + 1..*idx + prefix_len];
    let data_len = match width {
        LengthWidth::U16 => LittleEndian::read_u16(len_field) as usize,
        LengthWidth::U32 => LittleEndian::read_u32(len_field) as usize,
    };

    let start = *idx + prefix_len;
    let end = start
        .checked_add(data_len)
        .filter(|end| *end <= buf.len())
        .ok_or_else(|| {
            Error::MalformedHeader(format!(
                "record {} declares {}B but only {}B remain",
                id,
                data_len,
                buf.len().saturating_sub(start)
            ))
        })?;

    *idx = end;
    Ok(TlvRecord {
        id,
        data: &buf[start..end],
    })
}

pub(crate) fn write_record(
    out: &mut Vec<u8>,
    id: u8,
    data: &[u8],
    width: LengthWidth,
) -> Result<()> {
    out.push(id);
    match width {
        LengthWidth::U16 => {
            if data.len() > u16::MAX as usize {
                return Err(Error::MalformedHeader(format!(
                    "record {} is {}B, too long for a 2 byte length field",
                    id,
                    data.len()
                )));
            }
            let mut len = [0u8; 2];
            LittleEndian::write_u16(&mut len, data.len() as u16);
            out.extend_from_slice(&len);
        }
        LengthWidth::U32 => {
            if data.len() > u32::MAX as usize {
                return Err(Error::MalformedHeader(format!(
                    "record {} is too long for a 4 byte length field",
                    id
                )));
            }
            let mut len = [0u8; 4];
            LittleEndian::write_u32(&mut len, data.len() as u32);
            out.extend_from_slice(&len);
        }
    }
    out.extend_from_slice(data);
    Ok(())
}

/// Writes the id 0 terminator with the given payload.
pub(crate) fn write_end(out: &mut Vec<u8>, payload: &[u8], width: LengthWidth) -> Result<()> {
    write_record(out, 0, payload, width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdbx::consts::END_OF_HEADER;

    #[test]
    fn reads_back_both_length_widths() {
        for width in [LengthWidth::U16, LengthWidth::U32] {
            let mut buf = Vec::new();
            write_record(&mut buf, 4, &[7u8; 32], width).unwrap();
            write_end(&mut buf, &END_OF_HEADER, width).unwrap();

            let mut idx = 0;
            let first = read_record(&buf, &mut idx, width).unwrap();
            assert_eq!(first.id, 4);
            assert_eq!(first.data, &[7u8; 32][..]);
            let end = read_record(&buf, &mut idx, width).unwrap();
            assert!(end.is_end());
            assert_eq!(end.data, &END_OF_HEADER[..]);
            assert_eq!(idx, buf.len());
        }
    }

    #[test]
    fn u16_record_layout() {
        let mut buf = Vec::new();
        write_record(&mut buf, 2, &[0xAA, 0xBB], LengthWidth::U16).unwrap();
        assert_eq!(buf, vec![2, 2, 0, 0xAA, 0xBB]);
    }

    #[test]
    fn truncated_record_is_malformed() {
        let mut buf = Vec::new();
        write_record(&mut buf, 4, &[1u8; 32], LengthWidth::U32).unwrap();
        buf.truncate(20);

        let mut idx = 0;
        let err = read_record(&buf, &mut idx, LengthWidth::U32).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));

        let mut idx = 0;
        let err = read_record(&buf[..3], &mut idx, LengthWidth::U32).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }

    #[test]
    fn oversized_u16_record_is_rejected() {
        let mut buf = Vec::new();
        let data = vec![0u8; u16::MAX as usize + 1];
        assert!(write_record(&mut buf, 1, &data, LengthWidth::U16).is_err());
    }
}
