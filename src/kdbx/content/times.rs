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

use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};

use crate::kdbx::options::FormatVersion;
use crate::kdbx::result::{Error, Result};

/// Seconds between 0001-01-01T00:00:00Z and the Unix epoch.
const SECONDS_TO_UNIX_EPOCH: i64 = 62_135_596_800;
const TEXT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Timestamps and usage statistics of a group or entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdbxTimes {
    pub creation_time: DateTime<Utc>,
    pub last_modification_time: DateTime<Utc>,
    pub last_access_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    pub expires: bool,
    pub usage_count: u64,
    pub location_changed: DateTime<Utc>,
}

impl Default for KdbxTimes {
    fn default() -> Self {
        KdbxTimes::now()
    }
}

impl KdbxTimes {
    pub fn now() -> KdbxTimes {
        let now = now();
        KdbxTimes {
            creation_time: now,
            last_modification_time: now,
            last_access_time: now,
            expiry_time: now,
            expires: false,
            usage_count: 0,
            location_changed: now,
        }
    }

    /// Records an access.
    pub fn touch(&mut self) {
        self.last_access_time = now();
        self.usage_count += 1;
    }

    /// Records a modification, which is also an access.
    pub fn modify(&mut self) {
        let now = now();
        self.last_modification_time = now;
        self.last_access_time = now;
    }

    pub fn expire_at(&mut self, time: DateTime<Utc>) {
        self.expiry_time = time.trunc_subsecs(0);
        self.expires = true;
    }

    pub fn is_expired(&self) -> bool {
        self.expires && self.expiry_time <= Utc::now()
    }
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Format 4 stores base64 of the little-endian seconds since year 1, format 3 an ISO 8601 string.
pub(crate) fn format_time(time: &DateTime<Utc>, version: FormatVersion) -> String {
    match version {
        FormatVersion::Kdbx4 => {
            let secs = time.timestamp() + SECONDS_TO_UNIX_EPOCH;
            base64::encode(secs.to_le_bytes())
        }
        FormatVersion::Kdbx3 => time.format(TEXT_FORMAT).to_string(),
    }
}

/// Accepts either encoding regardless of the file version.
pub(crate) fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc).trunc_subsecs(0));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, TEXT_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    let bytes = base64::decode(text).map_err(|_| Error::Xml(format!("invalid time {:?}", text)))?;
    if bytes.len() != 8 {
        return Err(Error::Xml(format!("invalid time {:?}", text)));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes);
    i64::from_le_bytes(raw)
        .checked_sub(SECONDS_TO_UNIX_EPOCH)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| Error::Xml(format!("time {:?} out of range", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_time_counts_from_year_one() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let text = format_time(&epoch, FormatVersion::Kdbx4);
        assert_eq!(base64::decode(&text).unwrap(), 62_135_596_800i64.to_le_bytes());
        assert_eq!(parse_time(&text).unwrap(), epoch);
    }

    #[test]
    fn text_time() {
        let time = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        let text = format_time(&time, FormatVersion::Kdbx3);
        assert_eq!(text, "2020-09-13T12:26:40Z");
        assert_eq!(parse_time(&text).unwrap(), time);
        assert_eq!(parse_time("2020-09-13T12:26:40.250Z").unwrap(), time);
    }

    #[test]
    fn garbage_time_is_rejected() {
        assert!(parse_time("yesterday").is_err());
        assert!(parse_time("AAAA").is_err());
        assert!(parse_time(&base64::encode(i64::MIN.to_le_bytes())).is_err());
        assert!(parse_time(&base64::encode(i64::MAX.to_le_bytes())).is_err());
    }

    #[test]
    fn now_has_whole_seconds() {
        let mut times = KdbxTimes::now();
        assert_eq!(times.creation_time.timestamp_subsec_nanos(), 0);
        assert_eq!(times.creation_time, times.last_modification_time);

        times.touch();
        times.touch();
        assert_eq!(times.usage_count, 2);
        assert!(!times.is_expired());

        times.expire_at(Utc.timestamp_opt(0, 0).unwrap());
        assert!(times.is_expired());
    }
}
