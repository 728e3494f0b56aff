use std::fmt::{self, Display};

use chrono::{NaiveDateTime, SubsecRound};
use lazy_static::lazy_static;
use regex::Regex;

use crate::snapshot::{KEY_EXTENSION, KEY_PREFIX, TIMESTAMP_FORMAT};
use crate::Error;

lazy_static! {
    static ref KEY_PATTERN: Regex =
        Regex::new(r"^leakr_db_([^_]+)_([^_]+)_it([^_]*)\.sqlite$").unwrap();
}

/// Identity of a single backup snapshot, carried entirely by its object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackupKey {
    user_id: String,
    timestamp: NaiveDateTime,
    iteration: u64,
}

impl BackupKey {
    /// Sub-second precision is dropped, the key format stores whole seconds.
    pub fn new<S>(user_id: S, timestamp: NaiveDateTime, iteration: u64) -> Result<Self, Error>
    where
        S: Into<String>,
    {
        let user_id = user_id.into();
        check_user_id(&user_id)?;

        Ok(BackupKey {
            user_id,
            timestamp: timestamp.trunc_subsecs(0),
            iteration,
        })
    }

    pub fn decode<S>(key: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let key = key.as_ref();
        let captures = match KEY_PATTERN.captures(key) {
            Some(ok) => ok,
            None => return Err(Error::malformed_key(key)),
        };

        let user_id = &captures[1];
        let timestamp = &captures[2];
        let iteration = &captures[3];

        let iteration = parse_iteration(iteration).map_err(|err| Error::bad_iteration(key, err))?;
        let timestamp = parse_timestamp(timestamp).map_err(|err| Error::bad_timestamp(key, err))?;

        Ok(BackupKey {
            user_id: user_id.to_string(),
            timestamp,
            iteration,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{}_{}_it{}{}",
            KEY_PREFIX,
            self.user_id,
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.iteration,
            KEY_EXTENSION
        )
    }

    #[inline]
    pub fn user_id(&self) -> &str {
        self.user_id.as_str()
    }

    #[inline]
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    #[inline]
    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}

impl Display for BackupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.encode())
    }
}

/// Encodes a key without building a `BackupKey` first.
pub fn encode<S>(user_id: S, timestamp: NaiveDateTime, iteration: u64) -> Result<String, Error>
where
    S: Into<String>,
{
    BackupKey::new(user_id, timestamp, iteration).map(|it| it.encode())
}

/// Listing prefix shared by every snapshot of `user_id`.
pub fn user_prefix(user_id: &str) -> Result<String, Error> {
    check_user_id(user_id)?;
    Ok(format!("{}{}_", KEY_PREFIX, user_id))
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, String> {
    let timestamp = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|err| format!("'{}' does not match '{}': {}", value, TIMESTAMP_FORMAT, err))?;

    // chrono accepts unpadded fields, the key format does not
    let canonical = timestamp.format(TIMESTAMP_FORMAT).to_string();
    if canonical != value {
        return Err(format!("'{}' is not canonical, expected '{}'", value, canonical));
    }

    Ok(timestamp)
}

fn parse_iteration(value: &str) -> Result<u64, String> {
    if value.is_empty() || !value.bytes().all(|it| it.is_ascii_digit()) {
        return Err(format!("'{}' is not a non-negative integer", value));
    }

    value
        .parse::<u64>()
        .map_err(|err| format!("'{}' is out of range: {}", value, err))
}

fn check_user_id(user_id: &str) -> Result<(), Error> {
    if user_id.is_empty() || user_id.contains('_') {
        return Err(Error::invalid_user_id(user_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;

    use crate::ErrorKind;

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|it| it.and_hms_opt(h, min, s))
            .unwrap()
    }

    #[test]
    fn encode_key() {
        let key = BackupKey::new("u1", ts(2024, 1, 2, 3, 4, 5), 17).unwrap();
        assert_eq!(key.encode(), "leakr_db_u1_2024-01-02 03:04:05_it17.sqlite");
        assert_eq!(
            encode("u1", ts(2024, 1, 2, 3, 4, 5), 0).unwrap(),
            "leakr_db_u1_2024-01-02 03:04:05_it0.sqlite"
        );
    }

    #[test]
    fn round_trip() {
        #[rustfmt::skip]
        let params = vec![
            ("u1", ts(2024, 1, 1, 0, 0, 0), 0),
            ("0b7e0c4a-3f1d-4c1e-9a55-0c2d4e6f8a9b", ts(1999, 12, 31, 23, 59, 59), 292),
            ("user.name@example.com", ts(2030, 6, 15, 12, 0, 0), u64::MAX),
        ];

        for (user_id, timestamp, iteration) in params {
            let key = BackupKey::new(user_id, timestamp, iteration).unwrap();
            let decoded = BackupKey::decode(key.encode()).unwrap();
            assert_eq!(key, decoded);
            assert_eq!(decoded, BackupKey::decode(key.encode()).unwrap());
        }
    }

    #[test]
    fn subsecond_timestamp_is_truncated() {
        let timestamp = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|it| it.and_hms_milli_opt(0, 0, 0, 500))
            .unwrap();

        let key = BackupKey::new("u1", timestamp, 1).unwrap();
        assert_eq!(key.timestamp(), ts(2024, 1, 1, 0, 0, 0));
        assert_eq!(key.encode(), "leakr_db_u1_2024-01-01 00:00:00_it1.sqlite");
        assert_eq!(BackupKey::decode(key.encode()).unwrap(), key);
    }

    #[test]
    fn decode_key() {
        let key = BackupKey::decode("leakr_db_u1_2024-01-01 00:00:00_it007.sqlite").unwrap();

        assert_eq!(key.user_id(), "u1");
        assert_eq!(key.timestamp(), ts(2024, 1, 1, 0, 0, 0));
        assert_eq!(key.iteration(), 7);
    }

    #[test]
    fn reject_malformed() {
        let params = vec![
            "garbage.txt",
            "",
            "leakr_db__2024-01-01 00:00:00_it1.sqlite",
            "leakr_db_u_1_2024-01-01 00:00:00_it1.sqlite",
            "leakr_db_u1_2024-01-01 00:00:00_it1.sqlite.bak",
            "leakr_db_u1_2024-01-01 00:00:00_1.sqlite",
            "prefix/leakr_db_u1_2024-01-01 00:00:00_it1.sqlite",
        ];

        for key in params {
            match BackupKey::decode(key) {
                Err(err) => assert_eq!(err.kind(), &ErrorKind::MalformedKey(key.into()), "{}", key),
                Ok(ok) => unreachable!("{:?}", ok),
            }
        }
    }

    #[test]
    fn reject_bad_iteration() {
        let params = vec![
            "leakr_db_u1_2024-01-01 00:00:00_it.sqlite",
            "leakr_db_u1_2024-01-01 00:00:00_it-1.sqlite",
            "leakr_db_u1_2024-01-01 00:00:00_it+1.sqlite",
            "leakr_db_u1_2024-01-01 00:00:00_itone.sqlite",
            "leakr_db_u1_2024-01-01 00:00:00_it99999999999999999999999.sqlite",
        ];

        for key in params {
            match BackupKey::decode(key) {
                Err(err) => assert_eq!(err.kind(), &ErrorKind::BadIteration(key.into()), "{}", key),
                Ok(ok) => unreachable!("{:?}", ok),
            }
        }
    }

    #[test]
    fn reject_bad_timestamp() {
        let params = vec![
            "leakr_db_u1_2024-01-01 00-00-00_it1.sqlite",
            "leakr_db_u1_2024-13-01 00:00:00_it1.sqlite",
            "leakr_db_u1_2024-1-1 00:00:00_it1.sqlite",
            "leakr_db_u1_2024-01-01T00:00:00_it1.sqlite",
            "leakr_db_u1_yesterday_it1.sqlite",
        ];

        for key in params {
            match BackupKey::decode(key) {
                Err(err) => assert_eq!(err.kind(), &ErrorKind::BadTimestamp(key.into()), "{}", key),
                Ok(ok) => unreachable!("{:?}", ok),
            }
        }
    }

    #[test]
    fn reject_invalid_user_id() {
        let timestamp = ts(2024, 1, 1, 0, 0, 0);

        for user_id in &["", "u_1"] {
            let err = BackupKey::new(*user_id, timestamp, 1).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidUserId(user_id.to_string()));
        }

        assert!(user_prefix("u_1").is_err());
        assert_eq!(user_prefix("u1").unwrap(), "leakr_db_u1_");
    }
}
