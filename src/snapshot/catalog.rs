use std::cmp::Ordering;

use serde_derive::Serialize;

use crate::snapshot::{BackupKey, KEY_EXTENSION, TIMESTAMP_FORMAT};
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    key: BackupKey,
    raw_key: String,
}

impl CatalogEntry {
    pub fn decode<S>(raw_key: S) -> Result<Self, Error>
    where
        S: Into<String>,
    {
        let raw_key = raw_key.into();
        let key = BackupKey::decode(&raw_key)?;
        Ok(CatalogEntry { key, raw_key })
    }

    #[inline]
    pub fn key(&self) -> &BackupKey {
        &self.key
    }

    #[inline]
    pub fn raw_key(&self) -> &str {
        self.raw_key.as_str()
    }

    pub fn info(&self) -> EntryInfo<'_> {
        EntryInfo {
            filename: self.raw_key.as_str(),
            user_id: self.key.user_id(),
            timestamp: self.key.timestamp().format(TIMESTAMP_FORMAT).to_string(),
            iteration: self.raw_iteration(),
        }
    }

    /// Iteration segment as written in the key, leading zeros included.
    fn raw_iteration(&self) -> &str {
        let stem = self
            .raw_key
            .strip_suffix(KEY_EXTENSION)
            .unwrap_or(&self.raw_key);

        match stem.rfind(ITERATION_MARKER) {
            Some(pos) => &stem[pos + ITERATION_MARKER.len()..],
            None => stem,
        }
    }
}

const ITERATION_MARKER: &str = "_it";

/// Wire shape of a candidate as reported to clients, every field a string.
#[derive(Debug, PartialEq, Serialize)]
pub struct EntryInfo<'a> {
    pub filename: &'a str,
    #[serde(rename = "userID")]
    pub user_id: &'a str,
    pub timestamp: String,
    pub iteration: &'a str,
}

/// The iteration-first candidate, followed by the time-first candidate when
/// the two orderings disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    by_iteration: CatalogEntry,
    by_timestamp: Option<CatalogEntry>,
}

impl CandidateSet {
    #[inline]
    pub fn latest(&self) -> &CatalogEntry {
        &self.by_iteration
    }

    #[inline]
    pub fn divergent(&self) -> Option<&CatalogEntry> {
        self.by_timestamp.as_ref()
    }

    #[inline]
    pub fn is_divergent(&self) -> bool {
        self.by_timestamp.is_some()
    }

    pub fn len(&self) -> usize {
        if self.is_divergent() {
            2
        } else {
            1
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        Some(&self.by_iteration)
            .into_iter()
            .chain(self.by_timestamp.as_ref())
    }

    pub fn infos(&self) -> Vec<EntryInfo<'_>> {
        self.iter().map(CatalogEntry::info).collect()
    }
}

#[derive(Debug)]
pub struct Resolution {
    pub candidates: CandidateSet,
    pub rejected: Vec<(String, Error)>,
}

/// Ranks every decodable key of `user_id` and picks both candidates.
///
/// Keys that do not decode, or decode to another user, are never ranked;
/// they are returned in `Resolution::rejected` in listing order. Fails with
/// `NoValidSnapshots` when nothing is left to rank.
pub fn resolve<I, S>(user_id: &str, raw_keys: I) -> Result<Resolution, Error>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut entries = Vec::new();
    let mut rejected = Vec::new();

    for raw_key in raw_keys {
        let raw_key = raw_key.into();
        match CatalogEntry::decode(raw_key.as_str()) {
            Ok(entry) if entry.key.user_id() == user_id => entries.push(entry),
            Ok(entry) => {
                let err = Error::foreign_key(user_id, entry.key.user_id());
                rejected.push((raw_key, err));
            }
            Err(err) => rejected.push((raw_key, err)),
        }
    }

    if entries.is_empty() {
        return Err(Error::no_valid_snapshots(user_id, rejected.len()));
    }

    let by_iteration = first_by(&entries, by_iteration_then_time);
    let by_timestamp = first_by(&entries, by_time_then_iteration);

    let by_timestamp = if by_iteration.raw_key == by_timestamp.raw_key {
        None
    } else {
        Some(by_timestamp.clone())
    };

    let candidates = CandidateSet {
        by_iteration: by_iteration.clone(),
        by_timestamp,
    };

    Ok(Resolution {
        candidates,
        rejected,
    })
}

fn first_by<F>(entries: &[CatalogEntry], compare: F) -> &CatalogEntry
where
    F: Fn(&CatalogEntry, &CatalogEntry) -> Ordering,
{
    let mut ranked = entries.iter().collect::<Vec<_>>();
    // sort_by is stable, equal entries keep listing order
    ranked.sort_by(|a, b| compare(a, b));
    ranked[0]
}

fn by_iteration_then_time(a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
    b.key
        .iteration()
        .cmp(&a.key.iteration())
        .then_with(|| b.key.timestamp().cmp(&a.key.timestamp()))
}

fn by_time_then_iteration(a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
    b.key
        .timestamp()
        .cmp(&a.key.timestamp())
        .then_with(|| b.key.iteration().cmp(&a.key.iteration()))
}
