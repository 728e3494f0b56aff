mod catalog;
mod constants;
mod key;

pub use self::catalog::{resolve, CandidateSet, CatalogEntry, EntryInfo, Resolution};
pub use self::constants::*;
pub use self::key::{encode, parse_timestamp, user_prefix, BackupKey};
