#![warn(rust_2018_idioms)]

mod commands;
mod config;
mod errors;
mod stats;
mod sync;

pub mod snapshot;
pub mod storage;

#[cfg(test)]
mod testing;

pub use self::commands::{write_json, Download, Info, Status, Target, Upload};
pub use self::config::{Config, Credentials};
pub use self::errors::{Error, ErrorKind, ResultExt};
pub use self::stats::Stats;
pub use self::storage::Storage;
pub use self::sync::{reconcile, Verdict};
