use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, SubsecRound, Utc};
use log::info;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::errors::ResultExt;
use crate::storage::Body;
use crate::{Error, Storage};

#[derive(Debug)]
pub struct Upload<'a> {
    storage: &'a Storage,
    user_id: String,
    iteration: u64,
    timestamp: Option<NaiveDateTime>,
    path: PathBuf,
}

impl<'a> Upload<'a> {
    pub fn new<S, P>(storage: &'a Storage, user_id: S, iteration: u64, path: P) -> Self
    where
        S: Into<String>,
        P: AsRef<Path>,
    {
        Upload {
            storage,
            user_id: user_id.into(),
            iteration,
            timestamp: None,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Defaults to the current UTC time, truncated to seconds.
    pub fn timestamp(&mut self, timestamp: NaiveDateTime) {
        self.timestamp = Some(timestamp);
    }

    pub async fn run(self) -> Result<String, Error> {
        let Self {
            storage,
            user_id,
            iteration,
            timestamp,
            path,
        } = self;

        let timestamp = timestamp.unwrap_or_else(|| Utc::now().naive_utc().trunc_subsecs(0));

        info!("Reading snapshot from {:?}", path.as_os_str());
        let file = File::open(&path).await.io_err(&path)?;
        let body: Body = Box::pin(ReaderStream::new(file));

        storage
            .upload_snapshot(&user_id, timestamp, iteration, body)
            .await
    }
}
