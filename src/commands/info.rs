use std::io::Write;

use crate::snapshot::CandidateSet;
use crate::{Error, Storage};

#[derive(Debug)]
pub struct Info<'a> {
    storage: &'a Storage,
    user_id: String,
}

impl<'a> Info<'a> {
    pub fn new<S>(storage: &'a Storage, user_id: S) -> Self
    where
        S: Into<String>,
    {
        Info {
            storage,
            user_id: user_id.into(),
        }
    }

    pub async fn run(self) -> Result<CandidateSet, Error> {
        self.storage.list_latest_info_for_user(&self.user_id).await
    }
}

/// Candidates as a JSON array, iteration-first candidate first.
pub fn write_json<W: Write>(candidates: &CandidateSet, writer: W) -> Result<(), serde_json::Error> {
    serde_json::to_writer_pretty(writer, &candidates.infos())
}
