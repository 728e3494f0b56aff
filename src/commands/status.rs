use log::debug;

use crate::snapshot::BackupKey;
use crate::sync::{self, Verdict};
use crate::{Error, ErrorKind, Storage};

#[derive(Debug)]
pub struct Status<'a> {
    storage: &'a Storage,
    user_id: String,
    local: Option<String>,
}

impl<'a> Status<'a> {
    pub fn new<S>(storage: &'a Storage, user_id: S) -> Self
    where
        S: Into<String>,
    {
        Status {
            storage,
            user_id: user_id.into(),
            local: None,
        }
    }

    /// Key of the snapshot currently held locally.
    pub fn local<S>(&mut self, key: S)
    where
        S: Into<String>,
    {
        self.local = Some(key.into());
    }

    pub async fn run(self) -> Result<Verdict, Error> {
        let Self {
            storage,
            user_id,
            local,
        } = self;

        let local = match local {
            Some(key) => {
                let key = BackupKey::decode(key)?;
                if key.user_id() != user_id {
                    return Err(Error::foreign_key(user_id, key.user_id()));
                }
                Some(key)
            }
            None => None,
        };

        let candidates = match storage.list_latest_info_for_user(&user_id).await {
            Ok(ok) => ok,
            Err(err) => match err.kind() {
                ErrorKind::NoBackupsFound(_) | ErrorKind::NoValidSnapshots { .. } => {
                    debug!("{}", err);
                    return Ok(Verdict::NoRemote);
                }
                _ => return Err(err),
            },
        };

        Ok(sync::reconcile(local.as_ref(), &candidates))
    }
}
