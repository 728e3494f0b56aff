use std::fmt::{self, Display};

use chrono::NaiveDateTime;
use futures::stream::TryStreamExt;
use log::{debug, error, info, warn};

use crate::snapshot::{self, BackupKey, CandidateSet, CatalogEntry};
use crate::{Config, Error, ErrorKind, Stats};

pub mod backend;

pub use self::backend::{body_from, read_to_end, Backend, Body, ObjectSummary};

/// Upload and download of backup snapshots over a single backend.
#[derive(Debug)]
pub struct Storage {
    backend: Box<dyn Backend>,
}

impl Storage {
    pub fn new(cfg: &Config) -> Result<Self, Error> {
        let uri = &cfg.storage_url;

        if uri.scheme() == backend::S3::scheme() {
            let s3 = backend::S3::from(uri, cfg.credentials.as_ref())?;
            return Ok(Storage::with_backend(s3));
        }

        if uri.scheme() == backend::Fs::scheme() {
            let fs = backend::Fs::from(uri)?;
            return Ok(Storage::with_backend(fs));
        }

        let err = format!("Unknown storage url '{}'", uri);
        Err(Error::config(err))
    }

    pub fn with_backend<B>(backend: B) -> Self
    where
        B: Backend + 'static,
    {
        Storage {
            backend: Box::new(backend),
        }
    }

    /// Stores `body` under the key encoded from the other arguments and
    /// returns that key. An existing object with the same key is replaced.
    pub async fn upload_snapshot(
        &self,
        user_id: &str,
        timestamp: NaiveDateTime,
        iteration: u64,
        body: Body,
    ) -> Result<String, Error> {
        let key = BackupKey::new(user_id, timestamp, iteration)?.encode();

        info!("Uploading '{}' ...", key);
        let len = {
            let _timer = Stats::current().upload().timer();
            self.backend.put(&key, body).await?
        };
        Stats::current().upload().inc_bytes(len);
        info!("Uploaded '{}' ({} bytes)", key, len);

        Ok(key)
    }

    pub async fn fetch_by_key(&self, key: &str) -> Result<Body, Error> {
        let body = {
            let _timer = Stats::current().download().timer();
            self.backend.get(key).await?
        };

        let body = body.inspect_ok(|chunk| Stats::current().download().inc_bytes(chunk.len()));
        Ok(Box::pin(body))
    }

    /// Content of the iteration-first candidate; the time-first candidate is
    /// only reported by `list_latest_info_for_user`.
    pub async fn fetch_latest_for_user(&self, user_id: &str) -> Result<(CatalogEntry, Body), Error> {
        let candidates = self.resolve_user(user_id).await?;
        let latest = candidates.latest().clone();

        debug!("Fetching latest backup '{}'", latest.raw_key());
        let body = self.fetch_by_key(latest.raw_key()).await?;

        Ok((latest, body))
    }

    pub async fn list_latest_info_for_user(&self, user_id: &str) -> Result<CandidateSet, Error> {
        self.resolve_user(user_id).await
    }

    async fn resolve_user(&self, user_id: &str) -> Result<CandidateSet, Error> {
        let prefix = snapshot::user_prefix(user_id)?;

        let objects = {
            let _timer = Stats::current().listing().timer();
            self.backend.list(&prefix).await?
        };

        if objects.is_empty() {
            info!("No backups found under '{}'", prefix);
            return Err(Error::no_backups_found(user_id));
        }

        let raw_keys = objects.into_iter().map(|it| it.key);
        let resolution = match snapshot::resolve(user_id, raw_keys) {
            Ok(ok) => ok,
            Err(err) => {
                if let ErrorKind::NoValidSnapshots { .. } = err.kind() {
                    error!("Every object under '{}' is unparseable: {}", prefix, err);
                }
                return Err(err);
            }
        };

        for (raw_key, err) in &resolution.rejected {
            warn!("Skipping '{}': {}", raw_key, err);
        }

        let candidates = resolution.candidates;
        if let Some(divergent) = candidates.divergent() {
            warn!(
                "Latest backups of '{}' diverge: '{}' by iteration, '{}' by timestamp",
                user_id,
                candidates.latest().raw_key(),
                divergent.raw_key()
            );
        }

        Ok(candidates)
    }
}

impl Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "Storage({})", self.backend)
    }
}
