use std::path::{Path, PathBuf};

use futures::stream::TryStreamExt;
use log::info;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::errors::ResultExt;
use crate::storage::Body;
use crate::{Error, Storage};

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Latest { user_id: String },
    Key(String),
}

#[derive(Debug)]
pub struct Download<'a> {
    storage: &'a Storage,
    target: Target,
    output: Option<PathBuf>,
}

impl<'a> Download<'a> {
    pub fn new(storage: &'a Storage, target: Target) -> Self {
        Download {
            storage,
            target,
            output: None,
        }
    }

    /// Defaults to the object key as a file name in the working directory.
    pub fn output<P>(&mut self, path: P)
    where
        P: AsRef<Path>,
    {
        self.output = Some(path.as_ref().to_path_buf());
    }

    pub async fn run(self) -> Result<(String, PathBuf, usize), Error> {
        let Self {
            storage,
            target,
            output,
        } = self;

        let (key, body) = match target {
            Target::Latest { user_id } => {
                let (entry, body) = storage.fetch_latest_for_user(&user_id).await?;
                info!("Latest backup of '{}' is '{}'", user_id, entry.raw_key());
                (entry.raw_key().to_string(), body)
            }
            Target::Key(key) => {
                let body = storage.fetch_by_key(&key).await?;
                (key, body)
            }
        };

        let path = match output {
            Some(val) => val,
            None => PathBuf::from(file_name(&key)?),
        };

        let len = write_body(&path, body).await?;
        info!("Saved '{}' to {:?}", key, path.as_os_str());

        Ok((key, path, len))
    }
}

async fn write_body(path: &Path, mut body: Body) -> Result<usize, Error> {
    let dir = match path.parent() {
        Some(val) if !val.as_os_str().is_empty() => val,
        _ => Path::new("."),
    };
    let name = path.file_name().and_then(|it| it.to_str()).unwrap_or("download");

    // removed on drop unless persisted, including on cancellation
    let partial = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".partial")
        .tempfile_in(dir)
        .io_err(dir)?;

    let mut file = partial
        .as_file()
        .try_clone()
        .map(File::from_std)
        .io_err(partial.path())?;
    let mut len = 0;

    while let Some(chunk) = body.try_next().await.storage_err("Download interrupted")? {
        file.write_all(&chunk).await.io_err(partial.path())?;
        len += chunk.len();
    }

    file.flush().await.io_err(partial.path())?;
    drop(file);

    partial.persist(path).io_err(path)?;

    Ok(len)
}

fn file_name(key: &str) -> Result<String, Error> {
    Path::new(key)
        .file_name()
        .and_then(|it| it.to_str())
        .map(|it| it.to_string())
        .ok_or_else(|| Error::malformed_key(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs as std_fs;
    use std::io;

    use bytes::Bytes;
    use futures::stream;

    use crate::storage::backend::Fs;
    use crate::testing;
    use crate::ErrorKind;

    #[tokio::test]
    async fn download_latest() {
        let remote = testing::temp_dir();
        let work = testing::temp_dir();

        std_fs::write(
            remote.as_ref().join("leakr_db_u1_2024-01-01 00:00:00_it2.sqlite"),
            b"by iteration",
        )
        .unwrap();
        std_fs::write(
            remote.as_ref().join("leakr_db_u1_2024-01-02 00:00:00_it1.sqlite"),
            b"by timestamp",
        )
        .unwrap();

        let storage = Storage::with_backend(Fs::new(&remote));
        let dst = work.as_ref().join("restored.sqlite");

        let target = Target::Latest {
            user_id: "u1".into(),
        };
        let mut command = Download::new(&storage, target);
        command.output(&dst);

        let (key, path, len) = command.run().await.unwrap();
        assert_eq!(key, "leakr_db_u1_2024-01-01 00:00:00_it2.sqlite");
        assert_eq!(path, dst);
        assert_eq!(len, 12);
        assert_eq!(std_fs::read(&dst).unwrap(), b"by iteration");
    }

    #[tokio::test]
    async fn download_by_key() {
        let remote = testing::temp_dir();
        let work = testing::temp_dir();
        let key = "leakr_db_u1_2024-01-02 00:00:00_it1.sqlite";

        std_fs::write(remote.as_ref().join(key), b"by timestamp").unwrap();

        let storage = Storage::with_backend(Fs::new(&remote));
        let mut command = Download::new(&storage, Target::Key(key.into()));
        command.output(work.as_ref().join("out.sqlite"));

        let (_, path, _) = command.run().await.unwrap();
        assert_eq!(std_fs::read(&path).unwrap(), b"by timestamp");
    }

    #[tokio::test]
    async fn download_missing() {
        let remote = testing::temp_dir();
        let storage = Storage::with_backend(Fs::new(&remote));

        let target = Target::Latest {
            user_id: "u1".into(),
        };
        let err = Download::new(&storage, target).run().await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NoBackupsFound("u1".into()));
    }

    #[tokio::test]
    async fn interrupted_download_leaves_nothing_behind() {
        let work = testing::temp_dir();
        let dst = work.as_ref().join("restored.sqlite");

        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"SQLite")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body: Body = Box::pin(stream::iter(chunks));

        let err = write_body(&dst, body).await.unwrap_err();
        assert!(err.is_transient(), "{}", err);
        assert_eq!(std_fs::read_dir(work.as_ref()).unwrap().count(), 0);
    }

    #[test]
    fn output_file_name() {
        assert_eq!(
            file_name("backups/leakr_db_u1_x.sqlite").unwrap(),
            "leakr_db_u1_x.sqlite"
        );
        assert!(file_name("..").is_err());
    }
}
