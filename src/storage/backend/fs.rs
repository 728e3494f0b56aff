use std::fmt::{self, Display};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::TryStreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::errors::ResultExt;
use crate::storage::backend::{Backend, Body, ObjectSummary};
use crate::Error;

const FS_URI_SCHEME: &str = "file";
const PARTIAL_SUFFIX: &str = ".partial";

/// Objects stored as plain files in a single directory.
#[derive(Debug)]
pub struct Fs {
    root: PathBuf,
}

impl Fs {
    pub fn from(uri: &Url) -> Result<Self, Error> {
        let root = uri
            .to_file_path()
            .map_err(|_| Error::config(format!("Unrecognized directory '{}'", uri)))?;

        Ok(Fs::new(root))
    }

    pub fn new<P>(root: P) -> Self
    where
        P: AsRef<Path>,
    {
        Fs {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn scheme() -> &'static str {
        FS_URI_SCHEME
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, Error> {
        let is_plain = !key.is_empty()
            && !key.starts_with('.')
            && !key.contains(|it: char| it == '/' || it == '\\' || it == '\0');

        if !is_plain {
            return Err(Error::malformed_key(key));
        }

        Ok(self.root.join(key))
    }
}

#[async_trait]
impl Backend for Fs {
    async fn put(&self, key: &str, mut body: Body) -> Result<usize, Error> {
        let path = self.object_path(key)?;

        fs::create_dir_all(&self.root).await.io_err(&self.root)?;

        // one staging file per writer, removed on drop unless persisted
        let partial = tempfile::Builder::new()
            .prefix(&format!(".{}.", key))
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(&self.root)
            .io_err(&self.root)?;

        let mut file = partial
            .as_file()
            .try_clone()
            .map(File::from_std)
            .io_err(partial.path())?;
        let mut len = 0;

        while let Some(chunk) = body.try_next().await.io_err(partial.path())? {
            file.write_all(&chunk).await.io_err(partial.path())?;
            len += chunk.len();
        }

        file.sync_all().await.io_err(partial.path())?;
        drop(file);

        // rename replaces an existing object atomically
        partial.persist(&path).io_err(&path)?;

        Ok(len)
    }

    async fn get(&self, key: &str) -> Result<Body, Error> {
        let path = self.object_path(key)?;

        let file = match File::open(&path).await {
            Ok(ok) => ok,
            Err(ref err) if err.kind() == IoErrorKind::NotFound => {
                return Err(Error::not_found(key))
            }
            Err(err) => return Err(Error::io(&path)(err)),
        };

        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, Error> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(ok) => ok,
            Err(ref err) if err.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::io(&self.root)(err)),
        };

        let mut objects = Vec::new();

        while let Some(entry) = dir.next_entry().await.io_err(&self.root)? {
            let key = match entry.file_name().into_string() {
                Ok(ok) => ok,
                Err(_) => continue,
            };

            if key.starts_with('.') || !key.starts_with(prefix) {
                continue;
            }

            let meta = entry.metadata().await.io_err(entry.path())?;
            if !meta.is_file() {
                continue;
            }

            let last_modified = meta.modified().ok().map(|it| {
                DateTime::<Utc>::from(it).to_rfc3339_opts(SecondsFormat::Millis, true)
            });

            objects.push(ObjectSummary { key, last_modified });
        }

        // match the lexicographic order of S3 listings
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(objects)
    }
}

impl Display for Fs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}://{}", FS_URI_SCHEME, self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs as std_fs;
    use std::io;
    use std::sync::Arc;

    use bytes::Bytes;
    use futures::stream;

    use crate::storage::backend::{body_from, read_to_end};
    use crate::testing;
    use crate::ErrorKind;

    fn chunked(fill: u8, chunks: usize) -> Body {
        let chunks = (0..chunks).map(move |_| Ok(Bytes::from(vec![fill; 64 * 1024])));
        Box::pin(stream::iter(chunks.collect::<Vec<Result<Bytes, io::Error>>>()))
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names = std_fs::read_dir(dir)
            .unwrap()
            .map(|it| it.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    const KEY: &str = "leakr_db_u1_2024-01-01 00:00:00_it1.sqlite";

    #[tokio::test]
    async fn put_get_list() {
        let work = testing::temp_dir();
        let fs = Fs::new(&work);

        assert!(fs.list("leakr_db_u1_").await.unwrap().is_empty());

        let len = fs.put(KEY, body_from(&b"first"[..])).await.unwrap();
        assert_eq!(len, 5);
        fs.put(KEY, body_from(&b"second"[..])).await.unwrap();
        fs.put("leakr_db_u2_x", body_from(&b"other"[..])).await.unwrap();

        let content = read_to_end(fs.get(KEY).await.unwrap()).await.unwrap();
        assert_eq!(&content[..], &b"second"[..]);

        let listed = fs.list("leakr_db_u1_").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, KEY);
        assert!(listed[0].last_modified.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_to_same_key() {
        let work = testing::temp_dir();
        let fs = Arc::new(Fs::new(&work));

        for _ in 0..5 {
            let writers = (1..=4_u8)
                .map(|fill| {
                    let fs = fs.clone();
                    tokio::spawn(async move { fs.put(KEY, chunked(fill, 16)).await })
                })
                .collect::<Vec<_>>();

            for it in writers {
                assert_eq!(it.await.unwrap().unwrap(), 16 * 64 * 1024);
            }

            let content = read_to_end(fs.get(KEY).await.unwrap()).await.unwrap();
            assert_eq!(content.len(), 16 * 64 * 1024);
            assert!(content.iter().all(|it| *it == content[0]));
        }

        assert_eq!(dir_entries(work.as_ref()), vec![KEY.to_string()]);
    }

    #[tokio::test]
    async fn failed_put_leaves_nothing_behind() {
        let work = testing::temp_dir();
        let fs = Fs::new(&work);

        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body: Body = Box::pin(stream::iter(chunks));

        assert!(fs.put(KEY, body).await.is_err());
        assert!(dir_entries(work.as_ref()).is_empty());
        assert!(fs.get(KEY).await.err().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn missing_object() {
        let work = testing::temp_dir();
        let fs = Fs::new(&work);

        let err = fs.get(KEY).await.err().unwrap();
        assert!(err.is_not_found(), "{}", err);

        let missing_root = Fs::new(work.as_ref().join("nope"));
        assert!(missing_root.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reject_path_keys() {
        let work = testing::temp_dir();
        let fs = Fs::new(&work);

        for key in &["../escape", "a/b", "", ".hidden"] {
            let err = fs.put(key, body_from(&b"x"[..])).await.unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::MalformedKey(key.to_string()));
        }
    }

    #[test]
    fn from_url() {
        let uri = Url::parse("file:///var/lib/leakr").unwrap();
        let fs = Fs::from(&uri).unwrap();

        assert_eq!(fs.to_string(), "file:///var/lib/leakr");
    }
}
