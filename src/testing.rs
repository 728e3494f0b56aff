use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::{self, TempDir};

use crate::storage::{body_from, read_to_end, Backend, Body, ObjectSummary};
use crate::Error;

#[derive(Debug)]
pub struct DirGuard(Option<TempDir>);

impl AsRef<Path> for DirGuard {
    fn as_ref(&self) -> &Path {
        match self.0 {
            Some(ref temp) => temp.path(),
            None => panic!("using after close"),
        }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        if let Some(dir) = self.0.take() {
            dir.close().expect("cannot close temporary directory")
        }
    }
}

pub fn temp_dir() -> DirGuard {
    let mut b = tempfile::Builder::new();
    let dir = b.prefix("leakr-").tempdir().unwrap();
    DirGuard(Some(dir))
}

/// Objects kept in a sorted map, listed in key order like S3.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    objects: Arc<Mutex<BTreeMap<String, Bytes>>>,
}

impl MemoryBackend {
    pub fn with_objects(objects: Vec<(&str, &[u8])>) -> Self {
        let objects = objects
            .into_iter()
            .map(|(key, content)| (key.to_string(), Bytes::copy_from_slice(content)))
            .collect();

        MemoryBackend {
            objects: Arc::new(Mutex::new(objects)),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

impl Display for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "memory://")
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn put(&self, key: &str, body: Body) -> Result<usize, Error> {
        let content = read_to_end(body).await.map_err(Error::storage)?;
        let len = content.len();
        self.objects.lock().unwrap().insert(key.to_string(), content);
        Ok(len)
    }

    async fn get(&self, key: &str) -> Result<Body, Error> {
        let content = self.objects.lock().unwrap().get(key).cloned();
        content.map(body_from).ok_or_else(|| Error::not_found(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, Error> {
        let objects = self.objects.lock().unwrap();
        let listed = objects
            .keys()
            .filter(|it| it.starts_with(prefix))
            .map(|key| ObjectSummary {
                key: key.clone(),
                last_modified: None,
            })
            .collect();

        Ok(listed)
    }
}

/// Every call fails like an unreachable store.
#[derive(Debug)]
pub struct FailingBackend;

impl FailingBackend {
    fn err() -> Error {
        Error::storage(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
    }
}

impl Display for FailingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "failing://")
    }
}

#[async_trait]
impl Backend for FailingBackend {
    async fn put(&self, _key: &str, _body: Body) -> Result<usize, Error> {
        Err(FailingBackend::err())
    }

    async fn get(&self, _key: &str) -> Result<Body, Error> {
        Err(FailingBackend::err())
    }

    async fn list(&self, _prefix: &str) -> Result<Vec<ObjectSummary>, Error> {
        Err(FailingBackend::err())
    }
}
