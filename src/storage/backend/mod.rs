use std::fmt::{Debug, Display};
use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, TryStreamExt};

mod fs;
mod s3;

pub use self::fs::Fs;
pub use self::s3::S3;
use crate::Error;

/// Object content as a stream of chunks.
pub type Body = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send + 'static>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: Option<String>,
}

/// Put, get and list against a content store. Implementations carry no
/// knowledge of backup keys.
#[async_trait]
pub trait Backend: Debug + Display + Send + Sync {
    async fn put(&self, key: &str, body: Body) -> Result<usize, Error>;

    /// Fails with `ErrorKind::NotFound` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Body, Error>;

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, Error>;
}

pub fn body_from<B>(content: B) -> Body
where
    B: Into<Bytes>,
{
    let content = content.into();
    Box::pin(stream::once(async move { Ok(content) }))
}

pub async fn read_to_end(body: Body) -> Result<Bytes, io::Error> {
    let buf = body
        .try_fold(BytesMut::new(), |mut buf, chunk| async move {
            buf.extend_from_slice(&chunk);
            Ok(buf)
        })
        .await?;

    Ok(buf.freeze())
}
