use std::fmt::{self, Debug, Display};
use std::io;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{FuturesUnordered, StreamExt, TryStreamExt};
use log::{debug, warn};
use rusoto_core::credential::{DefaultCredentialsProvider, StaticProvider};
use rusoto_core::{HttpClient, Region, RusotoError};
use rusoto_s3::{self as s3_api, S3Client, S3 as S3Api};
use url::{Host, Url};

use crate::config::Credentials;
use crate::errors::ResultExt;
use crate::storage::backend::{Backend, Body, ObjectSummary};
use crate::Error;

const S3_URI_SCHEME: &str = "s3";
const REGION_QUERY_KEY: &str = "region";
const ENDPOINT_QUERY_KEY: &str = "endpoint";
const CHUNK_SIZE: usize = 1024 * 1024 * 10; // 10mb
const CONCURRENCY: usize = 10;

pub struct S3 {
    bucket_name: String,
    key_prefix: Option<String>,
    region: Region,
    client: S3Client,
}

impl S3 {
    pub fn from(uri: &Url, credentials: Option<&Credentials>) -> Result<Self, Error> {
        let bucket_name = match uri.host() {
            Some(Host::Domain(host)) => host.to_string(),
            host => {
                let err = format!("Unrecognized bucket '{:?}'", host);
                return Err(Error::config(err));
            }
        };

        let key_prefix = uri.path().trim_matches('/');
        let key_prefix = if key_prefix.is_empty() {
            None
        } else {
            Some(key_prefix.to_string())
        };

        let mut query = uri.query_pairs();

        let region_name = query
            .clone()
            .find(|it| it.0.as_ref() == REGION_QUERY_KEY)
            .map(|it| it.1.to_string());

        let endpoint = query
            .find(|it| it.0.as_ref() == ENDPOINT_QUERY_KEY)
            .map(|it| it.1.to_string());

        let region = match (region_name, endpoint) {
            (name, Some(endpoint)) => Region::Custom {
                name: name.unwrap_or_else(|| "custom".into()),
                endpoint,
            },
            (Some(name), None) => Region::from_str(name.as_str()).unwrap_or_default(),
            (None, None) => Region::default(),
        };

        let dispatcher = HttpClient::new()
            .map_err(|err| Error::config(format!("Cannot create HTTP client: {}", err)))?;

        let client = match credentials {
            Some(creds) => {
                let provider = StaticProvider::new_minimal(
                    creds.access_key_id.clone(),
                    creds.secret_access_key.clone(),
                );
                S3Client::new_with(dispatcher, provider, region.clone())
            }
            None => {
                let provider = DefaultCredentialsProvider::new().map_err(|err| {
                    Error::config(format!("Cannot create credentials provider: {}", err))
                })?;
                S3Client::new_with(dispatcher, provider, region.clone())
            }
        };

        Ok(S3 {
            bucket_name,
            key_prefix,
            region,
            client,
        })
    }

    pub fn scheme() -> &'static str {
        S3_URI_SCHEME
    }

    fn key_prefixed(&self, key: &str) -> String {
        if let Some(val) = &self.key_prefix {
            format!("{}/{}", val, key)
        } else {
            key.to_string()
        }
    }

    fn key_unprefixed(&self, key: String) -> String {
        match &self.key_prefix {
            Some(val) => key
                .strip_prefix(val.as_str())
                .and_then(|it| it.strip_prefix('/'))
                .map(str::to_string)
                .unwrap_or(key),
            None => key,
        }
    }

    async fn put_object(&self, key: String, content: Bytes) -> Result<usize, Error> {
        let len = content.len();
        let put_object = s3_api::PutObjectRequest {
            bucket: self.bucket_name.clone(),
            key: key.clone(),
            content_length: Some(len as i64),
            body: Some(content.to_vec().into()),
            ..Default::default()
        };

        self.client
            .put_object(put_object)
            .await
            .storage_err(format!("Put object '{}' failed", key))?;

        Ok(len)
    }

    async fn multipart_upload(
        &self,
        key: String,
        first: Bytes,
        second: Bytes,
        parts: &mut Parts,
    ) -> Result<usize, Error> {
        let upload = s3_api::CreateMultipartUploadRequest {
            bucket: self.bucket_name.clone(),
            key: key.clone(),
            ..Default::default()
        };

        let upload = self
            .client
            .create_multipart_upload(upload)
            .await
            .storage_err(format!("Create multipart upload '{}' failed", key))?;

        let upload_id = upload
            .upload_id
            .ok_or_else(|| Error::storage("upload_id cannot be empty"))?;

        let uploaded = self
            .upload_parts(&key, &upload_id, vec![second, first], parts)
            .await;

        let (completed, len) = match uploaded {
            Ok(ok) => ok,
            Err(err) => {
                self.abort_multipart_upload(&key, upload_id).await;
                return Err(err);
            }
        };

        let complete = s3_api::CompleteMultipartUploadRequest {
            bucket: self.bucket_name.clone(),
            key: key.clone(),
            upload_id,
            multipart_upload: Some(s3_api::CompletedMultipartUpload {
                parts: Some(completed),
            }),
            ..Default::default()
        };

        self.client
            .complete_multipart_upload(complete)
            .await
            .storage_err(format!("Complete multipart upload '{}' failed", key))?;

        Ok(len)
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        mut queued: Vec<Bytes>,
        parts: &mut Parts,
    ) -> Result<(Vec<s3_api::CompletedPart>, usize), Error> {
        let mut in_flight = FuturesUnordered::new();
        let mut completed = Vec::new();
        let mut part_number = 0_i64;
        let mut len = 0;

        loop {
            let part = match queued.pop() {
                Some(val) => val,
                None => match parts.next_part().await.storage_err("Read upload body failed")? {
                    Some(val) => val,
                    None => break,
                },
            };

            part_number += 1;
            len += part.len();
            in_flight.push(self.upload_part(key, upload_id, part_number, part));

            if in_flight.len() >= CONCURRENCY {
                if let Some(done) = in_flight.next().await {
                    completed.push(done?);
                }
            }
        }

        while let Some(done) = in_flight.next().await {
            completed.push(done?);
        }

        completed.sort_by_key(|it: &s3_api::CompletedPart| it.part_number);
        debug!("Uploaded {} parts of '{}'", completed.len(), key);

        Ok((completed, len))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i64,
        body: Bytes,
    ) -> Result<s3_api::CompletedPart, Error> {
        let part = s3_api::UploadPartRequest {
            content_length: Some(body.len() as i64),
            body: Some(body.to_vec().into()),
            bucket: self.bucket_name.clone(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            part_number,
            ..Default::default()
        };

        let res = self
            .client
            .upload_part(part)
            .await
            .storage_err(format!("Upload part {} of '{}' failed", part_number, key))?;

        Ok(s3_api::CompletedPart {
            e_tag: res.e_tag,
            part_number: Some(part_number),
            ..Default::default()
        })
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: String) {
        let abort = s3_api::AbortMultipartUploadRequest {
            bucket: self.bucket_name.clone(),
            key: key.to_string(),
            upload_id,
            ..Default::default()
        };

        if let Err(err) = self.client.abort_multipart_upload(abort).await {
            warn!("Cannot abort multipart upload of '{}': {}", key, err);
        }
    }
}

#[async_trait]
impl Backend for S3 {
    async fn put(&self, key: &str, body: Body) -> Result<usize, Error> {
        let key = self.key_prefixed(key);
        let mut parts = Parts::new(body, CHUNK_SIZE);

        let first = parts
            .next_part()
            .await
            .storage_err("Read upload body failed")?
            .unwrap_or_default();

        match parts.next_part().await.storage_err("Read upload body failed")? {
            None => self.put_object(key, first).await,
            Some(second) => self.multipart_upload(key, first, second, &mut parts).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Body, Error> {
        let get_object = s3_api::GetObjectRequest {
            bucket: self.bucket_name.clone(),
            key: self.key_prefixed(key),
            ..Default::default()
        };

        let resp = match self.client.get_object(get_object).await {
            Ok(ok) => ok,
            Err(RusotoError::Service(s3_api::GetObjectError::NoSuchKey(_))) => {
                return Err(Error::not_found(key))
            }
            Err(RusotoError::Unknown(ref resp)) if resp.status.as_u16() == 404 => {
                return Err(Error::not_found(key))
            }
            Err(err) => return Err(Error::storage_with(format!("Get object '{}' failed", key))(err)),
        };

        let body = resp.body.ok_or_else(|| Error::storage("body must be"))?;
        Ok(Box::pin(body))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, Error> {
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let list_objects = s3_api::ListObjectsV2Request {
                bucket: self.bucket_name.clone(),
                prefix: Some(self.key_prefixed(prefix)),
                continuation_token: continuation_token.take(),
                ..Default::default()
            };

            let resp = self
                .client
                .list_objects_v2(list_objects)
                .await
                .storage_err(format!("List objects '{}' failed", prefix))?;

            for object in resp.contents.unwrap_or_default() {
                if let Some(key) = object.key {
                    objects.push(ObjectSummary {
                        key: self.key_unprefixed(key),
                        last_modified: object.last_modified,
                    });
                }
            }

            match (resp.is_truncated, resp.next_continuation_token) {
                (Some(true), Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }
}

impl Display for S3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}://{}", S3_URI_SCHEME, self.bucket_name)?;

        if let Some(prefix) = &self.key_prefix {
            write!(f, "/{}", prefix)?;
        };

        match &self.region {
            Region::Custom { name, endpoint } => {
                write!(f, "?{}={}&{}={}", REGION_QUERY_KEY, name, ENDPOINT_QUERY_KEY, endpoint)
            }
            region => write!(f, "?{}={}", REGION_QUERY_KEY, region.name()),
        }
    }
}

impl Debug for S3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("S3")
            .field("bucket_name", &self.bucket_name)
            .field("key_prefix", &self.key_prefix)
            .field("region", &self.region)
            .finish()
    }
}

/// Re-chunks a body into parts of `part_size` bytes, the last one shorter.
struct Parts {
    body: Body,
    pending: BytesMut,
    part_size: usize,
    done: bool,
}

impl Parts {
    fn new(body: Body, part_size: usize) -> Self {
        Parts {
            body,
            pending: BytesMut::new(),
            part_size,
            done: false,
        }
    }

    async fn next_part(&mut self) -> Result<Option<Bytes>, io::Error> {
        while !self.done && self.pending.len() < self.part_size {
            match self.body.try_next().await? {
                Some(chunk) => self.pending.extend_from_slice(&chunk),
                None => self.done = true,
            }
        }

        if self.pending.is_empty() {
            return Ok(None);
        }

        let len = self.pending.len().min(self.part_size);
        Ok(Some(self.pending.split_to(len).freeze()))
    }
}
