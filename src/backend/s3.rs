//! S3-compatible backend built on the AWS SDK.
//!
//! Every gateway bucket maps to a key prefix inside one physical bucket:
//! `{prefix/}{bucket_id}/{key}`.

use super::{BackendError, BackendResult, StorageBackend};
use crate::models::object::{
    DEFAULT_CACHE_CONTROL, DEFAULT_MIMETYPE, ObjectMetadata, ObjectPage, Preconditions,
    StoredObject, Validators,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region, http::HttpResponse},
    error::{DisplayErrorContext, SdkError},
    primitives::{ByteStream, DateTime as AwsDateTime},
    types::{Delete, ObjectIdentifier},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub force_path_style: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Backend {
    pub async fn connect(settings: &S3Settings) -> anyhow::Result<Self> {
        if settings.bucket.is_empty() {
            anyhow::bail!("S3 backend requires a bucket name");
        }

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);

        if let (Some(access_key), Some(secret_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            builder = builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "storage-gateway",
            ));
        }
        if let Some(endpoint) = &settings.endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint);
            builder = builder.endpoint_url(endpoint);
        }
        if settings.force_path_style || settings.endpoint.is_some() {
            builder = builder.force_path_style(true);
        }

        info!("S3 backend targeting bucket {}", settings.bucket);
        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
            prefix: settings
                .prefix
                .as_deref()
                .map(|p| p.trim_matches('/'))
                .filter(|p| !p.is_empty())
                .map(|p| format!("{p}/"))
                .unwrap_or_default(),
        })
    }

    fn bucket_prefix(&self, bucket: &str) -> String {
        format!("{}{}/", self.prefix, bucket)
    }

    fn object_key(&self, bucket: &str, key: &str) -> String {
        format!("{}{}", self.bucket_prefix(bucket), key)
    }
}

fn to_aws_time(value: &DateTime<Utc>) -> AwsDateTime {
    AwsDateTime::from_secs(value.timestamp())
}

fn from_aws_time(value: Option<&AwsDateTime>) -> DateTime<Utc> {
    value
        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or_else(Utc::now)
}

fn build_metadata(
    size: Option<i64>,
    mimetype: Option<&str>,
    e_tag: Option<&str>,
    last_modified: Option<&AwsDateTime>,
    cache_control: Option<&str>,
) -> ObjectMetadata {
    let size = size.and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
    ObjectMetadata {
        size,
        mimetype: mimetype.unwrap_or(DEFAULT_MIMETYPE).to_string(),
        e_tag: e_tag.unwrap_or_default().to_string(),
        last_modified: from_aws_time(last_modified),
        cache_control: cache_control.unwrap_or(DEFAULT_CACHE_CONTROL).to_string(),
        content_length: size,
        http_status_code: 200,
    }
}

/// Translate SDK failures by the HTTP status of the raw response.
fn map_sdk_error<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: &str) -> BackendError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if let Some(response) = err.raw_response() {
        match response.status().as_u16() {
            304 => {
                let headers = response.headers();
                return BackendError::NotModified(Validators {
                    e_tag: headers.get("etag").map(str::to_string),
                    last_modified: headers
                        .get("last-modified")
                        .and_then(|v| httpdate::parse_http_date(v).ok())
                        .map(DateTime::<Utc>::from),
                });
            }
            404 => return BackendError::not_found(bucket, key),
            412 => return BackendError::PreconditionFailed,
            _ => {}
        }
    }
    BackendError::Request(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&str>,
        preconditions: &Preconditions,
    ) -> BackendResult<StoredObject> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(bucket, key))
            .set_version_id(version.map(str::to_string))
            .set_if_match(preconditions.if_match.clone())
            .set_if_none_match(preconditions.if_none_match.clone())
            .set_if_modified_since(preconditions.if_modified_since.as_ref().map(to_aws_time))
            .set_if_unmodified_since(preconditions.if_unmodified_since.as_ref().map(to_aws_time))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket, key))?;

        let metadata = build_metadata(
            output.content_length(),
            output.content_type(),
            output.e_tag(),
            output.last_modified(),
            output.cache_control(),
        );
        let reader = output.body.into_async_read();

        Ok(StoredObject {
            metadata,
            body: ReaderStream::new(reader).boxed(),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectMetadata> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(bucket, key))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket, key))?;

        Ok(build_metadata(
            output.content_length(),
            output.content_type(),
            output.e_tag(),
            output.last_modified(),
            output.cache_control(),
        ))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        cache_control: &str,
    ) -> BackendResult<ObjectMetadata> {
        let size = body.len() as u64;
        let local_etag = format!("\"{:x}\"", md5::compute(&body));
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(bucket, key))
            .content_type(content_type)
            .cache_control(cache_control)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket, key))?;

        Ok(ObjectMetadata {
            size,
            mimetype: content_type.to_string(),
            e_tag: output.e_tag().map(str::to_string).unwrap_or(local_etag),
            last_modified: Utc::now(),
            cache_control: cache_control.to_string(),
            content_length: size,
            http_status_code: 200,
        })
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> BackendResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let identifiers = keys
            .iter()
            .map(|key| {
                ObjectIdentifier::builder()
                    .key(self.object_key(bucket, key))
                    .build()
                    .map_err(|err| BackendError::Request(err.to_string()))
            })
            .collect::<BackendResult<Vec<_>>>()?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|err| BackendError::Request(err.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket, ""))?;

        let failed = output.errors().len();
        if failed > 0 {
            for error in output.errors() {
                warn!(
                    "S3 refused to delete {}: {}",
                    error.key().unwrap_or("?"),
                    error.message().unwrap_or("unknown error")
                );
            }
            return Err(BackendError::PartialDelete {
                failed,
                total: keys.len(),
            });
        }
        Ok(())
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
    ) -> BackendResult<ObjectMetadata> {
        let source = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(bucket, source_key))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket, source_key))?;

        let content_type = source.content_type().unwrap_or(DEFAULT_MIMETYPE).to_string();
        let cache_control = source.cache_control().unwrap_or(DEFAULT_CACHE_CONTROL).to_string();
        let data = source
            .body
            .collect()
            .await
            .map_err(|err| BackendError::Request(err.to_string()))?
            .into_bytes();

        self.put_object(bucket, destination_key, data, &content_type, &cache_control)
            .await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        limit: usize,
    ) -> BackendResult<ObjectPage> {
        let root = self.bucket_prefix(bucket);
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(format!("{root}{prefix}"))
            .set_start_after(continuation.map(|after| format!("{root}{after}")))
            .max_keys(i32::try_from(limit).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket, prefix))?;

        let keys: Vec<String> = output
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .filter_map(|key| key.strip_prefix(root.as_str()))
            .map(str::to_string)
            .collect();
        let next_token = if output.is_truncated().unwrap_or(false) {
            keys.last().cloned()
        } else {
            None
        };
        Ok(ObjectPage { keys, next_token })
    }

    async fn health_check(&self) -> BackendResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, &self.bucket, ""))?;
        Ok(())
    }
}
