//! Local filesystem backend.
//!
//! Each object is a single file under `base_path/objects/{bucket}/{key}`: one
//! line of JSON metadata followed by the payload. Writes go to a temporary
//! file that is fsynced and renamed into place, so a reader always sees the
//! metadata and bytes of the same version.
//!
//! Bucket ids and key segments that are empty or start with `.` or `~` are
//! stored with a leading `~`, so no logical name can resolve to `.`, `..` or a
//! temporary file.

use super::{BackendError, BackendResult, StorageBackend};
use crate::{
    models::object::{ObjectMetadata, ObjectPage, Preconditions, StoredObject, Validators},
    services::conditional::{self, Outcome},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use std::{
    borrow::Cow,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

const TMP_PREFIX: &str = ".tmp-";
const ESCAPE: char = '~';

fn encode_segment(segment: &str) -> Cow<'_, str> {
    if segment.is_empty() || segment.starts_with('.') || segment.starts_with(ESCAPE) {
        Cow::Owned(format!("{ESCAPE}{segment}"))
    } else {
        Cow::Borrowed(segment)
    }
}

fn decode_segment(name: &str) -> &str {
    name.strip_prefix(ESCAPE).unwrap_or(name)
}

fn invalid_data(reason: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, reason.to_string())
}

#[derive(Debug, Clone)]
pub struct FileBackend {
    base_path: PathBuf,
}

impl FileBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.base_path
            .join("objects")
            .join(encode_segment(bucket).as_ref())
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        key.split('/').fold(self.bucket_root(bucket), |path, segment| {
            path.join(encode_segment(segment).as_ref())
        })
    }

    /// Open an object and parse its metadata line, leaving the reader at the
    /// first payload byte.
    async fn open_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> BackendResult<(ObjectMetadata, BufReader<File>)> {
        let file = match File::open(self.object_path(bucket, key)).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BackendError::not_found(bucket, key));
            }
            Err(err) => return Err(err.into()),
        };
        if file.metadata().await?.is_dir() {
            return Err(BackendError::not_found(bucket, key));
        }

        let mut reader = BufReader::new(file);
        let mut header = Vec::new();
        reader.read_until(b'\n', &mut header).await?;
        if header.pop() != Some(b'\n') {
            return Err(invalid_data("object metadata line is truncated").into());
        }
        let metadata = serde_json::from_slice(&header)
            .map_err(|err| io::Error::new(ErrorKind::InvalidData, err))?;
        Ok((metadata, reader))
    }

    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
        payload: &[u8],
    ) -> BackendResult<()> {
        let mut header = serde_json::to_vec(metadata)
            .map_err(|err| io::Error::new(ErrorKind::InvalidData, err))?;
        header.push(b'\n');
        write_atomically(&self.object_path(bucket, key), &[&header, payload]).await?;
        Ok(())
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> io::Result<()> {
        let path = self.object_path(bucket, key);
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        if let Some(parent) = path.parent() {
            prune_empty_dirs(parent, &self.bucket_root(bucket)).await;
        }
        Ok(())
    }

    /// Collect every key under a bucket, sorted.
    async fn all_keys(&self, bucket: &str) -> io::Result<Vec<String>> {
        let root = self.bucket_root(bucket);
        let mut keys = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&root) {
                    let key = relative
                        .components()
                        .map(|c| decode_segment(&c.as_os_str().to_string_lossy()).to_string())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        _version: Option<&str>,
        preconditions: &Preconditions,
    ) -> BackendResult<StoredObject> {
        let (metadata, reader) = self.open_object(bucket, key).await?;
        match conditional::evaluate(preconditions, &metadata) {
            Outcome::Serve => {}
            Outcome::NotModified => {
                return Err(BackendError::NotModified(Validators::from(&metadata)));
            }
            Outcome::PreconditionFailed => return Err(BackendError::PreconditionFailed),
        }

        Ok(StoredObject {
            metadata,
            body: ReaderStream::new(reader).boxed(),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectMetadata> {
        let (metadata, _) = self.open_object(bucket, key).await?;
        Ok(metadata)
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
        let metadata = ObjectMetadata {
            size,
            mimetype: content_type.to_string(),
            e_tag: format!("\"{:x}\"", md5::compute(&body)),
            last_modified: Utc::now(),
            cache_control: cache_control.to_string(),
            content_length: size,
            http_status_code: 200,
        };
        self.write_object(bucket, key, &metadata, &body).await?;
        Ok(metadata)
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> BackendResult<()> {
        let mut failed = 0;
        for key in keys {
            if let Err(err) = self.remove_object(bucket, key).await {
                warn!("failed to delete {bucket}/{key}: {err}");
                failed += 1;
            }
        }
        if failed > 0 {
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
        let (source, mut reader) = self.open_object(bucket, source_key).await?;
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).await?;

        let metadata = ObjectMetadata {
            last_modified: Utc::now(),
            ..source
        };
        self.write_object(bucket, destination_key, &metadata, &payload).await?;
        Ok(metadata)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        limit: usize,
    ) -> BackendResult<ObjectPage> {
        let mut keys: Vec<String> = self
            .all_keys(bucket)
            .await?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| continuation.is_none_or(|after| k.as_str() > after))
            .take(limit.saturating_add(1))
            .collect();

        let next_token = if keys.len() > limit {
            keys.truncate(limit);
            keys.last().cloned()
        } else {
            None
        };
        Ok(ObjectPage { keys, next_token })
    }

    /// Write, read back and delete a probe file under the base path.
    async fn health_check(&self) -> BackendResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let probe = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        let bytes = fs::read(&probe).await;
        let _ = fs::remove_file(&probe).await;
        if bytes? != b"readyz" {
            return Err(BackendError::Request("disk probe content mismatch".into()));
        }
        Ok(())
    }
}

/// Write `parts` to a temporary sibling, fsync it and rename it over `path`.
async fn write_atomically(path: &Path, parts: &[&[u8]]) -> io::Result<()> {
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
    fs::create_dir_all(&parent).await?;
    let tmp_path = parent.join(format!("{TMP_PREFIX}{}", Uuid::new_v4()));

    let result = async {
        let mut file = File::create(&tmp_path).await?;
        for part in parts {
            file.write_all(part).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        fs::rename(&tmp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }
    result
}

/// Recursively remove empty directories up to (not including) `stop`.
async fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(stop) && current != stop {
        match fs::remove_dir(&current).await {
            Ok(_) => match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            },
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
            Err(err) => {
                debug!("failed to prune directory {}: {}", current.display(), err);
                break;
            }
        }
    }
}
