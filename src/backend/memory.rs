//! In-memory backend used by tests and local experiments.
//!
//! Behaves like a precondition-aware S3 endpoint by default and records every
//! `get_object` call so callers can assert on what was forwarded.

use super::{BackendError, BackendResult, StorageBackend};
use crate::{
    models::object::{ObjectMetadata, ObjectPage, Preconditions, StoredObject, Validators},
    services::conditional::{self, Outcome},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};

/// A recorded `get_object` invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct GetObjectCall {
    pub bucket: String,
    pub key: String,
    pub version: Option<String>,
    pub preconditions: Preconditions,
}

#[derive(Clone, Debug)]
struct MemoryObject {
    data: Bytes,
    metadata: ObjectMetadata,
}

#[derive(Debug)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<(String, String), MemoryObject>>,
    get_calls: Mutex<Vec<GetObjectCall>>,
    failing_keys: Mutex<HashSet<String>>,
    delete_batches: Mutex<usize>,
    honor_preconditions: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            get_calls: Mutex::new(Vec::new()),
            failing_keys: Mutex::new(HashSet::new()),
            delete_batches: Mutex::new(0),
            honor_preconditions: true,
        }
    }

    /// A backend that always returns the full object, leaving conditional
    /// evaluation to the caller.
    pub fn ignoring_preconditions() -> Self {
        Self {
            honor_preconditions: false,
            ..Self::new()
        }
    }

    pub fn get_calls(&self) -> Vec<GetObjectCall> {
        self.get_calls.lock().clone()
    }

    /// Make every future delete of `key` (in any bucket) fail.
    pub fn fail_deletes_for(&self, key: &str) {
        self.failing_keys.lock().insert(key.to_string());
    }

    pub fn delete_batches(&self) -> usize {
        *self.delete_batches.lock()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.objects
            .read()
            .keys()
            .filter(|(b, _)| b == bucket)
            .count()
    }

    fn lookup(&self, bucket: &str, key: &str) -> BackendResult<MemoryObject> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| BackendError::not_found(bucket, key))
    }

    fn store(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        cache_control: &str,
    ) -> ObjectMetadata {
        let size = data.len() as u64;
        let metadata = ObjectMetadata {
            size,
            mimetype: content_type.to_string(),
            e_tag: format!("\"{:x}\"", md5::compute(&data)),
            last_modified: Utc::now(),
            cache_control: cache_control.to_string(),
            content_length: size,
            http_status_code: 200,
        };
        self.objects.write().insert(
            (bucket.to_string(), key.to_string()),
            MemoryObject {
                data,
                metadata: metadata.clone(),
            },
        );
        metadata
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&str>,
        preconditions: &Preconditions,
    ) -> BackendResult<StoredObject> {
        self.get_calls.lock().push(GetObjectCall {
            bucket: bucket.to_string(),
            key: key.to_string(),
            version: version.map(str::to_string),
            preconditions: preconditions.clone(),
        });

        let object = self.lookup(bucket, key)?;
        if self.honor_preconditions {
            match conditional::evaluate(preconditions, &object.metadata) {
                Outcome::Serve => {}
                Outcome::NotModified => {
                    return Err(BackendError::NotModified(Validators::from(&object.metadata)));
                }
                Outcome::PreconditionFailed => return Err(BackendError::PreconditionFailed),
            }
        }

        let data = object.data;
        Ok(StoredObject {
            metadata: object.metadata,
            body: stream::once(async move { Ok::<_, std::io::Error>(data) }).boxed(),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectMetadata> {
        self.lookup(bucket, key).map(|object| object.metadata)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        cache_control: &str,
    ) -> BackendResult<ObjectMetadata> {
        Ok(self.store(bucket, key, body, content_type, cache_control))
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> BackendResult<()> {
        *self.delete_batches.lock() += 1;
        let failing = self.failing_keys.lock().clone();
        let mut objects = self.objects.write();
        let mut failed = 0;
        for key in keys {
            if failing.contains(key) {
                failed += 1;
                continue;
            }
            objects.remove(&(bucket.to_string(), key.clone()));
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
        let source = self.lookup(bucket, source_key)?;
        Ok(self.store(
            bucket,
            destination_key,
            source.data,
            &source.metadata.mimetype,
            &source.metadata.cache_control,
        ))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        limit: usize,
    ) -> BackendResult<ObjectPage> {
        let objects = self.objects.read();
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .filter(|(_, k)| continuation.is_none_or(|after| k.as_str() > after))
            .map(|(_, k)| k.clone())
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
}
