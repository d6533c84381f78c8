//! Per-bucket coordination between uploads and bucket deletion.
//!
//! The mutex only guards the counters; it is never held across an await, so
//! backend round trips happen outside any lock. A bucket cannot be marked as
//! deleting while uploads hold leases, and no lease is granted while it is.

use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

#[derive(Default, Debug)]
struct Activity {
    writers: usize,
    deleting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contention {
    /// Uploads are in flight.
    Writers,
    /// Another request is deleting the bucket.
    Deleting,
}

#[derive(Default, Debug)]
pub struct BucketActivity {
    buckets: Mutex<HashMap<String, Activity>>,
}

impl BucketActivity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn begin_write(self: &Arc<Self>, bucket_id: &str) -> Result<WriteLease, Contention> {
        let mut buckets = self.buckets.lock();
        let entry = buckets.entry(bucket_id.to_string()).or_default();
        if entry.deleting {
            return Err(Contention::Deleting);
        }
        entry.writers += 1;
        Ok(WriteLease {
            activity: Arc::clone(self),
            bucket_id: bucket_id.to_string(),
        })
    }

    pub fn begin_delete(self: &Arc<Self>, bucket_id: &str) -> Result<DeleteGuard, Contention> {
        let mut buckets = self.buckets.lock();
        let entry = buckets.entry(bucket_id.to_string()).or_default();
        if entry.deleting {
            return Err(Contention::Deleting);
        }
        if entry.writers > 0 {
            return Err(Contention::Writers);
        }
        entry.deleting = true;
        Ok(DeleteGuard {
            activity: Arc::clone(self),
            bucket_id: bucket_id.to_string(),
        })
    }

    fn release(&self, bucket_id: &str, update: impl FnOnce(&mut Activity)) {
        let mut buckets = self.buckets.lock();
        if let Some(entry) = buckets.get_mut(bucket_id) {
            update(entry);
            if entry.writers == 0 && !entry.deleting {
                buckets.remove(bucket_id);
            }
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.buckets.lock().len()
    }
}

/// Held by an upload for its whole duration.
#[derive(Debug)]
pub struct WriteLease {
    activity: Arc<BucketActivity>,
    bucket_id: String,
}

impl Drop for WriteLease {
    fn drop(&mut self) {
        self.activity
            .release(&self.bucket_id, |entry| entry.writers = entry.writers.saturating_sub(1));
    }
}

/// Held by a bucket delete from the emptiness check until the row is gone.
#[derive(Debug)]
pub struct DeleteGuard {
    activity: Arc<BucketActivity>,
    bucket_id: String,
}

impl Drop for DeleteGuard {
    fn drop(&mut self) {
        self.activity
            .release(&self.bucket_id, |entry| entry.deleting = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_waits_for_writers() {
        let activity = BucketActivity::new();
        let lease = activity.begin_write("b").expect("lease");
        assert_eq!(activity.begin_delete("b").unwrap_err(), Contention::Writers);
        drop(lease);

        let guard = activity.begin_delete("b").expect("delete guard");
        assert_eq!(activity.begin_write("b").unwrap_err(), Contention::Deleting);
        assert_eq!(activity.begin_delete("b").unwrap_err(), Contention::Deleting);
        drop(guard);

        assert!(activity.begin_write("b").is_ok());
    }

    #[test]
    fn buckets_are_independent_and_entries_are_released() {
        let activity = BucketActivity::new();
        let _lease = activity.begin_write("a").expect("lease");
        let guard = activity.begin_delete("b").expect("other bucket deletable");
        assert_eq!(activity.tracked(), 2);
        drop(guard);
        drop(_lease);
        assert_eq!(activity.tracked(), 0);
    }
}
