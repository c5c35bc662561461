//! Storage boundary for records and audit entries.
//!
//! The core holds no persistence of its own: everything goes through the
//! [`RecordRepository`] trait, injected at construction. The on-device SQL
//! adapter implements this trait outside this crate; [`MemoryRepository`]
//! is the in-process reference implementation used by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::RepositoryError;
use crate::models::{AuditRecord, ExerciseRecord, RecordMetadata};

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// Half-open time filter for history queries. `None` bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Whether `instant` falls inside this range.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        if let Some(from) = self.from {
            if instant < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if instant >= until {
                return false;
            }
        }
        true
    }
}

/// Partial update applied to a stored exercise record.
///
/// Unset fields are left untouched; `updated_at` is always bumped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub metadata: Option<RecordMetadata>,
}

impl RecordPatch {
    /// Whether the patch changes anything at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.start_time.is_none()
            && self.duration_minutes.is_none()
            && self.metadata.is_none()
    }

    /// Names of the fields this patch sets, for audit metadata.
    pub fn updated_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name".to_string());
        }
        if self.start_time.is_some() {
            fields.push("start_time".to_string());
        }
        if self.duration_minutes.is_some() {
            fields.push("duration_minutes".to_string());
        }
        if self.metadata.is_some() {
            fields.push("metadata".to_string());
        }
        fields
    }

    /// Produce the patched copy of `record` with `updated_at` bumped.
    pub fn apply_to(&self, record: &ExerciseRecord) -> ExerciseRecord {
        let mut updated = record.clone();
        if let Some(ref name) = self.name {
            updated.name = name.clone();
        }
        if let Some(start_time) = self.start_time {
            updated.start_time = start_time;
        }
        if let Some(duration) = self.duration_minutes {
            updated.duration_minutes = duration;
        }
        if let Some(ref metadata) = self.metadata {
            updated.metadata = metadata.clone();
        }
        updated.updated_at = Utc::now();
        updated
    }
}

// ---------------------------------------------------------------------------
// Repository trait
// ---------------------------------------------------------------------------

/// Persistence contract consumed by the core.
///
/// Implementations own all transactional behavior; the core issues
/// sequential awaited calls and treats count-then-trim sequences as
/// non-atomic.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Persist a record. Saving an existing id replaces the stored value.
    async fn save_exercise_record(&self, record: &ExerciseRecord) -> Result<(), RepositoryError>;

    /// All records whose start time falls in `range`, ordered by start time.
    async fn get_exercise_history(
        &self,
        range: Option<DateRange>,
    ) -> Result<Vec<ExerciseRecord>, RepositoryError>;

    async fn get_record_by_id(&self, id: &str)
        -> Result<Option<ExerciseRecord>, RepositoryError>;

    /// Apply a partial update to a stored record.
    async fn update_record(&self, id: &str, patch: &RecordPatch) -> Result<(), RepositoryError>;

    async fn delete_record(&self, id: &str) -> Result<(), RepositoryError>;

    async fn save_audit_record(&self, record: &AuditRecord) -> Result<(), RepositoryError>;

    /// Audit entries, newest-first, up to `limit` when given.
    async fn get_audit_trail(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, RepositoryError>;

    /// Trim the audit trail to the `max_records` most recent entries by
    /// timestamp. Returns the number of entries removed.
    async fn cleanup_old_audit_records(&self, max_records: usize)
        -> Result<usize, RepositoryError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryStore {
    records: HashMap<String, ExerciseRecord>,
    /// Kept newest-first by timestamp.
    audits: Vec<AuditRecord>,
}

/// In-memory [`RecordRepository`] for tests and embedding.
#[derive(Default)]
pub struct MemoryRepository {
    store: RwLock<MemoryStore>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordRepository for MemoryRepository {
    async fn save_exercise_record(&self, record: &ExerciseRecord) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        store.records.insert(record.id.clone(), record.clone());
        debug!(id = %record.id, "saved exercise record");
        Ok(())
    }

    async fn get_exercise_history(
        &self,
        range: Option<DateRange>,
    ) -> Result<Vec<ExerciseRecord>, RepositoryError> {
        let store = self.store.read().await;
        let mut records: Vec<ExerciseRecord> = store
            .records
            .values()
            .filter(|r| range.map_or(true, |range| range.contains(r.start_time)))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.start_time);
        Ok(records)
    }

    async fn get_record_by_id(
        &self,
        id: &str,
    ) -> Result<Option<ExerciseRecord>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.records.get(id).cloned())
    }

    async fn update_record(&self, id: &str, patch: &RecordPatch) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        let existing = store
            .records
            .get(id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "exercise record".into(),
                id: id.to_string(),
            })?;
        let updated = patch.apply_to(existing);
        store.records.insert(id.to_string(), updated);
        debug!(id, "updated exercise record");
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        store
            .records
            .remove(id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "exercise record".into(),
                id: id.to_string(),
            })?;
        debug!(id, "deleted exercise record");
        Ok(())
    }

    async fn save_audit_record(&self, record: &AuditRecord) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        // Insert keeping newest-first order; ties go after existing entries
        // so insertion order breaks them stably.
        let pos = store
            .audits
            .partition_point(|existing| existing.timestamp > record.timestamp);
        store.audits.insert(pos, record.clone());
        Ok(())
    }

    async fn get_audit_trail(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, RepositoryError> {
        let store = self.store.read().await;
        let take = limit.unwrap_or(store.audits.len());
        Ok(store.audits.iter().take(take).cloned().collect())
    }

    async fn cleanup_old_audit_records(
        &self,
        max_records: usize,
    ) -> Result<usize, RepositoryError> {
        let mut store = self.store.write().await;
        let before = store.audits.len();
        store.audits.truncate(max_records);
        let removed = before - store.audits.len();
        if removed > 0 {
            debug!(removed, kept = store.audits.len(), "trimmed audit trail");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, AuditMetadata};
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 7, 0, 0).unwrap()
    }

    fn audit(id: &str, timestamp: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id: id.to_string(),
            action: AuditAction::RecordCreated,
            timestamp,
            record_id: "r1".into(),
            before_data: None,
            after_data: None,
            metadata: AuditMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_save_and_get_record() {
        let repo = MemoryRepository::new();
        let rec = ExerciseRecord::manual("Run", start(), 30);
        repo.save_exercise_record(&rec).await.unwrap();

        let loaded = repo.get_record_by_id(&rec.id).await.unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert!(repo.get_record_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_range_filter() {
        let repo = MemoryRepository::new();
        for offset in [0, 60, 120] {
            let rec =
                ExerciseRecord::manual(format!("run-{offset}"), start() + Duration::minutes(offset), 30);
            repo.save_exercise_record(&rec).await.unwrap();
        }

        let all = repo.get_exercise_history(None).await.unwrap();
        assert_eq!(all.len(), 3);
        // Sorted by start time.
        assert!(all.windows(2).all(|w| w[0].start_time <= w[1].start_time));

        let range = DateRange {
            from: Some(start() + Duration::minutes(30)),
            until: Some(start() + Duration::minutes(90)),
        };
        let windowed = repo.get_exercise_history(Some(range)).await.unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].name, "run-60");
    }

    #[tokio::test]
    async fn test_update_patch() {
        let repo = MemoryRepository::new();
        let rec = ExerciseRecord::manual("Run", start(), 30);
        repo.save_exercise_record(&rec).await.unwrap();

        let patch = RecordPatch {
            duration_minutes: Some(45),
            ..Default::default()
        };
        assert_eq!(patch.updated_fields(), vec!["duration_minutes"]);
        repo.update_record(&rec.id, &patch).await.unwrap();

        let loaded = repo.get_record_by_id(&rec.id).await.unwrap().unwrap();
        assert_eq!(loaded.duration_minutes, 45);
        assert_eq!(loaded.name, "Run");
        assert!(loaded.updated_at >= rec.updated_at);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let repo = MemoryRepository::new();
        let patch = RecordPatch::default();
        let result = repo.update_record("missing", &patch).await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_record() {
        let repo = MemoryRepository::new();
        let rec = ExerciseRecord::manual("Run", start(), 30);
        repo.save_exercise_record(&rec).await.unwrap();
        repo.delete_record(&rec.id).await.unwrap();
        assert!(repo.get_record_by_id(&rec.id).await.unwrap().is_none());

        let result = repo.delete_record(&rec.id).await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_audit_trail_newest_first() {
        let repo = MemoryRepository::new();
        // Saved out of order on purpose.
        repo.save_audit_record(&audit("a1", start())).await.unwrap();
        repo.save_audit_record(&audit("a3", start() + Duration::minutes(20)))
            .await
            .unwrap();
        repo.save_audit_record(&audit("a2", start() + Duration::minutes(10)))
            .await
            .unwrap();

        let trail = repo.get_audit_trail(None).await.unwrap();
        let ids: Vec<&str> = trail.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a3", "a2", "a1"]);

        let limited = repo.get_audit_trail(Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, "a3");
    }

    #[tokio::test]
    async fn test_cleanup_keeps_most_recent() {
        let repo = MemoryRepository::new();
        for i in 0..10 {
            repo.save_audit_record(&audit(&format!("a{i}"), start() + Duration::minutes(i)))
                .await
                .unwrap();
        }

        let removed = repo.cleanup_old_audit_records(4).await.unwrap();
        assert_eq!(removed, 6);

        let trail = repo.get_audit_trail(None).await.unwrap();
        let ids: Vec<&str> = trail.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a9", "a8", "a7", "a6"]);
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(RecordPatch::default().is_empty());
        let patch = RecordPatch {
            name: Some("Row".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
