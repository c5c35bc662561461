//! Audit-trail management.
//!
//! Every mutation the core performs lands here as an [`AuditRecord`]:
//! creations, updates, deletions, conflict resolutions, undos, and bulk
//! operations. The manager enforces a rolling cap on stored entries and
//! offers a time-boxed, single-use undo over recent operations.
//!
//! The "already undone" check scans the stored trail for a back-reference
//! (`metadata.original_audit_id`), which is O(n) per check against the
//! capped trail. A derived original-id -> undo-id index would remove the
//! scan if the cap ever grows.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AuditSettings;
use crate::errors::RepositoryError;
use crate::models::{
    AuditAction, AuditMetadata, AuditRecord, ConflictResolution, ExerciseRecord,
};
use crate::repository::RecordRepository;

// ---------------------------------------------------------------------------
// Query & outcome types
// ---------------------------------------------------------------------------

/// Composable filters for reading the audit trail.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    pub record_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Snapshot of audit-trail health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total_records: usize,
    /// Operations currently eligible for undo.
    pub undoable_operations: usize,
    /// Undo records appended in the last 24 hours.
    pub undos_last_24h: usize,
    /// Timestamp of the oldest still-undoable operation.
    pub oldest_undoable: Option<DateTime<Utc>>,
    /// `total_records / max_records`.
    pub storage_utilization: f64,
}

/// Whether an operation can be undone, with the reason when it cannot.
#[derive(Debug, Clone)]
pub struct UndoEligibility {
    pub can_undo: bool,
    pub reason: Option<String>,
}

impl UndoEligibility {
    fn no(reason: impl Into<String>) -> Self {
        Self {
            can_undo: false,
            reason: Some(reason.into()),
        }
    }

    fn yes() -> Self {
        Self {
            can_undo: true,
            reason: None,
        }
    }
}

/// Result of an undo attempt. Ineligibility is reported, never thrown.
#[derive(Debug, Clone)]
pub struct UndoOutcome {
    pub success: bool,
    pub reason: Option<String>,
    /// The undo audit record appended on success.
    pub undo_audit: Option<AuditRecord>,
}

impl UndoOutcome {
    fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            undo_audit: None,
        }
    }

    fn applied(undo_audit: AuditRecord) -> Self {
        Self {
            success: true,
            reason: None,
            undo_audit: Some(undo_audit),
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Records every mutation, enforces the rolling cap, and provides
/// time-boxed single-use undo.
#[derive(Clone)]
pub struct AuditTrailManager {
    repository: Arc<dyn RecordRepository>,
    settings: AuditSettings,
}

impl AuditTrailManager {
    pub fn new(repository: Arc<dyn RecordRepository>, settings: AuditSettings) -> Self {
        if let Some(days) = settings.retention_days {
            debug!(
                retention_days = days,
                "retention_days is configured but age-based expiry is not wired; \
                 the rolling cap is the authoritative cleanup mechanism"
            );
        }
        Self {
            repository,
            settings,
        }
    }

    // -- append methods -----------------------------------------------------

    /// Log the creation of a record.
    pub async fn record_created(
        &self,
        record: &ExerciseRecord,
    ) -> Result<AuditRecord, RepositoryError> {
        let audit = AuditRecord {
            id: audit_id("create"),
            action: AuditAction::RecordCreated,
            timestamp: Utc::now(),
            record_id: record.id.clone(),
            before_data: None,
            after_data: Some(snapshot(record)),
            metadata: AuditMetadata {
                source: Some(record.source),
                platform: record.platform,
                ..Default::default()
            },
        };
        self.append(audit).await
    }

    /// Log an update, with before/after snapshots and the changed fields.
    pub async fn record_updated(
        &self,
        before: &ExerciseRecord,
        after: &ExerciseRecord,
        updated_fields: &[String],
    ) -> Result<AuditRecord, RepositoryError> {
        let audit = AuditRecord {
            id: audit_id("update"),
            action: AuditAction::RecordUpdated,
            timestamp: Utc::now(),
            record_id: after.id.clone(),
            before_data: Some(snapshot(before)),
            after_data: Some(snapshot(after)),
            metadata: AuditMetadata {
                source: Some(after.source),
                platform: after.platform,
                updated_fields: updated_fields.to_vec(),
                ..Default::default()
            },
        };
        self.append(audit).await
    }

    /// Log the deletion of a record, keeping its full last state.
    pub async fn record_deleted(
        &self,
        record: &ExerciseRecord,
    ) -> Result<AuditRecord, RepositoryError> {
        let audit = AuditRecord {
            id: audit_id("delete"),
            action: AuditAction::RecordDeleted,
            timestamp: Utc::now(),
            record_id: record.id.clone(),
            before_data: Some(snapshot(record)),
            after_data: None,
            metadata: AuditMetadata {
                source: Some(record.source),
                platform: record.platform,
                ..Default::default()
            },
        };
        self.append(audit).await
    }

    /// Log a conflict resolution. The full [`ConflictResolution`] rides in
    /// `after_data`; this audit record is its only persistence.
    pub async fn conflict_resolved(
        &self,
        resolution: &ConflictResolution,
    ) -> Result<AuditRecord, RepositoryError> {
        let audit = AuditRecord {
            id: audit_id("resolve"),
            action: AuditAction::ConflictResolved,
            timestamp: Utc::now(),
            record_id: resolution.conflict_id.clone(),
            before_data: Some(snapshot(&resolution.before_state)),
            after_data: Some(snapshot(resolution)),
            metadata: AuditMetadata {
                details: Some(format!("resolved with {}", resolution.choice)),
                ..Default::default()
            },
        };
        self.append(audit).await
    }

    /// Log a batch operation (one entry per ingest cycle).
    pub async fn bulk_operation(
        &self,
        details: &str,
        record_ids: &[String],
    ) -> Result<AuditRecord, RepositoryError> {
        let audit = AuditRecord {
            id: audit_id("bulk"),
            action: AuditAction::BulkOperation,
            timestamp: Utc::now(),
            record_id: "bulk".to_string(),
            before_data: None,
            after_data: Some(serde_json::json!({ "record_ids": record_ids })),
            metadata: AuditMetadata {
                details: Some(details.to_string()),
                ..Default::default()
            },
        };
        self.append(audit).await
    }

    /// Persist an audit record, then run the rolling-cap check.
    async fn append(&self, audit: AuditRecord) -> Result<AuditRecord, RepositoryError> {
        self.repository.save_audit_record(&audit).await?;
        debug!(id = %audit.id, action = %audit.action, "appended audit record");
        self.maybe_cleanup().await?;
        Ok(audit)
    }

    /// Trim the trail once it reaches the cleanup threshold.
    ///
    /// Count and trim are separate repository calls; concurrent appends can
    /// interleave, so the sequence is best-effort rather than atomic.
    async fn maybe_cleanup(&self) -> Result<(), RepositoryError> {
        let total = self.repository.get_audit_trail(None).await?.len();
        if total >= self.settings.cleanup_threshold {
            let removed = self
                .repository
                .cleanup_old_audit_records(self.settings.max_records)
                .await?;
            info!(
                removed,
                kept = self.settings.max_records,
                "audit trail trimmed to rolling cap"
            );
        }
        Ok(())
    }

    // -- queries ------------------------------------------------------------

    /// Read the trail newest-first, applying the query's filters and limit.
    pub async fn get_audit_trail(
        &self,
        query: &AuditQuery,
    ) -> Result<Vec<AuditRecord>, RepositoryError> {
        let trail = self.repository.get_audit_trail(None).await?;
        let filtered: Vec<AuditRecord> = trail
            .into_iter()
            .filter(|a| query.action.map_or(true, |action| a.action == action))
            .filter(|a| {
                query
                    .record_id
                    .as_deref()
                    .map_or(true, |id| a.record_id == id)
            })
            .filter(|a| query.from.map_or(true, |from| a.timestamp >= from))
            .filter(|a| query.until.map_or(true, |until| a.timestamp <= until))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(filtered)
    }

    /// Conflict resolutions still eligible for undo within `max_age_hours`.
    pub async fn get_undoable_operations(
        &self,
        max_age_hours: i64,
    ) -> Result<Vec<AuditRecord>, RepositoryError> {
        let trail = self.repository.get_audit_trail(None).await?;
        let undone = undone_ids(&trail);
        let cutoff = Utc::now() - Duration::hours(max_age_hours);

        Ok(trail
            .iter()
            .filter(|a| a.action == AuditAction::ConflictResolved)
            .filter(|a| !a.is_undo())
            .filter(|a| a.timestamp >= cutoff)
            .filter(|a| !undone.contains(a.id.as_str()))
            .cloned()
            .collect())
    }

    /// Aggregate trail statistics.
    pub async fn management_statistics(&self) -> Result<AuditStatistics, RepositoryError> {
        let trail = self.repository.get_audit_trail(None).await?;
        let undone = undone_ids(&trail);
        let now = Utc::now();
        let window = Duration::hours(self.settings.undo_window_hours);

        let undoable: Vec<&AuditRecord> = trail
            .iter()
            .filter(|a| is_undoable_action(a.action))
            .filter(|a| !a.is_undo())
            .filter(|a| now - a.timestamp <= window)
            .filter(|a| !undone.contains(a.id.as_str()))
            .collect();

        let undos_last_24h = trail
            .iter()
            .filter(|a| a.is_undo())
            .filter(|a| now - a.timestamp <= Duration::hours(24))
            .count();

        Ok(AuditStatistics {
            total_records: trail.len(),
            undoable_operations: undoable.len(),
            undos_last_24h,
            oldest_undoable: undoable.iter().map(|a| a.timestamp).min(),
            storage_utilization: trail.len() as f64 / self.settings.max_records as f64,
        })
    }

    /// Integrity check: required fields, newest-first ordering, unique ids.
    /// Returns the list of violations instead of failing on the first.
    pub async fn validate_audit_trail(&self) -> Result<Vec<String>, RepositoryError> {
        let trail = self.repository.get_audit_trail(None).await?;
        let mut violations = Vec::new();
        let mut seen_ids = HashSet::new();

        for (index, audit) in trail.iter().enumerate() {
            if audit.id.is_empty() {
                violations.push(format!("audit record at position {index} has an empty id"));
            }
            if audit.record_id.is_empty() {
                violations.push(format!("audit record '{}' has an empty record_id", audit.id));
            }
            if !seen_ids.insert(audit.id.as_str()) {
                violations.push(format!("duplicate audit id: {}", audit.id));
            }
            if index > 0 && trail[index - 1].timestamp < audit.timestamp {
                violations.push(format!(
                    "audit trail is not ordered newest-first at position {index}"
                ));
            }
        }

        if !violations.is_empty() {
            warn!(count = violations.len(), "audit trail failed validation");
        }
        Ok(violations)
    }

    // -- undo ---------------------------------------------------------------

    /// Whether the operation behind `audit_id` can currently be undone.
    pub async fn can_undo_operation(
        &self,
        audit_id: &str,
    ) -> Result<UndoEligibility, RepositoryError> {
        let trail = self.repository.get_audit_trail(None).await?;
        Ok(eligibility(
            &trail,
            audit_id,
            self.settings.undo_window_hours,
        ))
    }

    /// Undo a record create/update/delete by applying its inverse and
    /// appending a back-referencing audit record.
    ///
    /// A `ConflictResolved` id is forwarded to
    /// [`undo_conflict_resolution`](Self::undo_conflict_resolution).
    pub async fn undo_record_operation(
        &self,
        audit_id: &str,
    ) -> Result<UndoOutcome, RepositoryError> {
        let trail = self.repository.get_audit_trail(None).await?;
        let check = eligibility(&trail, audit_id, self.settings.undo_window_hours);
        if !check.can_undo {
            return Ok(UndoOutcome::failure(
                check.reason.unwrap_or_else(|| "operation cannot be undone".into()),
            ));
        }
        // Eligibility guarantees presence.
        let Some(original) = trail.iter().find(|a| a.id == audit_id).cloned() else {
            return Ok(UndoOutcome::failure(format!(
                "audit record not found: {audit_id}"
            )));
        };

        match original.action {
            AuditAction::RecordCreated => self.undo_creation(&original).await,
            AuditAction::RecordUpdated => self.undo_update(&original).await,
            AuditAction::RecordDeleted => self.undo_deletion(&original).await,
            AuditAction::ConflictResolved => self.undo_resolution(&original).await,
            _ => Ok(UndoOutcome::failure(format!(
                "action {} cannot be undone",
                original.action
            ))),
        }
    }

    /// Undo a conflict resolution: restore the before-state records, remove
    /// a merged record, and append the `ResolutionUndone` audit.
    pub async fn undo_conflict_resolution(
        &self,
        audit_id: &str,
    ) -> Result<UndoOutcome, RepositoryError> {
        let trail = self.repository.get_audit_trail(None).await?;
        let check = eligibility(&trail, audit_id, self.settings.undo_window_hours);
        if !check.can_undo {
            return Ok(UndoOutcome::failure(
                check.reason.unwrap_or_else(|| "operation cannot be undone".into()),
            ));
        }
        let Some(original) = trail.iter().find(|a| a.id == audit_id).cloned() else {
            return Ok(UndoOutcome::failure(format!(
                "audit record not found: {audit_id}"
            )));
        };
        if original.action != AuditAction::ConflictResolved {
            return Ok(UndoOutcome::failure(
                "audit record is not a conflict resolution",
            ));
        }
        self.undo_resolution(&original).await
    }

    /// Inverse of a creation: delete the record again.
    async fn undo_creation(&self, original: &AuditRecord) -> Result<UndoOutcome, RepositoryError> {
        if self
            .repository
            .get_record_by_id(&original.record_id)
            .await?
            .is_none()
        {
            return Ok(UndoOutcome::failure(format!(
                "record no longer exists: {}",
                original.record_id
            )));
        }
        self.repository.delete_record(&original.record_id).await?;

        let undo = AuditRecord {
            id: audit_id("undo"),
            action: AuditAction::RecordDeleted,
            timestamp: Utc::now(),
            record_id: original.record_id.clone(),
            before_data: original.after_data.clone(),
            after_data: None,
            metadata: AuditMetadata {
                original_audit_id: Some(original.id.clone()),
                details: Some("undo of record creation".into()),
                ..Default::default()
            },
        };
        let undo = self.append(undo).await?;
        info!(original = %original.id, undo = %undo.id, "record creation undone");
        Ok(UndoOutcome::applied(undo))
    }

    /// Inverse of an update: restore the before-state.
    async fn undo_update(&self, original: &AuditRecord) -> Result<UndoOutcome, RepositoryError> {
        let Some(before) = decode_record(original.before_data.as_ref()) else {
            return Ok(UndoOutcome::failure(format!(
                "stored snapshot for {} could not be decoded",
                original.id
            )));
        };
        self.repository.save_exercise_record(&before).await?;

        let undo = AuditRecord {
            id: audit_id("undo"),
            action: AuditAction::RecordUpdated,
            timestamp: Utc::now(),
            record_id: original.record_id.clone(),
            before_data: original.after_data.clone(),
            after_data: original.before_data.clone(),
            metadata: AuditMetadata {
                updated_fields: original.metadata.updated_fields.clone(),
                original_audit_id: Some(original.id.clone()),
                details: Some("undo of record update".into()),
                ..Default::default()
            },
        };
        let undo = self.append(undo).await?;
        info!(original = %original.id, undo = %undo.id, "record update undone");
        Ok(UndoOutcome::applied(undo))
    }

    /// Inverse of a deletion: re-create the record from its snapshot.
    async fn undo_deletion(&self, original: &AuditRecord) -> Result<UndoOutcome, RepositoryError> {
        let Some(before) = decode_record(original.before_data.as_ref()) else {
            return Ok(UndoOutcome::failure(format!(
                "stored snapshot for {} could not be decoded",
                original.id
            )));
        };
        self.repository.save_exercise_record(&before).await?;

        let undo = AuditRecord {
            id: audit_id("undo"),
            action: AuditAction::RecordCreated,
            timestamp: Utc::now(),
            record_id: original.record_id.clone(),
            before_data: None,
            after_data: original.before_data.clone(),
            metadata: AuditMetadata {
                original_audit_id: Some(original.id.clone()),
                details: Some("undo of record deletion".into()),
                ..Default::default()
            },
        };
        let undo = self.append(undo).await?;
        info!(original = %original.id, undo = %undo.id, "record deletion undone");
        Ok(UndoOutcome::applied(undo))
    }

    /// Inverse of a resolution: put the before-state back.
    async fn undo_resolution(&self, original: &AuditRecord) -> Result<UndoOutcome, RepositoryError> {
        let resolution: ConflictResolution = match original
            .after_data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
        {
            Some(resolution) => resolution,
            None => {
                return Ok(UndoOutcome::failure(format!(
                    "stored resolution for {} could not be decoded",
                    original.id
                )))
            }
        };

        // Re-create whichever originals the resolution removed.
        for record in [
            resolution.before_state.manual_record.as_ref(),
            resolution.before_state.synced_record.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            if self.repository.get_record_by_id(&record.id).await?.is_none() {
                self.repository.save_exercise_record(record).await?;
            }
        }
        // Remove a synthesized merged record.
        if let Some(merged) = resolution.after_state.merged_record.as_ref() {
            if self.repository.get_record_by_id(&merged.id).await?.is_some() {
                self.repository.delete_record(&merged.id).await?;
            }
        }

        let undo = AuditRecord {
            id: audit_id("undo"),
            action: AuditAction::ResolutionUndone,
            timestamp: Utc::now(),
            record_id: resolution.conflict_id.clone(),
            // Carries the original audit record so the undone resolution
            // remains identifiable by id.
            before_data: Some(snapshot(original)),
            after_data: Some(snapshot(&resolution.before_state)),
            metadata: AuditMetadata {
                original_audit_id: Some(original.id.clone()),
                details: Some(format!("undo of resolution {}", resolution.id)),
                ..Default::default()
            },
        };
        let undo = self.append(undo).await?;
        info!(original = %original.id, undo = %undo.id, "conflict resolution undone");
        Ok(UndoOutcome::applied(undo))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Prefix-tagged unique audit id, e.g. `audit-create-<uuid>`.
fn audit_id(prefix: &str) -> String {
    format!("audit-{prefix}-{}", Uuid::new_v4())
}

/// JSON snapshot of a model value. Serialization of our own model types
/// cannot fail; a `Null` snapshot would only ever surface as a validation
/// violation downstream.
fn snapshot<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Ids of audit records that have been undone (referenced by a
/// back-reference on some other record).
fn undone_ids(trail: &[AuditRecord]) -> HashSet<&str> {
    trail
        .iter()
        .filter_map(|a| a.metadata.original_audit_id.as_deref())
        .collect()
}

fn is_undoable_action(action: AuditAction) -> bool {
    matches!(
        action,
        AuditAction::RecordCreated
            | AuditAction::RecordUpdated
            | AuditAction::RecordDeleted
            | AuditAction::ConflictResolved
    )
}

/// The undo state machine's eligibility check.
fn eligibility(trail: &[AuditRecord], audit_id: &str, window_hours: i64) -> UndoEligibility {
    let Some(record) = trail.iter().find(|a| a.id == audit_id) else {
        return UndoEligibility::no(format!("audit record not found: {audit_id}"));
    };
    if record.is_undo() {
        return UndoEligibility::no("undo operations cannot themselves be undone");
    }
    if !is_undoable_action(record.action) {
        return UndoEligibility::no(format!("action {} cannot be undone", record.action));
    }
    if Utc::now() - record.timestamp > Duration::hours(window_hours) {
        return UndoEligibility::no(format!(
            "operation is older than the {window_hours}-hour undo window"
        ));
    }
    if undone_ids(trail).contains(audit_id) {
        return UndoEligibility::no("operation has already been undone");
    }
    UndoEligibility::yes()
}

/// Decode an exercise record snapshot, tolerating corrupt data.
fn decode_record(data: Option<&serde_json::Value>) -> Option<ExerciseRecord> {
    data.and_then(|value| serde_json::from_value(value.clone()).ok())
}
