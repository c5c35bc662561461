//! Audited record mutations.
//!
//! The [`RecordManager`] is the write path for individual exercise records:
//! every create/update/delete is validated, persisted, and logged to the
//! audit trail as one operation. Validation failures and missing records are
//! reported as structured outcomes; only repository I/O travels the error
//! channel.

use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::AuditTrailManager;
use crate::errors::RepositoryError;
use crate::models::ExerciseRecord;
use crate::repository::{RecordPatch, RecordRepository};

/// Result of a record mutation. `record` carries the post-operation state
/// on success (the deleted record's last state for deletions).
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub success: bool,
    pub record: Option<ExerciseRecord>,
    pub error: Option<String>,
}

impl RecordOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            record: None,
            error: Some(error.into()),
        }
    }

    fn applied(record: ExerciseRecord) -> Self {
        Self {
            success: true,
            record: Some(record),
            error: None,
        }
    }
}

/// Validated, audited create/update/delete over the repository.
#[derive(Clone)]
pub struct RecordManager {
    repository: Arc<dyn RecordRepository>,
    audit: AuditTrailManager,
}

impl RecordManager {
    pub fn new(repository: Arc<dyn RecordRepository>, audit: AuditTrailManager) -> Self {
        Self { repository, audit }
    }

    /// Validate and persist a new record, logging its creation.
    pub async fn create_record(
        &self,
        record: ExerciseRecord,
    ) -> Result<RecordOutcome, RepositoryError> {
        if let Err(err) = record.validate() {
            warn!(id = %record.id, %err, "rejecting invalid record");
            return Ok(RecordOutcome::failure(err.to_string()));
        }

        self.repository.save_exercise_record(&record).await?;
        self.audit.record_created(&record).await?;
        info!(id = %record.id, name = %record.name, "record created");
        Ok(RecordOutcome::applied(record))
    }

    /// Apply a partial update, logging before/after and the changed fields.
    pub async fn update_record(
        &self,
        id: &str,
        patch: RecordPatch,
    ) -> Result<RecordOutcome, RepositoryError> {
        if patch.is_empty() {
            return Ok(RecordOutcome::failure("update patch contains no fields"));
        }
        let Some(before) = self.repository.get_record_by_id(id).await? else {
            return Ok(RecordOutcome::failure(format!("record not found: {id}")));
        };

        let after = patch.apply_to(&before);
        if let Err(err) = after.validate() {
            warn!(id, %err, "rejecting invalid update");
            return Ok(RecordOutcome::failure(err.to_string()));
        }

        self.repository.update_record(id, &patch).await?;
        self.audit
            .record_updated(&before, &after, &patch.updated_fields())
            .await?;
        info!(id, fields = ?patch.updated_fields(), "record updated");
        Ok(RecordOutcome::applied(after))
    }

    /// Delete a record, logging its last state.
    pub async fn delete_record(&self, id: &str) -> Result<RecordOutcome, RepositoryError> {
        let Some(record) = self.repository.get_record_by_id(id).await? else {
            return Ok(RecordOutcome::failure(format!("record not found: {id}")));
        };

        self.repository.delete_record(id).await?;
        self.audit.record_deleted(&record).await?;
        info!(id, "record deleted");
        Ok(RecordOutcome::applied(record))
    }
}
