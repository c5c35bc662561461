//! Reconciliation engine.
//!
//! The [`ReconcileEngine`] drives each ingest cycle:
//!
//! 1. Validate the incoming synced batch.
//! 2. Drop near-duplicates of existing history (and of earlier batch
//!    members) via the duplicate detector.
//! 3. Persist and audit the survivors.
//! 4. Detect conflicts between stored manual records and the newly accepted
//!    synced records.
//!
//! Callers then pick a [`ResolutionChoice`] per conflict and apply it
//! through [`apply_resolution`](ReconcileEngine::apply_resolution).
//!
//! An atomic flag prevents concurrent ingest cycles on one engine. Nothing
//! else is serialized: concurrent callers mutating the same record race,
//! the repository's own transactional behavior is the only consistency
//! boundary, and the last write wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::AuditTrailManager;
use crate::config::AppConfig;
use crate::conflict::{ConflictDetector, ConflictResolver, ResolutionOutcome, ResolveOptions};
use crate::dedup::{DedupOptions, DuplicateDetector};
use crate::errors::{EngineError, RepositoryError};
use crate::models::{
    Conflict, DuplicateMatch, ExerciseRecord, RecordSource, ResolutionChoice,
};
use crate::records::RecordManager;
use crate::repository::RecordRepository;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A batch record refused before persistence, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub record: ExerciseRecord,
    pub reason: String,
}

/// Outcome of one ingest cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Records persisted this cycle, in input order.
    pub accepted: Vec<ExerciseRecord>,
    /// Matches for batch records dropped as duplicates.
    pub duplicates: Vec<DuplicateMatch>,
    /// Batch records that failed validation.
    pub rejected: Vec<RejectedRecord>,
    /// Overlaps between stored manual records and the accepted batch.
    pub conflicts: Vec<Conflict>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Orchestrates dedup, conflict detection, resolution application, and
/// audit logging over an injected repository.
pub struct ReconcileEngine {
    config: AppConfig,
    repository: Arc<dyn RecordRepository>,
    audit: AuditTrailManager,
    records: RecordManager,
    /// Atomic flag preventing concurrent ingest cycles.
    running: Arc<AtomicBool>,
}

impl ReconcileEngine {
    /// Create an engine with all collaborators wired to `repository`.
    pub fn new(config: AppConfig, repository: Arc<dyn RecordRepository>) -> Self {
        let audit = AuditTrailManager::new(repository.clone(), config.audit.clone());
        let records = RecordManager::new(repository.clone(), audit.clone());
        Self {
            config,
            repository,
            audit,
            records,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The audit manager backing this engine.
    pub fn audit(&self) -> &AuditTrailManager {
        &self.audit
    }

    /// The record write path backing this engine.
    pub fn records(&self) -> &RecordManager {
        &self.records
    }

    /// Run one ingest cycle over a batch of platform-synced records.
    pub async fn ingest_synced(
        &self,
        batch: Vec<ExerciseRecord>,
    ) -> Result<IngestReport, EngineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::IngestInProgress);
        }

        let result = self.run_ingest(batch).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_ingest(&self, batch: Vec<ExerciseRecord>) -> Result<IngestReport, EngineError> {
        let started_at = Utc::now();
        info!(batch = batch.len(), "starting ingest cycle");

        // Validation pass: only well-formed synced records go further.
        let mut candidates = Vec::new();
        let mut rejected = Vec::new();
        for record in batch {
            if record.source != RecordSource::Synced {
                rejected.push(RejectedRecord {
                    reason: "batch record is not a synced record".into(),
                    record,
                });
                continue;
            }
            match record.validate() {
                Ok(()) => candidates.push(record),
                Err(err) => {
                    warn!(id = %record.id, %err, "rejecting malformed batch record");
                    rejected.push(RejectedRecord {
                        reason: err.to_string(),
                        record,
                    });
                }
            }
        }

        let existing = self.repository.get_exercise_history(None).await?;
        let options = DedupOptions::from_settings(&self.config.dedup);
        let filtered = DuplicateDetector::filter_duplicates(candidates, existing.clone(), &options);

        let mut accepted = Vec::new();
        for record in filtered.unique {
            let outcome = self.records.create_record(record).await?;
            match outcome.record {
                Some(record) if outcome.success => accepted.push(record),
                _ => {
                    if let Some(reason) = outcome.error {
                        warn!(%reason, "batch record refused at persistence");
                    }
                }
            }
        }

        if !accepted.is_empty() {
            let ids: Vec<String> = accepted.iter().map(|r| r.id.clone()).collect();
            self.audit
                .bulk_operation(&format!("ingested {} synced records", ids.len()), &ids)
                .await?;
        }

        let manual_records: Vec<ExerciseRecord> = existing
            .into_iter()
            .filter(|r| r.source == RecordSource::Manual)
            .collect();
        let conflicts = ConflictDetector::detect(
            &manual_records,
            &accepted,
            i64::from(self.config.conflict.min_overlap_minutes),
        );

        let report = IngestReport {
            accepted,
            duplicates: filtered.duplicates,
            rejected,
            conflicts,
            started_at,
            completed_at: Some(Utc::now()),
        };
        info!(
            accepted = report.accepted.len(),
            duplicates = report.duplicates.len(),
            rejected = report.rejected.len(),
            conflicts = report.conflicts.len(),
            "ingest cycle complete"
        );
        Ok(report)
    }

    /// Resolve `conflict` under `choice` and apply the outcome to storage.
    ///
    /// The pure resolution step failing is reported in the returned outcome;
    /// repository failures propagate. Exactly one `ConflictResolved` audit
    /// record captures the whole operation.
    pub async fn apply_resolution(
        &self,
        conflict: &Conflict,
        choice: ResolutionChoice,
        user_notes: Option<String>,
    ) -> Result<ResolutionOutcome, EngineError> {
        let outcome = ConflictResolver::resolve(conflict, choice, ResolveOptions { user_notes });
        let Some(resolution) = outcome.resolution.clone() else {
            return Ok(outcome);
        };

        match resolution.choice {
            ResolutionChoice::KeepManual => {
                self.remove_if_present(&conflict.synced_record.id).await?;
            }
            ResolutionChoice::KeepSynced => {
                self.remove_if_present(&conflict.manual_record.id).await?;
            }
            ResolutionChoice::MergeRecords => {
                self.remove_if_present(&conflict.manual_record.id).await?;
                self.remove_if_present(&conflict.synced_record.id).await?;
                if let Some(merged) = resolution.after_state.merged_record.as_ref() {
                    self.repository.save_exercise_record(merged).await?;
                }
            }
            ResolutionChoice::KeepBoth => {}
        }

        self.audit.conflict_resolved(&resolution).await?;
        Ok(outcome)
    }

    /// Delete a record, tolerating it already being gone.
    async fn remove_if_present(&self, id: &str) -> Result<(), RepositoryError> {
        if self.repository.get_record_by_id(id).await?.is_some() {
            self.repository.delete_record(id).await?;
        }
        Ok(())
    }
}
