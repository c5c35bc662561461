//! Domain model types used throughout FitRec.
//!
//! These types bridge the detectors, the resolution engine, the audit trail,
//! and the repository boundary. They are plain value types: the core never
//! mutates a record in place — every transformation produces a new value
//! plus an audit pair (before, after).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::RecordError;

/// Maximum length of an exercise-record name.
pub const MAX_NAME_LEN: usize = 100;

/// Maximum number of entries in the metadata extension map.
pub const MAX_EXTRA_KEYS: usize = 32;

// ---------------------------------------------------------------------------
// Record source & platform
// ---------------------------------------------------------------------------

/// Where an exercise record originated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Entry typed in directly by the user.
    Manual,
    /// Entry delivered by an external health platform.
    Synced,
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Synced => write!(f, "synced"),
        }
    }
}

/// The health platform that produced a synced record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthPlatform {
    AppleHealthKit,
    GoogleHealthConnect,
}

impl std::fmt::Display for HealthPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AppleHealthKit => write!(f, "apple_health_kit"),
            Self::GoogleHealthConnect => write!(f, "google_health_connect"),
        }
    }
}

// ---------------------------------------------------------------------------
// Record metadata
// ---------------------------------------------------------------------------

/// Platform-specific extras attached to a record.
///
/// Well-known attributes get typed fields; anything else lands in the
/// bounded `extra` map (at most [`MAX_EXTRA_KEYS`] entries, enforced by
/// [`ExerciseRecord::validate`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordMetadata {
    /// Energy burned, in kilocalories.
    #[serde(default)]
    pub calories: Option<f64>,

    /// Average heart rate over the session, in bpm.
    #[serde(default)]
    pub avg_heart_rate: Option<f64>,

    /// The record's identifier on the originating platform.
    #[serde(default)]
    pub original_id: Option<String>,

    /// Platform-reported confidence in the record, in [0,1].
    #[serde(default)]
    pub confidence: Option<f64>,

    /// Free-form user notes.
    #[serde(default)]
    pub notes: Option<String>,

    /// Ids of the records a merged record was synthesized from.
    #[serde(default)]
    pub merged_from: Option<Vec<String>>,

    /// Open extension map for anything without a typed field.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Exercise record
// ---------------------------------------------------------------------------

/// A single exercise entry, either user-entered or platform-synced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExerciseRecord {
    /// Opaque unique id.
    pub id: String,
    /// Display name, non-empty and at most [`MAX_NAME_LEN`] characters.
    pub name: String,
    /// When the exercise started.
    pub start_time: DateTime<Utc>,
    /// Duration in whole minutes, at least 1.
    pub duration_minutes: i64,
    /// Where the record came from.
    pub source: RecordSource,
    /// Producing platform; set iff `source` is [`RecordSource::Synced`].
    pub platform: Option<HealthPlatform>,
    /// Platform-specific extras.
    #[serde(default)]
    pub metadata: RecordMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExerciseRecord {
    /// Create a user-entered record with a fresh UUID.
    pub fn manual(name: impl Into<String>, start_time: DateTime<Utc>, duration_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            start_time,
            duration_minutes,
            source: RecordSource::Manual,
            platform: None,
            metadata: RecordMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a platform-synced record with a fresh UUID.
    pub fn synced(
        name: impl Into<String>,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        platform: HealthPlatform,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            start_time,
            duration_minutes,
            source: RecordSource::Synced,
            platform: Some(platform),
            metadata: RecordMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// When the exercise ended.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes)
    }

    /// Check the record invariants: non-empty bounded name, positive
    /// duration, platform present iff synced, bounded extension map.
    pub fn validate(&self) -> Result<(), RecordError> {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            return Err(RecordError::InvalidName("name must not be empty".into()));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(RecordError::InvalidName(format!(
                "name exceeds {MAX_NAME_LEN} characters"
            )));
        }
        if self.duration_minutes < 1 {
            return Err(RecordError::InvalidDuration(self.duration_minutes));
        }
        let platform_ok = match self.source {
            RecordSource::Synced => self.platform.is_some(),
            RecordSource::Manual => self.platform.is_none(),
        };
        if !platform_ok {
            return Err(RecordError::PlatformMismatch {
                id: self.id.clone(),
                record_source: self.source.to_string(),
                platform: self
                    .platform
                    .map_or_else(|| "unset".to_string(), |p| p.to_string()),
            });
        }
        if self.metadata.extra.len() > MAX_EXTRA_KEYS {
            return Err(RecordError::MetadataOverflow {
                count: self.metadata.extra.len(),
                max: MAX_EXTRA_KEYS,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Duplicate match
// ---------------------------------------------------------------------------

/// A scored pairing of an incoming record against an existing one.
///
/// Produced by the duplicate detector, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub existing: ExerciseRecord,
    pub incoming: ExerciseRecord,
    /// Weighted, normalized similarity in [0,1].
    pub match_score: f64,
    /// Human-readable component descriptions.
    pub match_reasons: Vec<String>,
}

// ---------------------------------------------------------------------------
// Conflict
// ---------------------------------------------------------------------------

/// Categorisation of a manual/synced overlap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Intervals overlap but the entries plausibly describe distinct
    /// activities.
    TimeOverlap,
    /// Near-identical names over overlapping time: the same exercise logged
    /// twice.
    DuplicateExercise,
    /// Mostly-coincident windows with differing names or attributes.
    ConflictingData,
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeOverlap => write!(f, "time_overlap"),
            Self::DuplicateExercise => write!(f, "duplicate_exercise"),
            Self::ConflictingData => write!(f, "conflicting_data"),
        }
    }
}

/// A detected temporal overlap between a manual and a synced record.
///
/// Exists only transiently until resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique conflict id.
    pub id: String,
    pub manual_record: ExerciseRecord,
    pub synced_record: ExerciseRecord,
    /// Shared duration between the two intervals, in minutes (> 0).
    pub overlap_minutes: i64,
    pub conflict_type: ConflictType,
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    /// Create a new conflict with a fresh UUID.
    pub fn new(
        manual_record: ExerciseRecord,
        synced_record: ExerciseRecord,
        overlap_minutes: i64,
        conflict_type: ConflictType,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            manual_record,
            synced_record,
            overlap_minutes,
            conflict_type,
            detected_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conflict resolution
// ---------------------------------------------------------------------------

/// User/policy decision on how to collapse a conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    /// Keep the manual record; the synced one is removed.
    KeepManual,
    /// Keep the synced record; the manual one is removed.
    KeepSynced,
    /// Synthesize a merged record superseding both originals.
    MergeRecords,
    /// Keep both records, separately, with the conflict marked resolved.
    KeepBoth,
}

impl std::fmt::Display for ResolutionChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepManual => write!(f, "keep_manual"),
            Self::KeepSynced => write!(f, "keep_synced"),
            Self::MergeRecords => write!(f, "merge_records"),
            Self::KeepBoth => write!(f, "keep_both"),
        }
    }
}

/// The record state on one side of a resolution.
///
/// Which fields are set depends on the resolution choice; see
/// [`ConflictResolver`](crate::conflict::ConflictResolver).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionSnapshot {
    #[serde(default)]
    pub manual_record: Option<ExerciseRecord>,
    #[serde(default)]
    pub synced_record: Option<ExerciseRecord>,
    #[serde(default)]
    pub merged_record: Option<ExerciseRecord>,
}

/// The outcome of resolving one conflict. Immutable once created; persisted
/// only inside its audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub id: String,
    pub conflict_id: String,
    pub choice: ResolutionChoice,
    pub resolved_at: DateTime<Utc>,
    pub before_state: ResolutionSnapshot,
    pub after_state: ResolutionSnapshot,
    #[serde(default)]
    pub user_notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Audit records
// ---------------------------------------------------------------------------

/// The kind of mutation an audit record captures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
    ConflictResolved,
    ResolutionUndone,
    BulkOperation,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RecordCreated => write!(f, "record_created"),
            Self::RecordUpdated => write!(f, "record_updated"),
            Self::RecordDeleted => write!(f, "record_deleted"),
            Self::ConflictResolved => write!(f, "conflict_resolved"),
            Self::ResolutionUndone => write!(f, "resolution_undone"),
            Self::BulkOperation => write!(f, "bulk_operation"),
        }
    }
}

/// Structured context attached to an audit record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditMetadata {
    /// Source of the record the action touched.
    #[serde(default)]
    pub source: Option<RecordSource>,

    /// Platform of the record the action touched.
    #[serde(default)]
    pub platform: Option<HealthPlatform>,

    /// Field names changed by an update.
    #[serde(default)]
    pub updated_fields: Vec<String>,

    /// For undo records: the audit id of the operation being reversed.
    /// An audit record referenced here is permanently non-undoable, and a
    /// record carrying this field is itself never undoable.
    #[serde(default)]
    pub original_audit_id: Option<String>,

    /// Free-form description (bulk operations, undo context).
    #[serde(default)]
    pub details: Option<String>,
}

/// One immutable log entry capturing a mutation.
///
/// Append-mostly: the only lifecycle operation besides creation is bulk
/// trimming during rolling-cap cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Prefix-tagged unique id, e.g. `audit-create-<uuid>`.
    pub id: String,
    pub action: AuditAction,
    pub timestamp: DateTime<Utc>,
    /// Subject of the action (record id, or conflict id for resolutions).
    pub record_id: String,
    /// Opaque snapshot of the state before the action, action-dependent.
    #[serde(default)]
    pub before_data: Option<serde_json::Value>,
    /// Opaque snapshot of the state after the action, action-dependent.
    #[serde(default)]
    pub after_data: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: AuditMetadata,
}

impl AuditRecord {
    /// Whether this record is itself the result of an undo.
    pub fn is_undo(&self) -> bool {
        self.metadata.original_audit_id.is_some()
    }
}
