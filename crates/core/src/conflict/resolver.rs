//! Conflict resolution.
//!
//! The [`ConflictResolver`] turns a detected conflict plus a user-chosen
//! strategy into a [`ConflictResolution`] carrying before/after snapshots.
//! Resolution is pure computation: applying the outcome to storage is the
//! engine's job, and failure conditions are reported in the outcome rather
//! than thrown.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::conflict::merger::RecordMerger;
use crate::models::{
    Conflict, ConflictResolution, RecordSource, ResolutionChoice, ResolutionSnapshot,
};

/// Optional knobs for a resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Free-form note the user attached to the decision.
    pub user_notes: Option<String>,
}

/// Result of a resolution attempt. `resolution` is set iff `success`.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub success: bool,
    pub resolution: Option<ConflictResolution>,
    pub error: Option<String>,
}

impl ResolutionOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            resolution: None,
            error: Some(error.into()),
        }
    }

    fn resolved(resolution: ConflictResolution) -> Self {
        Self {
            success: true,
            resolution: Some(resolution),
            error: None,
        }
    }
}

/// Stateless resolution state machine over [`ResolutionChoice`].
pub struct ConflictResolver;

impl ConflictResolver {
    /// Compute the resolved state for `conflict` under `choice`.
    ///
    /// The before-state always carries both originals. The after-state
    /// carries exactly the records that remain active: the kept side for
    /// `KeepManual`/`KeepSynced`, only the merged record for
    /// `MergeRecords`, and both sides for `KeepBoth`.
    pub fn resolve(
        conflict: &Conflict,
        choice: ResolutionChoice,
        options: ResolveOptions,
    ) -> ResolutionOutcome {
        if conflict.overlap_minutes <= 0 {
            warn!(conflict_id = %conflict.id, "refusing to resolve conflict without overlap");
            return ResolutionOutcome::failure("conflict has no temporal overlap");
        }
        if conflict.manual_record.source != RecordSource::Manual {
            return ResolutionOutcome::failure("manual side of conflict is not a manual record");
        }
        if conflict.synced_record.source != RecordSource::Synced {
            return ResolutionOutcome::failure("synced side of conflict is not a synced record");
        }

        let before_state = ResolutionSnapshot {
            manual_record: Some(conflict.manual_record.clone()),
            synced_record: Some(conflict.synced_record.clone()),
            merged_record: None,
        };

        let after_state = match choice {
            ResolutionChoice::KeepManual => ResolutionSnapshot {
                manual_record: Some(conflict.manual_record.clone()),
                ..Default::default()
            },
            ResolutionChoice::KeepSynced => ResolutionSnapshot {
                synced_record: Some(conflict.synced_record.clone()),
                ..Default::default()
            },
            ResolutionChoice::MergeRecords => ResolutionSnapshot {
                merged_record: Some(RecordMerger::merge(
                    &conflict.manual_record,
                    &conflict.synced_record,
                )),
                ..Default::default()
            },
            ResolutionChoice::KeepBoth => before_state.clone(),
        };

        let resolution = ConflictResolution {
            id: Uuid::new_v4().to_string(),
            conflict_id: conflict.id.clone(),
            choice,
            resolved_at: Utc::now(),
            before_state,
            after_state,
            user_notes: options.user_notes,
        };

        info!(
            conflict_id = %conflict.id,
            choice = %choice,
            resolution_id = %resolution.id,
            "conflict resolved"
        );
        ResolutionOutcome::resolved(resolution)
    }
}
