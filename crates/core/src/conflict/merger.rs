//! Merged-record synthesis.
//!
//! When a conflict is resolved with `MergeRecords`, a fresh record is built
//! from the manual side's core fields, enriched with whatever the synced
//! side knows that the manual side doesn't.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::models::{ExerciseRecord, RecordSource};

/// Stateless merged-record builder.
pub struct RecordMerger;

impl RecordMerger {
    /// Synthesize the record that supersedes both conflict sides.
    ///
    /// The manual record is authoritative for name, start time, and
    /// duration; the result is a fresh user-owned record (`source` manual,
    /// no platform). Metadata starts from the manual side and is filled in
    /// from the synced side wherever the manual side is empty;
    /// `metadata.merged_from` records both origin ids.
    pub fn merge(manual: &ExerciseRecord, synced: &ExerciseRecord) -> ExerciseRecord {
        let mut metadata = manual.metadata.clone();

        if metadata.calories.is_none() {
            metadata.calories = synced.metadata.calories;
        }
        if metadata.avg_heart_rate.is_none() {
            metadata.avg_heart_rate = synced.metadata.avg_heart_rate;
        }
        if metadata.confidence.is_none() {
            metadata.confidence = synced.metadata.confidence;
        }
        if metadata.notes.is_none() {
            metadata.notes = synced.metadata.notes.clone();
        }
        if metadata.original_id.is_none() {
            metadata.original_id = synced.metadata.original_id.clone();
        }
        for (key, value) in &synced.metadata.extra {
            metadata
                .extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        metadata.merged_from = Some(vec![manual.id.clone(), synced.id.clone()]);

        let now = Utc::now();
        let merged = ExerciseRecord {
            id: Uuid::new_v4().to_string(),
            name: manual.name.clone(),
            start_time: manual.start_time,
            duration_minutes: manual.duration_minutes,
            source: RecordSource::Manual,
            platform: None,
            metadata,
            created_at: now,
            updated_at: now,
        };

        debug!(
            manual_id = %manual.id,
            synced_id = %synced.id,
            merged_id = %merged.id,
            "synthesized merged record"
        );
        merged
    }
}
