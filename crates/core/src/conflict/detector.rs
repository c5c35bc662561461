//! Conflict detection logic.
//!
//! Given manual and synced record sets, the detector finds cross-source
//! pairs whose time intervals overlap by at least a configured minimum and
//! classifies each pair.

use tracing::{debug, info};

use crate::dedup::similarity::name_similarity;
use crate::models::{Conflict, ConflictType, ExerciseRecord, RecordSource};

/// Name similarity at or above which an overlapping pair is treated as the
/// same exercise logged twice.
const DUPLICATE_NAME_SIMILARITY: f64 = 0.8;

/// Stateless conflict detector comparing two record sets.
pub struct ConflictDetector;

impl ConflictDetector {
    /// Compare manual and synced records and return all qualifying
    /// conflicts.
    ///
    /// A pair qualifies when the two `[start, start + duration]` intervals
    /// share at least `min_overlap_minutes`. Inputs are never mutated;
    /// entries on the wrong side of the source split are skipped.
    pub fn detect(
        manual_records: &[ExerciseRecord],
        synced_records: &[ExerciseRecord],
        min_overlap_minutes: i64,
    ) -> Vec<Conflict> {
        info!(
            manual_count = manual_records.len(),
            synced_count = synced_records.len(),
            "detecting conflicts"
        );

        let mut conflicts = Vec::new();

        for manual in manual_records {
            if manual.source != RecordSource::Manual {
                debug!(id = %manual.id, "skipping non-manual record in manual set");
                continue;
            }
            for synced in synced_records {
                if synced.source != RecordSource::Synced {
                    debug!(id = %synced.id, "skipping non-synced record in synced set");
                    continue;
                }

                let overlap = overlap_minutes(manual, synced);
                if overlap <= 0 || overlap < min_overlap_minutes {
                    continue;
                }

                let conflict_type = classify(manual, synced, overlap);
                debug!(
                    manual_id = %manual.id,
                    synced_id = %synced.id,
                    overlap,
                    conflict_type = %conflict_type,
                    "conflict detected"
                );
                conflicts.push(Conflict::new(
                    manual.clone(),
                    synced.clone(),
                    overlap,
                    conflict_type,
                ));
            }
        }

        info!(count = conflicts.len(), "conflict detection complete");
        conflicts
    }
}

/// Intersection length of the two records' intervals, in whole minutes.
fn overlap_minutes(a: &ExerciseRecord, b: &ExerciseRecord) -> i64 {
    let latest_start = a.start_time.max(b.start_time);
    let earliest_end = a.end_time().min(b.end_time());
    (earliest_end - latest_start).num_minutes()
}

/// Classify an overlapping pair. Total: every pair gets exactly one type.
///
/// Near-identical names mean the same exercise was logged twice. Otherwise
/// a pair whose overlap covers less than half of the shorter record is
/// treated as two distinct activities brushing against each other; anything
/// beyond that is contradictory data over the same window.
fn classify(manual: &ExerciseRecord, synced: &ExerciseRecord, overlap: i64) -> ConflictType {
    if name_similarity(&manual.name, &synced.name) >= DUPLICATE_NAME_SIMILARITY {
        return ConflictType::DuplicateExercise;
    }

    let shorter = manual.duration_minutes.min(synced.duration_minutes);
    if overlap * 2 < shorter {
        ConflictType::TimeOverlap
    } else {
        ConflictType::ConflictingData
    }
}
