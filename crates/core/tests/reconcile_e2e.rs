//! End-to-end tests for the reconciliation pipeline.
//!
//! These tests exercise the real `ReconcileEngine` with:
//! - A real `MemoryRepository` as the storage collaborator
//! - Default configuration (tolerances, rolling cap, undo window)
//! - The full flow: seed manual history, ingest a synced batch, resolve the
//!   detected conflicts, undo a resolution, and inspect the audit trail.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};

use fitrec_core::audit::AuditQuery;
use fitrec_core::config::{AppConfig, AuditSettings};
use fitrec_core::engine::ReconcileEngine;
use fitrec_core::models::{
    AuditAction, ConflictType, ExerciseRecord, HealthPlatform, ResolutionChoice,
};
use fitrec_core::repository::{MemoryRepository, RecordPatch, RecordRepository};

// ===========================================================================
// Helpers
// ===========================================================================

fn monday_7am() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap()
}

fn manual(name: &str, offset_minutes: i64, duration: i64) -> ExerciseRecord {
    ExerciseRecord::manual(name, monday_7am() + Duration::minutes(offset_minutes), duration)
}

fn synced(name: &str, offset_minutes: i64, duration: i64) -> ExerciseRecord {
    ExerciseRecord::synced(
        name,
        monday_7am() + Duration::minutes(offset_minutes),
        duration,
        HealthPlatform::AppleHealthKit,
    )
}

fn engine() -> (Arc<MemoryRepository>, ReconcileEngine) {
    let repo = Arc::new(MemoryRepository::new());
    let engine = ReconcileEngine::new(AppConfig::default(), repo.clone());
    (repo, engine)
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn test_ingest_resolve_undo_round_trip() -> Result<()> {
    let (repo, engine) = engine();

    // A week of manual history.
    let morning_run = manual("Morning Run", 0, 30);
    let evening_lift = manual("Strength Training", 600, 45);
    engine.records().create_record(morning_run.clone()).await?;
    engine.records().create_record(evening_lift.clone()).await?;

    // The platform delivers: a twin of the morning run, an overlapping ride
    // with a different name, and an unrelated swim.
    let report = engine
        .ingest_synced(vec![
            synced("Morning Run", 2, 31),
            synced("Indoor Cycling", 10, 45),
            synced("Swimming", 300, 40),
        ])
        .await?;

    // The twin was dropped, the other two landed.
    assert_eq!(report.duplicates.len(), 1);
    assert!(report.duplicates[0].match_score > 0.85);
    assert_eq!(report.accepted.len(), 2);

    // The overlapping ride conflicts with the stored manual run.
    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.manual_record.id, morning_run.id);
    assert_eq!(conflict.synced_record.name, "Indoor Cycling");
    assert_eq!(conflict.conflict_type, ConflictType::ConflictingData);
    assert_eq!(conflict.overlap_minutes, 20);

    // Merge the two: both originals are superseded by one enriched record.
    let outcome = engine
        .apply_resolution(conflict, ResolutionChoice::MergeRecords, Some("merge".into()))
        .await?;
    assert!(outcome.success);
    let merged = outcome.resolution.unwrap().after_state.merged_record.unwrap();
    assert!(repo.get_record_by_id(&merged.id).await?.is_some());
    assert!(repo.get_record_by_id(&morning_run.id).await?.is_none());

    // Undo the resolution: originals return, the merged record goes away.
    let resolved = engine.audit().get_undoable_operations(24).await?;
    assert_eq!(resolved.len(), 1);
    let undo = engine
        .audit()
        .undo_conflict_resolution(&resolved[0].id)
        .await?;
    assert!(undo.success, "{:?}", undo.reason);
    assert!(repo.get_record_by_id(&morning_run.id).await?.is_some());
    assert!(repo.get_record_by_id(&merged.id).await?.is_none());

    // The undo is single-use.
    let again = engine
        .audit()
        .undo_conflict_resolution(&resolved[0].id)
        .await?;
    assert!(!again.success);

    // The trail is internally consistent after the whole dance.
    let violations = engine.audit().validate_audit_trail().await?;
    assert!(violations.is_empty(), "{violations:?}");

    Ok(())
}

#[tokio::test]
async fn test_audited_crud_with_undo() -> Result<()> {
    let (repo, engine) = engine();
    let records = engine.records();

    let run = manual("Tempo Run", 0, 40);
    records.create_record(run.clone()).await?;

    let patch = RecordPatch {
        duration_minutes: Some(50),
        ..Default::default()
    };
    let updated = records.update_record(&run.id, patch).await?;
    assert!(updated.success);
    assert_eq!(updated.record.unwrap().duration_minutes, 50);

    // One audit per mutation, newest-first.
    let trail = engine.audit().get_audit_trail(&AuditQuery::default()).await?;
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].action, AuditAction::RecordUpdated);
    assert_eq!(trail[1].action, AuditAction::RecordCreated);

    // Undoing the update restores the original duration.
    let undo = engine.audit().undo_record_operation(&trail[0].id).await?;
    assert!(undo.success);
    let restored = repo.get_record_by_id(&run.id).await?.unwrap();
    assert_eq!(restored.duration_minutes, 40);

    Ok(())
}

#[tokio::test]
async fn test_no_overlap_means_no_conflicts() -> Result<()> {
    let (_, engine) = engine();

    // Manual hour at T, synced 45 minutes starting at T+90: disjoint.
    engine.records().create_record(manual("Run", 0, 60)).await?;
    let report = engine.ingest_synced(vec![synced("Run", 90, 45)]).await?;

    assert!(report.conflicts.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rolling_cap_under_sustained_ingest() -> Result<()> {
    let mut config = AppConfig::default();
    config.audit = AuditSettings {
        max_records: 20,
        cleanup_threshold: 25,
        ..Default::default()
    };

    let repo = Arc::new(MemoryRepository::new());
    let engine = ReconcileEngine::new(config, repo.clone());

    // Far-apart sessions so nothing dedups away; each cycle appends one
    // creation audit plus one bulk audit.
    for day in 0..20 {
        engine
            .ingest_synced(vec![synced("Ride", day * 24 * 60, 60)])
            .await?;
    }

    let trail = repo.get_audit_trail(None).await?;
    assert!(trail.len() <= 20, "trail has {} entries", trail.len());

    // The survivors are the most recent appends.
    let stats = engine.audit().management_statistics().await?;
    assert_eq!(stats.total_records, trail.len());
    assert!(stats.storage_utilization <= 1.0);

    Ok(())
}
