//! Fuzzy duplicate detection.
//!
//! Scores an incoming record against existing history across start time,
//! name, and duration, with a bonus for cross-source pairs (a manual entry
//! matching its synced counterpart). Detection never fails: no match simply
//! yields an empty outcome.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DedupSettings;
use crate::dedup::similarity::name_similarity;
use crate::models::{DuplicateMatch, ExerciseRecord};

/// Weight of start-time proximity in the match score.
const TIME_WEIGHT: f64 = 0.4;
/// Weight of name similarity in the match score.
const NAME_WEIGHT: f64 = 0.3;
/// Weight of duration proximity in the match score.
const DURATION_WEIGHT: f64 = 0.2;
/// Bonus weight for pairs from different sources, added to both the
/// numerator and the denominator.
const CROSS_SOURCE_WEIGHT: f64 = 0.1;

/// Pairs scoring above this become [`DuplicateMatch`] entries.
pub const MATCH_CUTOFF: f64 = 0.7;
/// Top scores above this flag the incoming record as a duplicate.
pub const DUPLICATE_THRESHOLD: f64 = 0.85;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Named tolerance presets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchScenario {
    /// Tight tolerances; flags only near-certain duplicates.
    Strict,
    /// Balanced defaults.
    Normal,
    /// Wide tolerances; flags anything plausibly duplicated.
    Lenient,
}

/// Tolerances controlling the duplicate detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupOptions {
    pub time_tolerance_minutes: f64,
    pub duration_tolerance_minutes: f64,
    pub name_match_threshold: f64,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self::for_scenario(MatchScenario::Normal)
    }
}

impl DedupOptions {
    /// Build options from loaded configuration.
    pub fn from_settings(settings: &DedupSettings) -> Self {
        Self {
            time_tolerance_minutes: f64::from(settings.time_tolerance_minutes),
            duration_tolerance_minutes: f64::from(settings.duration_tolerance_minutes),
            name_match_threshold: settings.name_match_threshold,
        }
    }

    /// Named presets. Tolerances widen strict -> normal -> lenient while the
    /// name threshold loosens in lockstep.
    pub fn for_scenario(scenario: MatchScenario) -> Self {
        match scenario {
            MatchScenario::Strict => Self {
                time_tolerance_minutes: 2.0,
                duration_tolerance_minutes: 1.0,
                name_match_threshold: 0.9,
            },
            MatchScenario::Normal => Self {
                time_tolerance_minutes: 5.0,
                duration_tolerance_minutes: 2.0,
                name_match_threshold: 0.8,
            },
            MatchScenario::Lenient => Self {
                time_tolerance_minutes: 10.0,
                duration_tolerance_minutes: 5.0,
                name_match_threshold: 0.7,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of checking one incoming record against existing history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupOutcome {
    /// Whether the top match clears [`DUPLICATE_THRESHOLD`].
    pub is_duplicate: bool,
    /// Matches above [`MATCH_CUTOFF`], sorted descending by score.
    pub matches: Vec<DuplicateMatch>,
    /// Score of the top match, 0.0 when there are none.
    pub confidence: f64,
}

/// Result of filtering a whole incoming batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOutcome {
    /// Records that survived the filter, in input order.
    pub unique: Vec<ExerciseRecord>,
    /// All matches for the records that were flagged.
    pub duplicates: Vec<DuplicateMatch>,
    /// How many incoming records were flagged.
    pub duplicate_count: usize,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Stateless duplicate detector.
pub struct DuplicateDetector;

impl DuplicateDetector {
    /// Score `incoming` against every record in `existing`.
    pub fn detect(
        incoming: &ExerciseRecord,
        existing: &[ExerciseRecord],
        options: &DedupOptions,
    ) -> DedupOutcome {
        let mut matches: Vec<DuplicateMatch> = existing
            .iter()
            .filter_map(|candidate| {
                let (score, reasons) = score_pair(incoming, candidate, options);
                if score > MATCH_CUTOFF {
                    Some(DuplicateMatch {
                        existing: candidate.clone(),
                        incoming: incoming.clone(),
                        match_score: score,
                        match_reasons: reasons,
                    })
                } else {
                    None
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.match_score
                .partial_cmp(&a.match_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let confidence = matches.first().map_or(0.0, |m| m.match_score);
        let is_duplicate = confidence > DUPLICATE_THRESHOLD;

        if is_duplicate {
            debug!(
                incoming = %incoming.id,
                confidence,
                matches = matches.len(),
                "incoming record flagged as duplicate"
            );
        }

        DedupOutcome {
            is_duplicate,
            matches,
            confidence,
        }
    }

    /// Filter an incoming batch against existing history.
    ///
    /// Records are processed in order; each accepted record joins the
    /// comparison pool, so later batch members are checked against earlier
    /// accepted ones as well.
    pub fn filter_duplicates(
        batch: Vec<ExerciseRecord>,
        existing: Vec<ExerciseRecord>,
        options: &DedupOptions,
    ) -> FilterOutcome {
        let mut pool = existing;
        let mut unique = Vec::new();
        let mut duplicates = Vec::new();
        let mut duplicate_count = 0;

        for record in batch {
            let outcome = Self::detect(&record, &pool, options);
            if outcome.is_duplicate {
                duplicate_count += 1;
                duplicates.extend(outcome.matches);
            } else {
                pool.push(record.clone());
                unique.push(record);
            }
        }

        info!(
            unique = unique.len(),
            duplicates = duplicate_count,
            "duplicate filtering complete"
        );

        FilterOutcome {
            unique,
            duplicates,
            duplicate_count,
        }
    }
}

/// Linear proximity score: 1.0 at zero difference, falling to 0.0 at twice
/// the tolerance. Differences inside the tolerance always score >= 0.5.
fn proximity(diff: f64, tolerance: f64) -> f64 {
    if tolerance <= 0.0 {
        return if diff == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - diff / (2.0 * tolerance)).max(0.0)
}

/// Weighted score for one record pair, with human-readable reasons for each
/// contributing component. Symmetric in its two record arguments.
fn score_pair(
    incoming: &ExerciseRecord,
    candidate: &ExerciseRecord,
    options: &DedupOptions,
) -> (f64, Vec<String>) {
    let mut weighted = 0.0;
    let mut possible = TIME_WEIGHT + NAME_WEIGHT + DURATION_WEIGHT;
    let mut reasons = Vec::new();

    // Start-time proximity.
    let minutes_apart =
        (incoming.start_time - candidate.start_time).num_seconds().abs() as f64 / 60.0;
    let time_score = proximity(minutes_apart, options.time_tolerance_minutes);
    weighted += time_score * TIME_WEIGHT;
    if minutes_apart <= options.time_tolerance_minutes {
        reasons.push(format!("start times {minutes_apart:.1} minutes apart"));
    }

    // Name similarity, gated by the match threshold.
    let similarity = name_similarity(&incoming.name, &candidate.name);
    if similarity >= options.name_match_threshold {
        weighted += similarity * NAME_WEIGHT;
        reasons.push(format!("names match (similarity {similarity:.2})"));
    }

    // Duration proximity.
    let duration_diff = (incoming.duration_minutes - candidate.duration_minutes).abs() as f64;
    let duration_score = proximity(duration_diff, options.duration_tolerance_minutes);
    weighted += duration_score * DURATION_WEIGHT;
    if duration_diff <= options.duration_tolerance_minutes {
        reasons.push(format!("durations {duration_diff:.0} minutes apart"));
    }

    // Cross-source bonus: a manual entry matching its synced counterpart.
    if incoming.source != candidate.source {
        weighted += CROSS_SOURCE_WEIGHT;
        possible += CROSS_SOURCE_WEIGHT;
        reasons.push("cross-source pair (manual vs synced)".to_string());
    }

    ((weighted / possible).clamp(0.0, 1.0), reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthPlatform;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 7, 0, 0).unwrap()
    }

    fn manual(name: &str, offset_minutes: i64, duration: i64) -> ExerciseRecord {
        ExerciseRecord::manual(name, start() + Duration::minutes(offset_minutes), duration)
    }

    fn synced(name: &str, offset_minutes: i64, duration: i64) -> ExerciseRecord {
        ExerciseRecord::synced(
            name,
            start() + Duration::minutes(offset_minutes),
            duration,
            HealthPlatform::AppleHealthKit,
        )
    }

    #[test]
    fn test_identical_self_match() {
        let rec = manual("Running", 0, 30);
        let mut copy = rec.clone();
        copy.id = "other".into();

        let outcome = DuplicateDetector::detect(&copy, &[rec], &DedupOptions::default());
        assert!(outcome.is_duplicate);
        assert!(outcome.confidence > DUPLICATE_THRESHOLD);
        assert_eq!(outcome.matches.len(), 1);
    }

    #[test]
    fn test_manual_vs_synced_counterpart() {
        // A manual entry and its platform-synced twin, two minutes and one
        // duration-minute apart.
        let existing = manual("Running", 0, 30);
        let incoming = synced("Running", 2, 31);

        let outcome = DuplicateDetector::detect(&incoming, &[existing], &DedupOptions::default());
        assert!(outcome.is_duplicate);
        assert!(outcome.confidence > 0.85);

        let reasons = &outcome.matches[0].match_reasons;
        assert!(reasons.iter().any(|r| r.contains("start times")));
        assert!(reasons.iter().any(|r| r.contains("names match")));
        assert!(reasons.iter().any(|r| r.contains("cross-source")));
    }

    #[test]
    fn test_time_shift_beyond_tolerance() {
        let existing = manual("Running", 0, 30);
        // Same name, same duration, but shifted past the 5-minute tolerance.
        let mut shifted = existing.clone();
        shifted.id = "shifted".into();
        shifted.start_time = start() + Duration::minutes(6);

        let outcome = DuplicateDetector::detect(&shifted, &[existing], &DedupOptions::default());
        assert!(!outcome.is_duplicate);
    }

    #[test]
    fn test_no_match_when_far_apart() {
        let existing = manual("Running", 0, 30);
        let incoming = manual("Running", 120, 30);

        let outcome = DuplicateDetector::detect(&incoming, &[existing], &DedupOptions::default());
        assert!(!outcome.is_duplicate);
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_score_symmetry() {
        let options = DedupOptions::default();
        let a = manual("Morning Run", 0, 30);
        let b = synced("morning run!", 3, 32);

        let (ab, _) = score_pair(&a, &b, &options);
        let (ba, _) = score_pair(&b, &a, &options);
        assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn test_cross_source_bonus_monotonicity() {
        let options = DedupOptions::default();
        let existing = manual("Yoga", 0, 45);

        let same_source = manual("Yoga", 3, 46);
        let mut cross_source = same_source.clone();
        cross_source.source = crate::models::RecordSource::Synced;
        cross_source.platform = Some(HealthPlatform::GoogleHealthConnect);

        let (same, _) = score_pair(&same_source, &existing, &options);
        let (cross, _) = score_pair(&cross_source, &existing, &options);
        assert!(cross >= same);
    }

    #[test]
    fn test_scenario_confidence_ordering() {
        // Borderline pair: shifted and stretched enough that tolerances matter.
        let existing = manual("Rowing", 0, 30);
        let incoming = synced("Rowing", 1, 31);

        let confidence = |scenario| {
            DuplicateDetector::detect(
                &incoming,
                std::slice::from_ref(&existing),
                &DedupOptions::for_scenario(scenario),
            )
            .confidence
        };

        let strict = confidence(MatchScenario::Strict);
        let normal = confidence(MatchScenario::Normal);
        let lenient = confidence(MatchScenario::Lenient);
        assert!(strict > 0.0);
        assert!(lenient >= normal, "lenient {lenient} < normal {normal}");
        assert!(normal >= strict, "normal {normal} < strict {strict}");
    }

    #[test]
    fn test_preset_ordering_invariant() {
        let strict = DedupOptions::for_scenario(MatchScenario::Strict);
        let normal = DedupOptions::for_scenario(MatchScenario::Normal);
        let lenient = DedupOptions::for_scenario(MatchScenario::Lenient);

        assert!(strict.time_tolerance_minutes <= normal.time_tolerance_minutes);
        assert!(normal.time_tolerance_minutes <= lenient.time_tolerance_minutes);
        assert!(strict.duration_tolerance_minutes <= normal.duration_tolerance_minutes);
        assert!(normal.duration_tolerance_minutes <= lenient.duration_tolerance_minutes);
        assert!(strict.name_match_threshold >= normal.name_match_threshold);
        assert!(normal.name_match_threshold >= lenient.name_match_threshold);
    }

    #[test]
    fn test_matches_sorted_descending() {
        let close = manual("Running", 1, 30);
        let closer = synced("Running", 0, 30);
        let incoming = manual("Running", 0, 30);

        let outcome =
            DuplicateDetector::detect(&incoming, &[close, closer], &DedupOptions::default());
        assert!(outcome.matches.len() >= 2);
        assert!(outcome.matches[0].match_score >= outcome.matches[1].match_score);
    }

    #[test]
    fn test_filter_batch_against_existing() {
        let existing = vec![manual("Running", 0, 30)];
        let batch = vec![
            synced("Running", 1, 30),  // duplicate of existing
            synced("Swimming", 240, 40), // unique
        ];

        let outcome =
            DuplicateDetector::filter_duplicates(batch, existing, &DedupOptions::default());
        assert_eq!(outcome.unique.len(), 1);
        assert_eq!(outcome.unique[0].name, "Swimming");
        assert_eq!(outcome.duplicate_count, 1);
        assert!(!outcome.duplicates.is_empty());
    }

    #[test]
    fn test_filter_checks_within_batch() {
        // Second batch member duplicates the first, which has no existing
        // counterpart: it must still be caught against the growing pool.
        let batch = vec![synced("Cycling", 0, 60), synced("Cycling", 1, 60)];

        let outcome =
            DuplicateDetector::filter_duplicates(batch, Vec::new(), &DedupOptions::default());
        assert_eq!(outcome.unique.len(), 1);
        assert_eq!(outcome.duplicate_count, 1);
    }
}
