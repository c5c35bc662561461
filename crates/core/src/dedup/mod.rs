//! Fuzzy duplicate detection for incoming exercise records.

pub mod detector;
pub mod similarity;

pub use detector::{
    DedupOptions, DedupOutcome, DuplicateDetector, FilterOutcome, MatchScenario, DUPLICATE_THRESHOLD,
    MATCH_CUTOFF,
};
pub use similarity::{name_similarity, normalize_name};
