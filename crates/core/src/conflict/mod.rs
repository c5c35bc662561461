//! Conflict detection and resolution between manual and synced records.

pub mod detector;
pub mod merger;
pub mod resolver;

pub use detector::ConflictDetector;
pub use merger::RecordMerger;
pub use resolver::{ConflictResolver, ResolutionOutcome, ResolveOptions};
