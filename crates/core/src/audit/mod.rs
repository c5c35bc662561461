//! Audit trail: append-mostly mutation log with rolling cap and undo.

pub mod manager;

pub use manager::{
    AuditQuery, AuditStatistics, AuditTrailManager, UndoEligibility, UndoOutcome,
};
