//! Detection and repair of drift in the cached seat counters.
//!
//! The tool runs on demand (admin endpoint or the `reconcile` binary),
//! never on a timer.

pub mod error;
pub mod reconciler;
pub mod report;

pub use error::{ReconcileError, Result};
pub use reconciler::Reconciler;
pub use report::{
    DiagnosticReport, RESET_CONFIRMATION, ReconcileSummary, ReservationLine, ResetConfirmation,
};
