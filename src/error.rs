use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// Failures raised while deriving advisory metrics for a project.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The planned window is empty or inverted.
    #[error("project {project_id} has an invalid planned window: {start} to {end}")]
    InvalidSchedule {
        project_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    },

    /// A precomputed progress report was supplied for a different project.
    #[error("progress report belongs to project {found}, expected {expected}")]
    ProgressMismatch { expected: Uuid, found: Uuid },

    /// Budgets and costs add up past the decimal range.
    #[error("amounts for project {project_id} overflow the decimal range")]
    Overflow { project_id: Uuid },
}
