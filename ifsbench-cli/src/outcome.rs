//! Process exit codes

use ifsbench_run::RunState;
use ifsbench_spec::SpecError;

/// Exit code for errors that are not a run outcome
pub const EXIT_ERROR: i32 = 5;

/// Overall outcome of a command, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Outcome {
    /// Every run completed
    Completed,
    /// At least one run was cancelled
    Cancelled,
    /// At least one run exceeded its wall time
    TimedOut,
    /// At least one run failed
    Failed,
    /// A spec did not validate
    InvalidSpec,
}

impl Outcome {
    /// Process exit code
    pub fn code(self) -> i32 {
        match self {
            Outcome::Completed => 0,
            Outcome::Failed => 1,
            Outcome::TimedOut => 2,
            Outcome::Cancelled => 3,
            Outcome::InvalidSpec => 4,
        }
    }

    /// Outcome of one terminal run state
    pub fn from_state(state: RunState) -> Self {
        match state {
            RunState::Completed => Outcome::Completed,
            RunState::TimedOut => Outcome::TimedOut,
            RunState::Cancelled => Outcome::Cancelled,
            _ => Outcome::Failed,
        }
    }

    /// Most severe outcome of a batch; an empty batch completed
    pub fn worst(states: impl IntoIterator<Item = RunState>) -> Self {
        states
            .into_iter()
            .map(Outcome::from_state)
            .max()
            .unwrap_or(Outcome::Completed)
    }
}

/// Exit code for an error that escaped a command
pub fn error_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SpecError>() {
        Some(SpecError::Io { .. }) | None => EXIT_ERROR,
        Some(_) => Outcome::InvalidSpec.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifsbench_spec::{InvalidSpecError, Violation};

    #[test]
    fn test_most_severe_wins() {
        assert_eq!(Outcome::worst([]), Outcome::Completed);
        assert_eq!(
            Outcome::worst([RunState::Completed, RunState::Cancelled, RunState::TimedOut]),
            Outcome::TimedOut
        );
        assert_eq!(
            Outcome::worst([RunState::TimedOut, RunState::Failed, RunState::Completed]),
            Outcome::Failed
        );
        assert!(Outcome::InvalidSpec > Outcome::Failed);
    }

    #[test]
    fn test_codes() {
        assert_eq!(Outcome::worst([RunState::Completed]).code(), 0);
        assert_eq!(Outcome::from_state(RunState::Failed).code(), 1);
        assert_eq!(Outcome::from_state(RunState::TimedOut).code(), 2);
        assert_eq!(Outcome::from_state(RunState::Cancelled).code(), 3);
    }

    #[test]
    fn test_error_codes() {
        let invalid = SpecError::Invalid(InvalidSpecError {
            violations: vec![Violation {
                experiment: None,
                message: "no configuration layers".to_string(),
            }],
        });
        assert_eq!(error_code(&anyhow::Error::from(invalid)), 4);
        assert_eq!(error_code(&anyhow::anyhow!("disk full")), EXIT_ERROR);
    }
}
