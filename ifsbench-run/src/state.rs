//! Run State Machine
//!
//! ```text
//! Pending ─► Materializing ─► Launched ─► Monitoring ─► Completed
//!    │             │              │            ├──────► Failed
//!    │             └──► Failed    └──► Failed  └──────► TimedOut
//!    └─────────────── any non-terminal ───────────────► Cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle state of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, nothing done yet
    Pending,
    /// Writing the working directory
    Materializing,
    /// Process spawned
    Launched,
    /// Waiting for the process
    Monitoring,
    /// Exited with status 0 within the wall time
    Completed,
    /// Could not be set up or exited unsuccessfully
    Failed,
    /// Exceeded the wall time and was terminated
    TimedOut,
    /// Stopped by a cancellation request
    Cancelled,
}

/// Rejected state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid run state transition: {from} -> {to}")]
pub struct InvalidTransition {
    /// Current state
    pub from: RunState,
    /// Requested state
    pub to: RunState,
}

impl RunState {
    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::TimedOut | RunState::Cancelled
        )
    }

    /// Whether `self -> to` is a legal transition
    pub fn can_transition(self, to: RunState) -> bool {
        use RunState::*;
        match (self, to) {
            (from, Cancelled) => !from.is_terminal(),
            (Pending, Materializing)
            | (Materializing, Launched)
            | (Materializing, Failed)
            | (Launched, Monitoring)
            | (Launched, Failed)
            | (Monitoring, Completed)
            | (Monitoring, Failed)
            | (Monitoring, TimedOut) => true,
            _ => false,
        }
    }

    /// Next state, or an error if the transition is illegal
    pub fn transition(self, to: RunState) -> Result<RunState, InvalidTransition> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Materializing => "materializing",
            RunState::Launched => "launched",
            RunState::Monitoring => "monitoring",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::TimedOut => "timed_out",
            RunState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One entry of a run's state history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    /// State entered
    pub state: RunState,
    /// When it was entered
    pub at: DateTime<Utc>,
}

/// Current state plus every state entered so far
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: RunState,
    history: Vec<StateChange>,
}

impl StateMachine {
    /// Machine in `Pending`
    pub fn new() -> Self {
        Self {
            state: RunState::Pending,
            history: vec![StateChange {
                state: RunState::Pending,
                at: Utc::now(),
            }],
        }
    }

    /// Current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// States entered, oldest first
    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    /// Move to `to`, recording it
    pub fn advance(&mut self, to: RunState) -> Result<RunState, InvalidTransition> {
        self.state = self.state.transition(to)?;
        self.history.push(StateChange { state: to, at: Utc::now() });
        Ok(to)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
