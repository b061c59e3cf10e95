//! Lifecycle of one download.
//!
//! ```text
//! Idle -> Prefetching -> Partitioning -> Downloading -> Merging -> Verifying -> Done
//!   \__________\_____________\______________\_____________\___________\______> Failed
//! ```

use std::fmt;
use tracing::{info, warn};

/// State of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Prefetching,
    Partitioning,
    Downloading,
    Merging,
    Verifying,
    Done,
    Failed,
}

impl Phase {
    /// The phase that follows on success; `None` for terminal phases.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Idle => Some(Phase::Prefetching),
            Phase::Prefetching => Some(Phase::Partitioning),
            Phase::Partitioning => Some(Phase::Downloading),
            Phase::Downloading => Some(Phase::Merging),
            Phase::Merging => Some(Phase::Verifying),
            Phase::Verifying => Some(Phase::Done),
            Phase::Done | Phase::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Prefetching => "prefetching",
            Phase::Partitioning => "partitioning",
            Phase::Downloading => "downloading",
            Phase::Merging => "merging",
            Phase::Verifying => "verifying",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moves a run through its phases and reports each transition.
pub(crate) struct PhaseMachine<'a> {
    current: Phase,
    observer: Option<&'a (dyn Fn(Phase) + Send + Sync)>,
}

impl<'a> PhaseMachine<'a> {
    pub(crate) fn new(observer: Option<&'a (dyn Fn(Phase) + Send + Sync)>) -> Self {
        Self {
            current: Phase::Idle,
            observer,
        }
    }

    pub(crate) fn current(&self) -> Phase {
        self.current
    }

    /// Steps to the successor of the current phase.
    pub(crate) fn advance(&mut self) -> Phase {
        if let Some(next) = self.current.next() {
            info!("Download {} -> {}", self.current, next);
            self.enter(next);
        }
        self.current
    }

    /// Enters `Failed`, returning the phase that was running.
    pub(crate) fn fail(&mut self, error: &dyn fmt::Display) -> Phase {
        let failed = self.current;
        warn!("Download failed while {}: {}", failed, error);
        self.enter(Phase::Failed);
        failed
    }

    fn enter(&mut self, phase: Phase) {
        self.current = phase;
        if let Some(observer) = self.observer {
            observer(phase);
        }
    }
}
