use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pipeline::error::PipelineError;

/// Orchestrator states. Section states carry the section index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum PipelineState {
    /// Splitting the document into sections.
    Segmenting,
    /// Computing a section's importance and budget.
    ScoringSection(usize),
    /// Extracting terms and ranking sentences.
    Extracting(usize),
    /// Generating the compressed summary.
    Abstracting(usize),
    /// Reinserting uncovered sentences.
    Verifying(usize),
    /// Rescaling sections to the global budget.
    Reconciling,
    /// Rendering the final document.
    Formatting,
    /// Finished successfully.
    Done,
    /// Aborted with a reason.
    Failed(String),
}

impl PipelineState {
    /// True for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_advance_to(&self, next: &Self) -> bool {
        use PipelineState::{
            Abstracting, Done, Extracting, Failed, Formatting, Reconciling, ScoringSection,
            Segmenting, Verifying,
        };
        match (self, next) {
            (from, Failed(_)) => !from.is_terminal(),
            (Segmenting, ScoringSection(_) | Done)
            | (Reconciling, Formatting)
            | (Formatting, Done) => true,
            (ScoringSection(a), Extracting(b))
            | (Extracting(a), Abstracting(b))
            | (Abstracting(a), Verifying(b)) => a == b,
            // a degraded section skips verification
            (Abstracting(a) | Verifying(a), ScoringSection(b)) => b > a,
            (Abstracting(_) | Verifying(_), Reconciling) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segmenting => f.write_str("segmenting"),
            Self::ScoringSection(i) => write!(f, "scoring_section({i})"),
            Self::Extracting(i) => write!(f, "extracting({i})"),
            Self::Abstracting(i) => write!(f, "abstracting({i})"),
            Self::Verifying(i) => write!(f, "verifying({i})"),
            Self::Reconciling => f.write_str("reconciling"),
            Self::Formatting => f.write_str("formatting"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}

/// Validated state history of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTracker {
    history: Vec<PipelineState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    /// Starts in `Segmenting`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: vec![PipelineState::Segmenting],
        }
    }

    /// Current state.
    #[must_use]
    pub fn current(&self) -> &PipelineState {
        // history is never empty
        &self.history[self.history.len() - 1]
    }

    /// Moves to `next` when the transition is legal.
    pub fn advance(&mut self, next: PipelineState) -> Result<(), PipelineError> {
        if !self.current().can_advance_to(&next) {
            return Err(PipelineError::InvalidTransition {
                from: self.current().clone(),
                to: next,
            });
        }
        self.history.push(next);
        Ok(())
    }

    /// Enters `Failed(reason)` unless already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.current().is_terminal() {
            self.history.push(PipelineState::Failed(reason.into()));
        }
    }

    /// Every state visited, in order.
    #[must_use]
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Consumes the tracker.
    #[must_use]
    pub fn into_history(self) -> Vec<PipelineState> {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn full_run_is_accepted() {
        let mut tracker = StateTracker::new();
        for state in [
            ScoringSection(0),
            Extracting(0),
            Abstracting(0),
            Verifying(0),
            ScoringSection(2),
            Extracting(2),
            Abstracting(2),
            Reconciling,
            Formatting,
            Done,
        ] {
            tracker.advance(state).unwrap();
        }
        assert_eq!(tracker.current(), &Done);
        assert_eq!(tracker.history().len(), 11);
    }

    #[test]
    fn empty_document_goes_straight_to_done() {
        let mut tracker = StateTracker::new();
        tracker.advance(Done).unwrap();
        assert_eq!(tracker.into_history(), vec![Segmenting, Done]);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut tracker = StateTracker::new();
        let err = tracker.advance(Formatting).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
        tracker.advance(ScoringSection(1)).unwrap();
        assert!(tracker.advance(Extracting(2)).is_err());
    }

    #[test]
    fn failure_is_reachable_once() {
        let mut tracker = StateTracker::new();
        tracker.advance(ScoringSection(0)).unwrap();
        tracker.fail("generator crashed");
        tracker.fail("again");
        assert_eq!(tracker.current(), &Failed("generator crashed".into()));
        assert!(tracker.advance(Done).is_err());
        assert_eq!(tracker.current().to_string(), "failed(generator crashed)");
    }
}
