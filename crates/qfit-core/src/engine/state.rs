use super::error::{EngineError, ErrorKind};
use std::fmt;

/// Pipeline stage a region was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Sampling,
    Filtering,
    Scoring,
    Solving,
    Merging,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Sampling => "sampling",
            Stage::Filtering => "filtering",
            Stage::Scoring => "scoring",
            Stage::Solving => "solving",
            Stage::Merging => "merging",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a region: `Pending → Sampled → Filtered → Scored → Solved → Merged`, or
/// `Failed` from whichever stage raised an error.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RegionState {
    #[default]
    Pending,
    Sampled,
    Filtered,
    Scored,
    Solved,
    Merged,
    Failed {
        stage: Stage,
        kind: ErrorKind,
        message: String,
    },
}

impl RegionState {
    /// The stage that moves a region out of this state, if any.
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            RegionState::Pending => Some(Stage::Sampling),
            RegionState::Sampled => Some(Stage::Filtering),
            RegionState::Filtered => Some(Stage::Scoring),
            RegionState::Scored => Some(Stage::Solving),
            RegionState::Solved => Some(Stage::Merging),
            RegionState::Merged | RegionState::Failed { .. } => None,
        }
    }

    /// Moves to the state that follows a successful `next_stage`; terminal states stay put.
    pub fn advance(&mut self) {
        *self = match self {
            RegionState::Pending => RegionState::Sampled,
            RegionState::Sampled => RegionState::Filtered,
            RegionState::Filtered => RegionState::Scored,
            RegionState::Scored => RegionState::Solved,
            RegionState::Solved => RegionState::Merged,
            RegionState::Merged => RegionState::Merged,
            RegionState::Failed { .. } => return,
        };
    }

    /// Records a failure of the stage the region was about to complete.
    pub fn fail(&mut self, error: &EngineError) {
        let stage = self.next_stage().unwrap_or(Stage::Merging);
        *self = RegionState::Failed {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        };
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RegionState::Failed { .. })
    }

    /// Solved or merged.
    pub fn is_success(&self) -> bool {
        matches!(self, RegionState::Solved | RegionState::Merged)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RegionState::Pending => "pending",
            RegionState::Sampled => "sampled",
            RegionState::Filtered => "filtered",
            RegionState::Scored => "scored",
            RegionState::Solved => "solved",
            RegionState::Merged => "merged",
            RegionState::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_through_every_stage() {
        let mut state = RegionState::default();
        let mut stages = Vec::new();
        while let Some(stage) = state.next_stage() {
            stages.push(stage);
            state.advance();
        }
        assert_eq!(
            stages,
            vec![
                Stage::Sampling,
                Stage::Filtering,
                Stage::Scoring,
                Stage::Solving,
                Stage::Merging
            ]
        );
        assert_eq!(state, RegionState::Merged);
        assert!(state.is_success());
    }

    #[test]
    fn failure_records_the_pending_stage() {
        let mut state = RegionState::Scored;
        state.fail(&EngineError::Infeasible("no candidates".into()));
        match &state {
            RegionState::Failed { stage, kind, message } => {
                assert_eq!(*stage, Stage::Solving);
                assert_eq!(*kind, ErrorKind::Infeasible);
                assert!(message.contains("no candidates"));
            }
            other => panic!("unexpected state {other:?}"),
        }
        state.advance();
        assert!(state.is_failed());
        assert_eq!(state.label(), "failed");
    }
}
