use std::fmt;

use serde::Serialize;

/// Orchestrator state. Transitions only move forward; `Failed` and `Done`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Ingesting,
    Reconciling,
    Aggregating,
    Rendering,
    Done,
    Failed,
}

impl PipelineStage {
    /// The stage that follows on success, if any.
    pub fn next(self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Idle => Some(PipelineStage::Ingesting),
            PipelineStage::Ingesting => Some(PipelineStage::Reconciling),
            PipelineStage::Reconciling => Some(PipelineStage::Aggregating),
            PipelineStage::Aggregating => Some(PipelineStage::Rendering),
            PipelineStage::Rendering => Some(PipelineStage::Done),
            PipelineStage::Done | PipelineStage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }

    /// `Failed` is reachable from every non-terminal stage; everything else
    /// only from its predecessor.
    pub fn can_advance_to(self, to: PipelineStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == PipelineStage::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Ingesting => "ingesting",
            PipelineStage::Reconciling => "reconciling",
            PipelineStage::Aggregating => "aggregating",
            PipelineStage::Rendering => "rendering",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}
