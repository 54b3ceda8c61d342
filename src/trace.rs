//! Append-only log of the pipeline stages that ran for one question.

use crate::models::{StepStatus, ThinkingStep};

pub const STEP_LOAD: &str = "Loading repository index";
pub const STEP_REBUILD: &str = "Rebuilding index";
pub const STEP_ROUTE: &str = "Analyzing question";
pub const STEP_FETCH: &str = "Fetching files";
pub const STEP_CONTEXT: &str = "Building context";
pub const STEP_ANSWER: &str = "Generating answer";

#[derive(Debug, Default)]
pub struct Trace {
    steps: Vec<ThinkingStep>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&mut self, label: &str, detail: impl Into<String>) {
        self.push(label, detail.into(), StepStatus::Complete);
    }

    pub fn fail(&mut self, label: &str, detail: impl Into<String>) {
        self.push(label, detail.into(), StepStatus::Failed);
    }

    fn push(&mut self, label: &str, detail: String, status: StepStatus) {
        tracing::debug!(step = label, detail = %detail, ?status, "pipeline step");
        self.steps.push(ThinkingStep {
            label: label.to_string(),
            detail,
            status,
        });
    }

    pub fn into_steps(self) -> Vec<ThinkingStep> {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_keep_insertion_order() {
        let mut trace = Trace::new();
        trace.complete(STEP_LOAD, "cached");
        trace.fail(STEP_REBUILD, "404");
        let steps = trace.into_steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].label, STEP_LOAD);
        assert_eq!(steps[1].status, StepStatus::Failed);
    }
}
