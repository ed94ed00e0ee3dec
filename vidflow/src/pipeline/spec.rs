//! Stage definitions and validated pipelines.

use crate::stages::StageExecutor;
use std::sync::Arc;

/// A single weighted stage in a pipeline.
#[derive(Debug, Clone)]
pub struct StageDefinition {
    /// The unique name of the stage.
    pub name: String,
    /// Share of total progress credited when the stage succeeds.
    pub weight: u8,
    /// The stage implementation.
    pub executor: Arc<dyn StageExecutor>,
}

impl StageDefinition {
    /// Creates a new stage definition.
    #[must_use]
    pub fn new(name: impl Into<String>, weight: u8, executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            name: name.into(),
            weight,
            executor,
        }
    }
}

/// An ordered, validated list of weighted stages.
///
/// Built through [`super::PipelineBuilder`], which guarantees the stage list
/// is non-empty, names are unique and weights sum to 100.
#[derive(Debug, Clone)]
pub struct StagePipeline {
    name: String,
    stages: Vec<StageDefinition>,
}

impl StagePipeline {
    pub(crate) fn new(name: String, stages: Vec<StageDefinition>) -> Self {
        Self { name, stages }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the first stage name.
    #[must_use]
    pub fn first_stage(&self) -> Option<&str> {
        self.stages.first().map(|s| s.name.as_str())
    }

    /// Progress reached once the first `completed` stages have succeeded.
    #[must_use]
    pub fn progress_after(&self, completed: usize) -> u8 {
        let total: u32 = self
            .stages
            .iter()
            .take(completed)
            .map(|s| u32::from(s.weight))
            .sum();
        u8::try_from(total.min(100)).unwrap_or(100)
    }
}
