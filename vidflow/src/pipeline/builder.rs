//! Pipeline builder with validation.

use super::{StageDefinition, StagePipeline};
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::StageExecutor;
use regex::Regex;
use std::sync::{Arc, LazyLock};

/// Total weight every pipeline must add up to.
pub const TOTAL_WEIGHT: u32 = 100;

static STAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("stage name pattern is valid"));

/// Builder for creating validated pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// The stage definitions in execution order.
    stages: Vec<StageDefinition>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage to the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is malformed or already used, the weight
    /// is zero, or the running weight total would exceed 100.
    pub fn stage(
        mut self,
        name: impl Into<String>,
        weight: u8,
        executor: Arc<dyn StageExecutor>,
    ) -> Result<Self, PipelineValidationError> {
        self.add_stage(StageDefinition::new(name, weight, executor))?;
        Ok(self)
    }

    /// Appends a stage definition.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn add_stage(&mut self, stage: StageDefinition) -> Result<(), PipelineValidationError> {
        if !STAGE_NAME.is_match(&stage.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage name '{}' must be lowercase snake_case",
                stage.name
            ))
            .with_stages(vec![stage.name.clone()])
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-STAGE-NAME", "Malformed stage name")
                    .with_fix_hint("Use lowercase letters, digits and underscores, starting with a letter."),
            ));
        }

        if self.stages.iter().any(|s| s.name == stage.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' is defined twice in pipeline '{}'",
                stage.name, self.name
            ))
            .with_stages(vec![stage.name.clone()])
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-DUPLICATE-STAGE", "Stage names must be unique")
                    .with_fix_hint("Rename one of the stages."),
            ));
        }

        if stage.weight == 0 {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' has zero weight",
                stage.name
            ))
            .with_stages(vec![stage.name.clone()])
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-WEIGHT-ZERO", "Stage weight must be positive")
                    .with_fix_hint("Give every stage a share of the pipeline's progress."),
            ));
        }

        let total = self.total_weight() + u32::from(stage.weight);
        if total > TOTAL_WEIGHT {
            return Err(weight_sum_error(&self.name, total, self.stage_names_with(&stage.name)));
        }

        self.stages.push(stage);
        Ok(())
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder has no stages or the weights do not
    /// sum to exactly 100.
    pub fn build(self) -> Result<StagePipeline, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages")
                .with_error_info(
                    ContractErrorInfo::new("PIPELINE-EMPTY", "Cannot build an empty pipeline")
                        .with_fix_hint("Add at least one stage to the pipeline before building."),
                ));
        }

        let total = self.total_weight();
        if total != TOTAL_WEIGHT {
            let names = self.stages.iter().map(|s| s.name.clone()).collect();
            return Err(weight_sum_error(&self.name, total, names));
        }

        Ok(StagePipeline::new(self.name, self.stages))
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the sum of weights added so far.
    #[must_use]
    pub fn total_weight(&self) -> u32 {
        self.stages.iter().map(|s| u32::from(s.weight)).sum()
    }

    fn stage_names_with(&self, extra: &str) -> Vec<String> {
        self.stages
            .iter()
            .map(|s| s.name.clone())
            .chain(std::iter::once(extra.to_string()))
            .collect()
    }
}

fn weight_sum_error(pipeline: &str, total: u32, stages: Vec<String>) -> PipelineValidationError {
    PipelineValidationError::new(format!(
        "Stage weights in pipeline '{pipeline}' sum to {total}, expected {TOTAL_WEIGHT}"
    ))
    .with_stages(stages)
    .with_error_info(
        ContractErrorInfo::new("PIPELINE-WEIGHT-SUM", "Stage weights must sum to 100")
            .with_context_entry("total", total.to_string())
            .with_fix_hint("Adjust stage weights so they add up to exactly 100."),
    )
}
