//! The closed set of pipelines, one per job type.

use super::{PipelineBuilder, StagePipeline};
use crate::core::JobType;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::StageExecutor;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A kind of stage the host supplies an executor for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageSlot {
    /// Extracts concepts and structure from the source documents.
    Analyze,
    /// Writes the narration script.
    Script,
    /// Produces visuals for each scene.
    Images,
    /// Synthesizes the voice-over.
    Narration,
    /// Assembles the final video.
    Render,
}

impl StageSlot {
    /// Returns the stage name used in pipelines.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Script => "script",
            Self::Images => "images",
            Self::Narration => "narration",
            Self::Render => "render",
        }
    }
}

impl fmt::Display for StageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage layout for a job type, in execution order.
#[must_use]
pub const fn layout(job_type: JobType) -> &'static [(StageSlot, u8)] {
    match job_type {
        JobType::VideoGeneration => &[
            (StageSlot::Analyze, 10),
            (StageSlot::Script, 20),
            (StageSlot::Images, 30),
            (StageSlot::Narration, 20),
            (StageSlot::Render, 20),
        ],
        JobType::ContentAnalysis => &[(StageSlot::Analyze, 100)],
        JobType::AudioOverview => &[
            (StageSlot::Analyze, 20),
            (StageSlot::Script, 30),
            (StageSlot::Narration, 50),
        ],
    }
}

/// Host-supplied executors, one per slot.
#[derive(Debug, Clone)]
pub struct StageExecutors {
    /// Content analysis.
    pub analyze: Arc<dyn StageExecutor>,
    /// Script generation.
    pub script: Arc<dyn StageExecutor>,
    /// Image synthesis.
    pub images: Arc<dyn StageExecutor>,
    /// Narration synthesis.
    pub narration: Arc<dyn StageExecutor>,
    /// Video rendering.
    pub render: Arc<dyn StageExecutor>,
}

impl StageExecutors {
    /// Returns the executor bound to `slot`.
    #[must_use]
    pub fn get(&self, slot: StageSlot) -> Arc<dyn StageExecutor> {
        match slot {
            StageSlot::Analyze => Arc::clone(&self.analyze),
            StageSlot::Script => Arc::clone(&self.script),
            StageSlot::Images => Arc::clone(&self.images),
            StageSlot::Narration => Arc::clone(&self.narration),
            StageSlot::Render => Arc::clone(&self.render),
        }
    }
}

/// Maps each job type to its validated pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineCatalog {
    pipelines: HashMap<JobType, Arc<StagePipeline>>,
}

impl PipelineCatalog {
    /// Builds the pipeline for every job type from `executors`.
    ///
    /// # Errors
    ///
    /// Returns the first pipeline validation failure.
    pub fn new(executors: &StageExecutors) -> Result<Self, PipelineValidationError> {
        let mut catalog = Self::empty();
        for job_type in JobType::ALL {
            let mut builder = PipelineBuilder::new(job_type.as_str());
            for &(slot, weight) in layout(job_type) {
                builder = builder.stage(slot.as_str(), weight, executors.get(slot))?;
            }
            catalog = catalog.with_pipeline(job_type, builder.build()?);
        }
        Ok(catalog)
    }

    /// Creates a catalog with no pipelines.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Binds `pipeline` to `job_type`, replacing any earlier binding.
    #[must_use]
    pub fn with_pipeline(mut self, job_type: JobType, pipeline: StagePipeline) -> Self {
        self.pipelines.insert(job_type, Arc::new(pipeline));
        self
    }

    /// Returns the pipeline for `job_type`.
    ///
    /// # Errors
    ///
    /// Returns `PIPELINE-MISSING` if no pipeline is bound.
    pub fn pipeline_for(&self, job_type: JobType) -> Result<Arc<StagePipeline>, PipelineValidationError> {
        self.pipelines.get(&job_type).cloned().ok_or_else(|| {
            PipelineValidationError::new(format!("No pipeline registered for job type '{job_type}'"))
                .with_error_info(
                    ContractErrorInfo::new("PIPELINE-MISSING", "Job type has no pipeline")
                        .with_context_entry("job_type", job_type.as_str())
                        .with_fix_hint("Bind a pipeline to this job type in the catalog."),
                )
        })
    }

    /// Returns true if `job_type` has a pipeline.
    #[must_use]
    pub fn contains(&self, job_type: JobType) -> bool {
        self.pipelines.contains_key(&job_type)
    }
}
