//! Test fixtures for registry and orchestrator tests.

use std::sync::Arc;

use super::StaticExecutor;
use crate::core::{GenerationOptions, JobRequest, JobType};
use crate::pipeline::{PipelineCatalog, StageDefinition, StageExecutors, StagePipeline};
use crate::registry::JobRegistry;
use crate::stages::StageExecutor;

/// A valid video-generation request.
#[must_use]
pub fn sample_request() -> JobRequest {
    JobRequest::new(
        JobType::VideoGeneration,
        ["paper-1706.03762"],
        GenerationOptions::new("Attention Is All You Need")
            .with_description("Transformers explained")
            .with_duration_secs(120),
    )
}

/// Stages `stage1`, `stage2`, `stage3` weighted 20, 50 and 30.
#[must_use]
pub fn three_stage_pipeline(
    stage1: Arc<dyn StageExecutor>,
    stage2: Arc<dyn StageExecutor>,
    stage3: Arc<dyn StageExecutor>,
) -> StagePipeline {
    StagePipeline::new(
        "three_stage".to_string(),
        vec![
            StageDefinition::new("stage1", 20, stage1),
            StageDefinition::new("stage2", 50, stage2),
            StageDefinition::new("stage3", 30, stage3),
        ],
    )
}

/// A registry running `pipeline` for video-generation jobs.
#[must_use]
pub fn registry_with(pipeline: StagePipeline, max_concurrent_jobs: usize) -> JobRegistry {
    JobRegistry::builder(PipelineCatalog::empty().with_pipeline(JobType::VideoGeneration, pipeline))
        .max_concurrent_jobs(max_concurrent_jobs)
        .build()
}

/// Executors that each write a key named after their slot.
#[must_use]
pub fn static_executors() -> StageExecutors {
    StageExecutors {
        analyze: Arc::new(StaticExecutor::writing("concepts", serde_json::json!(["attention"]))),
        script: Arc::new(StaticExecutor::writing("script", serde_json::json!("Once upon a time"))),
        images: Arc::new(StaticExecutor::writing("images", serde_json::json!(["scene1.png"]))),
        narration: Arc::new(StaticExecutor::writing("audio", serde_json::json!("narration.mp3"))),
        render: Arc::new(StaticExecutor::writing("video", serde_json::json!("final.mp4"))),
    }
}
