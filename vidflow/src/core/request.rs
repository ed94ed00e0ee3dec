//! Job submission requests.

use super::context::REQUEST_OWNER;
use super::{JobContext, StageOutput};
use crate::errors::InvalidRequestError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// The closed set of pipelines a job can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Full video: analysis, script, images, narration, render.
    VideoGeneration,
    /// Concept and keyword extraction only.
    ContentAnalysis,
    /// Narrated audio without visuals.
    AudioOverview,
}

impl JobType {
    /// All job types.
    pub const ALL: [Self; 3] = [Self::VideoGeneration, Self::ContentAnalysis, Self::AudioOverview];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VideoGeneration => "video_generation",
            Self::ContentAnalysis => "content_analysis",
            Self::AudioOverview => "audio_overview",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = InvalidRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|job_type| job_type.as_str() == s)
            .ok_or_else(|| InvalidRequestError::new("job_type", format!("unknown job type '{s}'")))
    }
}

/// Free-form generation settings supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Video title.
    pub title: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: String,
    /// Target duration in seconds; unset means the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    /// Visual style (e.g. "classic", "whiteboard").
    #[serde(default = "default_style")]
    pub style: String,
    /// Intended audience.
    #[serde(default = "default_audience")]
    pub audience: String,
    /// Channel or category the video is produced for.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Extra prompt text passed through to the stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

fn default_style() -> String {
    "classic".to_string()
}

fn default_audience() -> String {
    "adult".to_string()
}

fn default_channel() -> String {
    "research_papers".to_string()
}

impl GenerationOptions {
    /// Creates options with the given title and defaults elsewhere.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            duration_secs: None,
            style: default_style(),
            audience: default_audience(),
            channel: default_channel(),
            custom_prompt: None,
        }
    }

    /// Sets the duration.
    #[must_use]
    pub const fn with_duration_secs(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Sets the style.
    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    /// Sets the audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Sets the channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the custom prompt.
    #[must_use]
    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }
}

/// Bounds applied to incoming requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    /// Shortest accepted duration in seconds.
    pub min_duration_secs: u32,
    /// Longest accepted duration in seconds.
    pub max_duration_secs: u32,
    /// Maximum title length in characters.
    pub max_title_chars: usize,
    /// Maximum description length in characters.
    pub max_description_chars: usize,
    /// Duration applied when a request leaves it unset.
    pub default_duration_secs: u32,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            min_duration_secs: 60,
            max_duration_secs: 600,
            max_title_chars: 200,
            max_description_chars: 1000,
            default_duration_secs: 60,
        }
    }
}

/// A request to run one generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Which pipeline to run.
    pub job_type: JobType,
    /// References to source documents.
    pub input_refs: Vec<String>,
    /// Generation settings.
    pub options: GenerationOptions,
    /// Caller-chosen key rejecting duplicates while a job is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl JobRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(
        job_type: JobType,
        input_refs: impl IntoIterator<Item = impl Into<String>>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            job_type,
            input_refs: input_refs.into_iter().map(Into::into).collect(),
            options,
            idempotency_key: None,
        }
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Fills in options the caller left unset.
    #[must_use]
    pub fn with_defaults(mut self, limits: &RequestLimits) -> Self {
        self.options
            .duration_secs
            .get_or_insert(limits.default_duration_secs);
        self
    }

    /// Validates the request against `limits`.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidRequestError`] found.
    pub fn validate(&self, limits: &RequestLimits) -> Result<(), InvalidRequestError> {
        let title = self.options.title.trim();
        if title.is_empty() {
            return Err(InvalidRequestError::new("title", "title cannot be empty"));
        }
        if title.chars().count() > limits.max_title_chars {
            return Err(InvalidRequestError::new(
                "title",
                format!("title exceeds {} characters", limits.max_title_chars),
            ));
        }
        if self.options.description.chars().count() > limits.max_description_chars {
            return Err(InvalidRequestError::new(
                "description",
                format!("description exceeds {} characters", limits.max_description_chars),
            ));
        }

        let duration = self
            .options
            .duration_secs
            .unwrap_or(limits.default_duration_secs);
        if duration < limits.min_duration_secs {
            return Err(InvalidRequestError::new(
                "duration_secs",
                format!("duration must be at least {} seconds", limits.min_duration_secs),
            ));
        }
        if duration > limits.max_duration_secs {
            return Err(InvalidRequestError::new(
                "duration_secs",
                format!("duration cannot exceed {} seconds", limits.max_duration_secs),
            ));
        }

        if self.input_refs.iter().all(|r| r.trim().is_empty()) {
            return Err(InvalidRequestError::new(
                "input_refs",
                "at least one source is required",
            ));
        }

        if let Some(key) = &self.idempotency_key {
            if key.trim().is_empty() {
                return Err(InvalidRequestError::new(
                    "idempotency_key",
                    "idempotency key cannot be blank",
                ));
            }
        }

        Ok(())
    }

    /// Stable SHA-256 fingerprint of the job type, inputs and options.
    ///
    /// The idempotency key itself is excluded.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::json!({
            "job_type": self.job_type,
            "input_refs": self.input_refs,
            "options": self.options,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Builds the context the first stage sees.
    #[must_use]
    pub fn initial_context(&self) -> JobContext {
        let opts = &self.options;
        let mut seed = StageOutput::new()
            .with("request.title", serde_json::json!(opts.title))
            .with("request.description", serde_json::json!(opts.description))
            .with("request.duration_secs", serde_json::json!(opts.duration_secs))
            .with("request.style", serde_json::json!(opts.style))
            .with("request.audience", serde_json::json!(opts.audience))
            .with("request.channel", serde_json::json!(opts.channel))
            .with("request.input_refs", serde_json::json!(self.input_refs));
        if let Some(prompt) = &opts.custom_prompt {
            seed.insert("request.custom_prompt", serde_json::json!(prompt));
        }

        // An empty context has no owners to conflict with.
        JobContext::new()
            .merged(REQUEST_OWNER, seed)
            .unwrap_or_default()
    }
}
