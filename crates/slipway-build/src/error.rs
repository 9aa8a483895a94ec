/// Build pipeline error types
use crate::context::ContextKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Missing context value '{kind}': no earlier step or platform setup provided it")]
    MissingContext { kind: ContextKind },

    #[error("Missing tool '{tool}': {reason}")]
    MissingTool { tool: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Output {path} is already produced by '{existing}', refusing to add '{attempted}'")]
    DuplicateOutput {
        path: PathBuf,
        existing: String,
        attempted: String,
    },

    #[error("Executor failed ({}):\n{output}", describe_exit(*code))]
    ExecutorFailed { code: Option<i32>, output: String },

    #[error("Executor produced no output for {}s and was killed", idle.as_secs())]
    ExecutorIdle { idle: Duration },

    #[error("Executor run was cancelled")]
    ExecutorCancelled,

    #[error("Executor still requested a frontend rerun after {passes} passes")]
    PassLimitExceeded { passes: u32 },

    #[error("Packaging failed: {0}")]
    PackagingFailed(String),

    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("Template '{template}': {reason}")]
    Template { template: String, reason: String },

    #[error("Cyclic action graph: {0}")]
    CyclicGraph(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Descriptor serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] slipway_config::ConfigError),
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a missing tool error
    pub fn missing_tool(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::MissingTool {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a template error
    pub fn template(template: impl Into<String>, reason: impl ToString) -> Self {
        Self::Template {
            template: template.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a step failure
    pub fn step_failed(step: impl Into<String>, message: impl ToString) -> Self {
        Self::StepFailed {
            step: step.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error comes from the environment rather than from the build itself
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingContext { .. }
                | Self::MissingTool { .. }
                | Self::InvalidConfiguration(_)
                | Self::Config(_)
        )
    }
}
