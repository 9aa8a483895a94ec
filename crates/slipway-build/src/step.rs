//! Build steps and the sequencer that runs them
//!
//! Steps run strictly in declared order. A step reads and writes the context
//! store and adds actions to the graph; it never executes anything. The first
//! failing step stops the sequence. Actions added before the failure stay in
//! the graph so it can still be written out and inspected.

use crate::context::{ContextKind, ContextStore};
use crate::error::{BuildError, BuildResult};
use crate::session::BuildSession;
use log::{debug, info, warn};
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Result of a step that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success { message: Option<String> },
    Failure { message: String },
}

impl StepOutcome {
    pub fn success() -> Self {
        Self::Success { message: None }
    }

    /// Success carrying progress text
    pub fn success_with(message: impl Into<String>) -> Self {
        Self::Success {
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// A unit of sequencing
pub trait BuildStep {
    /// Step name used in logs and failure reports
    fn name(&self) -> &str;

    /// Context kinds this step reads
    fn consumes(&self) -> &[ContextKind] {
        &[]
    }

    /// Context kinds this step sets for later steps
    fn produces(&self) -> &[ContextKind] {
        &[]
    }

    /// Add actions and context values for this step
    fn run(&self, session: &mut BuildSession) -> BuildResult<StepOutcome>;
}

/// Record of a step that succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub name: String,
    pub message: Option<String>,
    pub duration: Duration,
}

/// Why the sequence stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: String,
    pub message: String,
}

/// Outcome of running a whole sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceReport {
    pub completed: Vec<StepRecord>,
    pub failure: Option<StepFailure>,
}

impl SequenceReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Convert a failed report into [`BuildError::StepFailed`]
    pub fn into_result(self) -> BuildResult<Self> {
        match self.failure {
            Some(failure) => Err(BuildError::StepFailed {
                step: failure.step,
                message: failure.message,
            }),
            None => Ok(self),
        }
    }
}

/// Ordered list of build steps
#[derive(Default)]
pub struct StepSequence {
    steps: Vec<Box<dyn BuildStep>>,
}

impl StepSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step (builder style)
    pub fn with(mut self, step: impl BuildStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Append a step
    pub fn push(&mut self, step: Box<dyn BuildStep>) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in execution order
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Pre-flight check: report consumed kinds that neither the store nor an
    /// earlier step provides. Best effort; nothing is enforced.
    pub fn validate(&self, context: &ContextStore) -> Vec<String> {
        let mut available: BTreeSet<ContextKind> = context.kinds().into_iter().collect();
        let mut warnings = Vec::new();

        for step in &self.steps {
            for kind in step.consumes() {
                if !available.contains(kind) {
                    let warning = format!(
                        "step '{}' reads '{}' but nothing provides it beforehand",
                        step.name(),
                        kind
                    );
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
            available.extend(step.produces().iter().copied());
        }

        warnings
    }

    /// Run every step in order, stopping at the first failure
    pub fn run(&self, session: &mut BuildSession) -> SequenceReport {
        let mut report = SequenceReport::default();

        for step in &self.steps {
            let started = Instant::now();
            debug!("running step '{}'", step.name());

            let result = panic::catch_unwind(AssertUnwindSafe(|| step.run(session)));
            let message = match result {
                Ok(Ok(StepOutcome::Success { message })) => {
                    if let Some(message) = &message {
                        info!("{}: {}", step.name(), message);
                    }
                    report.completed.push(StepRecord {
                        name: step.name().to_string(),
                        message,
                        duration: started.elapsed(),
                    });
                    continue;
                }
                Ok(Ok(StepOutcome::Failure { message })) => message,
                Ok(Err(error)) => error.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };

            warn!("step '{}' failed: {}", step.name(), message);
            report.failure = Some(StepFailure {
                step: step.name().to_string(),
                message,
            });
            break;
        }

        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
