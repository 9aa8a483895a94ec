//! Slipway build orchestration
//!
//! Builds a game player package for a target platform by expressing every
//! compilation, code generation, copy and packaging task as an action in a
//! dependency graph, then handing that graph to an external incremental
//! executor:
//! - Action graph construction with single-writer outputs
//! - Typed context store shared between build steps
//! - Ordered step sequencing with fail-fast reporting
//! - Incremental execution driver with graph regeneration on request
//! - Android packaging (gradle project export, manifests, resources)

pub mod action;
pub mod android;
pub mod context;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod order;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod profile;
pub mod progress;
pub mod session;
pub mod settings;
pub mod sources;
pub mod step;
pub mod steps;
pub mod template;
pub mod toolchain;

// Re-export main types
pub use action::{Action, ActionKind, ActionOptions};
pub use android::{AndroidBuildContext, AndroidPlatform, AndroidSettings};
pub use context::{ContextKind, ContextStore, ContextValue};
pub use descriptor::{ActionRecord, GraphDescriptor};
pub use driver::{
    DriveReport, DriverSettings, IncrementalDriver, NoProgress, ProgressSink,
    RERUN_FRONTEND_EXIT_CODE,
};
pub use error::{BuildError, BuildResult};
pub use graph::ActionGraph;
pub use manifest::AndroidManifest;
pub use pipeline::{BuildReport, BuildStats, GraphKind, Pipeline, PlanReport};
pub use platform::{PackageArtifact, Platform, PlatformData};
pub use process::{ChildHandle, LaunchRequest, LaunchedProcess, Launcher, ProcessExit};
pub use profile::BuildProfile;
pub use progress::{ProgressParser, ProgressUpdate};
pub use session::BuildSession;
pub use settings::{BuildSettings, Il2CppConfiguration, ScriptingBackend};
pub use sources::{PlatformTag, SourceSetTable};
pub use step::{BuildStep, SequenceReport, StepOutcome, StepSequence};
pub use template::{replace_tokens, unresolved_tokens, TemplateMode, TemplateValues};
pub use toolchain::{Architecture, ArchitectureEntry, Architectures, Toolchain, ToolchainRegistry};
