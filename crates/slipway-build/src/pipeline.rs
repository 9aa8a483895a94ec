//! Build pipeline: graph generation passes and executor driving
//!
//! A build generates and runs two graphs. The type database graph comes
//! first, then the full graph whose final action produces the package. When
//! the executor asks for a rerun, the same graph kind is regenerated from
//! scratch against the context store before it is started again.

use crate::android::AndroidPlatform;
use crate::context::ContextStore;
use crate::descriptor::{backup_pass_file, GraphDescriptor};
use crate::driver::{DriverSettings, IncrementalDriver, ProgressSink};
use crate::error::{BuildError, BuildResult};
use crate::graph::ActionGraph;
use crate::platform::{PackageArtifact, Platform};
use crate::session::BuildSession;
use crate::settings::BuildSettings;
use crate::step::SequenceReport;
use crate::steps::{AdditionalFiles, ManagedAssemblies};
use log::{debug, info, warn};
use slipway_config::Config;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Project directory whose files are deployed as player data
pub const DATA_DIR: &str = "Data";

/// Which graph a pass generates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    TypeDb,
    Full,
}

impl GraphKind {
    /// Descriptor file name inside the state directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::TypeDb => "graph_typedb.json",
            Self::Full => "graph.json",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::TypeDb => "type database",
            Self::Full => "player",
        }
    }
}

/// Result of generating one graph without running it
#[derive(Debug, Clone)]
pub struct PlanReport {
    pub kind: GraphKind,
    pub descriptor_path: PathBuf,
    pub descriptor: GraphDescriptor,
    pub steps: SequenceReport,
}

/// Summary of the last full graph
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildStats {
    pub actions: usize,
    /// Action count per kind (`command`, `copy`, `write_text`)
    pub kinds: BTreeMap<String, usize>,
    pub duration: Duration,
}

/// Result of a successful build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub package: Option<PackageArtifact>,
    /// Executor invocations across both graphs
    pub passes: u32,
    pub stats: BuildStats,
}

/// Drives a platform's step sequences through the executor
pub struct Pipeline {
    platform: Box<dyn Platform>,
    settings: BuildSettings,
    driver: Option<IncrementalDriver>,
}

impl Pipeline {
    pub fn new(platform: Box<dyn Platform>, settings: BuildSettings) -> Self {
        Self {
            platform,
            settings,
            driver: None,
        }
    }

    pub fn with_driver(mut self, driver: IncrementalDriver) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Android pipeline from loaded configuration
    ///
    /// The executor is optional here; only [`build`](Self::build) needs it.
    pub fn from_config(config: &Config) -> BuildResult<Self> {
        let settings = BuildSettings::from_config(config)?;
        let platform = Box::new(AndroidPlatform::from_config(config));
        let mut pipeline = Self::new(platform, settings);

        if let Some(executor) = pipeline.settings.tools.executor.clone() {
            let executor_config = config.project.executor.clone().unwrap_or_default();
            let driver_settings =
                DriverSettings::new(executor, pipeline.settings.project_root.clone())
                    .with_config(&executor_config);
            pipeline = pipeline.with_driver(IncrementalDriver::system(driver_settings)?);
        }
        Ok(pipeline)
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn platform_name(&self) -> &str {
        self.platform.name()
    }

    pub fn graph_path(&self, kind: GraphKind) -> PathBuf {
        self.settings.state_dir().join(kind.file_name())
    }

    /// Context store with settings, data files and platform values
    pub fn prepare(&self) -> BuildResult<ContextStore> {
        let state_dir = self.settings.state_dir();
        fs::create_dir_all(&state_dir).map_err(|e| BuildError::io(&state_dir, e))?;

        let mut context = ContextStore::new();
        context.set(self.settings.clone());

        let data_files = AdditionalFiles::from_dir(&self.settings.project_root.join(DATA_DIR))?;
        if !data_files.is_empty() {
            debug!("{} player data files", data_files.len());
            context.set(data_files);
        }

        self.platform.prepare_context(&mut context)?;
        Ok(context)
    }

    /// Generate `kind` from scratch for `pass` and write its descriptor
    ///
    /// On a step failure the partial graph is still written for diagnosis.
    fn generate(
        &self,
        session: &mut BuildSession,
        kind: GraphKind,
        pass: u32,
    ) -> BuildResult<(GraphDescriptor, SequenceReport)> {
        self.platform.reset_pass_state(&mut session.context);
        session.context.take::<PackageArtifact>();
        session.context.take::<ManagedAssemblies>();

        let title = format!(
            "{} {} ({})",
            self.platform.name(),
            kind.label(),
            self.settings.profile
        );
        session.begin_pass(pass, ActionGraph::new(title, self.settings.artifacts_dir()));

        let sequence = match kind {
            GraphKind::TypeDb => self.platform.typedb_steps(),
            GraphKind::Full => self.platform.steps(),
        };
        sequence.validate(&session.context);
        let report = sequence.run(session);

        let path = self.graph_path(kind);
        if !report.is_success() {
            if let Err(e) = session.graph.write(&path) {
                warn!("could not write partial graph {}: {}", path.display(), e);
            }
            report.clone().into_result()?;
        }

        let descriptor = session.graph.write(&path)?;
        backup_pass_file(&path, pass)?;
        info!(
            "{} graph pass {}: {} actions",
            kind.label(),
            pass,
            descriptor.actions.len()
        );
        Ok((descriptor, report))
    }

    /// Generate one graph without running the executor
    pub fn plan(&self, kind: GraphKind) -> BuildResult<PlanReport> {
        let context = self.prepare()?;
        let mut session = BuildSession::new(context, ActionGraph::new("", self.settings.artifacts_dir()));
        let (descriptor, steps) = self.generate(&mut session, kind, 0)?;
        Ok(PlanReport {
            kind,
            descriptor_path: self.graph_path(kind),
            descriptor,
            steps,
        })
    }

    /// Generate and run the type database graph, then the full graph
    pub fn build(&self, sink: &mut dyn ProgressSink) -> BuildResult<BuildReport> {
        let driver = self.driver.as_ref().ok_or_else(|| {
            BuildError::missing_tool(
                "executor",
                "not configured; set [executor] path in slipway.toml or SLIPWAY_EXECUTOR",
            )
        })?;

        let started = Instant::now();
        let context = self.prepare()?;
        let mut session =
            BuildSession::new(context, ActionGraph::new("", self.settings.artifacts_dir()));
        let mut passes = 0;

        for kind in [GraphKind::TypeDb, GraphKind::Full] {
            self.generate(&mut session, kind, 0)?;
            let path = self.graph_path(kind);
            let report = driver.run(
                &path,
                0,
                &mut |pass| self.generate(&mut session, kind, pass).map(|_| ()),
                sink,
            )?;
            passes += report.invocations;
        }

        let mut kinds = BTreeMap::new();
        for action in session.graph.actions() {
            *kinds.entry(action.kind.label().to_string()).or_insert(0) += 1;
        }
        let stats = BuildStats {
            actions: session.graph.len(),
            kinds,
            duration: started.elapsed(),
        };

        let package = session.context.take::<PackageArtifact>();
        if let Some(package) = &package {
            info!("package: {}", package.path.display());
        }
        Ok(BuildReport {
            package,
            passes,
            stats,
        })
    }

    /// Remove the artifacts of this configuration; false when there were none
    pub fn clean(&self) -> BuildResult<bool> {
        let artifacts = self.settings.artifacts_dir();
        if !artifacts.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&artifacts).map_err(|e| BuildError::io(&artifacts, e))?;
        info!("removed {}", artifacts.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{BuildStep, StepOutcome, StepSequence};
    use crate::profile::BuildProfile;
    use crate::settings::{Il2CppConfiguration, ScriptingBackend};
    use std::path::Path;
    use tempfile::TempDir;

    struct Echo;

    impl BuildStep for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        fn run(&self, session: &mut BuildSession) -> BuildResult<StepOutcome> {
            let out = session.graph.artifacts_root().join("echo.txt");
            session.graph.add_write_text_action(&out, "echo")?;
            Ok(StepOutcome::success())
        }
    }

    struct EchoPlatform;

    impl Platform for EchoPlatform {
        fn name(&self) -> &str {
            "echo"
        }

        fn prepare_context(&self, _context: &mut ContextStore) -> BuildResult<()> {
            Ok(())
        }

        fn typedb_steps(&self) -> StepSequence {
            StepSequence::new()
        }

        fn steps(&self) -> StepSequence {
            StepSequence::new().with(Echo)
        }
    }

    fn settings(root: &Path) -> BuildSettings {
        BuildSettings {
            product_name: "Echo".to_string(),
            identifier: "com.example.echo".to_string(),
            version_name: "1.0".to_string(),
            version_code: 1,
            profile: BuildProfile::Debug,
            scripting_backend: ScriptingBackend::Mono,
            il2cpp_configuration: Il2CppConfiguration::Debug,
            project_root: root.to_path_buf(),
            output_dir: root.join("build"),
            sources: Vec::new(),
            player_package: root.join("player"),
            tools: Default::default(),
        }
    }

    #[test]
    fn test_plan_writes_descriptor() {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::new(Box::new(EchoPlatform), settings(temp.path()));

        let plan = pipeline.plan(GraphKind::Full).unwrap();

        assert_eq!(plan.descriptor.actions.len(), 1);
        assert!(plan.descriptor_path.ends_with(".slipway/debug/graph.json"));
        assert!(plan.descriptor_path.is_file());
        assert!(temp.path().join(".slipway/debug/graph0.json").is_file());
    }

    #[test]
    fn test_build_without_executor_fails_fast() {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::new(Box::new(EchoPlatform), settings(temp.path()));

        let err = pipeline.build(&mut crate::driver::NoProgress).unwrap_err();

        assert!(matches!(err, BuildError::MissingTool { .. }));
        assert!(!temp.path().join(".slipway").exists());
    }

    #[test]
    fn test_clean_removes_artifacts() {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::new(Box::new(EchoPlatform), settings(temp.path()));
        assert!(!pipeline.clean().unwrap());

        let artifacts = pipeline.settings().artifacts_dir();
        fs::create_dir_all(artifacts.join("managed")).unwrap();
        assert!(pipeline.clean().unwrap());
        assert!(!artifacts.exists());
    }

    #[test]
    fn test_data_dir_registered_as_additional_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("Data")).unwrap();
        fs::write(temp.path().join("Data/level0"), "x").unwrap();
        let pipeline = Pipeline::new(Box::new(EchoPlatform), settings(temp.path()));

        let context = pipeline.prepare().unwrap();

        assert_eq!(context.get::<AdditionalFiles>().unwrap().len(), 1);
    }
}
