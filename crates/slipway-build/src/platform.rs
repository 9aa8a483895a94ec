//! Platform abstraction
//!
//! A platform fills the shared context before any step runs and supplies the
//! two step sequences the pipeline drives: a small type-DB sequence run
//! first, and the full sequence that ends in the packaging stage.

use crate::context::ContextStore;
use crate::error::BuildResult;
use crate::sources::PlatformTag;
use crate::step::StepSequence;
use std::path::PathBuf;

/// A build target platform
pub trait Platform {
    /// Platform name used in logs and graph titles
    fn name(&self) -> &str;

    /// Validate tools and populate platform context values
    ///
    /// Runs once per build, after [`BuildSettings`](crate::settings::BuildSettings)
    /// is in the store. Missing tools must fail here, before any step adds an
    /// action that refers to them.
    fn prepare_context(&self, context: &mut ContextStore) -> BuildResult<()>;

    /// Drop per-pass state before the graph is regenerated
    fn reset_pass_state(&self, _context: &mut ContextStore) {}

    /// Steps producing the type database graph
    fn typedb_steps(&self) -> StepSequence;

    /// Steps producing the full build graph
    fn steps(&self) -> StepSequence;
}

/// Directories shared by all steps of a platform build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformData {
    pub platform_name: String,
    /// Which source-set providers native compilation uses
    pub source_tag: PlatformTag,
    /// Engine player package root
    pub player_package_dir: PathBuf,
    /// `Variations/<backend>/<Development|Release>` inside the player package
    pub variation_dir: PathBuf,
    /// Engine assemblies referenced by managed compilation
    pub engine_assemblies_dir: PathBuf,
    /// Native runtime sources fed to the source-set table
    pub runtime_source_dir: PathBuf,
    /// Codegen and packaging tools shipped with the player package
    pub tools_dir: PathBuf,
    /// Where player data files are deployed
    pub data_deploy_dir: PathBuf,
    /// Output directory of the type database
    pub type_db_dir: PathBuf,
}

impl PlatformData {
    /// Standard layout below a player package
    pub fn new(
        platform_name: impl Into<String>,
        source_tag: PlatformTag,
        player_package_dir: impl Into<PathBuf>,
        variation_dir: impl Into<PathBuf>,
        data_deploy_dir: impl Into<PathBuf>,
        type_db_dir: impl Into<PathBuf>,
    ) -> Self {
        let player_package_dir = player_package_dir.into();
        Self {
            platform_name: platform_name.into(),
            source_tag,
            engine_assemblies_dir: player_package_dir.join("Managed"),
            runtime_source_dir: player_package_dir.join("RuntimeSource"),
            tools_dir: player_package_dir.join("Tools"),
            player_package_dir,
            variation_dir: variation_dir.into(),
            data_deploy_dir: data_deploy_dir.into(),
            type_db_dir: type_db_dir.into(),
        }
    }

    /// Managed assemblies deploy directory
    pub fn managed_deploy_dir(&self) -> PathBuf {
        self.data_deploy_dir.join("Managed")
    }
}

/// The package the build produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArtifact {
    pub path: PathBuf,
    /// False when the platform only exported a project
    pub built: bool,
}
