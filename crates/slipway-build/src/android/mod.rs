//! Android platform: gradle project generation and packaging
//!
//! The engine player package provides per-ABI native libraries, java sources,
//! resources and templates. Steps here stage them into a gradle project with
//! a `launcher` application module and a `unityLibrary` library module, then
//! add one terminal action invoking gradle to produce the APK or bundle.

pub mod gradle;
pub mod steps;

pub use gradle::{template_values, ExportGradleProject};
pub use steps::{BuildGradleProject, CopyGradleResources, GenerateManifest, SetupPlayerFiles};

use crate::context::ContextStore;
use crate::error::{BuildError, BuildResult};
use crate::platform::{Platform, PlatformData};
use crate::settings::BuildSettings;
use crate::sources::{PlatformTag, SourceSetTable};
use crate::step::StepSequence;
use crate::steps::{CodegenSettings, SetupAdditionalFiles, SetupCodeGeneration, SetupIl2Cpp};
use crate::toolchain::{
    select_architectures, Architecture, ArchitectureEntry, Architectures, ToolchainRegistry,
};
use log::{debug, info};
use slipway_config::{AndroidConfig, Config};
use std::path::{Path, PathBuf};

pub const DEFAULT_MIN_API: u32 = 19;
pub const DEFAULT_TARGET_API: u32 = 29;
pub const BUILD_TOOLS_VERSION: &str = "28.0.3";

pub const LAUNCHER_MODULE: &str = "launcher";
pub const LIBRARY_MODULE: &str = "unityLibrary";
/// Package of the engine library module
pub const LIBRARY_PACKAGE: &str = "com.unity3d.player";

pub const BASE_PROJECT_TEMPLATE: &str = "baseProjectTemplate.gradle";
pub const LAUNCHER_TEMPLATE: &str = "launcherTemplate.gradle";
pub const LIBRARY_TEMPLATE: &str = "mainTemplate.gradle";
pub const SETTINGS_TEMPLATE: &str = "settingsTemplate.gradle";
pub const LAUNCHER_MANIFEST_TEMPLATE: &str = "LauncherManifest.xml";
pub const LIBRARY_MANIFEST_TEMPLATE: &str = "UnityManifest.xml";
pub const PROGUARD_TEMPLATE: &str = "UnityProGuardTemplate.txt";

/// Screen orientation of the engine activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Auto,
    Portrait,
    Landscape,
    ReverseLandscape,
}

impl Orientation {
    pub fn parse(s: &str) -> BuildResult<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "portrait" => Ok(Self::Portrait),
            "landscape" => Ok(Self::Landscape),
            "reverse-landscape" => Ok(Self::ReverseLandscape),
            other => Err(BuildError::InvalidConfiguration(format!(
                "unknown orientation '{}'",
                other
            ))),
        }
    }

    /// `android:screenOrientation` value
    pub fn manifest_value(&self) -> &'static str {
        match self {
            Self::Auto => "fullSensor",
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
            Self::ReverseLandscape => "reverseLandscape",
        }
    }
}

/// What the gradle build produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetType {
    #[default]
    Apk,
    AppBundle,
}

impl TargetType {
    pub fn parse(s: &str) -> BuildResult<Self> {
        match s {
            "apk" => Ok(Self::Apk),
            "app-bundle" | "aab" => Ok(Self::AppBundle),
            other => Err(BuildError::InvalidConfiguration(format!(
                "unknown android target type '{}'",
                other
            ))),
        }
    }

    pub fn is_bundle(&self) -> bool {
        *self == Self::AppBundle
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Apk => "apk",
            Self::AppBundle => "aab",
        }
    }
}

/// `[android]` settings with defaults applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidSettings {
    pub architectures: Vec<Architecture>,
    pub min_api: u32,
    pub target_api: u32,
    pub orientation: Orientation,
    pub permissions: Vec<String>,
    pub target_type: TargetType,
    pub export_project: bool,
    pub install_location: String,
    pub templates_dir: Option<PathBuf>,
}

impl Default for AndroidSettings {
    fn default() -> Self {
        Self {
            architectures: Architecture::all().to_vec(),
            min_api: DEFAULT_MIN_API,
            target_api: DEFAULT_TARGET_API,
            orientation: Orientation::default(),
            permissions: Vec::new(),
            target_type: TargetType::default(),
            export_project: false,
            install_location: "preferExternal".to_string(),
            templates_dir: None,
        }
    }
}

impl AndroidSettings {
    pub fn from_config(config: &AndroidConfig) -> BuildResult<Self> {
        let mut settings = Self::default();
        if !config.architectures.is_empty() {
            settings.architectures = config
                .architectures
                .iter()
                .map(|a| Architecture::parse(a))
                .collect::<BuildResult<_>>()?;
        }
        if let Some(api) = config.min_api {
            settings.min_api = api;
        }
        if let Some(api) = config.target_api {
            settings.target_api = api;
        }
        if settings.min_api > settings.target_api {
            return Err(BuildError::InvalidConfiguration(format!(
                "android min_api {} is above target_api {}",
                settings.min_api, settings.target_api
            )));
        }
        if let Some(orientation) = &config.orientation {
            settings.orientation = Orientation::parse(orientation)?;
        }
        if let Some(target) = &config.target_type {
            settings.target_type = TargetType::parse(target)?;
        }
        settings.permissions = config.permissions.clone();
        settings.export_project = config.export_project.unwrap_or(false);
        settings.templates_dir = config.templates.clone();
        Ok(settings)
    }
}

/// Gradle project layout, tool roots and the files tracked for packaging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidBuildContext {
    pub settings: AndroidSettings,
    pub sdk_dir: PathBuf,
    pub ndk_dir: PathBuf,
    pub jdk_dir: PathBuf,
    pub templates_dir: PathBuf,
    /// Root of the generated gradle project
    pub gradle_dir: PathBuf,
    /// Activity carrying the MAIN/LAUNCHER intent, once the manifest is generated
    pub launch_activity: Option<String>,
    project_files: Vec<PathBuf>,
}

impl AndroidBuildContext {
    pub fn new(
        settings: AndroidSettings,
        sdk_dir: PathBuf,
        ndk_dir: PathBuf,
        jdk_dir: PathBuf,
        templates_dir: PathBuf,
        gradle_dir: PathBuf,
    ) -> Self {
        Self {
            settings,
            sdk_dir,
            ndk_dir,
            jdk_dir,
            templates_dir,
            gradle_dir,
            launch_activity: None,
            project_files: Vec::new(),
        }
    }

    pub fn launcher_dir(&self) -> PathBuf {
        self.gradle_dir.join(LAUNCHER_MODULE)
    }

    pub fn library_dir(&self) -> PathBuf {
        self.gradle_dir.join(LIBRARY_MODULE)
    }

    pub fn launcher_src_main(&self) -> PathBuf {
        self.launcher_dir().join("src").join("main")
    }

    pub fn library_src_main(&self) -> PathBuf {
        self.library_dir().join("src").join("main")
    }

    /// Native library deploy directory for `abi`
    pub fn jni_libs_dir(&self, abi: &str) -> PathBuf {
        self.library_src_main().join("jniLibs").join(abi)
    }

    /// Player data directory inside the library assets
    pub fn data_deploy_dir(&self) -> PathBuf {
        self.library_src_main().join("assets").join("bin").join("Data")
    }

    pub fn template(&self, name: &str) -> PathBuf {
        self.templates_dir.join(name)
    }

    /// Record a file the gradle build depends on
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.project_files.contains(&path) {
            self.project_files.push(path);
        }
    }

    pub fn project_files(&self) -> &[PathBuf] {
        &self.project_files
    }

    /// Forget per-pass state before the graph is regenerated
    pub fn reset(&mut self) {
        self.project_files.clear();
        self.launch_activity = None;
    }
}

/// Android target
#[derive(Debug, Clone, Default)]
pub struct AndroidPlatform {
    config: AndroidConfig,
}

impl AndroidPlatform {
    pub fn new(config: AndroidConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.project.android.clone().unwrap_or_default())
    }
}

fn require_dir(path: Option<&PathBuf>, tool: &str, key: &str) -> BuildResult<PathBuf> {
    let path = path.ok_or_else(|| {
        BuildError::missing_tool(tool, format!("not configured; set {} in slipway.toml", key))
    })?;
    if !path.is_dir() {
        return Err(BuildError::missing_tool(
            tool,
            format!("{} does not exist", path.display()),
        ));
    }
    Ok(path.clone())
}

impl Platform for AndroidPlatform {
    fn name(&self) -> &str {
        "android"
    }

    fn prepare_context(&self, context: &mut ContextStore) -> BuildResult<()> {
        let settings = context.get::<BuildSettings>()?.clone();
        let android = AndroidSettings::from_config(&self.config)?;

        let sdk = require_dir(settings.tools.sdk.as_ref(), "Android SDK", "android.sdk")?;
        let ndk = require_dir(settings.tools.ndk.as_ref(), "Android NDK", "android.ndk")?;
        let jdk = require_dir(settings.tools.jdk.as_ref(), "JDK", "android.jdk")?;

        let player = &settings.player_package;
        let templates = android
            .templates_dir
            .clone()
            .unwrap_or_else(|| player.join("Templates"));
        if !templates.is_dir() {
            return Err(BuildError::missing_tool(
                "android templates",
                format!("{} does not exist", templates.display()),
            ));
        }

        let gradle_dir = if android.export_project {
            settings.output_dir.clone()
        } else {
            settings.artifacts_dir().join("gradleOut")
        };

        let selected = select_architectures(&android.architectures, settings.scripting_backend);
        if selected.is_empty() {
            return Err(BuildError::InvalidConfiguration(format!(
                "no architecture can be built with the {} backend",
                settings.scripting_backend
            )));
        }

        let build = AndroidBuildContext::new(android, sdk, ndk.clone(), jdk, templates, gradle_dir);

        let mut architectures = Architectures::new();
        for arch in &selected {
            architectures.add(ArchitectureEntry::new(*arch, build.jni_libs_dir(arch.abi())))?;
        }
        let toolchains = ToolchainRegistry::for_ndk(&ndk, build.settings.min_api, &selected);

        let tag = settings.scripting_backend.tag();
        let variation = player
            .join("Variations")
            .join(tag)
            .join(settings.profile.variation_name());
        let mut data = PlatformData::new(
            "android",
            PlatformTag::Android,
            player,
            variation,
            build.data_deploy_dir(),
            settings.artifacts_dir().join("TypeDb"),
        );
        data.engine_assemblies_dir = player.join("Variations").join(tag).join("Managed");

        context
            .get_or_insert_default::<CodegenSettings>()
            .env
            .insert("ANDROID_NDK_ROOT".to_string(), path_string(&ndk));
        if !context.contains::<SourceSetTable>() {
            context.set(SourceSetTable::with_defaults());
        }

        info!(
            "android: {} ({}), gradle project at {}",
            selected
                .iter()
                .map(|a| a.abi())
                .collect::<Vec<_>>()
                .join(", "),
            settings.scripting_backend,
            build.gradle_dir.display()
        );
        debug!("android variation {}", data.variation_dir.display());

        context.set(architectures);
        context.set(toolchains);
        context.set(data);
        context.set(build);
        Ok(())
    }

    fn reset_pass_state(&self, context: &mut ContextStore) {
        if let Ok(build) = context.get_mut::<AndroidBuildContext>() {
            build.reset();
        }
    }

    fn typedb_steps(&self) -> StepSequence {
        StepSequence::new().with(SetupCodeGeneration::type_db_only())
    }

    fn steps(&self) -> StepSequence {
        StepSequence::new()
            .with(SetupCodeGeneration::full())
            .with(SetupIl2Cpp)
            .with(SetupPlayerFiles)
            .with(CopyGradleResources)
            .with(GenerateManifest)
            .with(ExportGradleProject)
            .with(SetupAdditionalFiles)
            .with(BuildGradleProject)
    }
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}
