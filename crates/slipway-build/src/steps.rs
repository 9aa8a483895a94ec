//! Steps shared by every platform
//!
//! These add the managed compilation, type database, code generation and
//! IL2CPP actions, plus copies of host-provided data files. Platform steps
//! run after them and package whatever they deployed.

use crate::context::ContextKind;
use crate::error::{BuildError, BuildResult};
use crate::platform::PlatformData;
use crate::session::BuildSession;
use crate::settings::BuildSettings;
use crate::sources::SourceSetTable;
use crate::step::{BuildStep, StepOutcome};
use crate::toolchain::{Architectures, ToolchainRegistry};
use crate::action::ActionOptions;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const MANAGED_COMPILER: &str = "csc";
pub const TYPEDB_GENERATOR: &str = "typedb-gen";
pub const IL_POSTPROCESSOR: &str = "ilpp";
pub const AOT_COMPILER: &str = "aotc";
pub const IL2CPP: &str = "il2cpp";

/// Name of the type database written by code generation
pub const TYPE_DB_FILE: &str = "TypeDb.json";
/// Native library produced by AOT code generation in each deploy dir
pub const AOT_LIBRARY: &str = "lib_burst_generated.so";

/// Extra files copied into the data deploy directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalFiles {
    files: Vec<(PathBuf, PathBuf)>,
}

impl AdditionalFiles {
    /// Every file below `dir`, keeping its relative path as destination
    ///
    /// A missing directory yields an empty set.
    pub fn from_dir(dir: &Path) -> BuildResult<Self> {
        let mut files = Self::default();
        if !dir.is_dir() {
            return Ok(files);
        }
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(dir, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(dir) {
                files.add(entry.path(), relative);
            }
        }
        Ok(files)
    }

    /// Register `source`; a relative `destination` is under the data deploy dir
    pub fn add(&mut self, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) {
        self.files.push((source.into(), destination.into()));
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.files.iter().map(|(s, d)| (s.as_path(), d.as_path()))
    }
}

/// Environment and defines for native code generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodegenSettings {
    pub env: BTreeMap<String, String>,
    pub defines: Vec<String>,
}

/// Post-processed assemblies published for native code generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedAssemblies {
    pub assemblies: Vec<PathBuf>,
}

/// Path of a tool shipped in the player package, which must exist
pub fn require_tool(data: &PlatformData, name: &str) -> BuildResult<PathBuf> {
    let path = data.tools_dir.join(name);
    if !path.is_file() {
        return Err(BuildError::missing_tool(
            name,
            format!("{} does not exist", path.display()),
        ));
    }
    Ok(path)
}

/// Files below `dir` with `extension`, sorted
pub fn list_files(dir: &Path, extension: &str) -> BuildResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some(extension)
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn walk_error(dir: &Path, error: walkdir::Error) -> BuildError {
    let path = error.path().unwrap_or(dir).to_path_buf();
    BuildError::io(path, std::io::Error::other(error.to_string()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Copies registered additional files into the data deploy directory
pub struct SetupAdditionalFiles;

impl BuildStep for SetupAdditionalFiles {
    fn name(&self) -> &str {
        "SetupAdditionalFiles"
    }

    fn consumes(&self) -> &[ContextKind] {
        &[ContextKind::PlatformData]
    }

    fn run(&self, session: &mut BuildSession) -> BuildResult<StepOutcome> {
        let Some(files) = session.context.try_get::<AdditionalFiles>() else {
            return Ok(StepOutcome::success_with("no additional files"));
        };
        let data = session.context.get::<PlatformData>()?;

        for (source, destination) in files.iter() {
            let target = if destination.is_absolute() {
                destination.to_path_buf()
            } else {
                data.data_deploy_dir.join(destination)
            };
            session.graph.add_copy_action(&target, source)?;
        }
        Ok(StepOutcome::success_with(format!(
            "{} additional files",
            files.len()
        )))
    }
}

/// Whether code generation stops after the type database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenMode {
    Full,
    TypeDbOnly,
}

/// Managed compilation, type database and AOT code generation
pub struct SetupCodeGeneration {
    mode: CodegenMode,
}

impl SetupCodeGeneration {
    pub fn full() -> Self {
        Self {
            mode: CodegenMode::Full,
        }
    }

    pub fn type_db_only() -> Self {
        Self {
            mode: CodegenMode::TypeDbOnly,
        }
    }

    pub fn mode(&self) -> CodegenMode {
        self.mode
    }
}

impl BuildStep for SetupCodeGeneration {
    fn name(&self) -> &str {
        match self.mode {
            CodegenMode::Full => "SetupCodeGeneration",
            CodegenMode::TypeDbOnly => "SetupCodeGeneration(TypeDb)",
        }
    }

    fn consumes(&self) -> &[ContextKind] {
        match self.mode {
            CodegenMode::Full => &[
                ContextKind::BuildSettings,
                ContextKind::PlatformData,
                ContextKind::Architectures,
                ContextKind::CodegenSettings,
            ],
            CodegenMode::TypeDbOnly => &[ContextKind::BuildSettings, ContextKind::PlatformData],
        }
    }

    fn produces(&self) -> &[ContextKind] {
        match self.mode {
            CodegenMode::Full => &[ContextKind::ManagedAssemblies],
            CodegenMode::TypeDbOnly => &[],
        }
    }

    fn run(&self, session: &mut BuildSession) -> BuildResult<StepOutcome> {
        let settings = session.context.get::<BuildSettings>()?;
        let data = session.context.get::<PlatformData>()?;
        if settings.sources.is_empty() {
            if self.mode == CodegenMode::Full {
                session.context.set(ManagedAssemblies::default());
            }
            return Ok(StepOutcome::success_with("no managed sources"));
        }

        let compiler = require_tool(data, MANAGED_COMPILER)?;
        let typedb_generator = require_tool(data, TYPEDB_GENERATOR)?;
        let references = list_files(&data.engine_assemblies_dir, "dll")?;
        let development = settings.profile.is_development();
        let managed_dir = settings.artifacts_dir().join("managed");

        let mut assemblies: Vec<PathBuf> = Vec::new();
        for source_dir in &settings.sources {
            let name = file_name(source_dir);
            let sources = list_files(source_dir, "cs")?;
            if sources.is_empty() {
                warn!("{} contains no C# sources; skipped", source_dir.display());
                continue;
            }

            let output = managed_dir.join(format!("{}.dll", name));
            let mut args = vec![
                "-target:library".to_string(),
                "-nologo".to_string(),
                format!("-out:{}", output.display()),
            ];
            if development {
                args.push("-debug".to_string());
                args.push("-define:DEVELOPMENT_BUILD".to_string());
            }
            args.extend(
                references
                    .iter()
                    .chain(assemblies.iter())
                    .map(|r| format!("-r:{}", r.display())),
            );
            args.extend(sources.iter().map(|s| display(s)));

            let mut inputs = sources;
            inputs.extend(references.iter().cloned());
            inputs.extend(assemblies.iter().cloned());

            session.graph.add_action(
                format!("Csc {}", name),
                vec![output.clone()],
                inputs,
                display(&compiler),
                args,
                ActionOptions::new().use_response_file(),
            )?;
            assemblies.push(output);
        }

        if assemblies.is_empty() {
            if self.mode == CodegenMode::Full {
                session.context.set(ManagedAssemblies::default());
            }
            return Ok(StepOutcome::success_with("no managed sources"));
        }

        let type_db = data.type_db_dir.join(TYPE_DB_FILE);
        let mut args = vec![format!("--output={}", type_db.display())];
        args.extend(references.iter().map(|r| format!("--reference={}", r.display())));
        args.extend(assemblies.iter().map(|a| display(a)));
        session.graph.add_action(
            "TypeDb",
            vec![type_db.clone()],
            assemblies.clone(),
            display(&typedb_generator),
            args,
            ActionOptions::new(),
        )?;

        if self.mode == CodegenMode::TypeDbOnly {
            return Ok(StepOutcome::success_with(format!(
                "{} assemblies",
                assemblies.len()
            )));
        }

        let postprocessor = require_tool(data, IL_POSTPROCESSOR)?;
        let aot_compiler = require_tool(data, AOT_COMPILER)?;
        let processed_dir = settings.artifacts_dir().join("processed");
        let mut processed = Vec::with_capacity(assemblies.len());
        for assembly in &assemblies {
            let output = processed_dir.join(file_name(assembly));
            session.graph.add_action(
                format!("ILPostProcess {}", file_name(assembly)),
                vec![output.clone()],
                vec![assembly.clone(), type_db.clone()],
                display(&postprocessor),
                vec![
                    format!("--typedb={}", type_db.display()),
                    format!("--output={}", output.display()),
                    display(assembly),
                ],
                ActionOptions::new(),
            )?;
            processed.push(output);
        }

        let codegen = session.context.get::<CodegenSettings>()?;
        let architectures = session.context.get::<Architectures>()?;
        for entry in architectures.iter() {
            let output = entry.deploy_dir.join(AOT_LIBRARY);
            let mut args = vec![
                format!("--platform={}", data.platform_name),
                format!("--target={}", entry.codegen_target),
                format!("--output={}", output.display()),
            ];
            args.extend(codegen.defines.iter().map(|d| format!("--define={}", d)));
            args.extend(processed.iter().map(|p| display(p)));
            session.graph.add_action(
                format!("AotCompile {}", entry.architecture),
                vec![output],
                processed.clone(),
                display(&aot_compiler),
                args,
                ActionOptions::new()
                    .with_envs(&codegen.env)
                    .use_response_file(),
            )?;
        }

        if !settings.uses_il2cpp() {
            let managed_deploy = data.managed_deploy_dir();
            for assembly in &processed {
                session
                    .graph
                    .add_copy_action(&managed_deploy.join(file_name(assembly)), assembly)?;
            }
        }

        debug!("publishing {} managed assemblies", processed.len());
        let count = processed.len();
        session.context.set(ManagedAssemblies {
            assemblies: processed,
        });
        Ok(StepOutcome::success_with(format!("{} assemblies", count)))
    }
}

/// IL to C++ conversion and one native `libil2cpp.so` per architecture
pub struct SetupIl2Cpp;

impl BuildStep for SetupIl2Cpp {
    fn name(&self) -> &str {
        "SetupIl2Cpp"
    }

    fn consumes(&self) -> &[ContextKind] {
        &[
            ContextKind::BuildSettings,
            ContextKind::PlatformData,
            ContextKind::ManagedAssemblies,
            ContextKind::Architectures,
            ContextKind::Toolchains,
            ContextKind::SourceSets,
        ]
    }

    fn run(&self, session: &mut BuildSession) -> BuildResult<StepOutcome> {
        let settings = session.context.get::<BuildSettings>()?;
        if !settings.uses_il2cpp() {
            return Ok(StepOutcome::success_with("mono backend; skipped"));
        }

        let data = session.context.get::<PlatformData>()?;
        let assemblies = session.context.get::<ManagedAssemblies>()?;
        let il2cpp = require_tool(data, IL2CPP)?;

        let cpp_dir = settings.artifacts_dir().join("il2cpp").join("cpp");
        let registration = cpp_dir.join("Il2CppCodeRegistration.cpp");
        let metadata_dir = data.managed_deploy_dir().join("Metadata");
        let metadata = metadata_dir.join("global-metadata.dat");

        let mut args = vec![
            "--convert-to-cpp".to_string(),
            format!("--generatedcppdir={}", cpp_dir.display()),
            format!("--data-folder={}", metadata_dir.display()),
            format!("--configuration={}", settings.il2cpp_configuration.name()),
        ];
        args.extend(
            assemblies
                .assemblies
                .iter()
                .map(|a| format!("--assembly={}", a.display())),
        );
        session.graph.add_action(
            "Il2Cpp Convert",
            vec![registration.clone(), metadata],
            assemblies.assemblies.clone(),
            display(&il2cpp),
            args,
            ActionOptions::new()
                .allow_unexpected_output(vec![cpp_dir.clone()])
                .use_response_file(),
        )?;

        let table = session.context.get::<SourceSetTable>()?;
        let toolchains = session.context.get::<ToolchainRegistry>()?;
        let architectures = session.context.get::<Architectures>()?;
        let debug = settings.profile.is_development();

        for entry in architectures.iter() {
            let toolchain = entry.toolchain(toolchains)?;
            let runtime = table.files(data.source_tag, toolchain, debug, &data.runtime_source_dir);
            let output = entry.deploy_dir.join(toolchain.dynamic_library_name("il2cpp"));

            let mut args = vec![
                format!("--target={}", toolchain.target()),
                "-shared".to_string(),
                "-fPIC".to_string(),
            ];
            args.extend(
                settings
                    .il2cpp_configuration
                    .compiler_flags()
                    .iter()
                    .map(|f| f.to_string()),
            );
            args.push("-o".to_string());
            args.push(display(&output));
            args.push(display(&registration));
            args.extend(runtime.iter().map(|s| display(s)));

            let mut inputs = vec![registration.clone()];
            inputs.extend(runtime);

            session.graph.add_action(
                format!("Link libil2cpp {}", entry.architecture),
                vec![output],
                inputs,
                display(&toolchain.compiler()),
                args,
                ActionOptions::new().use_response_file(),
            )?;
        }

        Ok(StepOutcome::success_with(format!(
            "{} architectures",
            architectures.len()
        )))
    }
}
