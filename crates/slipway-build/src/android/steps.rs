//! Android staging and packaging steps

use super::{
    AndroidBuildContext, LAUNCHER_MANIFEST_TEMPLATE, LIBRARY_MANIFEST_TEMPLATE, LIBRARY_PACKAGE,
};
use crate::action::ActionOptions;
use crate::context::ContextKind;
use crate::error::{BuildError, BuildResult};
use crate::manifest::{AndroidManifest, CONFIG_CHANGES};
use crate::platform::{PackageArtifact, PlatformData};
use crate::session::BuildSession;
use crate::settings::BuildSettings;
use crate::step::{BuildStep, StepOutcome};
use crate::toolchain::Architectures;
use log::{debug, warn};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Mono runtime libraries copied next to the player libraries
pub const MONO_RUNTIME_LIBS: &[&str] = &["libmonobdwgc-2.0.so", "libMonoPosixHelper.so"];

/// Icon directories copied from the player resources into the launcher
pub const ICON_DIRS: &[&str] = &["mipmap-anydpi-v26", "mipmap-mdpi"];

/// Permissions every player needs
pub const DEFAULT_PERMISSIONS: &[&str] = &[
    "android.permission.INTERNET",
    "android.permission.ACCESS_NETWORK_STATE",
];

/// Files directly inside `dir`, sorted by name
fn files_in(dir: &Path) -> BuildResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BuildError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> BuildResult<&std::ffi::OsStr> {
    path.file_name().ok_or_else(|| {
        BuildError::InvalidConfiguration(format!("{} has no file name", path.display()))
    })
}

fn read_text(path: &Path) -> BuildResult<String> {
    fs::read_to_string(path).map_err(|e| BuildError::io(path, e))
}

/// Stage the player's native libraries into each ABI directory
pub struct SetupPlayerFiles;

impl BuildStep for SetupPlayerFiles {
    fn name(&self) -> &str {
        "SetupPlayerFiles"
    }

    fn consumes(&self) -> &[ContextKind] {
        &[
            ContextKind::BuildSettings,
            ContextKind::PlatformData,
            ContextKind::Architectures,
            ContextKind::AndroidBuild,
        ]
    }

    fn run(&self, session: &mut BuildSession) -> BuildResult<StepOutcome> {
        let settings = session.context.get::<BuildSettings>()?;
        let data = session.context.get::<PlatformData>()?;
        let architectures = session.context.get::<Architectures>()?;
        let mono = !settings.uses_il2cpp();

        let mut staged = Vec::new();
        for entry in architectures.iter() {
            let libs = data.variation_dir.join("Libs").join(&entry.abi);
            if !libs.is_dir() {
                return Ok(StepOutcome::failure(format!(
                    "player libraries for {} not found at {}",
                    entry.abi,
                    libs.display()
                )));
            }

            let mut sources = files_in(&libs)?;
            if mono {
                let mono_libs = data.variation_dir.join("MonoLibs").join(&entry.abi);
                sources.extend(MONO_RUNTIME_LIBS.iter().map(|lib| mono_libs.join(lib)));
            }

            for source in sources {
                let destination = entry.deploy_dir.join(file_name(&source)?);
                session.graph.add_copy_action(&destination, &source)?;
                staged.push(destination);
            }
        }

        let count = staged.len();
        let build = session.context.get_mut::<AndroidBuildContext>()?;
        for path in staged {
            build.track(path);
        }
        Ok(StepOutcome::success_with(format!("{} player libraries", count)))
    }
}

/// Copy styles, strings and icons from the player resources
pub struct CopyGradleResources;

impl CopyGradleResources {
    /// API level encoded in a `values-vNN` style directory name
    pub fn directory_api_level(dir_name: &str) -> BuildResult<Option<u32>> {
        let Some(index) = dir_name.rfind("-v") else {
            return Ok(None);
        };
        let level = &dir_name[index + 2..];
        level.parse::<u32>().map(Some).map_err(|_| {
            BuildError::InvalidConfiguration(format!(
                "resource directory '{}' has a non-numeric API level",
                dir_name
            ))
        })
    }

    /// Replace the `app_name` string, adding it when the file has none
    pub fn patch_app_name(strings: &str, product_name: &str) -> BuildResult<String> {
        let escaped = product_name
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('\'', "\\'");
        let pattern = Regex::new(r#"(<string\s+name\s*=\s*"app_name"\s*>)[^<]*(</string>)"#)?;
        if pattern.is_match(strings) {
            let replacement = format!("${{1}}{}${{2}}", escaped.replace('$', "$$"));
            return Ok(pattern.replace(strings, replacement.as_str()).into_owned());
        }

        let close = strings.rfind("</resources>").ok_or_else(|| {
            BuildError::template("strings.xml", "no <resources> element")
        })?;
        let mut patched = strings.to_string();
        patched.insert_str(
            close,
            &format!("    <string name=\"app_name\">{}</string>\n", escaped),
        );
        Ok(patched)
    }
}

impl BuildStep for CopyGradleResources {
    fn name(&self) -> &str {
        "CopyGradleResources"
    }

    fn consumes(&self) -> &[ContextKind] {
        &[
            ContextKind::BuildSettings,
            ContextKind::PlatformData,
            ContextKind::AndroidBuild,
        ]
    }

    fn run(&self, session: &mut BuildSession) -> BuildResult<StepOutcome> {
        let settings = session.context.get::<BuildSettings>()?;
        let data = session.context.get::<PlatformData>()?;
        let build = session.context.get::<AndroidBuildContext>()?;
        let resources = data.player_package_dir.join("Apk");
        let launcher_main = build.launcher_src_main();
        let library_main = build.library_src_main();
        let target_api = build.settings.target_api;

        let mut staged = Vec::new();

        for entry in WalkDir::new(&resources).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                BuildError::io(&resources, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() || entry.file_name() != "styles.xml" {
                continue;
            }
            let dir_name = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Some(level) = Self::directory_api_level(&dir_name)? {
                if level > target_api {
                    debug!("skipping {} (API {} > {})", entry.path().display(), level, target_api);
                    continue;
                }
            }
            let relative = entry.path().strip_prefix(&resources).unwrap_or(entry.path());
            for main in [&launcher_main, &library_main] {
                let destination = main.join(relative);
                session.graph.add_copy_action(&destination, entry.path())?;
                staged.push(destination);
            }
        }

        let strings_path = resources.join("res").join("values").join("strings.xml");
        let strings = Self::patch_app_name(&read_text(&strings_path)?, &settings.product_name)?;
        let strings_out = launcher_main.join("res").join("values").join("strings.xml");
        session.graph.add_write_text_action(&strings_out, strings)?;
        staged.push(strings_out);

        for dir in ICON_DIRS {
            let icons = resources.join("res").join(dir);
            if !icons.is_dir() {
                continue;
            }
            for icon in files_in(&icons)? {
                let destination = launcher_main.join("res").join(dir).join(file_name(&icon)?);
                session.graph.add_copy_action(&destination, &icon)?;
                staged.push(destination);
            }
        }

        let count = staged.len();
        let build = session.context.get_mut::<AndroidBuildContext>()?;
        for path in staged {
            build.track(path);
        }
        Ok(StepOutcome::success_with(format!("{} resource files", count)))
    }
}

/// Launcher and library manifests from templates
pub struct GenerateManifest;

impl GenerateManifest {
    /// Patch the launcher manifest template
    pub fn launcher_manifest(
        template: AndroidManifest,
        settings: &BuildSettings,
        build: &AndroidBuildContext,
    ) -> BuildResult<AndroidManifest> {
        let mut manifest = template;
        manifest.set_package_name(&settings.identifier)?;
        manifest.set_install_location(&build.settings.install_location)?;
        Ok(manifest)
    }

    /// Patch the engine library manifest template
    pub fn library_manifest(
        template: AndroidManifest,
        build: &AndroidBuildContext,
    ) -> BuildResult<AndroidManifest> {
        let android = &build.settings;
        let mut manifest = template;
        manifest.set_package_name(LIBRARY_PACKAGE)?;
        manifest.set_uses_sdk(android.min_api, android.target_api)?;

        let mut config_changes = CONFIG_CHANGES.to_string();
        if android.target_api > 23 {
            config_changes.push_str("|density");
        }
        for activity in manifest.activities()? {
            manifest.set_activity_attribute(
                &activity,
                "android:screenOrientation",
                android.orientation.manifest_value(),
            )?;
            manifest.set_activity_attribute(&activity, "android:launchMode", "singleTask")?;
            manifest.set_activity_attribute(&activity, "android:configChanges", &config_changes)?;
            manifest.set_activity_attribute(&activity, "android:hardwareAccelerated", "false")?;
        }

        for permission in DEFAULT_PERMISSIONS
            .iter()
            .copied()
            .chain(android.permissions.iter().map(String::as_str))
        {
            manifest.add_uses_permission(permission)?;
        }
        Ok(manifest)
    }
}

impl BuildStep for GenerateManifest {
    fn name(&self) -> &str {
        "GenerateManifest"
    }

    fn consumes(&self) -> &[ContextKind] {
        &[ContextKind::BuildSettings, ContextKind::AndroidBuild]
    }

    fn run(&self, session: &mut BuildSession) -> BuildResult<StepOutcome> {
        let settings = session.context.get::<BuildSettings>()?;
        let build = session.context.get::<AndroidBuildContext>()?;

        let launcher = Self::launcher_manifest(
            AndroidManifest::load(&build.template(LAUNCHER_MANIFEST_TEMPLATE))?,
            settings,
            build,
        )?;
        let library = Self::library_manifest(
            AndroidManifest::load(&build.template(LIBRARY_MANIFEST_TEMPLATE))?,
            build,
        )?;

        let launch_activity = library.activity_with_launch_intent()?;
        if launch_activity.is_none() {
            warn!("no activity declares a MAIN/LAUNCHER intent; the app will not show in the launcher");
        }

        let launcher_path = build.launcher_src_main().join("AndroidManifest.xml");
        let library_path = build.library_src_main().join("AndroidManifest.xml");
        session
            .graph
            .add_write_text_action(&launcher_path, launcher.into_contents())?;
        session
            .graph
            .add_write_text_action(&library_path, library.into_contents())?;

        let build = session.context.get_mut::<AndroidBuildContext>()?;
        build.track(launcher_path);
        build.track(library_path);
        build.launch_activity = launch_activity;
        Ok(StepOutcome::success())
    }
}

/// Terminal packaging action invoking gradle, plus the copy into the output dir
pub struct BuildGradleProject;

impl BuildGradleProject {
    /// Newest `gradle-launcher-*.jar` shipped with the player tools
    pub fn find_gradle_launcher(tools_dir: &Path) -> BuildResult<PathBuf> {
        let lib = tools_dir.join("gradle").join("lib");
        let candidates = if lib.is_dir() { files_in(&lib)? } else { Vec::new() };
        candidates
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|n| n.starts_with("gradle-launcher-") && n.ends_with(".jar"))
            })
            .last()
            .ok_or_else(|| {
                BuildError::missing_tool(
                    "gradle",
                    format!("no gradle-launcher jar in {}", lib.display()),
                )
            })
    }
}

impl BuildStep for BuildGradleProject {
    fn name(&self) -> &str {
        "BuildGradleProject"
    }

    fn consumes(&self) -> &[ContextKind] {
        &[
            ContextKind::BuildSettings,
            ContextKind::PlatformData,
            ContextKind::AndroidBuild,
        ]
    }

    fn produces(&self) -> &[ContextKind] {
        &[ContextKind::PackageArtifact]
    }

    fn run(&self, session: &mut BuildSession) -> BuildResult<StepOutcome> {
        let settings = session.context.get::<BuildSettings>()?;
        let data = session.context.get::<PlatformData>()?;
        let build = session.context.get::<AndroidBuildContext>()?;

        if build.settings.export_project {
            let exported = build.gradle_dir.clone();
            session.context.set(PackageArtifact {
                path: exported.clone(),
                built: false,
            });
            return Ok(StepOutcome::success_with(format!(
                "gradle project exported to {}",
                exported.display()
            )));
        }

        let java = build.jdk_dir.join("bin").join("java");
        if !java.is_file() {
            return Err(BuildError::missing_tool(
                "java",
                format!("{} does not exist", java.display()),
            ));
        }
        let launcher_jar = Self::find_gradle_launcher(&data.tools_dir)?;

        let bundle = build.settings.target_type.is_bundle();
        let task = settings.profile.gradle_task(bundle);
        let built = build.gradle_dir.join(settings.profile.gradle_output(bundle));

        let mut inputs: Vec<PathBuf> = build.project_files().to_vec();
        for action in session.graph.actions() {
            for output in &action.outputs {
                if output.starts_with(&build.gradle_dir) && !inputs.contains(output) {
                    inputs.push(output.clone());
                }
            }
        }
        inputs.push(launcher_jar.clone());

        let args = vec![
            "-classpath".to_string(),
            launcher_jar.display().to_string(),
            "org.gradle.launcher.GradleMain".to_string(),
            "-b".to_string(),
            build.gradle_dir.join("build.gradle").display().to_string(),
            task.to_string(),
        ];
        let options = ActionOptions::new()
            .with_env("JAVA_HOME", build.jdk_dir.display().to_string())
            .with_env("ANDROID_HOME", build.sdk_dir.display().to_string())
            .delete_outputs_before_run();

        session.graph.add_action(
            "Build Gradle",
            vec![built.clone()],
            inputs,
            java.display().to_string(),
            args,
            options,
        )?;

        let package = settings.output_dir.join(format!(
            "{}.{}",
            settings.safe_product_name(),
            build.settings.target_type.extension()
        ));
        session.graph.add_copy_action(&package, &built)?;
        session.context.set(PackageArtifact {
            path: package.clone(),
            built: true,
        });
        Ok(StepOutcome::success_with(format!(
            "{} -> {}",
            task,
            package.display()
        )))
    }
}
