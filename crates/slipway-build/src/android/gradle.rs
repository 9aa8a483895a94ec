//! Gradle project export: build scripts, properties and engine sources

use super::{
    AndroidBuildContext, BASE_PROJECT_TEMPLATE, BUILD_TOOLS_VERSION, LAUNCHER_TEMPLATE,
    LIBRARY_TEMPLATE, PROGUARD_TEMPLATE, SETTINGS_TEMPLATE,
};
use crate::context::ContextKind;
use crate::error::{BuildError, BuildResult};
use crate::platform::PlatformData;
use crate::session::BuildSession;
use crate::settings::BuildSettings;
use crate::step::{BuildStep, StepOutcome};
use crate::template::TemplateValues;
use crate::toolchain::Architectures;
use std::fs;
use std::path::{Path, PathBuf};

pub const GRADLE_PROPERTIES: &str = "org.gradle.jvmargs=-Xmx4096M\norg.gradle.parallel=true\n";

const SIGNING_CONFIG: &str = "\n            signingConfig signingConfigs.debug";

/// Tokens every template may use and that are empty unless a feature fills them
const EMPTY_TOKENS: &[&str] = &[
    "USER_PROGUARD",
    "APPLY_PLUGINS",
    "BUILD_SCRIPT_DEPS",
    "ARTIFACTORYREPOSITORY",
    "EXTERNAL_SOURCES",
    "DEPS",
    "SIGN",
    "SPLITS",
    "SPLITS_VERSION_CODE",
    "STREAMING_ASSETS",
    "INCLUDES",
];

/// Values substituted into the gradle templates
pub fn template_values(
    settings: &BuildSettings,
    build: &AndroidBuildContext,
    architectures: &Architectures,
) -> TemplateValues {
    let android = &build.settings;
    let mut values = TemplateValues::new();

    values.insert("BUILDTOOLS", BUILD_TOOLS_VERSION);
    values.insert("APIVERSION", android.target_api.to_string());
    values.insert("MINSDKVERSION", android.min_api.to_string());
    values.insert("TARGETSDKVERSION", android.target_api.to_string());
    values.insert("APPLICATIONID", settings.identifier.clone());
    values.insert("PACKAGENAME", settings.identifier.clone());
    values.insert("VERSIONCODE", settings.version_code.to_string());
    values.insert("VERSIONNAME", settings.version_name.clone());
    values.insert(
        "ABIFILTERS",
        architectures
            .iter()
            .map(|e| format!("'{}'", e.abi))
            .collect::<Vec<_>>()
            .join(", "),
    );

    for key in ["MINIFY_RELEASE", "PROGUARD_RELEASE", "MINIFY_DEBUG", "PROGUARD_DEBUG"] {
        values.insert(key, "false");
    }
    for key in EMPTY_TOKENS {
        values.insert(*key, "");
    }

    values.insert("SIGNCONFIG", SIGNING_CONFIG);
    values.insert("PACKAGING_OPTIONS", "\n\n    packagingOptions {\n");
    for entry in architectures.iter() {
        values.append(
            "PACKAGING_OPTIONS",
            &format!("        doNotStrip '*/{}/*.so'\n", entry.abi),
        );
    }
    values.append("PACKAGING_OPTIONS", "    }");
    values
}

/// Escape a path for a java properties file
pub fn escape_properties_path(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
}

/// `local.properties` pointing gradle at the SDK, and the NDK for IL2CPP
pub fn local_properties(build: &AndroidBuildContext, include_ndk: bool) -> String {
    let mut properties = format!("sdk.dir={}\n", escape_properties_path(&build.sdk_dir));
    if include_ndk {
        properties.push_str(&format!(
            "ndk.dir={}\n",
            escape_properties_path(&build.ndk_dir)
        ));
    }
    properties
}

fn read_template(path: &Path) -> BuildResult<String> {
    fs::read_to_string(path).map_err(|e| BuildError::io(path, e))
}

fn require_file(path: PathBuf, what: &str) -> BuildResult<PathBuf> {
    if !path.is_file() {
        return Err(BuildError::missing_tool(
            what,
            format!("{} does not exist", path.display()),
        ));
    }
    Ok(path)
}

/// Write the gradle project files around the staged player
pub struct ExportGradleProject;

impl BuildStep for ExportGradleProject {
    fn name(&self) -> &str {
        "ExportGradleProject"
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
        let build = session.context.get::<AndroidBuildContext>()?;
        let values = template_values(settings, build, architectures);

        let mut written = Vec::new();

        let scripts = [
            (BASE_PROJECT_TEMPLATE, build.gradle_dir.join("build.gradle")),
            (LAUNCHER_TEMPLATE, build.launcher_dir().join("build.gradle")),
            (LIBRARY_TEMPLATE, build.library_dir().join("build.gradle")),
        ];
        for (template, destination) in scripts {
            let text = read_template(&build.template(template))?;
            let rendered = values.render(template, &text)?;
            session.graph.add_write_text_action(&destination, rendered)?;
            written.push(destination);
        }

        let settings_text = read_template(&build.template(SETTINGS_TEMPLATE))?;
        let settings_gradle = values.render(SETTINGS_TEMPLATE, &settings_text)?;
        let settings_gradle = settings_gradle.trim();
        if !settings_gradle.is_empty() {
            let destination = build.gradle_dir.join("settings.gradle");
            session
                .graph
                .add_write_text_action(&destination, format!("{}\n", settings_gradle))?;
            written.push(destination);
        }

        let properties = build.gradle_dir.join("gradle.properties");
        session
            .graph
            .add_write_text_action(&properties, GRADLE_PROPERTIES)?;
        written.push(properties);

        let local = build.gradle_dir.join("local.properties");
        session
            .graph
            .add_write_text_action(&local, local_properties(build, settings.uses_il2cpp()))?;
        written.push(local);

        let copies = [
            (
                require_file(build.template(PROGUARD_TEMPLATE), "proguard template")?,
                build.library_dir().join("proguard-unity.txt"),
            ),
            (
                require_file(
                    data.variation_dir.join("Classes").join("classes.jar"),
                    "player classes.jar",
                )?,
                build.library_dir().join("libs").join("unity-classes.jar"),
            ),
            (
                require_file(
                    data.player_package_dir
                        .join("Source")
                        .join("com/unity3d/player/UnityPlayerActivity.java"),
                    "player activity source",
                )?,
                build
                    .library_src_main()
                    .join("java/com/unity3d/player/UnityPlayerActivity.java"),
            ),
        ];
        for (source, destination) in copies {
            session.graph.add_copy_action(&destination, &source)?;
            written.push(destination);
        }

        let count = written.len();
        let build = session.context.get_mut::<AndroidBuildContext>()?;
        for path in written {
            build.track(path);
        }
        Ok(StepOutcome::success_with(format!("{} project files", count)))
    }
}
