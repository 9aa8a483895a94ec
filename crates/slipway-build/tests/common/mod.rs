//! Shared fixtures: a fake player package and a scripted executor
#![allow(dead_code)]

use slipway_build::{
    BuildResult, ChildHandle, LaunchRequest, LaunchedProcess, Launcher, ProcessExit,
};
use slipway_config::{
    AndroidConfig, BuildConfig, Config, ExecutorConfig, PackageConfig, ProjectConfig,
};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const BASE_PROJECT_TEMPLATE: &str = "allprojects {\n    repositories {\n        google()\n    }\n}\n**BUILD_SCRIPT_DEPS**\n";
pub const LAUNCHER_TEMPLATE: &str = "apply plugin: 'com.android.application'\n\ndependencies {\n    implementation project(':unityLibrary')\n}\n\nandroid {\n    compileSdkVersion **APIVERSION**\n    buildToolsVersion '**BUILDTOOLS**'\n    defaultConfig {\n        minSdkVersion **MINSDKVERSION**\n        targetSdkVersion **TARGETSDKVERSION**\n        applicationId '**APPLICATIONID**'\n        ndk {\n            abiFilters **ABIFILTERS**\n        }\n        versionCode **VERSIONCODE**\n        versionName '**VERSIONNAME**'\n    }\n    buildTypes {\n        release {\n            minifyEnabled **MINIFY_RELEASE**\n            useProguard **PROGUARD_RELEASE**\n            proguardFiles getDefaultProguardFile('proguard-android.txt')**USER_PROGUARD****SIGNCONFIG**\n        }\n    }**PACKAGING_OPTIONS**\n}\n";
pub const LIBRARY_TEMPLATE: &str = "apply plugin: 'com.android.library'\n**APPLY_PLUGINS**\n\ndependencies {\n    implementation fileTree(dir: 'libs', include: ['*.jar'])\n**DEPS**}\n\nandroid {\n    compileSdkVersion **APIVERSION**\n    defaultConfig {\n        minSdkVersion **MINSDKVERSION**\n        targetSdkVersion **TARGETSDKVERSION**\n        ndk {\n            abiFilters **ABIFILTERS**\n        }\n        consumerProguardFiles 'proguard-unity.txt'**USER_PROGUARD**\n    }**PACKAGING_OPTIONS**\n}\n";
pub const SETTINGS_TEMPLATE: &str = "include ':launcher', ':unityLibrary'\n**INCLUDES**\n";
pub const LAUNCHER_MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.unity3d.player">
    <application android:label="@string/app_name" android:icon="@mipmap/app_icon" />
</manifest>
"#;
pub const LIBRARY_MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.unity3d.player">
    <application>
        <activity android:name="com.unity3d.player.UnityPlayerActivity" android:theme="@style/UnityThemeSelector">
            <intent-filter>
                <action android:name="android.intent.action.MAIN" />
                <category android:name="android.intent.category.LAUNCHER" />
            </intent-filter>
        </activity>
    </application>
</manifest>
"#;
pub const STRINGS: &str =
    "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<resources>\n    <string name=\"app_name\">Unity</string>\n</resources>\n";

pub const PLAYER_LIBS: &[&str] = &["libmain.so", "libunity.so"];

/// Write `content` to `root/relative`, creating parents
pub fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// A project with a complete fake player package and tool roots
pub struct AndroidFixture {
    pub temp: TempDir,
    pub architectures: Vec<String>,
    pub backend: String,
    pub configuration: String,
    pub export_project: bool,
    pub target_type: String,
}

impl AndroidFixture {
    pub fn new() -> Self {
        let fixture = Self {
            temp: tempfile::tempdir().unwrap(),
            architectures: vec!["armv7".to_string(), "arm64".to_string()],
            backend: "il2cpp".to_string(),
            configuration: "develop".to_string(),
            export_project: false,
            target_type: "apk".to_string(),
        };
        fixture.populate();
        fixture
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn player(&self) -> PathBuf {
        self.root().join("player")
    }

    pub fn with_backend(mut self, backend: &str) -> Self {
        self.backend = backend.to_string();
        self
    }

    pub fn with_architectures(mut self, architectures: &[&str]) -> Self {
        self.architectures = architectures.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn exporting(mut self) -> Self {
        self.export_project = true;
        self
    }

    pub fn app_bundle(mut self) -> Self {
        self.target_type = "app-bundle".to_string();
        self
    }

    fn populate(&self) {
        let root = self.root();

        for tool in ["csc", "typedb-gen", "ilpp", "aotc", "il2cpp"] {
            write(root, &format!("player/Tools/{}", tool), "#!/bin/sh\n");
        }
        write(root, "player/Tools/gradle/lib/gradle-launcher-5.1.1.jar", "");

        for backend in ["mono", "il2cpp"] {
            write(
                root,
                &format!("player/Variations/{}/Managed/UnityEngine.dll", backend),
                "dll",
            );
            for variation in ["Development", "Release"] {
                let base = format!("player/Variations/{}/{}", backend, variation);
                write(root, &format!("{}/Classes/classes.jar", base), "jar");
                for abi in ["armeabi-v7a", "arm64-v8a"] {
                    for lib in PLAYER_LIBS {
                        write(root, &format!("{}/Libs/{}/{}", base, abi, lib), "so");
                    }
                    if backend == "mono" {
                        for lib in ["libmonobdwgc-2.0.so", "libMonoPosixHelper.so"] {
                            write(root, &format!("{}/MonoLibs/{}/{}", base, abi, lib), "so");
                        }
                    }
                }
            }
        }

        write(
            root,
            "player/Source/com/unity3d/player/UnityPlayerActivity.java",
            "package com.unity3d.player;\n",
        );
        write(root, "player/Apk/res/values/styles.xml", "<resources/>\n");
        write(root, "player/Apk/res/values-v21/styles.xml", "<resources/>\n");
        write(root, "player/Apk/res/values-v30/styles.xml", "<resources/>\n");
        write(root, "player/Apk/res/values/strings.xml", STRINGS);
        write(root, "player/Apk/res/mipmap-mdpi/app_icon.png", "png");

        write(root, "player/Templates/baseProjectTemplate.gradle", BASE_PROJECT_TEMPLATE);
        write(root, "player/Templates/launcherTemplate.gradle", LAUNCHER_TEMPLATE);
        write(root, "player/Templates/mainTemplate.gradle", LIBRARY_TEMPLATE);
        write(root, "player/Templates/settingsTemplate.gradle", SETTINGS_TEMPLATE);
        write(root, "player/Templates/LauncherManifest.xml", LAUNCHER_MANIFEST);
        write(root, "player/Templates/UnityManifest.xml", LIBRARY_MANIFEST);
        write(root, "player/Templates/UnityProGuardTemplate.txt", "-keep class bitter.jnibridge.* { *; }\n");

        fs::create_dir_all(root.join("sdk/platforms")).unwrap();
        fs::create_dir_all(root.join("ndk/toolchains")).unwrap();
        write(root, "jdk/bin/java", "#!/bin/sh\n");
        write(root, "tools/executor", "#!/bin/sh\n");

        write(root, "Assets/Scripts/Player.cs", "class Player {}\n");
        write(root, "Assets/Scripts/Enemy.cs", "class Enemy {}\n");
        write(root, "Data/level0", "level");
    }

    pub fn config(&self) -> Config {
        let root = self.root();
        Config {
            project: ProjectConfig {
                package: Some(PackageConfig {
                    product_name: "Rooftops".to_string(),
                    identifier: "com.example.rooftops".to_string(),
                    version_name: "1.2".to_string(),
                    version_code: 12,
                }),
                build: Some(BuildConfig {
                    configuration: Some(self.configuration.clone()),
                    scripting_backend: Some(self.backend.clone()),
                    sources: vec![PathBuf::from("Assets/Scripts")],
                    player_package: Some(PathBuf::from("player")),
                    ..Default::default()
                }),
                android: Some(AndroidConfig {
                    architectures: self.architectures.clone(),
                    target_api: Some(29),
                    target_type: Some(self.target_type.clone()),
                    export_project: Some(self.export_project),
                    sdk: Some(root.join("sdk")),
                    ndk: Some(root.join("ndk")),
                    jdk: Some(root.join("jdk")),
                    ..Default::default()
                }),
                executor: Some(ExecutorConfig {
                    path: Some(root.join("tools/executor")),
                    ..Default::default()
                }),
            },
            global: Default::default(),
            project_root: Some(root.to_path_buf()),
        }
    }
}

/// What one scripted executor run does
#[derive(Debug, Clone)]
pub struct Script {
    pub lines: Vec<String>,
    /// `None` keeps the process alive and silent until killed
    pub exit: Option<i32>,
}

impl Script {
    pub fn exit(code: i32) -> Self {
        Self {
            lines: Vec::new(),
            exit: Some(code),
        }
    }

    pub fn hang() -> Self {
        Self {
            lines: Vec::new(),
            exit: None,
        }
    }

    pub fn with_lines(mut self, lines: &[&str]) -> Self {
        self.lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }
}

struct ScriptedChild {
    exit: Option<i32>,
    killed: Arc<AtomicBool>,
    // Held open so a hanging run never reports closed output
    _output: Option<Sender<String>>,
}

impl ChildHandle for ScriptedChild {
    fn try_wait(&mut self) -> BuildResult<Option<ProcessExit>> {
        if self.killed.load(Ordering::SeqCst) {
            return Ok(Some(ProcessExit { code: None }));
        }
        Ok(self.exit.map(ProcessExit::code))
    }

    fn kill(&mut self) -> BuildResult<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher replaying one [`Script`] per launch and recording requests
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    pub requests: Arc<Mutex<Vec<LaunchRequest>>>,
    pub killed: Arc<AtomicBool>,
}

impl ScriptedLauncher {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            ..Default::default()
        }
    }

    pub fn launches(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(&self, request: &LaunchRequest) -> BuildResult<LaunchedProcess> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::exit(0));

        let (tx, rx) = mpsc::channel();
        for line in &script.lines {
            tx.send(line.clone()).unwrap();
        }
        let held = if script.exit.is_none() { Some(tx) } else { None };

        Ok(LaunchedProcess {
            child: Box::new(ScriptedChild {
                exit: script.exit,
                killed: self.killed.clone(),
                _output: held,
            }),
            output: rx,
        })
    }
}
