//! Target architectures and native toolchains
//!
//! Toolchains are owned by the build session through a [`ToolchainRegistry`]
//! stored in the context. Architecture entries refer to their toolchain by
//! architecture key.

use crate::action::normalize;
use crate::error::{BuildError, BuildResult};
use crate::settings::ScriptingBackend;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Target CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Armv7,
    Arm64,
}

impl Architecture {
    pub fn all() -> [Architecture; 2] {
        [Self::Armv7, Self::Arm64]
    }

    pub fn parse(s: &str) -> BuildResult<Self> {
        match s.to_lowercase().as_str() {
            "armv7" => Ok(Self::Armv7),
            "arm64" => Ok(Self::Arm64),
            other => Err(BuildError::InvalidConfiguration(format!(
                "unknown architecture '{}'",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Armv7 => "armv7",
            Self::Arm64 => "arm64",
        }
    }

    /// Android ABI directory name
    pub fn abi(&self) -> &'static str {
        match self {
            Self::Armv7 => "armeabi-v7a",
            Self::Arm64 => "arm64-v8a",
        }
    }

    /// Target string for the ahead-of-time code generator
    pub fn codegen_target(&self) -> &'static str {
        match self {
            Self::Armv7 => "ARMV7A_NEON32",
            Self::Arm64 => "ARMV8A_AARCH64",
        }
    }

    /// Clang target triple without API level
    pub fn triple(&self) -> &'static str {
        match self {
            Self::Armv7 => "armv7a-linux-androideabi",
            Self::Arm64 => "aarch64-linux-android",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An NDK clang toolchain for one architecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub architecture: Architecture,
    pub ndk_root: PathBuf,
    pub api_level: u32,
}

impl Toolchain {
    pub fn new(architecture: Architecture, ndk_root: impl Into<PathBuf>, api_level: u32) -> Self {
        Self {
            architecture,
            ndk_root: ndk_root.into(),
            api_level,
        }
    }

    fn host_tag() -> &'static str {
        if cfg!(target_os = "windows") {
            "windows-x86_64"
        } else if cfg!(target_os = "macos") {
            "darwin-x86_64"
        } else {
            "linux-x86_64"
        }
    }

    fn bin_dir(&self) -> PathBuf {
        self.ndk_root
            .join("toolchains")
            .join("llvm")
            .join("prebuilt")
            .join(Self::host_tag())
            .join("bin")
    }

    /// C++ compiler driver
    pub fn compiler(&self) -> PathBuf {
        self.bin_dir().join("clang++")
    }

    /// Archiver
    pub fn archiver(&self) -> PathBuf {
        self.bin_dir().join("llvm-ar")
    }

    /// Triple including the API level, e.g. `aarch64-linux-android21`
    pub fn target(&self) -> String {
        format!("{}{}", self.architecture.triple(), self.api_level)
    }

    /// File name of a dynamic library
    pub fn dynamic_library_name(&self, stem: &str) -> String {
        format!("lib{}.so", stem)
    }
}

/// Toolchains for this build, keyed by architecture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainRegistry {
    toolchains: BTreeMap<Architecture, Toolchain>,
}

impl ToolchainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One NDK toolchain per architecture
    pub fn for_ndk(ndk_root: &Path, api_level: u32, architectures: &[Architecture]) -> Self {
        let mut registry = Self::new();
        for &arch in architectures {
            registry.register(Toolchain::new(arch, ndk_root, api_level));
        }
        registry
    }

    /// Register a toolchain, returning the one it replaced
    pub fn register(&mut self, toolchain: Toolchain) -> Option<Toolchain> {
        self.toolchains.insert(toolchain.architecture, toolchain)
    }

    pub fn get(&self, architecture: Architecture) -> BuildResult<&Toolchain> {
        self.toolchains.get(&architecture).ok_or_else(|| {
            BuildError::missing_tool(
                format!("{} toolchain", architecture),
                "no toolchain registered for this architecture",
            )
        })
    }

    pub fn len(&self) -> usize {
        self.toolchains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toolchains.is_empty()
    }
}

/// Per-architecture build configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitectureEntry {
    pub architecture: Architecture,
    /// Where native libraries for this architecture are deployed
    pub deploy_dir: PathBuf,
    pub abi: String,
    pub codegen_target: String,
}

impl ArchitectureEntry {
    pub fn new(architecture: Architecture, deploy_dir: impl Into<PathBuf>) -> Self {
        Self {
            architecture,
            deploy_dir: deploy_dir.into(),
            abi: architecture.abi().to_string(),
            codegen_target: architecture.codegen_target().to_string(),
        }
    }

    /// Resolve this entry's toolchain handle
    pub fn toolchain<'a>(&self, registry: &'a ToolchainRegistry) -> BuildResult<&'a Toolchain> {
        registry.get(self.architecture)
    }
}

/// Architecture entries for a build; additive, one per architecture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Architectures {
    entries: Vec<ArchitectureEntry>,
}

impl Architectures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry
    ///
    /// A second entry for the same architecture, or one deploying into a
    /// directory another entry already owns, is an error.
    pub fn add(&mut self, entry: ArchitectureEntry) -> BuildResult<()> {
        if self.contains(entry.architecture) {
            return Err(BuildError::InvalidConfiguration(format!(
                "architecture {} was added twice",
                entry.architecture
            )));
        }
        if let Some(owner) = self
            .entries
            .iter()
            .find(|e| normalize(&e.deploy_dir) == normalize(&entry.deploy_dir))
        {
            return Err(BuildError::InvalidConfiguration(format!(
                "architectures {} and {} both deploy to {}",
                owner.architecture,
                entry.architecture,
                entry.deploy_dir.display()
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn contains(&self, architecture: Architecture) -> bool {
        self.entries.iter().any(|e| e.architecture == architecture)
    }

    pub fn get(&self, architecture: Architecture) -> Option<&ArchitectureEntry> {
        self.entries.iter().find(|e| e.architecture == architecture)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArchitectureEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Architectures in insertion order
    pub fn architectures(&self) -> Vec<Architecture> {
        self.entries.iter().map(|e| e.architecture).collect()
    }
}

/// Filter requested architectures down to what the backend supports
///
/// Mono has no arm64 runtime; arm64 is dropped with a warning. Duplicates are
/// removed, order is kept.
pub fn select_architectures(
    requested: &[Architecture],
    backend: ScriptingBackend,
) -> Vec<Architecture> {
    let mut selected = Vec::new();
    for &arch in requested {
        if selected.contains(&arch) {
            continue;
        }
        if backend == ScriptingBackend::Mono && arch == Architecture::Arm64 {
            warn!("arm64 is not available with the mono backend; skipping it");
            continue;
        }
        selected.push(arch);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_architecture_identifiers() {
        assert_eq!(Architecture::Armv7.abi(), "armeabi-v7a");
        assert_eq!(Architecture::Arm64.abi(), "arm64-v8a");
        assert_eq!(Architecture::Arm64.codegen_target(), "ARMV8A_AARCH64");
        assert_eq!(Architecture::parse("ARM64").unwrap(), Architecture::Arm64);
        assert!(Architecture::parse("x86").is_err());
    }

    #[test]
    fn test_toolchain_paths() {
        let tc = Toolchain::new(Architecture::Arm64, "/ndk", 21);
        assert_eq!(tc.target(), "aarch64-linux-android21");
        assert!(tc.compiler().starts_with("/ndk/toolchains/llvm/prebuilt"));
        assert_eq!(tc.dynamic_library_name("il2cpp"), "libil2cpp.so");
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ToolchainRegistry::for_ndk(Path::new("/ndk"), 21, &[Architecture::Armv7]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(Architecture::Armv7).is_ok());
        assert!(matches!(
            registry.get(Architecture::Arm64),
            Err(BuildError::MissingTool { .. })
        ));
    }

    #[test]
    fn test_architectures_are_additive() {
        let mut archs = Architectures::new();
        archs
            .add(ArchitectureEntry::new(Architecture::Armv7, "/jni/armeabi-v7a"))
            .unwrap();
        archs
            .add(ArchitectureEntry::new(Architecture::Arm64, "/jni/arm64-v8a"))
            .unwrap();

        assert!(archs
            .add(ArchitectureEntry::new(Architecture::Armv7, "/elsewhere"))
            .is_err());
        assert_eq!(archs.len(), 2);
        assert_eq!(
            archs.architectures(),
            vec![Architecture::Armv7, Architecture::Arm64]
        );
    }

    #[test]
    fn test_shared_deploy_dir_rejected() {
        let mut archs = Architectures::new();
        archs
            .add(ArchitectureEntry::new(Architecture::Armv7, "/jni/libs"))
            .unwrap();

        let err = archs
            .add(ArchitectureEntry::new(Architecture::Arm64, "/jni/./libs"))
            .unwrap_err();
        assert!(err.to_string().contains("both deploy to"));
        assert_eq!(archs.architectures(), vec![Architecture::Armv7]);
    }

    #[test]
    fn test_mono_drops_arm64() {
        let requested = [Architecture::Armv7, Architecture::Arm64, Architecture::Armv7];
        assert_eq!(
            select_architectures(&requested, ScriptingBackend::Mono),
            vec![Architecture::Armv7]
        );
        assert_eq!(
            select_architectures(&requested, ScriptingBackend::Il2Cpp),
            vec![Architecture::Armv7, Architecture::Arm64]
        );
    }
}
