//! Build profile management
//!
//! A profile selects the player variation, whether the player is a
//! development build, and which packaging task the platform runs.

use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Build profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    /// Development player with debugging enabled (default)
    #[default]
    Debug,
    /// Development player with optimizations
    Develop,
    /// Shipping player
    Release,
}

impl BuildProfile {
    /// Parse profile from string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> BuildResult<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "develop" | "development" => Ok(Self::Develop),
            "release" => Ok(Self::Release),
            other => Err(BuildError::InvalidConfiguration(format!(
                "unknown build configuration '{}' (expected debug, develop or release)",
                other
            ))),
        }
    }

    /// Get profile name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Develop => "develop",
            Self::Release => "release",
        }
    }

    /// All profiles
    pub fn all() -> [BuildProfile; 3] {
        [Self::Debug, Self::Develop, Self::Release]
    }

    /// Whether the player is built as a development player
    pub fn is_development(&self) -> bool {
        !matches!(self, Self::Release)
    }

    /// Player package variation directory name
    pub fn variation_name(&self) -> &'static str {
        match self {
            Self::Debug | Self::Develop => "Development",
            Self::Release => "Release",
        }
    }

    /// Gradle task producing the package
    pub fn gradle_task(&self, app_bundle: bool) -> &'static str {
        match (self.is_development(), app_bundle) {
            (true, false) => "assembleDebug",
            (false, false) => "assembleRelease",
            (true, true) => "bundleDebug",
            (false, true) => "bundleRelease",
        }
    }

    /// Package path produced by [`gradle_task`](Self::gradle_task), relative to the gradle project
    pub fn gradle_output(&self, app_bundle: bool) -> PathBuf {
        let config = if self.is_development() {
            "debug"
        } else {
            "release"
        };
        if app_bundle {
            PathBuf::from(format!(
                "launcher/build/outputs/bundle/{}/launcher.aab",
                config
            ))
        } else {
            PathBuf::from(format!(
                "launcher/build/outputs/apk/{}/launcher-{}.apk",
                config, config
            ))
        }
    }
}

impl fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("debug", BuildProfile::Debug)]
    #[case("Develop", BuildProfile::Develop)]
    #[case("development", BuildProfile::Develop)]
    #[case("RELEASE", BuildProfile::Release)]
    fn test_profile_from_str(#[case] input: &str, #[case] expected: BuildProfile) {
        assert_eq!(BuildProfile::from_str(input).unwrap(), expected);
    }

    #[test]
    fn test_unknown_profile_rejected() {
        assert!(BuildProfile::from_str("fastest").is_err());
    }

    #[rstest]
    #[case(BuildProfile::Debug, false, "assembleDebug")]
    #[case(BuildProfile::Develop, true, "bundleDebug")]
    #[case(BuildProfile::Release, false, "assembleRelease")]
    #[case(BuildProfile::Release, true, "bundleRelease")]
    fn test_gradle_task(#[case] profile: BuildProfile, #[case] bundle: bool, #[case] task: &str) {
        assert_eq!(profile.gradle_task(bundle), task);
    }

    #[test]
    fn test_gradle_output_extension_follows_target() {
        let apk = BuildProfile::Release.gradle_output(false);
        let aab = BuildProfile::Release.gradle_output(true);
        assert_eq!(apk.extension().unwrap(), "apk");
        assert_eq!(aab.extension().unwrap(), "aab");
    }

    #[test]
    fn test_variation_name() {
        assert_eq!(BuildProfile::Debug.variation_name(), "Development");
        assert_eq!(BuildProfile::Develop.variation_name(), "Development");
        assert_eq!(BuildProfile::Release.variation_name(), "Release");
    }
}
