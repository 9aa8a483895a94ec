//! Typed context store shared by build steps
//!
//! Every kind of shared value is listed once in the `context_values!` table
//! below. The table generates the [`ContextKind`] enum, one storage slot per
//! kind, and a [`ContextValue`] impl tying each Rust type to its slot, so
//! lookups are resolved at compile time.
//!
//! At most one value of each kind is live at a time. Asking for a value that
//! has not been set yet fails with [`BuildError::MissingContext`].

use crate::error::{BuildError, BuildResult};
use std::fmt;

/// A type that can be stored in a [`ContextStore`]
pub trait ContextValue: Sized + 'static {
    const KIND: ContextKind;

    #[doc(hidden)]
    fn slot(store: &ContextStore) -> &Option<Self>;

    #[doc(hidden)]
    fn slot_mut(store: &mut ContextStore) -> &mut Option<Self>;
}

macro_rules! context_values {
    ($($(#[$doc:meta])* $kind:ident($field:ident): $ty:ty => $label:literal,)+) => {
        /// Every kind of value the context store can hold
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ContextKind {
            $($(#[$doc])* $kind,)+
        }

        impl ContextKind {
            /// All kinds, in declaration order
            pub const ALL: &'static [ContextKind] = &[$(ContextKind::$kind,)+];

            /// Stable label used in messages
            pub fn label(&self) -> &'static str {
                match self {
                    $(ContextKind::$kind => $label,)+
                }
            }
        }

        /// Process-local store holding at most one value per [`ContextKind`]
        #[derive(Default)]
        pub struct ContextStore {
            $($field: Option<$ty>,)+
        }

        impl ContextStore {
            /// Whether a value of `kind` is currently set
            pub fn contains_kind(&self, kind: ContextKind) -> bool {
                match kind {
                    $(ContextKind::$kind => self.$field.is_some(),)+
                }
            }

            /// Drop the value of `kind`, if any
            pub fn clear_kind(&mut self, kind: ContextKind) {
                match kind {
                    $(ContextKind::$kind => self.$field = None,)+
                }
            }
        }

        $(
            impl ContextValue for $ty {
                const KIND: ContextKind = ContextKind::$kind;

                fn slot(store: &ContextStore) -> &Option<Self> {
                    &store.$field
                }

                fn slot_mut(store: &mut ContextStore) -> &mut Option<Self> {
                    &mut store.$field
                }
            }
        )+
    };
}

context_values! {
    /// Product, profile and tool locations resolved from configuration
    BuildSettings(build_settings): crate::settings::BuildSettings => "build-settings",
    /// Directories shared by every platform (player package, data deploy dir, ...)
    PlatformData(platform_data): crate::platform::PlatformData => "platform-data",
    /// One entry per target CPU architecture
    Architectures(architectures): crate::toolchain::Architectures => "architectures",
    /// Toolchains owned by this build, keyed by architecture
    Toolchains(toolchains): crate::toolchain::ToolchainRegistry => "toolchains",
    /// Platform tag to source-set providers
    SourceSets(source_sets): crate::sources::SourceSetTable => "source-sets",
    /// Extra files the host asked to deploy
    AdditionalFiles(additional_files): crate::steps::AdditionalFiles => "additional-files",
    /// Environment and target settings for native code generation
    CodegenSettings(codegen_settings): crate::steps::CodegenSettings => "codegen-settings",
    /// Managed assemblies published by code generation for IL2CPP
    ManagedAssemblies(managed_assemblies): crate::steps::ManagedAssemblies => "managed-assemblies",
    /// Android gradle project layout and tracked project files
    AndroidBuild(android_build): crate::android::AndroidBuildContext => "android-build",
    /// The final package produced by the packaging stage
    PackageArtifact(package_artifact): crate::platform::PackageArtifact => "package-artifact",
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl ContextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value, failing fast when it has not been set
    pub fn get<T: ContextValue>(&self) -> BuildResult<&T> {
        T::slot(self)
            .as_ref()
            .ok_or(BuildError::MissingContext { kind: T::KIND })
    }

    /// Get a value mutably, failing fast when it has not been set
    pub fn get_mut<T: ContextValue>(&mut self) -> BuildResult<&mut T> {
        T::slot_mut(self)
            .as_mut()
            .ok_or(BuildError::MissingContext { kind: T::KIND })
    }

    /// Get a value if present
    pub fn try_get<T: ContextValue>(&self) -> Option<&T> {
        T::slot(self).as_ref()
    }

    /// Set a value, returning the one it replaced
    pub fn set<T: ContextValue>(&mut self, value: T) -> Option<T> {
        T::slot_mut(self).replace(value)
    }

    /// Whether a value of type `T` is set
    pub fn contains<T: ContextValue>(&self) -> bool {
        T::slot(self).is_some()
    }

    /// Remove and return a value
    pub fn take<T: ContextValue>(&mut self) -> Option<T> {
        T::slot_mut(self).take()
    }

    /// Get a value, inserting the default first when missing
    pub fn get_or_insert_default<T: ContextValue + Default>(&mut self) -> &mut T {
        T::slot_mut(self).get_or_insert_with(T::default)
    }

    /// Kinds currently set
    pub fn kinds(&self) -> Vec<ContextKind> {
        ContextKind::ALL
            .iter()
            .copied()
            .filter(|&kind| self.contains_kind(kind))
            .collect()
    }
}

impl fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStore")
            .field("kinds", &self.kinds())
            .finish()
    }
}
