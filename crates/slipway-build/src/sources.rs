//! Source-set capability table
//!
//! Maps a platform tag to an ordered list of providers. Each provider is a
//! plain function of (toolchain, debug flag, source root) returning the files
//! it contributes; a platform's full list is the concatenation of its
//! providers' output. Platforms share providers by listing them, not by
//! wrapping each other.

use crate::toolchain::Toolchain;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A pure source-set provider
pub type SourceProvider = fn(&Toolchain, bool, &Path) -> Vec<PathBuf>;

/// Platform tags with registered source sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlatformTag {
    Android,
    Linux,
}

/// Platform tag to ordered providers
#[derive(Debug, Clone, Default)]
pub struct SourceSetTable {
    providers: BTreeMap<PlatformTag, Vec<SourceProvider>>,
}

impl SourceSetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the runtime source sets this crate knows about
    pub fn with_defaults() -> Self {
        Self::new()
            .with(PlatformTag::Android, &[runtime_common, runtime_posix, runtime_android])
            .with(PlatformTag::Linux, &[runtime_common, runtime_posix, runtime_linux])
    }

    /// Append providers for a tag (builder style)
    pub fn with(mut self, tag: PlatformTag, providers: &[SourceProvider]) -> Self {
        self.register(tag, providers);
        self
    }

    /// Append providers for a tag
    pub fn register(&mut self, tag: PlatformTag, providers: &[SourceProvider]) {
        self.providers
            .entry(tag)
            .or_default()
            .extend_from_slice(providers);
    }

    pub fn providers(&self, tag: PlatformTag) -> &[SourceProvider] {
        self.providers.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All files for `tag`, in provider order
    pub fn files(&self, tag: PlatformTag, toolchain: &Toolchain, debug: bool, root: &Path) -> Vec<PathBuf> {
        self.providers(tag)
            .iter()
            .flat_map(|provider| provider(toolchain, debug, root))
            .collect()
    }
}

fn join_all(root: &Path, files: &[&str]) -> Vec<PathBuf> {
    files.iter().map(|f| root.join(f)).collect()
}

/// Sources every platform compiles
pub fn runtime_common(_toolchain: &Toolchain, debug: bool, root: &Path) -> Vec<PathBuf> {
    let mut files = join_all(
        root,
        &[
            "mono/eglib/garray.c",
            "mono/eglib/gbytearray.c",
            "mono/eglib/gerror.c",
            "mono/eglib/ghashtable.c",
            "mono/eglib/glist.c",
            "mono/eglib/gmem.c",
            "mono/eglib/gpath.c",
            "mono/eglib/gstr.c",
            "mono/eglib/gstring.c",
            "mono/eglib/gutf8.c",
        ],
    );
    if debug {
        files.extend(join_all(
            root,
            &["mono/metadata/mono-hash.c", "mono/metadata/profiler.c"],
        ));
    }
    files
}

/// Sources shared by POSIX platforms
pub fn runtime_posix(_toolchain: &Toolchain, _debug: bool, root: &Path) -> Vec<PathBuf> {
    join_all(
        root,
        &[
            "mono/metadata/console-unix.c",
            "mono/metadata/w32error-unix.c",
            "mono/metadata/w32file-unix.c",
            "mono/metadata/w32process-unix.c",
            "mono/metadata/w32socket-unix.c",
            "mono/utils/mono-dl-posix.c",
            "mono/utils/mono-log-posix.c",
            "mono/utils/mono-threads-posix.c",
            "mono/utils/os-event-unix.c",
            "mono/utils/networking-posix.c",
        ],
    )
}

/// Android additions on top of POSIX
pub fn runtime_android(_toolchain: &Toolchain, _debug: bool, root: &Path) -> Vec<PathBuf> {
    join_all(
        root,
        &[
            "mono/metadata/w32process-unix-default.c",
            "support/libm/complex.c",
            "mono/utils/mono-log-android.c",
            "mono/utils/mono-threads-android.c",
        ],
    )
}

/// Linux additions on top of POSIX
pub fn runtime_linux(_toolchain: &Toolchain, _debug: bool, root: &Path) -> Vec<PathBuf> {
    join_all(
        root,
        &[
            "mono/metadata/w32process-unix-default.c",
            "mono/utils/mono-threads-linux.c",
        ],
    )
}
