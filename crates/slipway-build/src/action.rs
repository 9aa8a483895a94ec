//! Build actions
//!
//! An action is a single unit of work handed to the incremental executor: the
//! files it produces, the files it reads and how to get from one to the other.
//! Actions are immutable once added to an [`ActionGraph`](crate::graph::ActionGraph).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What the executor has to do to produce an action's outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Run an external command
    Command {
        executable: String,
        args: Vec<String>,
    },
    /// Copy the single input to the single output
    Copy,
    /// Write literal text to the single output
    WriteText { content: String, digest: String },
}

impl ActionKind {
    /// Short kind label used in logs and descriptors
    pub fn label(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Copy => "copy",
            Self::WriteText { .. } => "write_text",
        }
    }
}

/// Optional knobs on an action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOptions {
    /// Environment variable overrides for the command
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Delete the declared outputs before running
    #[serde(default)]
    pub delete_outputs_before_run: bool,
    /// Outputs may include files not literally declared (globbed directories)
    #[serde(default)]
    pub allow_unexpected_output: bool,
    /// Directories scanned to resolve globbed outputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_directories: Vec<PathBuf>,
    /// Move long argument lists into a response file
    #[serde(default)]
    pub use_response_file: bool,
}

impl ActionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment variable override
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Merge a set of environment overrides
    pub fn with_envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn delete_outputs_before_run(mut self) -> Self {
        self.delete_outputs_before_run = true;
        self
    }

    /// Accept outputs under `dirs` that were not declared up front
    pub fn allow_unexpected_output(mut self, dirs: Vec<PathBuf>) -> Self {
        self.allow_unexpected_output = true;
        self.target_directories = dirs;
        self
    }

    pub fn use_response_file(mut self) -> Self {
        self.use_response_file = true;
        self
    }
}

/// A declared unit of work in the build graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Human readable name, also used as the category in executor output
    pub name: String,
    pub kind: ActionKind,
    /// Declared outputs; the action's identity
    pub outputs: Vec<PathBuf>,
    /// Ordered inputs; files or other actions' outputs
    pub inputs: Vec<PathBuf>,
    pub options: ActionOptions,
}

impl Action {
    /// Create a command action
    pub fn command(
        name: impl Into<String>,
        outputs: Vec<PathBuf>,
        inputs: Vec<PathBuf>,
        executable: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::Command {
                executable: executable.into(),
                args,
            },
            outputs: outputs.iter().map(|p| normalize(p)).collect(),
            inputs: inputs.iter().map(|p| normalize(p)).collect(),
            options: ActionOptions::default(),
        }
    }

    /// Create a copy action from `source` to `destination`
    pub fn copy(destination: &Path, source: &Path) -> Self {
        Self {
            name: "Copy".to_string(),
            kind: ActionKind::Copy,
            outputs: vec![normalize(destination)],
            inputs: vec![normalize(source)],
            options: ActionOptions::default(),
        }
    }

    /// Create a write-text action; the content digest is how the executor notices changes
    pub fn write_text(path: &Path, content: impl Into<String>) -> Self {
        let content = content.into();
        let digest = content_digest(&content);
        Self {
            name: "WriteText".to_string(),
            kind: ActionKind::WriteText { content, digest },
            outputs: vec![normalize(path)],
            inputs: Vec::new(),
            options: ActionOptions::default(),
        }
    }

    /// Set options
    pub fn with_options(mut self, options: ActionOptions) -> Self {
        self.options = options;
        self
    }

    /// Label for logs: name plus first output
    pub fn display_name(&self) -> String {
        match self.outputs.first() {
            Some(output) => format!("{} {}", self.name, output.display()),
            None => self.name.clone(),
        }
    }

    /// Arguments joined the way they would appear on a command line
    pub fn joined_args(&self) -> Option<String> {
        match &self.kind {
            ActionKind::Command { args, .. } => Some(
                args.iter()
                    .map(|a| quote_arg(a))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        }
    }
}

/// SHA-256 of text content, lowercase hex
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Quote an argument for a POSIX shell when it contains whitespace or quotes
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if arg.starts_with('"') && arg.ends_with('"') && arg.len() > 1 {
        return arg.to_string();
    }
    if arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// Lexically normalize a path so `a/./b` and `a/b/` name the same output
pub fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_text_digest_tracks_content() {
        let a = Action::write_text(Path::new("out/a.txt"), "hello");
        let b = Action::write_text(Path::new("out/a.txt"), "hello!");

        let digest = |action: &Action| match &action.kind {
            ActionKind::WriteText { digest, .. } => digest.clone(),
            _ => unreachable!(),
        };

        assert_eq!(digest(&a).len(), 64);
        assert_ne!(digest(&a), digest(&b));
        assert!(a.inputs.is_empty());
    }

    #[test]
    fn test_copy_action_shape() {
        let action = Action::copy(Path::new("dst/lib.so"), Path::new("src/lib.so"));
        assert_eq!(action.outputs, vec![PathBuf::from("dst/lib.so")]);
        assert_eq!(action.inputs, vec![PathBuf::from("src/lib.so")]);
        assert_eq!(action.kind.label(), "copy");
    }

    #[test]
    fn test_normalize_collapses_dot_segments() {
        assert_eq!(normalize(Path::new("a/./b/")), PathBuf::from("a/b"));
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("plain"), "plain");
        assert_eq!(quote_arg("with space"), "\"with space\"");
        assert_eq!(quote_arg("\"already\""), "\"already\"");
        assert_eq!(quote_arg(""), "\"\"");
    }

    #[test]
    fn test_options_builder() {
        let options = ActionOptions::new()
            .with_env("ANDROID_NDK_ROOT", "/ndk")
            .delete_outputs_before_run()
            .use_response_file();

        assert_eq!(options.env.get("ANDROID_NDK_ROOT").map(String::as_str), Some("/ndk"));
        assert!(options.delete_outputs_before_run);
        assert!(options.use_response_file);
        assert!(!options.allow_unexpected_output);
    }
}
