//! Graph descriptor format consumed by the incremental executor

use crate::action::{content_digest, quote_arg, ActionKind};
use crate::error::{BuildError, BuildResult};
use crate::graph::ActionGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Argument lists longer than this go into a response file when the action allows it
pub const RESPONSE_FILE_THRESHOLD: usize = 8 * 1024;

/// Files with these extensions are compared by content hash instead of timestamp.
/// The empty string covers extensionless files.
pub const DEFAULT_DIGEST_EXTENSIONS: &[&str] = &[
    "cs", "c", "cpp", "m", "mm", "rsp", "exe", "dll", "pdb", "txt", "json", "bundle", "entities",
    "header", "bin", "",
];

/// Serialized action graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescriptor {
    pub title: String,
    pub artifacts_root: PathBuf,
    pub content_digest_extensions: Vec<String>,
    pub actions: Vec<ActionRecord>,
}

/// One action as the executor sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub index: usize,
    pub name: String,
    pub kind: String,
    pub outputs: Vec<PathBuf>,
    pub inputs: Vec<PathBuf>,
    /// Indices of actions producing this action's inputs
    pub dependencies: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub delete_outputs_before_run: bool,
    #[serde(default)]
    pub allow_unexpected_output: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_directories: Vec<PathBuf>,
}

/// A response file to be written next to the descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFile {
    pub path: PathBuf,
    pub content: String,
}

impl GraphDescriptor {
    /// Build the descriptor for `graph`; response files are placed under `dir/rsp`
    pub fn from_graph(graph: &ActionGraph, dir: &Path) -> (Self, Vec<ResponseFile>) {
        let dependencies = graph.dependencies();
        let mut response_files = Vec::new();

        let actions = graph
            .actions()
            .iter()
            .zip(dependencies)
            .enumerate()
            .map(|(index, (action, dependencies))| {
                let mut record = ActionRecord {
                    index,
                    name: action.name.clone(),
                    kind: action.kind.label().to_string(),
                    outputs: action.outputs.clone(),
                    inputs: action.inputs.clone(),
                    dependencies,
                    command_line: None,
                    response_file: None,
                    content: None,
                    content_digest: None,
                    env: action.options.env.clone(),
                    delete_outputs_before_run: action.options.delete_outputs_before_run,
                    allow_unexpected_output: action.options.allow_unexpected_output,
                    target_directories: action.options.target_directories.clone(),
                };

                match &action.kind {
                    ActionKind::Command { executable, .. } => {
                        let joined = action.joined_args().unwrap_or_default();
                        let exe = quote_arg(executable);
                        if action.options.use_response_file && joined.len() > RESPONSE_FILE_THRESHOLD {
                            let digest = content_digest(&joined);
                            let path = dir.join("rsp").join(format!("{}.rsp", &digest[..16]));
                            record.command_line =
                                Some(format!("{} @{}", exe, quote_arg(&path.to_string_lossy())));
                            record.response_file = Some(path.clone());
                            response_files.push(ResponseFile {
                                path,
                                content: joined,
                            });
                        } else if joined.is_empty() {
                            record.command_line = Some(exe);
                        } else {
                            record.command_line = Some(format!("{} {}", exe, joined));
                        }
                    }
                    ActionKind::Copy => {}
                    ActionKind::WriteText { content, digest } => {
                        record.content = Some(content.clone());
                        record.content_digest = Some(digest.clone());
                    }
                }
                record
            })
            .collect();

        let descriptor = Self {
            title: graph.title().to_string(),
            artifacts_root: graph.artifacts_root().to_path_buf(),
            content_digest_extensions: graph.digest_extensions().to_vec(),
            actions,
        };
        (descriptor, response_files)
    }

    /// Read a descriptor back from disk
    pub fn read(path: &Path) -> BuildResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Number of actions of each kind
    pub fn kind_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for action in &self.actions {
            *counts.entry(action.kind.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Copy `file` to `<stem><pass>.<ext>` beside it; missing files are skipped
pub fn backup_pass_file(file: &Path, pass: u32) -> BuildResult<Option<PathBuf>> {
    if !file.is_file() {
        return Ok(None);
    }

    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match file.extension() {
        Some(ext) => format!("{}{}.{}", stem, pass, ext.to_string_lossy()),
        None => format!("{}{}", stem, pass),
    };
    let target = file.with_file_name(name);

    fs::copy(file, &target).map_err(|e| BuildError::io(&target, e))?;
    Ok(Some(target))
}
