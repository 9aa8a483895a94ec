//! Action graph builder
//!
//! Accumulates actions while build steps run. Nothing is executed here; the
//! graph is serialized with [`ActionGraph::write`] and handed to the executor.
//!
//! Every output path has exactly one writer. Adding a second action that
//! declares an already-claimed output fails with [`BuildError::DuplicateOutput`]
//! and leaves the graph untouched.

use crate::action::{normalize, Action, ActionOptions};
use crate::descriptor::{GraphDescriptor, DEFAULT_DIGEST_EXTENSIONS};
use crate::error::{BuildError, BuildResult};
use crate::order::DependencyGraph;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// The full set of actions for one incremental pass
#[derive(Debug, Clone)]
pub struct ActionGraph {
    title: String,
    artifacts_root: PathBuf,
    actions: Vec<Action>,
    /// Output path -> index of the action that produces it
    writers: HashMap<PathBuf, usize>,
    digest_extensions: Vec<String>,
}

impl ActionGraph {
    /// Create an empty graph
    pub fn new(title: impl Into<String>, artifacts_root: impl Into<PathBuf>) -> Self {
        Self {
            title: title.into(),
            artifacts_root: artifacts_root.into(),
            actions: Vec::new(),
            writers: HashMap::new(),
            digest_extensions: DEFAULT_DIGEST_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artifacts_root(&self) -> &Path {
        &self.artifacts_root
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Extensions the executor should hash rather than timestamp
    pub fn digest_extensions(&self) -> &[String] {
        &self.digest_extensions
    }

    /// Replace the content-digest extension list
    pub fn set_digest_extensions<S: AsRef<str>>(&mut self, extensions: &[S]) {
        self.digest_extensions = extensions.iter().map(|e| e.as_ref().to_string()).collect();
    }

    /// Add a fully constructed action
    ///
    /// Output and input paths are normalized before the single-writer check.
    pub fn add(&mut self, mut action: Action) -> BuildResult<()> {
        for path in action.outputs.iter_mut().chain(action.inputs.iter_mut()) {
            *path = normalize(path);
        }

        let mut seen = HashSet::new();
        for output in &action.outputs {
            if let Some(&existing) = self.writers.get(output) {
                return Err(BuildError::DuplicateOutput {
                    path: output.clone(),
                    existing: self.actions[existing].display_name(),
                    attempted: action.display_name(),
                });
            }
            if !seen.insert(output) {
                return Err(BuildError::DuplicateOutput {
                    path: output.clone(),
                    existing: action.display_name(),
                    attempted: action.display_name(),
                });
            }
        }

        debug!(
            "graph '{}': {} ({})",
            self.title,
            action.display_name(),
            action.kind.label()
        );

        let index = self.actions.len();
        for output in &action.outputs {
            self.writers.insert(output.clone(), index);
        }
        self.actions.push(action);
        Ok(())
    }

    /// Add a command action
    pub fn add_action(
        &mut self,
        name: impl Into<String>,
        outputs: Vec<PathBuf>,
        inputs: Vec<PathBuf>,
        executable: impl Into<String>,
        args: Vec<String>,
        options: ActionOptions,
    ) -> BuildResult<()> {
        self.add(Action::command(name, outputs, inputs, executable, args).with_options(options))
    }

    /// Add a copy of `source` to `destination`
    pub fn add_copy_action(&mut self, destination: &Path, source: &Path) -> BuildResult<()> {
        self.add(Action::copy(destination, source))
    }

    /// Add an action writing literal `content` to `path`
    pub fn add_write_text_action(&mut self, path: &Path, content: impl Into<String>) -> BuildResult<()> {
        self.add(Action::write_text(path, content))
    }

    /// Whether some action already declares `path` as an output
    pub fn produces(&self, path: &Path) -> bool {
        self.writers.contains_key(&normalize(path))
    }

    /// The action producing `path`, if any
    pub fn writer_of(&self, path: &Path) -> Option<&Action> {
        self.writers.get(&normalize(path)).map(|&i| &self.actions[i])
    }

    /// For each action, the indices of the actions producing its inputs
    pub fn dependencies(&self) -> Vec<Vec<usize>> {
        self.actions
            .iter()
            .enumerate()
            .map(|(index, action)| {
                let mut deps: Vec<usize> = action
                    .inputs
                    .iter()
                    .filter_map(|input| self.writers.get(input).copied())
                    .filter(|&dep| dep != index)
                    .collect();
                deps.sort_unstable();
                deps.dedup();
                deps
            })
            .collect()
    }

    /// Dependency layers; fails on cycles
    pub fn layers(&self) -> BuildResult<Vec<Vec<usize>>> {
        let names = self.actions.iter().map(|a| a.display_name()).collect();
        DependencyGraph::new(names, self.dependencies())?.layers()
    }

    /// Serialize the graph into a descriptor at `path`, plus any response files
    pub fn write(&self, path: &Path) -> BuildResult<GraphDescriptor> {
        self.layers()?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;

        let (descriptor, response_files) = GraphDescriptor::from_graph(self, dir);
        for rsp in &response_files {
            if let Some(parent) = rsp.path.parent() {
                fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
            }
            fs::write(&rsp.path, &rsp.content).map_err(|e| BuildError::io(&rsp.path, e))?;
        }

        let json = serde_json::to_string_pretty(&descriptor)?;
        fs::write(path, json).map_err(|e| BuildError::io(path, e))?;

        debug!(
            "wrote graph '{}' with {} actions to {}",
            self.title,
            self.actions.len(),
            path.display()
        );
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let mut graph = ActionGraph::new("test", "/artifacts");
        graph.add_copy_action(&p("out/a"), &p("src/a")).unwrap();

        let err = graph
            .add_write_text_action(&p("out/a"), "text")
            .unwrap_err();
        match err {
            BuildError::DuplicateOutput { path, .. } => assert_eq!(path, p("out/a")),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_duplicate_output_after_normalization() {
        let mut graph = ActionGraph::new("test", "/artifacts");
        graph.add_copy_action(&p("out/./a"), &p("src/a")).unwrap();
        assert!(graph.add_copy_action(&p("out/a"), &p("src/b")).is_err());
    }

    #[test]
    fn test_hand_built_action_paths_normalized() {
        let mut graph = ActionGraph::new("test", "/artifacts");
        graph.add_copy_action(&p("out/a"), &p("src/a")).unwrap();

        let mut action = Action::copy(&p("out/b"), &p("src/b"));
        action.outputs = vec![p("out/./a")];
        assert!(matches!(
            graph.add(action),
            Err(BuildError::DuplicateOutput { .. })
        ));

        let mut action = Action::copy(&p("out/b"), &p("src/b"));
        action.outputs = vec![p("out/./b/")];
        action.inputs = vec![p("out/./a")];
        graph.add(action).unwrap();

        assert!(graph.produces(&p("out/b")));
        assert_eq!(graph.actions()[1].inputs, vec![p("out/a")]);
    }

    #[test]
    fn test_duplicate_within_single_action() {
        let mut graph = ActionGraph::new("test", "/artifacts");
        let result = graph.add_action(
            "Twice",
            vec![p("out/x"), p("out/x")],
            vec![],
            "tool",
            vec![],
            ActionOptions::new(),
        );
        assert!(result.is_err());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_dependencies_follow_inputs() {
        let mut graph = ActionGraph::new("test", "/artifacts");
        graph
            .add_action(
                "Compile",
                vec![p("obj/a.o")],
                vec![p("src/a.c")],
                "cc",
                vec!["-c".into()],
                ActionOptions::new(),
            )
            .unwrap();
        graph
            .add_action(
                "Link",
                vec![p("lib/liba.so")],
                vec![p("obj/a.o")],
                "ld",
                vec![],
                ActionOptions::new(),
            )
            .unwrap();
        graph.add_copy_action(&p("deploy/liba.so"), &p("lib/liba.so")).unwrap();

        assert_eq!(graph.dependencies(), vec![vec![], vec![0], vec![1]]);
        assert_eq!(graph.layers().unwrap(), vec![vec![0], vec![1], vec![2]]);
        assert_eq!(graph.writer_of(&p("lib/liba.so")).map(|a| a.name.as_str()), Some("Link"));
    }

    #[test]
    fn test_write_descriptor() {
        let temp = TempDir::new().unwrap();
        let mut graph = ActionGraph::new("debug", temp.path().join("artifacts"));
        graph.add_write_text_action(&p("out/notes.txt"), "notes").unwrap();
        graph.add_copy_action(&p("out/copy.txt"), &p("out/notes.txt")).unwrap();

        let path = temp.path().join("graph.json");
        let written = graph.write(&path).unwrap();
        let read = GraphDescriptor::read(&path).unwrap();

        assert_eq!(written, read);
        assert_eq!(read.title, "debug");
        assert_eq!(read.actions.len(), 2);
        assert_eq!(read.actions[1].dependencies, vec![0]);
    }
}
