//! Build session: the state threaded through one build invocation

use crate::context::{ContextStore, ContextValue};
use crate::error::BuildResult;
use crate::graph::ActionGraph;

/// Context store plus the action graph of the current incremental pass
///
/// Fields are public so a step can read context while adding actions.
#[derive(Debug)]
pub struct BuildSession {
    pub context: ContextStore,
    pub graph: ActionGraph,
    pass: u32,
}

impl BuildSession {
    /// Create a session at pass 0
    pub fn new(context: ContextStore, graph: ActionGraph) -> Self {
        Self {
            context,
            graph,
            pass: 0,
        }
    }

    /// Current incremental pass number
    pub fn pass(&self) -> u32 {
        self.pass
    }

    /// Start a new pass with a fresh graph, returning the previous graph
    pub fn begin_pass(&mut self, pass: u32, graph: ActionGraph) -> ActionGraph {
        self.pass = pass;
        std::mem::replace(&mut self.graph, graph)
    }

    /// Shortcut for `context.get`
    pub fn get<T: ContextValue>(&self) -> BuildResult<&T> {
        self.context.get::<T>()
    }

    /// Shortcut for `context.set`
    pub fn set<T: ContextValue>(&mut self, value: T) -> Option<T> {
        self.context.set(value)
    }

    /// Split into context and graph
    pub fn into_parts(self) -> (ContextStore, ActionGraph) {
        (self.context, self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_begin_pass_swaps_graph() {
        let mut session = BuildSession::new(ContextStore::new(), ActionGraph::new("first", "/a"));
        session
            .graph
            .add_write_text_action(Path::new("out/a.txt"), "a")
            .unwrap();

        let previous = session.begin_pass(1, ActionGraph::new("second", "/a"));

        assert_eq!(session.pass(), 1);
        assert_eq!(previous.len(), 1);
        assert!(session.graph.is_empty());
        assert_eq!(session.graph.title(), "second");
    }
}
