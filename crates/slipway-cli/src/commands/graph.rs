//! Graph command - generate a descriptor without running the executor

use super::Target;
use anyhow::{Context, Result};
use slipway_build::{GraphKind, Pipeline};

/// Graph command arguments
pub struct GraphArgs {
    pub target: Target,
    /// Type database graph instead of the full graph
    pub typedb: bool,
    /// JSON output
    pub json: bool,
}

/// Run the graph command
pub fn run(args: GraphArgs) -> Result<()> {
    let config = args.target.load()?;
    let pipeline = Pipeline::from_config(&config).context("Failed to set up build")?;

    let kind = if args.typedb {
        GraphKind::TypeDb
    } else {
        GraphKind::Full
    };
    let plan = pipeline
        .plan(kind)
        .context("Graph generation failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "graph": plan.descriptor_path.display().to_string(),
                "title": plan.descriptor.title,
                "actions": plan.descriptor.actions.len(),
                "action_kinds": plan.descriptor.kind_counts(),
                "steps": plan.steps.completed.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
            })
        );
    } else {
        println!("{}", plan.descriptor_path.display());
        println!("{} actions", plan.descriptor.actions.len());
    }
    Ok(())
}
