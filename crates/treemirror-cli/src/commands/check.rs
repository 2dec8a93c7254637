//! Check command - Show pending updates without applying them
//!
//! Provides the `treemirror check` CLI command which:
//! 1. Loads configuration
//! 2. Connects every configured source and reads its manifest
//! 3. Prints each rule's task: item counts, bytes, latest remote timestamp

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{build_plan, error_json, load_config, task_json, Plan, PlannedTask};
use crate::output::{human_bytes, plural, OutputFormat, Printer};

#[derive(Debug, Args)]
pub struct CheckCommand {
    /// List every item, not only per-rule totals
    #[arg(long)]
    pub items: bool,
}

impl CheckCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let out = Printer::new(format);
        let config = load_config(config_path)?;
        info!(config_path = %config_path.display(), sources = config.sources.len(), "Loaded configuration");

        if config.sources.is_empty() {
            out.warn(&format!(
                "No sources configured in {}",
                config_path.display()
            ));
            return Ok(());
        }

        let plan = build_plan(&config, &CancellationToken::new()).await?;

        if format.is_json() {
            out.json(&plan_json(&plan, self.items));
        } else {
            print_plan(&out, &plan, self.items);
        }
        Ok(())
    }
}

pub fn plan_json(plan: &Plan, with_items: bool) -> serde_json::Value {
    serde_json::json!({
        "tasks": plan.tasks.iter().map(|t| task_json(t, with_items)).collect::<Vec<_>>(),
        "errors": plan.errors.iter().map(error_json).collect::<Vec<_>>(),
    })
}

pub fn print_plan(out: &Printer, plan: &Plan, with_items: bool) {
    let pending: usize = plan.active().map(|t| t.task.items.len()).sum();
    if pending == 0 {
        out.success("Already up to date");
    } else {
        out.success(&format!("{pending} pending update{}", plural(pending)));
    }

    for planned in &plan.tasks {
        print_task(out, planned, with_items);
    }

    if !plan.errors.is_empty() {
        out.error(&format!(
            "{} error{} occurred:",
            plan.errors.len(),
            plural(plan.errors.len())
        ));
        for err in &plan.errors {
            out.line(&format!("  - {}: {}", err.source, err.error));
        }
    }
}

fn print_task(out: &Printer, planned: &PlannedTask, with_items: bool) {
    let task = &planned.task;
    out.line(&format!(
        "{} -> {}",
        task.name,
        task.rule.client_path.display()
    ));
    if let Some(by) = &planned.superseded_by {
        out.line(&format!("  superseded by {by}"));
        return;
    }
    out.line(&format!(
        "  {} download{} ({}), {} deletion{}",
        task.download_count(),
        plural(task.download_count()),
        human_bytes(task.total_bytes()),
        task.delete_count(),
        plural(task.delete_count())
    ));
    if let Some(latest) = task.latest_modified {
        out.line(&format!("  latest remote change: {}", latest.to_rfc3339()));
    }
    if with_items {
        for item in &task.items {
            out.line(&format!("    {item}"));
        }
    }
}
