//! CLI commands
//!
//! `check` and `apply` share [`build_plan`], which runs the update engine for
//! every configured source and settles overlapping rules by priority.

pub mod apply;
pub mod check;
pub mod config;

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use treemirror_core::config::Config;
use treemirror_core::domain::UpdateError;
use treemirror_remote::build_source;
use treemirror_sync::{UpdateEngine, UpdateTask};

/// Loads the configuration file, falling back to defaults when it does not exist
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!(config_path = %path.display(), "No configuration file, using defaults");
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

/// A task together with where it came from
#[derive(Debug)]
pub struct PlannedTask {
    pub source: String,
    pub task: UpdateTask,
    /// Endpoint of the higher-priority source targeting the same directory
    pub superseded_by: Option<String>,
}

/// A source or rule that could not be planned
#[derive(Debug)]
pub struct PlanError {
    pub source: String,
    pub error: UpdateError,
}

/// Tasks of every configured source
#[derive(Debug, Default)]
pub struct Plan {
    pub tasks: Vec<PlannedTask>,
    pub errors: Vec<PlanError>,
}

impl Plan {
    /// Tasks that will be applied
    pub fn active(&self) -> impl Iterator<Item = &PlannedTask> {
        self.tasks.iter().filter(|t| t.superseded_by.is_none())
    }
}

/// Runs the engine for every source in order.
///
/// Source and rule failures are collected in [`Plan::errors`]; cancellation
/// aborts the whole plan.
pub async fn build_plan(config: &Config, cancel: &CancellationToken) -> Result<Plan> {
    let retry = config.retry.policy();
    let mut plan = Plan::default();

    for source_config in &config.sources {
        let endpoint = source_config.endpoint.clone();
        let source = match build_source(source_config, retry) {
            Ok(source) => source,
            Err(error) => {
                warn!(endpoint = %endpoint, error = %error, "Invalid source");
                plan.errors.push(PlanError { source: endpoint, error });
                continue;
            }
        };

        match UpdateEngine::new(source).get_update_items(cancel).await {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(task) => plan.tasks.push(PlannedTask {
                            source: endpoint.clone(),
                            task,
                            superseded_by: None,
                        }),
                        Err(error) => plan.errors.push(PlanError {
                            source: endpoint.clone(),
                            error,
                        }),
                    }
                }
            }
            Err(e) if e.is_cancelled() => bail!("cancelled"),
            Err(error) => {
                warn!(endpoint = %endpoint, error = %error, "Source failed");
                plan.errors.push(PlanError { source: endpoint, error });
            }
        }
    }

    resolve_overlaps(&mut plan.tasks);
    Ok(plan)
}

/// Marks tasks whose client path is also targeted by a task of higher
/// priority. On equal priority the earlier task wins.
pub fn resolve_overlaps(tasks: &mut [PlannedTask]) {
    for i in 0..tasks.len() {
        let winner = tasks.iter().enumerate().find(|(j, other)| {
            *j != i
                && other.task.rule.client_path == tasks[i].task.rule.client_path
                && (other.task.priority > tasks[i].task.priority
                    || (other.task.priority == tasks[i].task.priority && *j < i))
        });
        if let Some((_, other)) = winner {
            let by = other.source.clone();
            info!(
                rule = %tasks[i].task.name,
                client_path = %tasks[i].task.rule.client_path.display(),
                superseded_by = %by,
                "Rule superseded by higher-priority source"
            );
            tasks[i].superseded_by = Some(by);
        }
    }
}

/// JSON form of one planned task
pub fn task_json(planned: &PlannedTask, with_items: bool) -> serde_json::Value {
    let task = &planned.task;
    let mut value = serde_json::json!({
        "source": planned.source,
        "name": task.name,
        "server_path": task.rule.server_path,
        "client_path": task.rule.client_path.display().to_string(),
        "priority": task.priority,
        "downloads": task.download_count(),
        "deletes": task.delete_count(),
        "bytes": task.total_bytes(),
        "latest_modified": task.latest_modified.map(|t| t.to_rfc3339()),
        "superseded_by": planned.superseded_by,
    });
    if with_items {
        value["items"] = task
            .items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "action": if item.is_download() { "download" } else { "delete" },
                    "path": item.target_path().display().to_string(),
                    "size": item.size(),
                })
            })
            .collect();
    }
    value
}

/// JSON form of one plan error
pub fn error_json(error: &PlanError) -> serde_json::Value {
    serde_json::json!({
        "source": error.source,
        "kind": format!("{:?}", error.error.kind()),
        "error": error.error.to_string(),
    })
}
