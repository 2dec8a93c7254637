//! Apply command - Bring local directories in line with their sources
//!
//! Provides the `treemirror apply` CLI command which:
//! 1. Builds the same plan as `check`
//! 2. Executes every item of every active task in order, with progress
//! 3. Stops cleanly on Ctrl-C; an interrupted download leaves no partial file

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use treemirror_core::ports::ProgressFn;
use treemirror_sync::UpdateItem;

use super::{build_plan, error_json, load_config};
use crate::commands::check::print_plan;
use crate::output::{plural, OutputFormat, Printer};

#[derive(Debug, Args)]
pub struct ApplyCommand {
    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,
}

/// Counters for one apply run
#[derive(Debug, Default)]
struct ApplyTotals {
    downloaded: usize,
    deleted: usize,
    bytes: u64,
    failures: Vec<(String, String)>,
}

impl ApplyTotals {
    fn record(&mut self, item: &UpdateItem) {
        if item.is_download() {
            self.downloaded += 1;
            self.bytes += item.size().unwrap_or(0);
        } else {
            self.deleted += 1;
        }
    }
}

impl ApplyCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let out = Printer::new(format);
        let config = load_config(config_path)?;

        if config.sources.is_empty() {
            out.warn(&format!(
                "No sources configured in {}",
                config_path.display()
            ));
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let signal_token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                signal_token.cancel();
            }
        });

        let plan = build_plan(&config, &cancel).await?;

        if self.dry_run {
            if format.is_json() {
                out.json(&super::check::plan_json(&plan, true));
            } else {
                out.line("Dry run mode - no changes will be made");
                print_plan(&out, &plan, true);
            }
            return Ok(());
        }

        let started = Instant::now();
        let mut totals = ApplyTotals::default();

        for planned in plan.active() {
            let task = &planned.task;
            if task.is_empty() {
                continue;
            }
            out.line(&format!(
                "{} ({} item{})",
                task.name,
                task.items.len(),
                plural(task.items.len())
            ));

            for (index, item) in task.items.iter().enumerate() {
                out.line(&format!("  [{}/{}] {item}", index + 1, task.items.len()));
                match item.update(Some(progress_logger(item)), &cancel).await {
                    Ok(()) => totals.record(item),
                    Err(e) if e.is_cancelled() => {
                        out.error("Cancelled");
                        bail!("cancelled");
                    }
                    Err(e) => {
                        out.error(&format!("{item}: {e}"));
                        totals
                            .failures
                            .push((item.target_path().display().to_string(), e.to_string()));
                    }
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            downloaded = totals.downloaded,
            deleted = totals.deleted,
            failed = totals.failures.len(),
            elapsed_ms,
            "Apply finished"
        );

        if format.is_json() {
            out.json(&serde_json::json!({
                "files_downloaded": totals.downloaded,
                "files_deleted": totals.deleted,
                "bytes_downloaded": totals.bytes,
                "failures": totals.failures.iter().map(|(path, error)| {
                    serde_json::json!({"path": path, "error": error})
                }).collect::<Vec<_>>(),
                "errors": plan.errors.iter().map(error_json).collect::<Vec<_>>(),
                "duration_ms": elapsed_ms,
            }));
        } else {
            let total = totals.downloaded + totals.deleted;
            if total == 0 && totals.failures.is_empty() {
                out.success("Already up to date");
            } else {
                out.success(&format!("Applied {total} update{}", plural(total)));
            }
            if totals.downloaded > 0 {
                out.line(&format!(
                    "Downloaded: {} file{}",
                    totals.downloaded,
                    plural(totals.downloaded)
                ));
            }
            if totals.deleted > 0 {
                out.line(&format!(
                    "Deleted:    {} entr{}",
                    totals.deleted,
                    if totals.deleted == 1 { "y" } else { "ies" }
                ));
            }
            for err in &plan.errors {
                out.warn(&format!("{}: {}", err.source, err.error));
            }
            if !totals.failures.is_empty() {
                out.error(&format!(
                    "{} item{} failed",
                    totals.failures.len(),
                    plural(totals.failures.len())
                ));
            }
        }

        if !totals.failures.is_empty() {
            bail!("{} update item(s) failed", totals.failures.len());
        }
        Ok(())
    }
}

/// Logs transfer progress at debug level, once per started tenth
fn progress_logger(item: &UpdateItem) -> ProgressFn {
    let path = item.target_path().display().to_string();
    let last_decile = std::sync::atomic::AtomicU64::new(u64::MAX);
    Arc::new(move |done, total| {
        let decile = if total == 0 { 10 } else { done * 10 / total };
        if last_decile.swap(decile, std::sync::atomic::Ordering::Relaxed) != decile {
            debug!(path = %path, done, total, "Transfer progress");
        }
    })
}
