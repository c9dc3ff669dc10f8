//! Push command - copy local sources into a running pod

use console::style;
use std::path::{Path, PathBuf};
use stevedore_core::ExcludeRules;
use stevedore_kube::{FileSyncStreamer, KubeExec, SyncManifest};

use crate::error::Result;

/// Run the push command
#[allow(clippy::too_many_arguments)]
pub async fn run(
    namespace: &str,
    pod: &str,
    local_root: &Path,
    dest: &str,
    files: Vec<PathBuf>,
    extra_excludes: &[String],
    deleted: &[String],
    roots: &[String],
) -> Result<()> {
    let excludes = ExcludeRules::from_directory(local_root, extra_excludes)?;
    tracing::debug!(rules = excludes.len(), "exclusion rules loaded");

    let client = super::connect().await?;
    let streamer = FileSyncStreamer::new(KubeExec::new(client, namespace));

    if !deleted.is_empty() {
        let roots = if roots.is_empty() {
            vec![dest.to_string()]
        } else {
            roots.to_vec()
        };
        streamer.propagate_deletes(pod, deleted, &roots).await?;
        println!(
            "{} Removed {} path(s) under {} root(s)",
            style("✓").green(),
            deleted.len(),
            roots.len()
        );
        // deletions alone are a complete incremental push
        if files.is_empty() {
            return Ok(());
        }
    }

    let incremental = !files.is_empty();
    let manifest = SyncManifest::full(local_root, dest, excludes).with_changed(files);
    println!(
        "{} Pushing {} to {}:{}",
        style("→").blue().bold(),
        style(local_root.display()).cyan(),
        style(pod).cyan(),
        dest
    );

    let report = streamer.sync(pod, manifest).await?;
    println!(
        "{} Pushed {} file(s), {} dir(s), {} symlink(s){}",
        style("✓").green().bold(),
        report.files,
        report.directories,
        report.symlinks,
        if incremental {
            String::new()
        } else {
            format!(", {} excluded", report.skipped)
        }
    );

    Ok(())
}
