//! File synchronization into a running container
//!
//! A producer on a blocking thread walks the selected local files and writes
//! a tar stream into a [`pipe`](crate::pipe); concurrently the remote
//! extraction command consumes the read end as its stdin. Nothing buffers the
//! whole archive. A failure on either side closes the pipe, which fails the
//! other side instead of leaving it blocked.

use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use stevedore_core::ExcludeRules;
use stevedore_core::paths::{clean, join_remote, relative_slash, to_slash};
use tar::{EntryType, Header};
use walkdir::WalkDir;

use crate::error::{KubeError, Result};
use crate::pipe::{PipeWriter, pipe};
use crate::session::RemoteExec;

/// Remote extraction command; one leading component is stripped
pub fn extract_command(dest: &str) -> Vec<String> {
    ["tar", "xf", "-", "-C", dest, "--strip", "1"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// What one synchronization pass wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    pub skipped: usize,
}

/// Files selected for one synchronization pass
#[derive(Debug, Clone)]
pub struct SyncManifest {
    /// Local directory whose contents land in `dest`
    pub local_root: PathBuf,

    /// Remote destination directory
    pub dest: String,

    /// Paths to send; empty means the whole tree
    pub changed_paths: Vec<PathBuf>,

    pub excludes: ExcludeRules,
}

impl SyncManifest {
    /// Full-tree manifest
    pub fn full(local_root: impl Into<PathBuf>, dest: impl Into<String>, excludes: ExcludeRules) -> Self {
        Self {
            local_root: local_root.into(),
            dest: dest.into(),
            changed_paths: Vec::new(),
            excludes,
        }
    }

    /// Restrict the pass to `paths` (relative to the root, or absolute under it)
    pub fn with_changed(mut self, paths: Vec<PathBuf>) -> Self {
        self.changed_paths = paths;
        self
    }
}

/// Streams local files into pods and propagates deletions
pub struct FileSyncStreamer<E> {
    exec: E,
}

impl<E: RemoteExec> FileSyncStreamer<E> {
    pub fn new(exec: E) -> Self {
        Self { exec }
    }

    /// Copy the manifest's files into `pod`
    pub async fn sync(&self, pod: &str, manifest: SyncManifest) -> Result<SyncReport> {
        if manifest.dest.trim().is_empty() {
            return Err(KubeError::MalformedInput(
                "remote destination must not be blank".to_string(),
            ));
        }
        let root = fs::canonicalize(&manifest.local_root).map_err(|e| {
            KubeError::MalformedInput(format!(
                "cannot read local root {}: {}",
                manifest.local_root.display(),
                e
            ))
        })?;
        if !root.is_dir() {
            return Err(KubeError::MalformedInput(format!(
                "local root {} is not a directory",
                root.display()
            )));
        }
        let prefix = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                KubeError::MalformedInput(format!("local root {} has no name", root.display()))
            })?;
        let changed = resolve_changed(&root, &manifest.changed_paths)?;

        let command = extract_command(&manifest.dest);
        tracing::info!(
            pod,
            root = %root.display(),
            dest = %manifest.dest,
            incremental = !changed.is_empty(),
            "syncing files"
        );

        let (writer, reader) = pipe();
        let excludes = manifest.excludes;
        let producer = tokio::task::spawn_blocking(move || {
            produce(writer, &root, &prefix, &changed, &excludes)
        });
        let consumer = self.exec.exec(pod, &command, Some(Box::new(reader)));

        let (produced, consumed) = tokio::join!(producer, consumer);
        let produced = produced.map_err(|e| KubeError::Stream(format!("tar producer failed: {}", e)))?;

        match (produced, consumed) {
            (Ok(report), Ok(_)) => {
                tracing::debug!(?report, "sync finished");
                Ok(report)
            }
            (Err(e), Err(remote)) if e.kind() == io::ErrorKind::BrokenPipe => Err(remote),
            (Err(e), _) => Err(KubeError::Stream(format!("writing tar stream: {}", e))),
            (Ok(_), Err(remote)) => Err(remote),
        }
    }

    /// Remove `deleted` (relative paths) under every root with one remote command
    pub async fn propagate_deletes(&self, pod: &str, deleted: &[String], roots: &[String]) -> Result<()> {
        if deleted.is_empty() {
            return Err(KubeError::MalformedInput("no deleted paths given".to_string()));
        }
        if roots.is_empty() {
            return Err(KubeError::MalformedInput("no remote roots given".to_string()));
        }

        let mut command = vec!["rm".to_string(), "-rf".to_string()];
        for root in roots {
            for rel in deleted {
                let rel = clean(&to_slash(rel));
                if rel == "." || rel.starts_with('/') || rel.starts_with("..") {
                    return Err(KubeError::MalformedInput(format!(
                        "deleted path '{}' must be relative to the synchronized root",
                        rel
                    )));
                }
                command.push(join_remote(root, &rel));
            }
        }

        tracing::info!(pod, paths = command.len() - 2, "propagating deletes");
        self.exec.exec(pod, &command, None).await?;
        Ok(())
    }
}

/// Changed paths as absolute paths under `root`
fn resolve_changed(root: &Path, changed: &[PathBuf]) -> Result<Vec<PathBuf>> {
    changed
        .iter()
        .map(|p| {
            let absolute = if p.is_absolute() { p.clone() } else { root.join(p) };
            let escapes = p.components().any(|c| matches!(c, Component::ParentDir));
            if escapes || !absolute.starts_with(root) {
                return Err(KubeError::MalformedInput(format!(
                    "changed path {} is outside {}",
                    p.display(),
                    root.display()
                )));
            }
            Ok(absolute)
        })
        .collect()
}

/// Producer body: build the archive, then close the pipe cleanly or with the error
fn produce(
    mut writer: PipeWriter,
    root: &Path,
    prefix: &str,
    changed: &[PathBuf],
    excludes: &ExcludeRules,
) -> io::Result<SyncReport> {
    let outcome = {
        let mut archive = ArchiveWriter {
            builder: tar::Builder::new(&mut writer),
            root,
            prefix,
            excludes,
            report: SyncReport::default(),
        };
        archive.builder.follow_symlinks(false);
        let written = if changed.is_empty() {
            archive.append_tree(root, false)
        } else {
            archive.append_changed(changed)
        };
        written
            .and_then(|_| archive.builder.finish())
            .map(|_| archive.report)
    };

    match outcome {
        Ok(report) => Ok(report),
        Err(e) => {
            writer.close_with_error(io::Error::new(e.kind(), e.to_string()));
            Err(e)
        }
    }
}

struct ArchiveWriter<'a, W: io::Write> {
    builder: tar::Builder<W>,
    root: &'a Path,
    prefix: &'a str,
    excludes: &'a ExcludeRules,
    report: SyncReport,
}

impl<W: io::Write> ArchiveWriter<'_, W> {
    fn relative(&self, path: &Path) -> io::Result<String> {
        relative_slash(self.root, path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is outside {}", path.display(), self.root.display()),
            )
        })
    }

    /// Walk `dir`, writing every non-excluded entry; excluded directories are not entered
    fn append_tree(&mut self, dir: &Path, include_self: bool) -> io::Result<()> {
        let skipped = Cell::new(0);
        let walker = WalkDir::new(dir)
            .min_depth(if include_self { 0 } else { 1 })
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let rel = relative_slash(self.root, entry.path()).unwrap_or_default();
                let excluded = self.excludes.is_excluded(&rel, entry.path());
                if excluded {
                    skipped.set(skipped.get() + 1);
                }
                !excluded
            });

        let entries: Vec<PathBuf> = walker
            .map(|entry| entry.map(|e| e.into_path()).map_err(io::Error::from))
            .collect::<io::Result<_>>()?;
        self.report.skipped += skipped.get();

        for path in entries {
            self.append_entry(&path)?;
        }
        Ok(())
    }

    /// Write only the changed paths; directories are sent with their contents
    fn append_changed(&mut self, changed: &[PathBuf]) -> io::Result<()> {
        for path in changed {
            let Ok(meta) = fs::symlink_metadata(path) else {
                tracing::debug!(path = %path.display(), "changed path no longer exists, skipping");
                continue;
            };
            let rel = self.relative(path)?;
            if self.excludes.is_excluded(&rel, path) {
                self.report.skipped += 1;
                continue;
            }
            if meta.is_dir() {
                self.append_tree(path, true)?;
            } else {
                self.append_entry(path)?;
            }
        }
        Ok(())
    }

    fn append_entry(&mut self, path: &Path) -> io::Result<()> {
        let rel = self.relative(path)?;
        if rel.is_empty() {
            return Ok(());
        }
        let name = format!("{}/{}", self.prefix, rel);
        let meta = fs::symlink_metadata(path)?;
        let file_type = meta.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(path)?;
            let mut header = Header::new_gnu();
            header.set_metadata(&meta);
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            self.builder.append_link(&mut header, &name, &target)?;
            self.report.symlinks += 1;
            tracing::debug!(entry = %name, target = %target.display(), "wrote symlink");
        } else if file_type.is_dir() {
            // non-empty directories are implied by their entries, even when
            // every child was excluded
            if fs::read_dir(path)?.next().is_none() {
                self.builder.append_dir(&name, path)?;
                self.report.directories += 1;
                tracing::debug!(entry = %name, "wrote empty directory");
            }
        } else {
            self.builder.append_path_with_name(path, &name)?;
            self.report.files += 1;
            tracing::debug!(entry = %name, "wrote file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExec;
    use tempfile::TempDir;

    /// Entry names and types of a captured archive
    fn entries(bytes: &[u8]) -> Vec<(String, EntryType)> {
        let mut archive = tar::Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let path = e.path().unwrap().to_string_lossy().trim_end_matches('/').to_string();
                (path, e.header().entry_type())
            })
            .collect()
    }

    fn tree(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("app");
        fs::create_dir(&root).unwrap();
        for f in files {
            let path = root.join(f);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, f.as_bytes()).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_excluded_paths_never_reach_the_archive() {
        let dir = tree(&["build/out.bin", "src/main.go"]);
        let exec = MockExec::new();
        let streamer = FileSyncStreamer::new(exec.clone());

        let manifest = SyncManifest::full(
            dir.path().join("app"),
            "/opt/app-root/src",
            ExcludeRules::new(&["build/*"]).unwrap(),
        );
        let report = streamer.sync("web-1", manifest).await.unwrap();

        let calls = exec.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command, extract_command("/opt/app-root/src"));
        assert_eq!(
            entries(&calls[0].stdin),
            [("app/src/main.go".to_string(), EntryType::Regular)]
        );
        assert_eq!((report.files, report.directories), (1, 0));
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_excluded_directory_is_not_entered() {
        let dir = tree(&[".git/config", "main.go"]);
        let exec = MockExec::new();
        let streamer = FileSyncStreamer::new(exec.clone());

        let rules = ExcludeRules::from_directory(&dir.path().join("app"), &[] as &[&str]).unwrap();
        let manifest = SyncManifest::full(dir.path().join("app"), "/src", rules);
        streamer.sync("web-1", manifest).await.unwrap();

        let names: Vec<String> = entries(&exec.calls()[0].stdin).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["app/main.go"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_and_empty_directories() {
        let dir = tree(&["main.go"]);
        let root = dir.path().join("app");
        fs::create_dir(root.join("logs")).unwrap();
        std::os::unix::fs::symlink("main.go", root.join("current")).unwrap();

        let exec = MockExec::new();
        let streamer = FileSyncStreamer::new(exec.clone());
        let report = streamer
            .sync("web-1", SyncManifest::full(&root, "/src", ExcludeRules::default()))
            .await
            .unwrap();

        let found = entries(&exec.calls()[0].stdin);
        assert!(found.contains(&("app/current".to_string(), EntryType::Symlink)));
        assert!(found.contains(&("app/logs".to_string(), EntryType::Directory)));
        assert!(found.contains(&("app/main.go".to_string(), EntryType::Regular)));
        assert_eq!((report.files, report.directories, report.symlinks), (1, 1, 1));

        let calls = exec.calls();
        let mut archive = tar::Archive::new(calls[0].stdin.as_slice());
        let link = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap())
            .find(|e| e.header().entry_type() == EntryType::Symlink)
            .unwrap();
        assert_eq!(link.link_name().unwrap().unwrap().to_string_lossy(), "main.go");
    }

    #[tokio::test]
    async fn test_incremental_sync_skips_vanished_paths() {
        let dir = tree(&["a.txt", "b.txt", "lib/c.txt"]);
        let exec = MockExec::new();
        let streamer = FileSyncStreamer::new(exec.clone());

        let manifest = SyncManifest::full(dir.path().join("app"), "/src", ExcludeRules::default())
            .with_changed(vec!["b.txt".into(), "gone.txt".into(), "lib".into()]);
        streamer.sync("web-1", manifest).await.unwrap();

        let names: Vec<String> = entries(&exec.calls()[0].stdin).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["app/b.txt", "app/lib/c.txt"]);
    }

    #[tokio::test]
    async fn test_changed_path_outside_root_is_rejected() {
        let dir = tree(&["a.txt"]);
        let exec = MockExec::new();
        let streamer = FileSyncStreamer::new(exec.clone());

        let manifest = SyncManifest::full(dir.path().join("app"), "/src", ExcludeRules::default())
            .with_changed(vec!["../elsewhere.txt".into()]);
        let err = streamer.sync("web-1", manifest).await.unwrap_err();
        assert!(matches!(err, KubeError::MalformedInput(_)));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_unblocks_producer() {
        let files: Vec<String> = (0..200).map(|i| format!("f{:03}.txt", i)).collect();
        let refs: Vec<&str> = files.iter().map(String::as_str).collect();
        let dir = tree(&refs);

        let exec = MockExec::new();
        exec.fail_with("tar: cannot open: Permission denied");
        let streamer = FileSyncStreamer::new(exec.clone());

        let err = streamer
            .sync("web-1", SyncManifest::full(dir.path().join("app"), "/src", ExcludeRules::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Exec { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_failure_reaches_remote_side() {
        let dir = tree(&["a.txt"]);
        let root = dir.path().join("app");
        // sockets cannot be archived
        let _listener = std::os::unix::net::UnixListener::bind(root.join("sock")).unwrap();

        let exec = MockExec::new();
        let streamer = FileSyncStreamer::new(exec.clone());
        let err = streamer
            .sync("web-1", SyncManifest::full(&root, "/src", ExcludeRules::default()))
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::Stream(_)));
        assert!(err.to_string().contains("writing tar stream"));
        // the remote read failed, so no finished call was recorded
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deletes_are_batched() {
        let exec = MockExec::new();
        let streamer = FileSyncStreamer::new(exec.clone());

        streamer
            .propagate_deletes(
                "web-1",
                &["foo.txt".to_string()],
                &["/app/src".to_string(), "/app/bin".to_string()],
            )
            .await
            .unwrap();

        let calls = exec.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command, ["rm", "-rf", "/app/src/foo.txt", "/app/bin/foo.txt"]);
    }

    #[tokio::test]
    async fn test_empty_deletes_are_rejected() {
        let exec = MockExec::new();
        let streamer = FileSyncStreamer::new(exec.clone());

        assert!(streamer.propagate_deletes("p", &[], &["/app".to_string()]).await.is_err());
        assert!(streamer.propagate_deletes("p", &["a".to_string()], &[]).await.is_err());
        assert!(
            streamer
                .propagate_deletes("p", &["../etc".to_string()], &["/app".to_string()])
                .await
                .is_err()
        );
        assert!(exec.calls().is_empty());
    }
}
