// File watcher for incremental updates

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::file_tree::relative_path;
use super::{Pipeline, RunSummary};
use crate::config::Config;

/// Quiet period collecting a burst of events into one run
const DEBOUNCE: Duration = Duration::from_millis(300);

/// Re-runs the incremental pipeline whenever a tracked file changes.
///
/// Unchanged files are skipped by their content hash, and files that
/// disappeared are pruned by the file tree pass, so a full run after each
/// burst of events is all the watcher needs.
pub struct FileWatcher {
    config: Arc<Config>,
    watch_path: PathBuf,
    extensions: HashSet<String>,
}

impl FileWatcher {
    pub fn new(pipeline: &Pipeline) -> Self {
        let config = pipeline.config().clone();
        let extensions = pipeline
            .extensions()
            .into_iter()
            .map(str::to_string)
            .chain(config.indexing.extensions.iter().map(|e| e.trim_start_matches('.').to_string()))
            .collect();

        Self {
            config,
            watch_path: pipeline.root().to_path_buf(),
            extensions,
        }
    }

    /// Watch until Ctrl+C, re-running `pipeline` after each change burst.
    ///
    /// Ctrl+C during a re-run cancels it through the pipeline's token and
    /// ends the watch once the run returns.
    pub async fn watch(&self, pipeline: Pipeline) -> Result<()> {
        info!("Starting file watcher for: {}", self.watch_path.display());

        let (tx, rx) = mpsc::channel(100);

        // notify calls back on its own thread, outside the runtime
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Err(e) = tx.blocking_send(event) {
                        error!("Failed to send file event: {}", e);
                    }
                }
                Err(e) => error!("File watch error: {}", e),
            },
            NotifyConfig::default(),
        )?;

        watcher
            .watch(&self.watch_path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", self.watch_path.display()))?;

        info!("File watcher started. Monitoring for changes...");

        let cancel = pipeline.cancel_token();
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });

        let result = self.drive(pipeline, rx, tokio::signal::ctrl_c()).await;
        listener.abort();
        result
    }

    /// Event loop: runs until `stop` resolves, the channel closes, or the
    /// pipeline's token is cancelled.
    async fn drive<S: Future>(
        &self,
        mut pipeline: Pipeline,
        mut rx: mpsc::Receiver<Event>,
        stop: S,
    ) -> Result<()> {
        tokio::pin!(stop);

        while !pipeline.cancel_token().is_cancelled() {
            let event = tokio::select! {
                event = rx.recv() => event,
                _ = &mut stop => {
                    info!("Stopping file watcher");
                    pipeline.cancel_token().cancel();
                    break;
                }
            };
            let Some(event) = event else {
                break;
            };
            if !self.is_relevant(&event) {
                continue;
            }

            debug!("File event: {:?}", event);
            tokio::time::sleep(DEBOUNCE).await;
            while rx.try_recv().is_ok() {}

            let (returned, summary) = run_blocking(pipeline).await?;
            pipeline = returned;
            match summary {
                Ok(summary) if summary.cancelled => info!("Re-index cancelled, stopping file watcher"),
                Ok(summary) => info!(
                    "Re-indexed: {} files processed, {} unchanged, {} failed",
                    summary.files_processed, summary.files_unchanged, summary.files_failed
                ),
                Err(e) => error!("Re-index failed: {:#}", e),
            }
        }

        Ok(())
    }

    fn is_relevant(&self, event: &Event) -> bool {
        matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) && event.paths.iter().any(|path| self.is_tracked(path))
    }

    /// Whether a path would be part of the file tree. Removed paths no
    /// longer exist, so only the name is checked.
    fn is_tracked(&self, path: &Path) -> bool {
        let Some(rel) = relative_path(&self.watch_path, path) else {
            return false;
        };
        let known_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(e));

        known_extension && self.config.should_index_file(&rel)
    }
}

/// Run the pipeline on the blocking pool, handing it back with the result.
pub async fn run_blocking(mut pipeline: Pipeline) -> Result<(Pipeline, Result<RunSummary>)> {
    let joined = tokio::task::spawn_blocking(move || {
        let summary = pipeline.run();
        (pipeline, summary)
    })
    .await
    .context("Indexing task panicked")?;
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use tempfile::tempdir;

    fn pipeline_for(root: &Path) -> Pipeline {
        let mut config = Config::default();
        config.project.root = root.to_string_lossy().to_string();
        config.indexing.extensions = vec![".twig".to_string()];
        Pipeline::from_config(Arc::new(config)).unwrap()
    }

    fn watcher_for(root: &Path) -> FileWatcher {
        FileWatcher::new(&pipeline_for(root))
    }

    fn event(kind: EventKind, path: PathBuf) -> Event {
        Event::new(kind).add_path(path)
    }

    #[test]
    fn test_relevant_events() {
        let dir = tempdir().unwrap();
        let watcher = watcher_for(dir.path());
        let root = dir.path();

        assert!(watcher.is_relevant(&event(EventKind::Create(CreateKind::File), root.join("src/A.php"))));
        assert!(watcher.is_relevant(&event(EventKind::Modify(ModifyKind::Any), root.join("web/app.js"))));
        assert!(watcher.is_relevant(&event(EventKind::Remove(RemoveKind::File), root.join("views/a.twig"))));
    }

    #[test]
    fn test_irrelevant_events() {
        let dir = tempdir().unwrap();
        let watcher = watcher_for(dir.path());
        let root = dir.path();

        // The store's own files
        assert!(!watcher.is_relevant(&event(EventKind::Modify(ModifyKind::Any), root.join(".symgraph.db-wal"))));
        assert!(!watcher.is_relevant(&event(EventKind::Modify(ModifyKind::Any), root.join("vendor/lib/X.php"))));
        assert!(!watcher.is_relevant(&event(EventKind::Modify(ModifyKind::Any), root.join("README.md"))));
        assert!(!watcher.is_relevant(&event(EventKind::Access(notify::event::AccessKind::Any), root.join("src/A.php"))));
        assert!(!watcher.is_relevant(&event(EventKind::Create(CreateKind::File), PathBuf::from("/elsewhere/B.php"))));
    }

    #[tokio::test]
    async fn test_cancelled_pipeline_ends_the_watch() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_for(dir.path());
        let watcher = FileWatcher::new(&pipeline);
        pipeline.cancel_token().cancel();

        let (tx, rx) = mpsc::channel(8);
        tx.send(event(EventKind::Create(CreateKind::File), dir.path().join("a.php")))
            .await
            .unwrap();

        // The sender stays open and stop never fires: only the token ends the loop
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            watcher.drive(pipeline, rx, std::future::pending::<()>()),
        )
        .await;
        assert!(outcome.is_ok());
        assert!(outcome.unwrap().is_ok());
        drop(tx);
    }

    #[tokio::test]
    async fn test_stop_cancels_and_returns() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_for(dir.path());
        let watcher = FileWatcher::new(&pipeline);
        let token = pipeline.cancel_token();

        let (_tx, rx) = mpsc::channel::<Event>(8);
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            watcher.drive(pipeline, rx, std::future::ready(())),
        )
        .await;

        assert!(outcome.unwrap().is_ok());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_change_is_indexed_before_stop() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_for(dir.path());
        let store = pipeline.store().clone();
        let watcher = FileWatcher::new(&pipeline);
        std::fs::write(dir.path().join("a.php"), "<?php\nclass Alpha {}\n").unwrap();

        let (tx, rx) = mpsc::channel(8);
        tx.send(event(EventKind::Create(CreateKind::File), dir.path().join("a.php")))
            .await
            .unwrap();

        let stop = tokio::time::sleep(Duration::from_secs(3));
        watcher.drive(pipeline, rx, stop).await.unwrap();

        let names: Vec<String> = store.get_in_file("a.php").unwrap().into_iter().map(|s| s.name).collect();
        assert!(names.contains(&"Alpha".to_string()));
    }
}
