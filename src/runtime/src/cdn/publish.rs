//! Directory and shared-module publication over a bounded upload pool.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures::TryStreamExt;
use mfe_bundle_core::config::DEFAULT_UPLOAD_CONCURRENCY;
use mfe_bundle_core::error::{BundleError, Result};
use mfe_bundle_core::event::events;
use mfe_bundle_core::{EventEmitter, PipelineEvent};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::object::join_remote;
use super::CdnUploader;
use crate::module::SharedModule;

/// Publish tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// Maximum uploads in flight
    pub concurrency: usize,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }
}

/// One file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub local_path: PathBuf,
    pub remote_path: String,
}

/// Upload every regular file under `source` to `remote_base/{relative}`.
///
/// Links are not followed and directories are never uploaded. The first
/// failure stops the publish; uploads still in flight are dropped and queued
/// ones never start. Returns the tasks in walk order.
pub async fn publish_directory(
    uploader: &dyn CdnUploader,
    source: &Path,
    remote_base: &str,
    options: &PublishOptions,
    emitter: &EventEmitter,
    cancel: &CancellationToken,
) -> Result<Vec<UploadTask>> {
    let tasks = collect_tasks(source, remote_base)?;

    tracing::info!(
        source = %source.display(),
        remote_base,
        target_store = %uploader.target(),
        files = tasks.len(),
        concurrency = options.concurrency,
        "Publishing directory"
    );

    run_uploads(uploader, &tasks, options, emitter, cancel).await?;

    tracing::info!(
        source = %source.display(),
        files = tasks.len(),
        "Directory published"
    );
    Ok(tasks)
}

/// Upload each module's entry file to `vendor/{name}@{version}/{entry}`.
///
/// `root` is the directory the modules were analyzed from. Repeated modules
/// are uploaded once.
pub async fn publish_shared_modules(
    uploader: &dyn CdnUploader,
    root: &Path,
    modules: &[SharedModule],
    options: &PublishOptions,
    emitter: &EventEmitter,
    cancel: &CancellationToken,
) -> Result<Vec<UploadTask>> {
    let mut seen = HashSet::new();
    let tasks: Vec<UploadTask> = modules
        .iter()
        .filter(|m| seen.insert(m.vendor_path()))
        .map(|m| UploadTask {
            local_path: root.join(&m.source),
            remote_path: m.vendor_path(),
        })
        .collect();

    tracing::info!(
        modules = modules.len(),
        uploads = tasks.len(),
        target_store = %uploader.target(),
        "Publishing shared modules"
    );

    run_uploads(uploader, &tasks, options, emitter, cancel).await?;
    Ok(tasks)
}

/// Walk `source` depth-first in name order, collecting regular files.
fn collect_tasks(source: &Path, remote_base: &str) -> Result<Vec<UploadTask>> {
    let mut tasks = Vec::new();

    for entry in WalkDir::new(source)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            match e.into_io_error() {
                Some(io) => BundleError::io("Walk publish source", &path, io),
                None => BundleError::Other(format!("Filesystem loop under {}", path.display())),
            }
        })?;

        if !entry.file_type().is_file() {
            if entry.file_type().is_symlink() {
                tracing::debug!(path = %entry.path().display(), "Not publishing symlink");
            }
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| BundleError::Other(format!("{} escaped publish root", entry.path().display())))?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        tasks.push(UploadTask {
            local_path: entry.path().to_path_buf(),
            remote_path: join_remote(remote_base, &relative),
        });
    }

    Ok(tasks)
}

/// Run `tasks` on a pool of `options.concurrency` uploads.
async fn run_uploads(
    uploader: &dyn CdnUploader,
    tasks: &[UploadTask],
    options: &PublishOptions,
    emitter: &EventEmitter,
    cancel: &CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(BundleError::Cancelled("publish".to_string()));
    }

    let limit = options.concurrency.max(1);
    let uploads = futures::stream::iter(tasks.iter().map(Ok::<_, BundleError>))
        .try_for_each_concurrent(limit, |task| async move {
            let local = task.local_path.to_string_lossy();
            emitter.emit(PipelineEvent::upload(events::UPLOAD_STARTED, &local, &task.remote_path));

            match uploader.upload(&task.local_path, &task.remote_path).await {
                Ok(()) => {
                    tracing::debug!(local = %local, remote = %task.remote_path, "Uploaded");
                    emitter.emit(PipelineEvent::upload(
                        events::UPLOAD_COMPLETED,
                        &local,
                        &task.remote_path,
                    ));
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(
                        local = %local,
                        remote = %task.remote_path,
                        error = %e,
                        "Upload failed"
                    );
                    emitter.emit(PipelineEvent::upload(
                        events::UPLOAD_FAILED,
                        &local,
                        &task.remote_path,
                    ));
                    Err(e)
                }
            }
        });

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::warn!(pending = tasks.len(), "Publish cancelled");
            Err(BundleError::Cancelled("publish".to_string()))
        }
        result = uploads => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Records uploads into a map of remote path to bytes.
    #[derive(Default)]
    struct RecordingUploader {
        objects: Mutex<BTreeMap<String, Vec<u8>>>,
        fail_on: Option<String>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        attempts: AtomicUsize,
    }

    impl RecordingUploader {
        fn objects(&self) -> BTreeMap<String, Vec<u8>> {
            self.objects.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CdnUploader for RecordingUploader {
        async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.as_deref() == Some(remote_path) {
                return Err(BundleError::UploadError {
                    path: remote_path.to_string(),
                    message: "simulated failure".to_string(),
                });
            }

            let data = std::fs::read(local_path)
                .map_err(|e| BundleError::io("Read upload source", local_path, e))?;
            self.objects
                .lock()
                .unwrap()
                .insert(remote_path.to_string(), data);
            Ok(())
        }

        fn target(&self) -> String {
            "memory://test".to_string()
        }
    }

    fn bundle_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("js/chunks")).unwrap();
        std::fs::create_dir_all(tmp.path().join("empty")).unwrap();
        std::fs::write(tmp.path().join("index.html"), b"<html></html>").unwrap();
        std::fs::write(tmp.path().join("js/app.js"), b"app").unwrap();
        std::fs::write(tmp.path().join("js/chunks/1.js"), b"chunk").unwrap();
        tmp
    }

    #[tokio::test]
    async fn test_publish_directory_uploads_regular_files() {
        let dir = bundle_dir();
        let uploader = RecordingUploader::default();

        let tasks = publish_directory(
            &uploader,
            dir.path(),
            "/apps/shell/",
            &PublishOptions::default(),
            &EventEmitter::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(tasks.len(), 3);
        let objects = uploader.objects();
        let keys: Vec<&str> = objects.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "apps/shell/index.html",
                "apps/shell/js/app.js",
                "apps/shell/js/chunks/1.js"
            ]
        );
        assert_eq!(objects["apps/shell/js/app.js"], b"app");
    }

    #[tokio::test]
    async fn test_republish_is_idempotent() {
        let dir = bundle_dir();
        let uploader = RecordingUploader::default();
        let emitter = EventEmitter::default();

        for _ in 0..2 {
            publish_directory(
                &uploader,
                dir.path(),
                "apps/shell",
                &PublishOptions::default(),
                &emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        }
        let after_two = uploader.objects();

        publish_directory(
            &uploader,
            dir.path(),
            "apps/shell",
            &PublishOptions::default(),
            &emitter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(after_two.len(), 3);
        assert_eq!(uploader.objects(), after_two);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_skips_symlinks() {
        let dir = bundle_dir();
        std::os::unix::fs::symlink("/etc/passwd", dir.path().join("passwd")).unwrap();
        let uploader = RecordingUploader::default();

        publish_directory(
            &uploader,
            dir.path(),
            "apps",
            &PublishOptions::default(),
            &EventEmitter::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!uploader.objects().contains_key("apps/passwd"));
        assert_eq!(uploader.objects().len(), 3);
    }

    #[tokio::test]
    async fn test_publish_stops_at_first_error() {
        let tmp = TempDir::new().unwrap();
        for i in 0..20 {
            std::fs::write(tmp.path().join(format!("f{:02}.js", i)), b"x").unwrap();
        }
        let uploader = RecordingUploader {
            fail_on: Some("cdn/f00.js".to_string()),
            ..Default::default()
        };

        let err = publish_directory(
            &uploader,
            tmp.path(),
            "cdn",
            &PublishOptions { concurrency: 1 },
            &EventEmitter::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BundleError::UploadError { ref path, .. } if path == "cdn/f00.js"));
        assert_eq!(uploader.attempts.load(Ordering::SeqCst), 1);
        assert!(uploader.objects().is_empty());
    }

    #[tokio::test]
    async fn test_publish_respects_concurrency_limit() {
        let tmp = TempDir::new().unwrap();
        for i in 0..12 {
            std::fs::write(tmp.path().join(format!("f{}.js", i)), b"x").unwrap();
        }
        let uploader = RecordingUploader {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        };

        publish_directory(
            &uploader,
            tmp.path(),
            "cdn",
            &PublishOptions { concurrency: 3 },
            &EventEmitter::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(uploader.objects().len(), 12);
        let max = uploader.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "max in flight was {}", max);
        assert!(max >= 2, "uploads never overlapped");
    }

    #[tokio::test]
    async fn test_publish_cancellation() {
        let dir = bundle_dir();
        let uploader = RecordingUploader {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = publish_directory(
            &uploader,
            dir.path(),
            "apps",
            &PublishOptions::default(),
            &EventEmitter::default(),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BundleError::Cancelled(_)));
        assert!(uploader.objects().is_empty());
    }

    #[tokio::test]
    async fn test_publish_emits_events() {
        let dir = bundle_dir();
        let uploader = RecordingUploader::default();
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();

        publish_directory(
            &uploader,
            dir.path(),
            "apps",
            &PublishOptions { concurrency: 1 },
            &emitter,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let mut started = 0;
        let mut completed = 0;
        while let Ok(event) = rx.try_recv() {
            match event.key.as_str() {
                events::UPLOAD_STARTED => started += 1,
                events::UPLOAD_COMPLETED => completed += 1,
                _ => {}
            }
        }
        assert_eq!(started, 3);
        assert_eq!(completed, 3);
    }

    #[tokio::test]
    async fn test_publish_shared_modules_vendor_paths() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("js")).unwrap();
        std::fs::write(tmp.path().join("js/remoteEntry.js"), b"entry").unwrap();

        let mut react = SharedModule::new("react", "18.2.0", "remoteEntry.js");
        react.source = PathBuf::from("js/remoteEntry.js");
        let mut lodash = SharedModule::new("lodash", "4.17.21", "remoteEntry.js");
        lodash.source = PathBuf::from("js/remoteEntry.js");
        let modules = vec![react.clone(), lodash, react];

        let uploader = RecordingUploader::default();
        let tasks = publish_shared_modules(
            &uploader,
            tmp.path(),
            &modules,
            &PublishOptions::default(),
            &EventEmitter::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(tasks.len(), 2);
        let objects = uploader.objects();
        assert_eq!(objects["vendor/react@18.2.0/remoteEntry.js"], b"entry");
        assert_eq!(objects["vendor/lodash@4.17.21/remoteEntry.js"], b"entry");
    }

    #[tokio::test]
    async fn test_publish_shared_modules_missing_source() {
        let tmp = TempDir::new().unwrap();
        let modules = vec![SharedModule::new("react", "18.2.0", "remoteEntry.js")];

        let err = publish_shared_modules(
            &RecordingUploader::default(),
            tmp.path(),
            &modules,
            &PublishOptions::default(),
            &EventEmitter::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BundleError::Io { .. }));
    }
}
