//! Bundle pipeline orchestration.
//!
//! Sequences fetch, extract, analyze, bundle publish, vendor publish and the
//! manifest write for one artifact. Every stage shares the caller's
//! cancellation token; the first failing stage ends the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use mfe_bundle_core::error::{BundleError, Result};
use mfe_bundle_core::event::events;
use mfe_bundle_core::{EventEmitter, NamingStrategy, PipelineConfig, PipelineEvent};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cdn::{self, publish_directory, publish_shared_modules, CdnUploader, PublishOptions};
use crate::extract;
use crate::fs::{normalize_lexically, remove_dir_best_effort, remove_file_best_effort, run_blocking};
use crate::module::{self, SharedModule, MANIFEST_FILE};
use crate::naming::{self, ResolvedLocation};
use crate::oci::{ArtifactFetcher, RegistryFetcher};

/// Subdirectory of the work dir holding fetched artifacts.
pub const FETCH_DIR: &str = "artifacts";

/// Subdirectory of the work dir holding extracted bundles.
pub const EXTRACT_DIR: &str = "bundles";

/// Subdirectory of the work dir holding default manifests.
pub const MANIFEST_DIR: &str = "manifests";

const DEFAULT_MANIFEST_NAME: &str = "default";

/// What to publish.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineRequest {
    /// Logical name of the micro-frontend; feeds the `use-name` strategy
    pub name: String,
    /// OCI reference of the bundle artifact
    pub artifact: String,
    /// CDN prefix the bundle is published under
    pub cdn_base_path: String,
    /// File that must exist in the bundle, relative to its root
    pub entry_point: String,
    /// Module names the micro-frontend exposes
    pub exposed_modules: Vec<String>,
    /// Manifest destination; defaults to `{work_dir}/manifests/{name}`
    pub manifest_path: Option<PathBuf>,
}

impl PipelineRequest {
    pub fn new(name: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact: artifact.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.artifact.trim().is_empty() {
            return Err(BundleError::ConfigError(
                "artifact reference must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Details of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub name: String,
    pub reference: String,
    /// Removed when the run ends unless `keep_workdir` is set
    pub extract_root: PathBuf,
    pub files_published: usize,
    pub modules: Vec<SharedModule>,
    pub vendor_published: usize,
    pub skipped_entries: Vec<String>,
    pub exposed_modules: Vec<String>,
    pub manifest_path: PathBuf,
    /// Fetched tarball, present when `keep_tarball` is set
    pub tarball: Option<PathBuf>,
    pub cdn_target: String,
}

impl PipelineReport {
    /// One-line summary for the outcome message.
    pub fn summary(&self) -> String {
        format!(
            "Published {} files and {} shared modules from {} to {}",
            self.files_published, self.vendor_published, self.reference, self.cdn_target
        )
    }
}

/// Result handed back to the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub success: bool,
    pub message: String,
    pub completed_at: DateTime<Utc>,
}

impl PipelineOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            completed_at: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            completed_at: Utc::now(),
        }
    }
}

/// Runs the bundle pipeline against one fetcher and one CDN backend.
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn ArtifactFetcher>,
    uploader: Arc<dyn CdnUploader>,
    events: EventEmitter,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn ArtifactFetcher>,
        uploader: Arc<dyn CdnUploader>,
    ) -> Self {
        Self {
            config,
            fetcher,
            uploader,
            events: EventEmitter::default(),
        }
    }

    /// Build the registry fetcher and CDN uploader named by `config`.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(RegistryFetcher::from_config(&config.registry));
        let uploader = cdn::from_config(&config.cdn)?;
        Ok(Self::new(config, fetcher, uploader))
    }

    /// Use an existing event emitter.
    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage, returning a report or the first error.
    ///
    /// The fetch and extraction directories are removed when the run ends
    /// unless `keep_workdir` is set. With `keep_tarball`, a successful run
    /// keeps the fetched tarball and drops the rest of the fetch directory.
    pub async fn execute(
        &self,
        request: &PipelineRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport> {
        request.validate()?;
        let strategy = self.config.naming_strategy;

        tracing::info!(
            name = %request.name,
            artifact = %request.artifact,
            strategy = %strategy,
            "Pipeline started"
        );

        let fetch_location = naming::resolve(
            strategy,
            &self.config.work_dir.join(FETCH_DIR),
            &request.name,
            "fetch",
        )?;
        let extract_location = match self.extract_location(strategy, &request.name) {
            Ok(location) => location,
            Err(e) => {
                self.release_workdir(&fetch_location.directory, None);
                return Err(e);
            }
        };

        let result = self
            .run_stages(request, &fetch_location, &extract_location, cancel)
            .await;

        let kept_tarball = result.as_ref().ok().and_then(|r| r.tarball.as_deref());
        self.release_workdir(&extract_location.directory, None);
        self.release_workdir(&fetch_location.directory, kept_tarball);
        result
    }

    async fn run_stages(
        &self,
        request: &PipelineRequest,
        fetch_location: &ResolvedLocation,
        extract_location: &ResolvedLocation,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport> {
        let started = Instant::now();

        // Fetch
        self.events
            .emit(PipelineEvent::with_string(events::FETCH_STARTED, &request.artifact));
        let artifact = self
            .fetcher
            .fetch(&request.artifact, fetch_location, cancel)
            .await?;
        self.events.emit(PipelineEvent::with_string(
            events::FETCH_COMPLETED,
            artifact.tarball.display().to_string(),
        ));

        // Extract
        let bundle =
            match extract::extract(&artifact.tarball, &extract_location.directory, cancel).await {
                Ok(bundle) => bundle,
                Err(e) => {
                    remove_dir_best_effort(&extract_location.directory);
                    return Err(e);
                }
            };
        for skipped in &bundle.skipped {
            self.events.emit(PipelineEvent::with_string(
                events::EXTRACT_ENTRY_SKIPPED,
                &skipped.name,
            ));
        }
        self.events.emit(PipelineEvent::with_string(
            events::EXTRACT_COMPLETED,
            bundle.root.display().to_string(),
        ));
        let tarball = if self.config.keep_tarball {
            Some(artifact.tarball.clone())
        } else {
            remove_file_best_effort(&artifact.tarball);
            None
        };

        if !request.entry_point.is_empty() {
            check_entry_point(&bundle.files, &request.entry_point)?;
        }

        // Analyze
        let root = bundle.root.clone();
        let policy = self.config.module_policy;
        let modules = run_blocking(move || module::analyze_with_policy(&root, policy)).await?;
        self.events.emit(PipelineEvent::with_string(
            events::ANALYZE_COMPLETED,
            format!("{} shared modules", modules.len()),
        ));

        // Publish
        let options = PublishOptions {
            concurrency: self.config.upload_concurrency,
        };
        let bundle_uploads = publish_directory(
            self.uploader.as_ref(),
            &bundle.root,
            &request.cdn_base_path,
            &options,
            &self.events,
            cancel,
        )
        .await?;
        let vendor_uploads = publish_shared_modules(
            self.uploader.as_ref(),
            &bundle.root,
            &modules,
            &options,
            &self.events,
            cancel,
        )
        .await?;

        // Manifest
        let manifest_path = match &request.manifest_path {
            Some(path) => path.clone(),
            None => self.default_manifest_path(&request.name),
        };
        module::write_manifest(&manifest_path, &modules)?;

        let report = PipelineReport {
            name: request.name.clone(),
            reference: artifact.reference,
            extract_root: bundle.root,
            files_published: bundle_uploads.len(),
            modules,
            vendor_published: vendor_uploads.len(),
            skipped_entries: bundle.skipped.into_iter().map(|s| s.name).collect(),
            exposed_modules: request.exposed_modules.clone(),
            manifest_path,
            tarball,
            cdn_target: self.uploader.target(),
        };

        tracing::info!(
            name = %report.name,
            reference = %report.reference,
            files = report.files_published,
            shared_modules = report.vendor_published,
            exposed_modules = ?report.exposed_modules,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline completed"
        );

        Ok(report)
    }

    /// Run every stage and fold the result into a [`PipelineOutcome`].
    pub async fn run(&self, request: &PipelineRequest, cancel: &CancellationToken) -> PipelineOutcome {
        match self.execute(request, cancel).await {
            Ok(report) => {
                let message = report.summary();
                self.events
                    .emit(PipelineEvent::with_string(events::PIPELINE_COMPLETED, &message));
                PipelineOutcome::success(message)
            }
            Err(e) => {
                tracing::error!(
                    name = %request.name,
                    artifact = %request.artifact,
                    error = %e,
                    kind = ?e.kind(),
                    "Pipeline failed"
                );
                let message = e.to_string();
                self.events
                    .emit(PipelineEvent::with_string(events::PIPELINE_FAILED, &message));
                PipelineOutcome::failure(message)
            }
        }
    }

    /// Resolve the extraction directory. A name-derived directory is reused
    /// across runs, so its previous contents are cleared first.
    fn extract_location(&self, strategy: NamingStrategy, name: &str) -> Result<ResolvedLocation> {
        let base = self.config.work_dir.join(EXTRACT_DIR);
        let location = naming::resolve(strategy, &base, name, "extract")?;
        if strategy == NamingStrategy::UseName {
            remove_dir_best_effort(&location.directory);
            std::fs::create_dir_all(&location.directory)
                .map_err(|e| BundleError::io("Create extraction directory", &location.directory, e))?;
        }
        Ok(location)
    }

    /// `{work_dir}/manifests/{name}/shared-modules.json`, outside the
    /// per-run directories so it survives their cleanup.
    fn default_manifest_path(&self, name: &str) -> PathBuf {
        let sanitized = naming::sanitize_name(name);
        let directory = if sanitized.chars().all(|c| c == '_') {
            DEFAULT_MANIFEST_NAME.to_string()
        } else {
            sanitized
        };
        self.config
            .work_dir
            .join(MANIFEST_DIR)
            .join(directory)
            .join(MANIFEST_FILE)
    }

    /// Remove a per-run directory unless the work dir is kept. `keep` names
    /// one file inside `directory` that survives.
    fn release_workdir(&self, directory: &Path, keep: Option<&Path>) {
        if self.config.keep_workdir {
            return;
        }
        let Some(keep) = keep else {
            remove_dir_best_effort(directory);
            return;
        };

        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %directory.display(), error = %e, "Failed to list work directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path == keep {
                continue;
            }
            match entry.file_type() {
                Ok(t) if t.is_dir() => remove_dir_best_effort(&path),
                _ => remove_file_best_effort(&path),
            }
        }
    }
}

fn check_entry_point(files: &[PathBuf], entry_point: &str) -> Result<()> {
    let wanted = normalize_lexically(Path::new(entry_point.trim_start_matches('/')));
    if files.iter().any(|f| *f == wanted) {
        return Ok(());
    }
    Err(BundleError::ConfigError(format!(
        "entry point {} not found in bundle",
        entry_point
    )))
}
