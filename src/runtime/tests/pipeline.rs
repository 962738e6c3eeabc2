//! End-to-end pipeline scenarios.
//!
//! The registry is replaced by a fetcher serving a tarball from disk and the
//! CDN by an uploader recording objects in memory.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mfe_bundle_core::event::events;
use mfe_bundle_core::{BundleError, ModulePolicy, PipelineConfig, Result};
use mfe_bundle_runtime::{
    read_manifest, ArtifactFetcher, BundleArtifact, CdnUploader, Pipeline, PipelineRequest,
    ResolvedLocation, SharedModule,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const REMOTE_ENTRY: &str =
    r#"var moduleMap = {}; var shared = {"react@18.2.0": () => load("react")};"#;

struct LocalTarballFetcher {
    source: PathBuf,
}

#[async_trait]
impl ArtifactFetcher for LocalTarballFetcher {
    async fn fetch(
        &self,
        reference: &str,
        location: &ResolvedLocation,
        cancel: &CancellationToken,
    ) -> Result<BundleArtifact> {
        if cancel.is_cancelled() {
            return Err(BundleError::Cancelled(format!("fetch {}", reference)));
        }
        let tarball = location.tarball_path();
        tokio::fs::copy(&self.source, &tarball)
            .await
            .map_err(|e| BundleError::io("Copy tarball", &tarball, e))?;
        Ok(BundleArtifact {
            reference: reference.to_string(),
            tarball,
        })
    }
}

#[derive(Default)]
struct MemoryUploader {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryUploader {
    fn objects(&self) -> BTreeMap<String, Vec<u8>> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl CdnUploader for MemoryUploader {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| BundleError::io("Read upload source", local_path, e))?;
        self.objects
            .lock()
            .unwrap()
            .insert(remote_path.to_string(), data);
        Ok(())
    }

    fn target(&self) -> String {
        "memory://cdn".to_string()
    }
}

fn create_bundle(path: &Path, files: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
        file,
        flate2::Compression::default(),
    ));
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn setup(files: &[(&str, &[u8])]) -> (TempDir, Pipeline, Arc<MemoryUploader>) {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("checkout.tar.gz");
    create_bundle(&source, files);

    let config = PipelineConfig {
        work_dir: tmp.path().join("work"),
        upload_concurrency: 2,
        ..Default::default()
    };
    let uploader = Arc::new(MemoryUploader::default());
    let pipeline = Pipeline::new(
        config,
        Arc::new(LocalTarballFetcher { source }),
        uploader.clone(),
    );
    (tmp, pipeline, uploader)
}

fn checkout_request(tmp: &TempDir) -> PipelineRequest {
    PipelineRequest {
        name: "checkout".to_string(),
        artifact: "registry.local/team/checkout:1.4.0".to_string(),
        cdn_base_path: "apps/checkout/1.4.0".to_string(),
        entry_point: "index.html".to_string(),
        exposed_modules: vec!["./Cart".to_string()],
        manifest_path: Some(tmp.path().join("out").join("shared-modules.json")),
    }
}

#[tokio::test]
async fn test_publish_bundle_end_to_end() {
    let (tmp, pipeline, uploader) = setup(&[
        ("index.html", b"<html></html>"),
        ("js/app.js", b"console.log('app')"),
        ("js/remoteEntry.js", REMOTE_ENTRY.as_bytes()),
    ]);
    let request = checkout_request(&tmp);

    let outcome = pipeline.run(&request, &CancellationToken::new()).await;
    assert!(outcome.success, "{}", outcome.message);

    let objects = uploader.objects();
    let keys: Vec<&str> = objects.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec![
            "apps/checkout/1.4.0/index.html",
            "apps/checkout/1.4.0/js/app.js",
            "apps/checkout/1.4.0/js/remoteEntry.js",
            "vendor/react@18.2.0/remoteEntry.js",
        ]
    );
    assert_eq!(
        objects["vendor/react@18.2.0/remoteEntry.js"],
        REMOTE_ENTRY.as_bytes()
    );

    let manifest = read_manifest(request.manifest_path.as_ref().unwrap()).unwrap();
    assert_eq!(
        manifest,
        vec![SharedModule::new("react", "18.2.0", "remoteEntry.js")]
    );
}

#[tokio::test]
async fn test_report_contents() {
    let (tmp, pipeline, _uploader) = setup(&[
        ("index.html", b"<html></html>"),
        ("js/app.js", b"console.log('app')"),
        ("js/remoteEntry.js", REMOTE_ENTRY.as_bytes()),
    ]);

    let report = pipeline
        .execute(&checkout_request(&tmp), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.files_published, 3);
    assert_eq!(report.vendor_published, 1);
    assert_eq!(report.modules.len(), 1);
    assert_eq!(report.exposed_modules, vec!["./Cart"]);
    assert_eq!(report.cdn_target, "memory://cdn");
    assert!(report.tarball.is_none());
    assert!(!report.extract_root.exists());
}

#[tokio::test]
async fn test_default_manifest_location() {
    let (tmp, pipeline, _uploader) = setup(&[("index.html", b"<html></html>")]);
    let request = PipelineRequest {
        manifest_path: None,
        ..checkout_request(&tmp)
    };

    let report = pipeline
        .execute(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        report.manifest_path,
        tmp.path()
            .join("work/manifests/checkout")
            .join("shared-modules.json")
    );
    assert!(read_manifest(&report.manifest_path).unwrap().is_empty());
}

#[tokio::test]
async fn test_republish_is_idempotent() {
    let (tmp, pipeline, uploader) = setup(&[
        ("index.html", b"<html></html>"),
        ("js/remoteEntry.js", REMOTE_ENTRY.as_bytes()),
    ]);
    let request = checkout_request(&tmp);

    assert!(pipeline.run(&request, &CancellationToken::new()).await.success);
    let first = uploader.objects();
    assert!(pipeline.run(&request, &CancellationToken::new()).await.success);

    assert_eq!(uploader.objects(), first);
    for dir in ["work/artifacts", "work/bundles"] {
        let leftovers = std::fs::read_dir(tmp.path().join(dir)).unwrap().count();
        assert_eq!(leftovers, 0, "{} not cleaned", dir);
    }
}

#[tokio::test]
async fn test_deduplicated_policy_manifest() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("bundle.tar.gz");
    let entry = br#"{"react@18.2.0": 1, "react@18.2.0": 2, "lodash@4.17.21": 3}"#;
    create_bundle(&source, &[("remoteEntry.js", entry.as_slice())]);

    let config = PipelineConfig {
        work_dir: tmp.path().join("work"),
        module_policy: ModulePolicy::Deduplicated,
        ..Default::default()
    };
    let pipeline = Pipeline::new(
        config,
        Arc::new(LocalTarballFetcher { source }),
        Arc::new(MemoryUploader::default()),
    );

    let report = pipeline
        .execute(
            &PipelineRequest::new("dedup", "registry.local/dedup:1.0.0"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        read_manifest(&report.manifest_path).unwrap(),
        vec![
            SharedModule::new("react", "18.2.0", "remoteEntry.js"),
            SharedModule::new("lodash", "4.17.21", "remoteEntry.js"),
        ]
    );
}

#[tokio::test]
async fn test_traversal_bundle_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("evil.tar.gz");

    let file = File::create(&source).unwrap();
    let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
        file,
        flate2::Compression::default(),
    ));
    let name = b"../../escape.txt";
    let mut header = tar::Header::new_old();
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(5);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, &b"pwned"[..]).unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    let config = PipelineConfig {
        work_dir: tmp.path().join("work"),
        ..Default::default()
    };
    let uploader = Arc::new(MemoryUploader::default());
    let pipeline = Pipeline::new(
        config,
        Arc::new(LocalTarballFetcher { source }),
        uploader.clone(),
    );
    let mut rx = pipeline.events().subscribe();

    let outcome = pipeline
        .run(
            &PipelineRequest::new("evil", "registry.local/evil:1.0.0"),
            &CancellationToken::new(),
        )
        .await;

    assert!(!outcome.success);
    assert!(outcome.message.contains("escape.txt"));
    assert!(uploader.objects().is_empty());
    assert!(!tmp.path().join("work/escape.txt").exists());
    assert!(!tmp.path().join("escape.txt").exists());

    let mut keys = Vec::new();
    while let Ok(event) = rx.try_recv() {
        keys.push(event.key);
    }
    assert!(keys.iter().any(|k| k == events::PIPELINE_FAILED));
    assert!(!keys.iter().any(|k| k == events::UPLOAD_STARTED));
}

#[tokio::test]
async fn test_cancelled_before_fetch() {
    let (tmp, pipeline, uploader) = setup(&[("index.html", b"<html></html>")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline
        .execute(&checkout_request(&tmp), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, BundleError::Cancelled(_)));
    assert!(uploader.objects().is_empty());
}
