//! Object-store plumbing shared by the CDN backends.

use std::path::Path;

use mfe_bundle_core::error::{BundleError, Result};
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, ObjectStore, PutMultipartOpts, PutOptions, PutPayload, WriteMultipart,
};
use tokio::io::AsyncReadExt;

/// Files larger than this are sent as a multipart upload.
pub const MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;

const READ_CHUNK_SIZE: usize = 1024 * 1024;
const MAX_INFLIGHT_PARTS: usize = 4;

/// Normalize a CDN path: backslashes become `/` and leading slashes are
/// dropped.
pub fn normalize_remote_path(remote: &str) -> String {
    remote.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Join a remote base and a relative path with exactly one `/`.
pub fn join_remote(base: &str, relative: &str) -> String {
    let base = normalize_remote_path(base);
    let base = base.trim_end_matches('/');
    let relative = normalize_remote_path(relative);
    if base.is_empty() {
        relative
    } else {
        format!("{}/{}", base, relative)
    }
}

/// Content type served for a file, derived from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") | Some("cjs") => "application/javascript",
        Some("css") => "text/css",
        Some("json") | Some("map") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Attributes carrying the content type of `local`.
pub(crate) fn content_attributes(local: &Path) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(Attribute::ContentType, content_type_for(local).into());
    attributes
}

/// Stream `local` to `remote` in `store`.
///
/// Dropping the returned future abandons the transfer; a multipart upload
/// that fails while reading the source is aborted.
pub(crate) async fn put_file(
    store: &dyn ObjectStore,
    local: &Path,
    remote: &str,
    attributes: Attributes,
) -> Result<()> {
    let remote = normalize_remote_path(remote);
    let location = ObjectPath::from(remote.as_str());

    let mut file = tokio::fs::File::open(local)
        .await
        .map_err(|e| BundleError::io("Open upload source", local, e))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| BundleError::io("Stat upload source", local, e))?
        .len();

    if size <= MULTIPART_THRESHOLD {
        let mut buf = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| BundleError::io("Read upload source", local, e))?;

        let opts = PutOptions {
            attributes,
            ..Default::default()
        };
        store
            .put_opts(&location, PutPayload::from(buf), opts)
            .await
            .map_err(|e| upload_error(&remote, e))?;
    } else {
        tracing::debug!(local = %local.display(), remote = %remote, size, "Multipart upload");

        let opts = PutMultipartOpts {
            attributes,
            ..Default::default()
        };
        let upload = store
            .put_multipart_opts(&location, opts)
            .await
            .map_err(|e| upload_error(&remote, e))?;
        let mut writer = WriteMultipart::new(upload);

        if let Err(e) = write_parts(&mut file, &mut writer, local, &remote).await {
            if let Err(abort) = writer.abort().await {
                tracing::warn!(remote = %remote, error = %abort, "Failed to abort multipart upload");
            }
            return Err(e);
        }
        writer.finish().await.map_err(|e| upload_error(&remote, e))?;
    }

    Ok(())
}

async fn write_parts(
    file: &mut tokio::fs::File,
    writer: &mut WriteMultipart,
    local: &Path,
    remote: &str,
) -> Result<()> {
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut chunk)
            .await
            .map_err(|e| BundleError::io("Read upload source", local, e))?;
        if n == 0 {
            return Ok(());
        }
        writer
            .wait_for_capacity(MAX_INFLIGHT_PARTS)
            .await
            .map_err(|e| upload_error(remote, e))?;
        writer.write(&chunk[..n]);
    }
}

pub(crate) fn upload_error(remote: &str, err: object_store::Error) -> BundleError {
    BundleError::UploadError {
        path: remote.to_string(),
        message: err.to_string(),
    }
}
