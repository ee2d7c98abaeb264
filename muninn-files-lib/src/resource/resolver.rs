//! Path classification and resource reads.
//!
//! Resolution is a pure function of the decoded path and the filesystem: it
//! takes no locks (listing reads counter values through `get`, which locks
//! only per lookup) and runs concurrently from any number of workers.

use std::io;
use std::path::Path;

use crate::counters::CounterStore;
use crate::error::RequestError;
use crate::resource::listing::{list_entries, ListingEntry};

const HTML_UTF8: &str = "text/html; charset=utf-8";

/// Classified outcome of resolving a request path.
#[derive(Debug)]
pub enum Resolved {
    /// Directory listing records, ready for the renderer.
    Directory(Vec<ListingEntry>),
    /// A typed body: static asset, image, pdf, html passthrough or wrapped
    /// text.
    Page {
        content_type: &'static str,
        body: Vec<u8>,
    },
    /// Forced download with attachment disposition.
    Download { filename: String, body: Vec<u8> },
}

/// Strip the query string from a decoded path, reporting whether the
/// download marker appeared anywhere in it.
pub fn split_query(path: &str) -> (&str, bool) {
    let is_download = path.contains("download=true");
    let clean = path.split_once('?').map_or(path, |(head, _)| head);
    (clean, is_download)
}

/// Counter key for a cleaned path; the served root counts as ".".
pub fn normalize_key(path: &str) -> &str {
    if path.is_empty() {
        "."
    } else {
        path
    }
}

/// Resolve a cleaned, decoded path against the served tree.
pub async fn resolve(
    path: &str,
    is_download: bool,
    root_dir: &Path,
    static_dir: &Path,
    counters: &CounterStore,
) -> Result<Resolved, RequestError> {
    if let Some(asset) = path.strip_prefix("static/") {
        return serve_static(static_dir, asset).await;
    }

    let fs_path = root_dir.join(path);
    let meta = match tokio::fs::metadata(&fs_path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(RequestError::NotFound),
        Err(e) => return Err(RequestError::Access(e)),
    };

    if meta.is_dir() {
        let entries = list_entries(&fs_path, root_dir, counters).await?;
        return Ok(Resolved::Directory(entries));
    }
    if !meta.is_file() {
        return Err(RequestError::NotFound);
    }

    if is_download {
        let body = read_bytes(&fs_path).await?;
        let filename = fs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(Resolved::Download { filename, body });
    }

    match extension_of(&fs_path).as_deref() {
        Some("png") => Ok(Resolved::Page {
            content_type: "image/png",
            body: read_bytes(&fs_path).await?,
        }),
        Some("pdf") => Ok(Resolved::Page {
            content_type: "application/pdf",
            body: read_bytes(&fs_path).await?,
        }),
        Some("html") => Ok(Resolved::Page {
            content_type: HTML_UTF8,
            body: read_text(&fs_path).await?.into_bytes(),
        }),
        Some("txt") => {
            let text = read_text(&fs_path).await?;
            let body = format!("<html><body><pre>{text}</pre></body></html>").into_bytes();
            Ok(Resolved::Page {
                content_type: HTML_UTF8,
                body,
            })
        }
        _ => Err(RequestError::NotFound),
    }
}

/// Raw bytes from the static-assets tree; only the content type depends on
/// the extension.
async fn serve_static(static_dir: &Path, asset: &str) -> Result<Resolved, RequestError> {
    let fs_path = static_dir.join(asset);
    let body = read_bytes(&fs_path).await?;
    let content_type = match extension_of(&fs_path).as_deref() {
        Some("css") => "text/css",
        _ => "image/png",
    };
    Ok(Resolved::Page { content_type, body })
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

async fn read_bytes(path: &Path) -> Result<Vec<u8>, RequestError> {
    tokio::fs::read(path).await.map_err(read_error)
}

async fn read_text(path: &Path) -> Result<String, RequestError> {
    tokio::fs::read_to_string(path).await.map_err(read_error)
}

fn read_error(e: io::Error) -> RequestError {
    if e.kind() == io::ErrorKind::NotFound {
        RequestError::NotFound
    } else {
        RequestError::Access(e)
    }
}
