//! Directory listing records and rendering.

use std::io;
use std::path::Path;

use serde::Serialize;
use tera::{Context, Tera};
use tracing::warn;

use crate::counters::CounterStore;
use crate::error::{RequestError, Result};

const DEFAULT_TEMPLATE: &str = include_str!("../../templates/index.html");
const TEMPLATE_NAME: &str = "index.html";

/// One row of a directory listing, shaped for the template.
#[derive(Debug, Clone, Serialize)]
pub struct ListingEntry {
    pub name: String,
    pub path: String,
    pub icon: &'static str,
    pub icon_selected: &'static str,
    pub is_dir: bool,
    pub count: u64,
}

/// Icon pair (normal, selected) for a listed entry.
fn icon_pair(name: &str, is_dir: bool) -> (&'static str, &'static str) {
    if is_dir {
        return ("folder.png", "folder_selected.png");
    }
    match Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => ("pdf.png", "pdf_selected.png"),
        Some("html") => ("html.png", "html_selected.png"),
        Some("png") => ("png.png", "png_selected.png"),
        Some("txt") => ("txt.png", "txt_selected.png"),
        _ => ("file.png", "file_selected.png"),
    }
}

/// Collect the listing records for `dir`, sorted by name, with live counts
/// from the store. A directory that vanished between classification and
/// listing yields an empty listing rather than an error.
pub async fn list_entries(
    dir: &Path,
    root_dir: &Path,
    counters: &CounterStore,
) -> std::result::Result<Vec<ListingEntry>, RequestError> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RequestError::Access(e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(RequestError::Access)? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let full = dir.join(&name);
        let rel = full
            .strip_prefix(root_dir)
            .unwrap_or(Path::new(&name))
            .to_string_lossy()
            .replace('\\', "/");
        // follows symlinks, like the classification step; a broken link
        // lists as a plain file
        let is_dir = tokio::fs::metadata(&full)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let (icon, icon_selected) = icon_pair(&name, is_dir);
        let count = counters.get(&rel);
        entries.push(ListingEntry {
            name,
            path: rel,
            icon,
            icon_selected,
            is_dir,
            count,
        });
    }
    Ok(entries)
}

/// Renders listing records to an HTML body.
///
/// A built-in template ships in the binary; an `index.html` inside the
/// static-assets directory replaces it so deployments can restyle listings
/// without rebuilding.
pub struct ListingRenderer {
    tera: Tera,
}

impl ListingRenderer {
    /// Build the renderer, preferring a template override from `static_dir`.
    pub fn from_static_dir(static_dir: &Path) -> Result<Self> {
        let override_path = static_dir.join(TEMPLATE_NAME);
        match std::fs::read_to_string(&override_path) {
            Ok(source) => {
                let mut tera = Tera::default();
                tera.add_raw_template(TEMPLATE_NAME, &source)?;
                Ok(Self { tera })
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %override_path.display(), error = %e, "cannot read listing template override, using built-in");
                }
                Self::embedded()
            }
        }
    }

    /// Renderer with only the built-in template.
    pub fn embedded() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, DEFAULT_TEMPLATE)?;
        Ok(Self { tera })
    }

    pub fn render(&self, entries: &[ListingEntry]) -> std::result::Result<String, RequestError> {
        let mut ctx = Context::new();
        ctx.insert("files", entries);
        self.tera
            .render(TEMPLATE_NAME, &ctx)
            .map_err(RequestError::Render)
    }
}
