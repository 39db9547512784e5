//! Repository walk: filter → read → classify → build documents.

use std::path::Path;

use grove_memory::tokens::{MAX_DOCUMENT_TOKENS, estimate_tokens};
use tokio_util::sync::CancellationToken;

use crate::document::{Document, DocumentMetadata, Importance};
use crate::error::{IndexError, Result};
use crate::languages::{FileKind, detect_kind, extension};

const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".venv",
    "venv",
    "node_modules",
    ".git",
    "__pycache__",
    ".pytest_cache",
    "dist",
    "build",
    ".idea",
    ".vscode",
];

const DEFAULT_EXCLUDED_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "poetry.lock",
    "Pipfile.lock",
    ".DS_Store",
    "Thumbs.db",
    ".env",
    ".gitignore",
];

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub excluded_dirs: Vec<String>,
    pub excluded_files: Vec<String>,
    /// Files estimated above this many tokens are skipped whole.
    pub max_tokens: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| (*s).to_owned()).collect(),
            excluded_files: DEFAULT_EXCLUDED_FILES.iter().map(|s| (*s).to_owned()).collect(),
            max_tokens: MAX_DOCUMENT_TOKENS,
        }
    }
}

/// Summary of an indexing run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub skipped_oversized: usize,
    pub skipped_unreadable: usize,
    pub duration_ms: u64,
    /// The corpus came from the cache and no file was read.
    pub cache_hit: bool,
}

/// Walk `root` and build one document per eligible file, in file-name order.
///
/// Blocking; callers on the async runtime should go through `spawn_blocking`.
///
/// # Errors
///
/// Returns [`IndexError::Cancelled`] if `cancel` fires mid-walk, or an IO error if `root`
/// is not a readable directory.
pub fn build_corpus(
    root: &Path,
    config: &IndexerConfig,
    cancel: &CancellationToken,
) -> Result<(Vec<Document>, IndexReport)> {
    let start = std::time::Instant::now();
    let mut report = IndexReport::default();

    if !root.is_dir() {
        return Err(IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        )));
    }

    let excluded_dirs = config.excluded_dirs.clone();
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |e| {
            let is_dir = e.file_type().is_some_and(|ft| ft.is_dir());
            !(is_dir && e.depth() > 0 && excluded_dirs.iter().any(|d| e.file_name() == d.as_str()))
        })
        .build();

    let mut documents = Vec::new();
    for entry in walker {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "skipping unwalkable entry");
                report.skipped_unreadable += 1;
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();
        if config.excluded_files.iter().any(|f| *f == file_name) {
            continue;
        }
        let Some(ext) = extension(path) else {
            continue;
        };
        let Some(kind) = detect_kind(&ext) else {
            continue;
        };
        report.files_scanned += 1;

        let rel_path = relative_path(root, path);
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(file = %rel_path, error = %e, "skipping unreadable file");
                report.skipped_unreadable += 1;
                continue;
            }
        };

        let token_count = estimate_tokens(&text);
        if token_count > config.max_tokens {
            tracing::debug!(file = %rel_path, token_count, "skipping oversized file");
            report.skipped_oversized += 1;
            continue;
        }

        documents.push(build_document(&rel_path, text, kind, ext, token_count));
        report.files_indexed += 1;
    }

    report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
    tracing::info!(
        root = %root.display(),
        indexed = report.files_indexed,
        oversized = report.skipped_oversized,
        unreadable = report.skipped_unreadable,
        duration_ms = report.duration_ms,
        "corpus built"
    );
    Ok((documents, report))
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn build_document(
    rel_path: &str,
    text: String,
    kind: FileKind,
    content_type: String,
    token_count: usize,
) -> Document {
    let is_code = kind.is_code();
    let is_implementation = is_code && is_implementation_path(rel_path);
    let mut metadata = DocumentMetadata::new(rel_path);
    metadata.content_type = content_type;
    metadata.is_code = is_code;
    metadata.is_implementation = is_implementation;
    metadata.token_count = token_count;
    metadata.importance = importance_for(rel_path, kind, is_implementation);
    Document::new(rel_path, text, metadata)
}

/// Test and app entry-point files do not count as implementation code.
fn is_implementation_path(rel_path: &str) -> bool {
    let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    !(file_name.starts_with("test_")
        || file_name.starts_with("app_")
        || rel_path.to_lowercase().contains("test"))
}

fn importance_for(rel_path: &str, kind: FileKind, is_implementation: bool) -> Importance {
    let stem = Path::new(rel_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match kind {
        FileKind::Documentation if stem == "readme" || stem == "index" => Importance::High,
        FileKind::Code if is_implementation => Importance::Medium,
        _ => Importance::Normal,
    }
}
