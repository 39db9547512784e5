//! File classification by extension.

use std::path::Path;

const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "java", "cpp", "c", "go", "rs", "jsx", "tsx", "html", "css", "php",
    "swift", "cs",
];

const DOC_EXTENSIONS: &[&str] = &["md", "txt", "rst", "json", "yaml", "yml"];

/// What kind of content a file holds, as far as indexing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileKind {
    Code,
    /// Prose or structured documentation.
    Documentation,
}

impl FileKind {
    pub(crate) fn is_code(self) -> bool {
        self == Self::Code
    }
}

/// Lowercased extension of `path`, which doubles as the document content type.
pub(crate) fn extension(path: &Path) -> Option<String> {
    Some(path.extension()?.to_str()?.to_ascii_lowercase())
}

/// Classify a lowercased extension. `None` means the file is not indexed.
pub(crate) fn detect_kind(extension: &str) -> Option<FileKind> {
    if CODE_EXTENSIONS.contains(&extension) {
        Some(FileKind::Code)
    } else if DOC_EXTENSIONS.contains(&extension) {
        Some(FileKind::Documentation)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension(Path::new("app.PY")).as_deref(), Some("py"));
        assert_eq!(extension(Path::new("src/main.rs")).as_deref(), Some("rs"));
        assert!(extension(Path::new("Makefile")).is_none());
    }

    #[test]
    fn code_and_documentation_extensions() {
        assert_eq!(detect_kind("rs"), Some(FileKind::Code));
        assert_eq!(detect_kind("cs"), Some(FileKind::Code));
        assert_eq!(detect_kind("md"), Some(FileKind::Documentation));
        assert!(!detect_kind("yml").unwrap().is_code());
    }

    #[test]
    fn unknown_extension_is_skipped() {
        assert!(detect_kind("png").is_none());
        assert!(detect_kind("").is_none());
    }
}
