use std::path::PathBuf;

use crate::error::{RagError, Result};
use crate::provider::{BoxFuture, RepoRef};

/// Turns a repository reference into a local directory to index.
pub trait Materializer: Send + Sync {
    fn materialize<'a>(&'a self, repo: &'a RepoRef) -> BoxFuture<'a, Result<PathBuf>>;
}

/// Accepts repositories that are already checked out locally. Remote URLs are rejected;
/// cloning belongs to a different materializer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPathMaterializer;

impl Materializer for LocalPathMaterializer {
    fn materialize<'a>(&'a self, repo: &'a RepoRef) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            let identifier = repo.identifier.trim();
            if identifier.contains("://") {
                return Err(RagError::Configuration(format!(
                    "remote repositories are not supported by the local materializer: {identifier}"
                )));
            }
            let path = PathBuf::from(identifier);
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => Ok(tokio::fs::canonicalize(&path).await.unwrap_or(path)),
                _ => Err(RagError::NotFound {
                    what: "repository directory",
                    name: identifier.to_owned(),
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn existing_directory_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let repo = RepoRef::new(dir.path().to_string_lossy());
        let path = LocalPathMaterializer.materialize(&repo).await.unwrap();
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn missing_directory_is_not_found() {
        let repo = RepoRef::new("/no/such/dir");
        let err = LocalPathMaterializer.materialize(&repo).await.unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));
    }

    #[tokio::test]
    async fn file_is_not_a_repository() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let repo = RepoRef::new(file.path().to_string_lossy());
        assert!(LocalPathMaterializer.materialize(&repo).await.is_err());
    }

    #[tokio::test]
    async fn remote_url_is_rejected() {
        let repo = RepoRef::new("https://github.com/acme/app");
        let err = LocalPathMaterializer.materialize(&repo).await.unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }
}
