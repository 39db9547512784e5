//! Provider capabilities.
//!
//! Every provider has a [`Lifecycle`]. Retrieval, generation and document storage are
//! separate capabilities a provider may or may not expose; asking for a missing one
//! yields [`RagError::Unsupported`].

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use grove_index::{Document, IndexReport, RetrievalCandidate};
use grove_llm::{ChatStream, Message};
use tokio_util::sync::CancellationToken;

use crate::error::{RagError, Result};
use crate::secret::Secret;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A repository to prepare: a URL or local path, plus an optional access token.
#[derive(Debug, Clone)]
pub struct RepoRef {
    pub identifier: String,
    pub auth_token: Option<Secret>,
}

impl RepoRef {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            auth_token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: Secret) -> Self {
        self.auth_token = Some(token);
        self
    }
}

/// A repository ready for retrieval.
#[derive(Debug, Clone)]
pub struct PreparedRepository {
    pub key: String,
    pub root: PathBuf,
    pub report: IndexReport,
}

pub trait Lifecycle: Send + Sync {
    /// Unique registry name.
    fn name(&self) -> &str;

    fn initialize(&self) -> BoxFuture<'_, Result<()>>;

    fn close(&self) -> BoxFuture<'_, Result<()>>;
}

pub trait Retriever: Send + Sync {
    /// Materialize the repository and make sure its corpus is built.
    fn prepare_retriever<'a>(
        &'a self,
        repo: &'a RepoRef,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<PreparedRepository>>;

    /// Like [`Retriever::prepare_retriever`], but discards any cached corpus and walks
    /// the repository again.
    fn refresh_retriever<'a>(
        &'a self,
        repo: &'a RepoRef,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<PreparedRepository>>;

    /// Drop the corpus of `repo_key` from memory and the cache. Returns `true` if one existed.
    fn forget<'a>(&'a self, repo_key: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Rank the prepared corpus of `repo_key` against `query`, best first.
    fn retrieve_documents<'a>(
        &'a self,
        repo_key: &'a str,
        query: &'a str,
    ) -> BoxFuture<'a, Result<Vec<RetrievalCandidate>>>;
}

pub trait Generator: Send + Sync {
    /// Start streaming a completion for `messages`.
    fn generate_stream<'a>(&'a self, messages: &'a [Message]) -> BoxFuture<'a, Result<ChatStream>>;
}

pub trait DocumentStore: Send + Sync {
    fn index_document<'a>(&'a self, repo_key: &'a str, document: Document)
    -> BoxFuture<'a, Result<()>>;

    fn get_document<'a>(&'a self, repo_key: &'a str, id: &'a str) -> BoxFuture<'a, Result<Document>>;

    fn delete_document<'a>(&'a self, repo_key: &'a str, id: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// A registrable provider and the capabilities it offers.
pub trait RagProvider: Lifecycle {
    fn retriever(&self) -> Option<&dyn Retriever> {
        None
    }

    fn generator(&self) -> Option<&dyn Generator> {
        None
    }

    fn documents(&self) -> Option<&dyn DocumentStore> {
        None
    }
}

fn unsupported(provider: &dyn RagProvider, capability: &'static str) -> RagError {
    RagError::Unsupported {
        provider: provider.name().to_owned(),
        capability,
    }
}

/// # Errors
///
/// Returns [`RagError::Unsupported`] if `provider` has no retriever.
pub fn require_retriever(provider: &dyn RagProvider) -> Result<&dyn Retriever> {
    provider
        .retriever()
        .ok_or_else(|| unsupported(provider, "retrieval"))
}

/// # Errors
///
/// Returns [`RagError::Unsupported`] if `provider` has no generator.
pub fn require_generator(provider: &dyn RagProvider) -> Result<&dyn Generator> {
    provider
        .generator()
        .ok_or_else(|| unsupported(provider, "generation"))
}

/// # Errors
///
/// Returns [`RagError::Unsupported`] if `provider` has no document store.
pub fn require_documents(provider: &dyn RagProvider) -> Result<&dyn DocumentStore> {
    provider
        .documents()
        .ok_or_else(|| unsupported(provider, "document storage"))
}
