//! Repository question answering: providers, prompt assembly and streamed answers.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod materializer;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod rag;
pub mod registry;
pub mod secret;
pub mod service;

pub use bootstrap::{LOCAL_PROVIDER, build_service};
pub use config::Config;
pub use error::{RagError, Result};
pub use materializer::{LocalPathMaterializer, Materializer};
pub use pipeline::{Fragment, GenerationPipeline, GenerationRequest, ResponseStream};
pub use provider::{
    DocumentStore, Generator, Lifecycle, PreparedRepository, RagProvider, RepoRef, Retriever,
};
pub use rag::RepositoryRagProvider;
pub use registry::ProviderRegistry;
pub use secret::Secret;
pub use service::{ChatRequest, RagService};
