//! Completion and embedding backends used by the retrieval pipeline.

pub mod any;
pub mod claude;
pub mod error;
pub mod gemini;
pub(crate) mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub(crate) mod retry;
pub(crate) mod sse;

pub use error::LlmError;
pub use provider::{ChatStream, GenerationParams, LlmProvider, Message, Role};
