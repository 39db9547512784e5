//! Conversation memory, corpus snapshots in `SQLite`, and vector search backends.

pub mod conversation;
pub mod error;
pub mod in_memory_store;
pub mod qdrant_ops;
pub mod sqlite;
pub mod tokens;
pub mod vector_store;

pub use conversation::{ConversationMemory, DialogTurn, RecallConfig, SessionStore};
pub use error::MemoryError;
pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantOps;
pub use sqlite::SqliteStore;
pub use vector_store::{ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError};
