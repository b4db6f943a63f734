//! Executors Layer
//!
//! HTTP orchestration that wires a provider's transformers to its endpoints.

pub mod chat;

pub use chat::HttpChatExecutor;
