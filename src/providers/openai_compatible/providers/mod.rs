//! Vendors speaking the OpenAI chat-completions schema.

pub mod cerebras;
pub mod lmstudio;
pub mod models;
pub mod openrouter;
pub mod qwen;
