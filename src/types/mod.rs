//! Canonical data types shared by every provider.

pub mod chat;
pub mod chunk;
pub mod config;
pub mod models;
pub mod options;
pub mod tools;

pub use chat::{ChatMessage, ContentPart, MediaSource, MessageRole, resolve_mime_type};
pub use chunk::{Choice, ChoiceDelta, Chunk, Usage};
pub use config::{
    AuthConfig, OAuthCredentialSet, ProviderConfig, ProviderFeatures, TokenRefreshCallback,
    ToolFormat,
};
pub use models::{ModelCapabilities, ModelInfo, ModelPricing, StaticModel};
pub use options::{GenerateOptions, ResponseFormat};
pub use tools::{FunctionCall, Tool, ToolCall, ToolChoice};
