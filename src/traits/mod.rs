//! Provider capability surface.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::metrics::{MetricsSink, ProviderMetrics};
use crate::registry::ProviderRegistry;
use crate::streaming::ChunkStream;
use crate::types::{AuthConfig, GenerateOptions, ModelInfo, ProviderConfig, ToolFormat};

/// One chat-completion backend, concrete or virtual.
///
/// Implementations are shared behind `Arc` and used concurrently; configuration
/// changes are serialized internally.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Display name (the config's `name`, defaulting to the type tag)
    fn name(&self) -> String;

    /// Provider-type tag the factory knows this provider by
    fn provider_type(&self) -> &str;

    fn description(&self) -> String;

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError>;

    fn default_model(&self) -> String;

    fn supports_streaming(&self) -> bool;

    fn supports_tool_calling(&self) -> bool;

    fn supports_responses_api(&self) -> bool {
        false
    }

    fn tool_format(&self) -> ToolFormat;

    async fn authenticate(&self, auth: AuthConfig) -> Result<(), LlmError>;

    fn is_authenticated(&self) -> bool;

    async fn logout(&self) -> Result<(), LlmError>;

    fn configure(&self, config: ProviderConfig) -> Result<(), LlmError>;

    fn config(&self) -> ProviderConfig;

    /// Run a chat completion.
    ///
    /// With `stream == false` the returned stream yields exactly one terminal
    /// chunk; otherwise it yields deltas followed by a terminal chunk.
    async fn generate(&self, options: GenerateOptions) -> Result<ChunkStream, LlmError>;

    /// Execute a named tool on the provider's own infrastructure.
    async fn invoke_server_tool(
        &self,
        tool_name: &str,
        _input: serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        Err(LlmError::unsupported(format!(
            "server-side tool '{tool_name}' is not available"
        ))
        .with_provider(self.provider_type())
        .with_operation("invoke_server_tool"))
    }

    async fn health_check(&self) -> Result<(), LlmError>;

    fn metrics(&self) -> ProviderMetrics;

    /// Attach a shared metrics sink; returns `false` when unsupported.
    fn set_metrics_sink(&self, _sink: Arc<dyn MetricsSink>) -> bool {
        false
    }

    fn as_virtual(&self) -> Option<&dyn VirtualProvider> {
        None
    }
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name())
            .field("type", &self.provider_type())
            .finish()
    }
}

/// Provider composed of other providers referenced by name.
pub trait VirtualProvider: Send + Sync {
    /// Names of the providers this one depends on.
    fn child_names(&self) -> Vec<String>;

    /// Resolve child names against already constructed providers.
    fn set_providers(&self, registry: &ProviderRegistry) -> Result<(), LlmError>;
}
