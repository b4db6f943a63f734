//! Generic HTTP provider driven by a [`ProviderSpec`].

use std::sync::Arc;

use async_trait::async_trait;

use super::core::ProviderCore;
use super::spec::ProviderSpec;
use crate::error::LlmError;
use crate::executors::HttpChatExecutor;
use crate::metrics::{MetricsSink, ProviderMetrics};
use crate::streaming::ChunkStream;
use crate::traits::Provider;
use crate::transformers::StandardRequestBuilder;
use crate::types::{AuthConfig, GenerateOptions, ModelInfo, ProviderConfig, ToolFormat};

/// A concrete provider: one spec plus the shared provider core.
pub struct HttpProvider<S: ProviderSpec> {
    spec: Arc<S>,
    core: Arc<ProviderCore>,
}

impl<S: ProviderSpec> std::fmt::Debug for HttpProvider<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("id", &self.spec.id())
            .field("core", &self.core)
            .finish()
    }
}

impl<S: ProviderSpec> HttpProvider<S> {
    pub fn new(spec: S, config: ProviderConfig) -> Result<Self, LlmError> {
        let core = ProviderCore::new(spec.id(), spec.defaults(), config)?;
        Ok(Self {
            spec: Arc::new(spec),
            core: Arc::new(core),
        })
    }

    pub fn spec(&self) -> &S {
        &self.spec
    }

    pub fn core(&self) -> &ProviderCore {
        &self.core
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let config = self.core.config();
        let url = self.spec.models_url(&config);
        let http = self.core.http();
        let response = self
            .core
            .send("list_models", "", config.timeout(), None, |credential| {
                let headers = self.spec.build_headers(&config, credential)?;
                Ok(http.get(&url).headers(headers))
            })
            .await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::from(e).in_context(self.spec.id(), "list_models"))?;
        self.spec
            .parse_models(&body)
            .map_err(|e| e.in_context(self.spec.id(), "list_models"))
    }
}

#[async_trait]
impl<S: ProviderSpec> Provider for HttpProvider<S> {
    fn name(&self) -> String {
        let config = self.core.config();
        if config.name.is_empty() {
            self.spec.id().to_string()
        } else {
            config.name
        }
    }

    fn provider_type(&self) -> &str {
        self.spec.id()
    }

    fn description(&self) -> String {
        self.spec.description().to_string()
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        Ok(self.core.models.get_or_fetch(|| self.fetch_models()).await)
    }

    fn default_model(&self) -> String {
        self.core.config().default_model
    }

    fn supports_streaming(&self) -> bool {
        self.core.config().features.streaming
    }

    fn supports_tool_calling(&self) -> bool {
        self.core.config().features.tool_calling
    }

    fn supports_responses_api(&self) -> bool {
        self.core.config().features.responses_api
    }

    fn tool_format(&self) -> ToolFormat {
        self.spec.defaults().tool_format
    }

    async fn authenticate(&self, auth: AuthConfig) -> Result<(), LlmError> {
        self.core.credentials.apply(auth);
        self.core.models.invalidate().await;
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.core.is_authenticated()
    }

    async fn logout(&self) -> Result<(), LlmError> {
        self.core.credentials.clear();
        self.core.models.invalidate().await;
        Ok(())
    }

    fn configure(&self, config: ProviderConfig) -> Result<(), LlmError> {
        self.core.reconfigure(config)
    }

    fn config(&self) -> ProviderConfig {
        self.core.config()
    }

    async fn generate(&self, options: GenerateOptions) -> Result<ChunkStream, LlmError> {
        let config = self.core.config();
        let request = StandardRequestBuilder::new(&config)
            .build(&options)
            .map_err(|e| e.in_context(self.spec.id(), "generate"))?;

        let cancel = options.stream_token();
        let timeout = options.timeout.unwrap_or_else(|| config.timeout());
        self.core
            .rate_limits
            .check_and_wait(&request.model, options.projected_tokens(), Some(&cancel))
            .await?;

        let spec = self.spec.clone();
        let url_config = config.clone();
        let model = request.model.clone();
        let header_spec = self.spec.clone();
        let executor = HttpChatExecutor {
            core: self.core.clone(),
            transformers: self.spec.choose_chat_transformers(),
            build_url: Box::new(move |stream| spec.chat_url(stream, &model, &url_config)),
            build_headers: Box::new(move |credential| {
                header_spec.build_headers(&config, credential)
            }),
            timeout,
            cancel,
        };
        executor.execute(request).await
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let config = self.core.config();
        let url = self.spec.models_url(&config);
        let http = self.core.http();
        self.core
            .send("health_check", "", config.timeout(), None, |credential| {
                let headers = self.spec.build_headers(&config, credential)?;
                Ok(http.get(&url).headers(headers))
            })
            .await?;
        Ok(())
    }

    fn metrics(&self) -> ProviderMetrics {
        self.core.metrics.snapshot()
    }

    fn set_metrics_sink(&self, sink: Arc<dyn MetricsSink>) -> bool {
        self.core.metrics.set_sink(sink);
        true
    }
}
