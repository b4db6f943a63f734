//! Vendor adapters for OpenAI-compatible endpoints.
//!
//! The wire protocol is shared; an adapter patches the request body and adds
//! headers for one vendor.

use reqwest::header::HeaderMap;

use crate::error::LlmError;
use crate::types::ProviderConfig;

pub trait CompatAdapter: Send + Sync + std::fmt::Debug {
    /// Provider identifier
    fn provider_id(&self) -> &'static str;

    /// Patch the rendered request body for this vendor and model.
    fn transform_request_params(
        &self,
        _params: &mut serde_json::Value,
        _model: &str,
    ) -> Result<(), LlmError> {
        Ok(())
    }

    /// Whether document parts can be sent as `file` content.
    fn supports_documents(&self) -> bool {
        false
    }

    /// Whether `stream_options.include_usage` is understood.
    fn supports_stream_usage(&self) -> bool {
        true
    }

    /// Headers beyond `Authorization`.
    fn custom_headers(&self, _config: &ProviderConfig) -> HeaderMap {
        HeaderMap::new()
    }
}

/// Adapter that leaves the OpenAI wire format untouched.
#[derive(Debug, Clone, Copy)]
pub struct PassthroughAdapter {
    id: &'static str,
}

impl PassthroughAdapter {
    pub const fn new(id: &'static str) -> Self {
        Self { id }
    }
}

impl CompatAdapter for PassthroughAdapter {
    fn provider_id(&self) -> &'static str {
        self.id
    }
}
