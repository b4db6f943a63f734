//! Chat executor
//!
//! Renders a [`StandardRequest`] with the provider's transformers, sends it
//! through the provider core and turns the response into a [`ChunkStream`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::auth::Credential;
use crate::error::LlmError;
use crate::providers::ProviderCore;
use crate::streaming::{ChunkStream, StreamContext, drive_sse_response};
use crate::transformers::{StandardRequest, TransformerSet};

/// Route hook: `stream` flag to URL.
pub type BuildUrl = Box<dyn Fn(bool) -> String + Send + Sync>;
/// Header hook: credential of the attempt to headers.
pub type BuildHeaders = Box<dyn Fn(&Credential) -> Result<HeaderMap, LlmError> + Send + Sync>;

/// Generic HTTP-based chat executor, built per call.
pub struct HttpChatExecutor {
    pub core: Arc<ProviderCore>,
    pub transformers: TransformerSet,
    pub build_url: BuildUrl,
    pub build_headers: BuildHeaders,
    /// Deadline for response headers, and for the body of non-streaming calls
    pub timeout: Duration,
    /// Cancels the request and, for streams, the reader task
    pub cancel: CancellationToken,
}

impl HttpChatExecutor {
    pub async fn execute(&self, request: StandardRequest) -> Result<ChunkStream, LlmError> {
        let core = &self.core;
        let model = request.model.clone();
        let body = self
            .transformers
            .request
            .transform_chat(&request)
            .map_err(|e| e.in_context(core.tag(), "generate"))?;
        let url = (self.build_url)(request.stream);

        core.metrics.record_request();
        let started = Instant::now();
        let result = if request.stream {
            self.execute_stream(&url, &body, &model, started).await
        } else {
            self.execute_once(&url, &body, &model, started).await
        };
        if let Err(e) = &result {
            core.metrics.record_error(&model, e.kind());
        }
        result
    }

    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        model: &str,
    ) -> Result<reqwest::Response, LlmError> {
        let http = self.core.http();
        self.core
            .send("generate", model, self.timeout, Some(&self.cancel), |credential| {
                let headers = (self.build_headers)(credential)?;
                Ok(http.post(url).headers(headers).json(body))
            })
            .await
    }

    async fn execute_once(
        &self,
        url: &str,
        body: &serde_json::Value,
        model: &str,
        started: Instant,
    ) -> Result<ChunkStream, LlmError> {
        let tag = self.core.tag();
        let response = self.post(url, body, model).await?;

        let remaining = self.timeout.saturating_sub(started.elapsed());
        let text = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(LlmError::cancelled().in_context(tag, "generate"));
            }
            text = tokio::time::timeout(remaining, response.text()) => text
                .map_err(|_| LlmError::timeout("response body not received in time"))?
                .map_err(LlmError::from)
                .map_err(|e| e.in_context(tag, "generate"))?,
        };
        let raw: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| LlmError::from(e).in_context(tag, "generate"))?;
        let chunk = self
            .transformers
            .response
            .transform_chat_response(&raw)
            .map_err(|e| e.in_context(tag, "generate"))?;

        self.core.metrics.record_success(model, started.elapsed());
        if let Some(usage) = chunk.usage {
            self.core
                .metrics
                .record_tokens(model, u64::from(usage.total_tokens));
        }
        Ok(ChunkStream::from_chunk(chunk))
    }

    async fn execute_stream(
        &self,
        url: &str,
        body: &serde_json::Value,
        model: &str,
        started: Instant,
    ) -> Result<ChunkStream, LlmError> {
        let response = self.post(url, body, model).await?;
        self.core.metrics.record_success(model, started.elapsed());

        let decoder = self.transformers.stream.decoder();
        let ctx = StreamContext::new(self.core.tag(), model).with_metrics(self.core.metrics.clone());
        tracing::debug!(provider = self.core.tag(), model, "stream opened");
        Ok(ChunkStream::spawn(self.cancel.clone(), move |tx| {
            drive_sse_response(response, decoder, ctx, tx)
        }))
    }
}
