//! Transformers layer
//!
//! Each wire protocol contributes three transformers: canonical request to
//! provider body, provider body to terminal chunk, and SSE events to stream
//! updates. Providers look their set up by tag in [`registry`], so a caller may
//! swap the wire handling of a tag without touching the provider.

pub mod registry;
pub mod request;
pub mod response;
pub mod stream;

use std::sync::Arc;

pub use registry::{register_transformers, registered_tags, transformers_for};
pub use request::{RequestTransformer, StandardRequest, StandardRequestBuilder};
pub use response::ResponseTransformer;
pub use stream::StreamChunkTransformer;

/// Request, response and stream transformers of one wire protocol.
#[derive(Clone)]
pub struct TransformerSet {
    pub request: Arc<dyn RequestTransformer>,
    pub response: Arc<dyn ResponseTransformer>,
    pub stream: Arc<dyn StreamChunkTransformer>,
}

impl std::fmt::Debug for TransformerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerSet")
            .field("request", &self.request.provider_id())
            .field("response", &self.response.provider_id())
            .field("stream", &self.stream.provider_id())
            .finish()
    }
}
