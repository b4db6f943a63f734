//! Stream-side transformer trait.

use eventsource_stream::Event;

use crate::error::LlmError;
use crate::streaming::{StreamDecoder, StreamUpdate};

/// Hands out a fresh per-response [`StreamDecoder`].
pub trait StreamChunkTransformer: Send + Sync {
    fn provider_id(&self) -> &str;

    fn decoder(&self) -> Box<dyn StreamDecoder>;
}

impl StreamDecoder for Box<dyn StreamDecoder> {
    fn decode(&mut self, event: &Event) -> Result<Vec<StreamUpdate>, LlmError> {
        (**self).decode(event)
    }
}
