//! Process-wide transformer registry keyed by provider tag.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use super::TransformerSet;

fn registry() -> &'static RwLock<HashMap<String, TransformerSet>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, TransformerSet>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert(
            "openai".to_string(),
            crate::providers::openai::openai_transformers(),
        );
        map.insert(
            "anthropic".to_string(),
            crate::providers::anthropic::anthropic_transformers(),
        );
        map.insert(
            "gemini".to_string(),
            crate::providers::gemini::gemini_transformers(),
        );
        RwLock::new(map)
    })
}

/// Register (or replace) the transformer set used by providers of `tag`.
pub fn register_transformers(tag: impl Into<String>, set: TransformerSet) {
    let tag = tag.into();
    tracing::debug!(tag = %tag, "registering transformers");
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(tag, set);
}

/// Transformer set registered for `tag`.
pub fn transformers_for(tag: &str) -> Option<TransformerSet> {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(tag)
        .cloned()
}

/// Sorted list of registered tags.
pub fn registered_tags() -> Vec<String> {
    let mut tags: Vec<String> = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect();
    tags.sort();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::openai_compatible::{PassthroughAdapter, compat_transformers};
    use std::sync::Arc;

    #[test]
    fn builtins_are_registered() {
        let tags = registered_tags();
        for tag in ["anthropic", "gemini", "openai"] {
            assert!(tags.iter().any(|t| t == tag), "missing {tag}");
        }
        assert_eq!(
            transformers_for("anthropic").unwrap().request.provider_id(),
            "anthropic"
        );
    }

    #[test]
    fn custom_tags_can_be_added() {
        assert!(transformers_for("acme-test").is_none());
        register_transformers(
            "acme-test",
            compat_transformers(Arc::new(PassthroughAdapter::new("acme-test"))),
        );
        let set = transformers_for("acme-test").unwrap();
        assert_eq!(set.stream.provider_id(), "acme-test");
    }
}
