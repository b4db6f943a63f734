//! Reassembly of fragmented tool calls.
//!
//! Fragments carrying an id open or update the entry for that id. Fragments
//! without an id continue the entry last opened at the same index, or the most
//! recently seen entry when no index is available (OpenAI omits the id after the
//! opening fragment of a call).

use std::collections::HashMap;

use crate::types::ToolCall;

/// One piece of a tool call as emitted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolCallFragment {
    pub index: Option<u32>,
    pub id: Option<String>,
    pub call_type: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

impl ToolCallFragment {
    pub fn opening(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn arguments(arguments: impl Into<String>) -> Self {
        Self {
            arguments: arguments.into(),
            ..Default::default()
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }
}

#[derive(Debug, Default)]
struct Entry {
    call_type: String,
    name: String,
    arguments: String,
}

/// Accumulates fragments keyed by tool-call id, preserving first-seen order.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    order: Vec<String>,
    entries: HashMap<String, Entry>,
    by_index: HashMap<u32, String>,
    last_id: Option<String>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    fn resolve_id(&mut self, fragment: &ToolCallFragment) -> String {
        if let Some(id) = fragment.id.as_ref().filter(|id| !id.is_empty()) {
            return id.clone();
        }
        if let Some(id) = fragment.index.and_then(|i| self.by_index.get(&i)) {
            return id.clone();
        }
        if let Some(id) = &self.last_id {
            return id.clone();
        }
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }

    pub fn push(&mut self, fragment: ToolCallFragment) {
        let id = self.resolve_id(&fragment);
        if !self.entries.contains_key(&id) {
            self.order.push(id.clone());
        }
        let entry = self.entries.entry(id.clone()).or_default();
        if let Some(call_type) = fragment.call_type.filter(|t| !t.is_empty()) {
            entry.call_type = call_type;
        }
        if let Some(name) = fragment.name.filter(|n| !n.is_empty()) {
            entry.name = name;
        }
        entry.arguments.push_str(&fragment.arguments);
        if let Some(index) = fragment.index {
            self.by_index.insert(index, id.clone());
        }
        self.last_id = Some(id);
    }

    /// Completed tool calls in the order their first fragment arrived.
    pub fn finish(&mut self) -> Vec<ToolCall> {
        let order = std::mem::take(&mut self.order);
        let mut entries = std::mem::take(&mut self.entries);
        self.by_index.clear();
        self.last_id = None;
        order
            .into_iter()
            .filter_map(|id| {
                entries.remove(&id).map(|e| ToolCall {
                    id,
                    call_type: if e.call_type.is_empty() {
                        "function".to_string()
                    } else {
                        e.call_type
                    },
                    function: crate::types::FunctionCall {
                        name: e.name,
                        arguments: e.arguments,
                    },
                })
            })
            .collect()
    }
}
