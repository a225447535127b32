//! Node handlers
//!
//! A [`NodeHandler`] runs one node of a workflow. Handlers are looked up by
//! the node's `type` in a [`NodeRegistry`]; the built-in `input`, `template`
//! and `output` handlers cover graphs that only move data around, and
//! provider-backed handlers are registered by the embedding binary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

use super::graph::WorkflowNode;

/// Result of one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutput {
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub word_count: u64,
    #[serde(default)]
    pub cost: f64,
}

impl NodeOutput {
    /// Structured output; string values also fill `text`
    pub fn from_value(content: serde_json::Value) -> Self {
        match content {
            serde_json::Value::String(text) => Self::text(text),
            content => Self {
                content,
                ..Default::default()
            },
        }
    }

    /// Text output with its word count
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            content: serde_json::Value::String(text.clone()),
            word_count: text.split_whitespace().count() as u64,
            text: Some(text),
            tokens_used: 0,
            cost: 0.0,
        }
    }

    pub fn with_usage(mut self, tokens_used: u64, cost: f64) -> Self {
        self.tokens_used = tokens_used;
        self.cost = cost;
        self
    }

    /// Text form used for templating and previews
    pub fn as_text(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => match &self.content {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            },
        }
    }
}

/// A node failure
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct NodeError {
    pub message: String,
}

impl NodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What a node can see while it runs
#[derive(Debug, Clone, Default)]
pub struct NodeContext {
    pub execution_id: String,
    /// Execution inputs
    pub inputs: serde_json::Value,
    /// Outputs of every node completed so far
    pub outputs: BTreeMap<String, NodeOutput>,
    /// Output of the nearest preceding node that produced one
    pub last_output: Option<NodeOutput>,
    /// Regeneration guidance, set only for the node being regenerated
    pub regeneration: Option<String>,
}

/// Runs one type of node
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(&self, node: &WorkflowNode, ctx: &NodeContext) -> Result<NodeOutput, NodeError>;
}

/// Node type to handler table
#[derive(Clone, Default)]
pub struct NodeRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `input`, `template` and `output` handlers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("input", Arc::new(InputNode));
        registry.register("template", Arc::new(TemplateNode));
        registry.register("output", Arc::new(OutputNode));
        registry
    }

    pub fn register(&mut self, node_type: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type.into(), handler);
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(node_type).cloned()
    }

    pub fn node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Returns the execution inputs, or one field of them named by `config.field`
pub struct InputNode;

#[async_trait]
impl NodeHandler for InputNode {
    async fn execute(&self, node: &WorkflowNode, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        match node.config_str("field") {
            Some(field) => ctx
                .inputs
                .get(field)
                .cloned()
                .map(NodeOutput::from_value)
                .ok_or_else(|| NodeError::new(format!("Input field '{}' is missing", field))),
            None => Ok(NodeOutput::from_value(ctx.inputs.clone())),
        }
    }
}

/// Renders `config.template`.
///
/// `{{node_id}}` expands to that node's output text and `{{input.key}}` to
/// an input field. Regeneration guidance, when present, is appended.
pub struct TemplateNode;

#[async_trait]
impl NodeHandler for TemplateNode {
    async fn execute(&self, node: &WorkflowNode, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let template = node
            .config_str("template")
            .ok_or_else(|| NodeError::new(format!("Template node {} has no template", node.id)))?;
        let mut rendered = render_template(template, ctx)?;
        if let Some(guidance) = &ctx.regeneration {
            rendered.push_str("\n\n");
            rendered.push_str(guidance);
        }
        Ok(NodeOutput::text(rendered))
    }
}

/// Passes through the last node output
pub struct OutputNode;

#[async_trait]
impl NodeHandler for OutputNode {
    async fn execute(&self, _node: &WorkflowNode, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(ctx.last_output.clone().unwrap_or_default())
    }
}

/// Expand `{{...}}` placeholders
pub fn render_template(template: &str, ctx: &NodeContext) -> Result<String, NodeError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| NodeError::new("Unclosed '{{' in template"))?;
        let key = after[..end].trim();

        let value = if let Some(field) = key.strip_prefix("input.") {
            ctx.inputs.get(field).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        } else {
            ctx.outputs.get(key).map(NodeOutput::as_text)
        };
        let value = value.ok_or_else(|| NodeError::new(format!("Unknown placeholder '{}'", key)))?;
        out.push_str(&value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
