//! Workflow graph definition and execution order

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::{ConductorError, Result};

fn default_node_type() -> String {
    "template".to_string()
}

/// Workflow node definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Node identifier, unique within the graph
    pub id: String,

    /// Handler type (`input`, `template`, `output` or an embedder-registered type)
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,

    /// Human-readable name for progress reporting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Handler configuration
    #[serde(default)]
    pub config: serde_json::Value,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            name: None,
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Name if set, otherwise the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// String value of a config field
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

/// Workflow edge definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    /// Source node ID
    pub source: String,
    /// Target node ID
    pub target: String,
}

impl WorkflowEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A directed acyclic graph of processing nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

impl WorkflowGraph {
    /// A linear chain: each node depends on the one before it
    pub fn chain(nodes: Vec<WorkflowNode>) -> Self {
        let edges = nodes
            .windows(2)
            .map(|pair| WorkflowEdge::new(pair[0].id.clone(), pair[1].id.clone()))
            .collect();
        Self { nodes, edges }
    }

    /// Parse and validate a graph from JSON (`{"nodes": [...], "edges": [...]}`)
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let graph: WorkflowGraph = serde_json::from_value(value)
            .map_err(|e| ConductorError::Validation(format!("Invalid workflow graph: {}", e)))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Reject empty graphs, duplicate ids and edges to unknown nodes
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(ConductorError::Validation("Workflow has no nodes".into()));
        }
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(ConductorError::Validation("Node id is empty".into()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(ConductorError::Validation(format!("Duplicate node id: {}", node.id)));
            }
        }
        for edge in &self.edges {
            for end in [&edge.source, &edge.target] {
                if !seen.contains(end.as_str()) {
                    return Err(ConductorError::Validation(format!(
                        "Edge {} -> {} references unknown node {}",
                        edge.source, edge.target, end
                    )));
                }
            }
        }
        Ok(())
    }

    /// Topological order of the nodes.
    ///
    /// Among nodes that are ready at the same time, declaration order wins,
    /// so the same graph always yields the same order. A cycle is a
    /// validation error.
    pub fn execution_order(&self) -> Result<Vec<WorkflowNode>> {
        self.validate()?;

        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            let (from, to) = (index[edge.source.as_str()], index[edge.target.as_str()]);
            successors[from].push(to);
            in_degree[to] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(next) = ready.pop_first() {
            order.push(self.nodes[next].clone());
            for &succ in &successors[next] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.insert(succ);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(ConductorError::Validation("Workflow graph contains a cycle".into()));
        }
        Ok(order)
    }
}
