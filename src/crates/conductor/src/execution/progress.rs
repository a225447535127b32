//! Live progress reporting
//!
//! The tracker keeps a small, bounded record that is written to the store
//! after every node. Subscribers may additionally receive every
//! [`ProgressUpdate`] over an mpsc channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use super::node::NodeOutput;

/// Maximum characters of node output kept as the live preview
pub const PREVIEW_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Completed,
    Failed,
}

/// One node-level progress event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub execution_id: String,
    pub node_id: String,
    pub node_name: String,
    /// Percentage, 0-100
    pub progress: u8,
    pub status: ProgressStatus,
    pub timestamp: DateTime<Utc>,
}

/// The live fields of an execution record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveProgress {
    pub progress: u8,
    pub current_node: Option<String>,
    pub preview: Option<String>,
    pub tokens_used: u64,
    pub cost: f64,
    pub word_count: u64,
}

/// Per-execution progress bookkeeping
pub struct ProgressTracker {
    execution_id: String,
    total_nodes: usize,
    live: LiveProgress,
    sender: Option<mpsc::Sender<ProgressUpdate>>,
}

impl ProgressTracker {
    pub fn new(execution_id: impl Into<String>, total_nodes: usize) -> Self {
        Self {
            execution_id: execution_id.into(),
            total_nodes,
            live: LiveProgress::default(),
            sender: None,
        }
    }

    /// Also deliver every update to `sender`; a full or closed channel drops updates
    pub fn with_sender(mut self, sender: mpsc::Sender<ProgressUpdate>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Seed counters from outputs completed before a resume
    pub fn restore<'a>(&mut self, outputs: impl IntoIterator<Item = &'a NodeOutput>, completed: usize) {
        for output in outputs {
            self.live.tokens_used += output.tokens_used;
            self.live.cost += output.cost;
            self.live.word_count += output.word_count;
        }
        self.live.progress = self.percent(completed);
    }

    pub fn live(&self) -> &LiveProgress {
        &self.live
    }

    pub fn node_completed(
        &mut self,
        node_index: usize,
        node_id: &str,
        node_name: &str,
        output: &NodeOutput,
    ) -> ProgressUpdate {
        self.live.progress = self.percent(node_index + 1);
        self.live.current_node = Some(node_id.to_string());
        self.live.preview = Some(truncate_chars(&output.as_text(), PREVIEW_LIMIT));
        self.live.tokens_used += output.tokens_used;
        self.live.cost += output.cost;
        self.live.word_count += output.word_count;
        self.emit(node_id, node_name, ProgressStatus::Completed)
    }

    pub fn node_failed(&mut self, node_id: &str, node_name: &str) -> ProgressUpdate {
        self.live.current_node = Some(node_id.to_string());
        self.emit(node_id, node_name, ProgressStatus::Failed)
    }

    fn percent(&self, completed: usize) -> u8 {
        if self.total_nodes == 0 {
            return 100;
        }
        ((completed * 100) / self.total_nodes).min(100) as u8
    }

    fn emit(&self, node_id: &str, node_name: &str, status: ProgressStatus) -> ProgressUpdate {
        let update = ProgressUpdate {
            execution_id: self.execution_id.clone(),
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
            progress: self.live.progress,
            status,
            timestamp: Utc::now(),
        };
        if let Some(sender) = &self.sender {
            if sender.try_send(update.clone()).is_err() {
                tracing::debug!("Dropped progress update for {}", self.execution_id);
            }
        }
        update
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
