//! The knowledge graph store
//!
//! Owned, in-memory node/edge maps with a durable JSON snapshot. The
//! pipeline holds the store behind a single async mutex; nothing here is
//! shared mutable state.

use super::edge::{EdgeKey, GraphEdge};
use super::node::GraphNode;
use crate::rewrite::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from graph persistence.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Self-describing snapshot document: everything needed to reconstruct
/// the in-memory graph. Read permissively; written completely.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

/// The personal knowledge graph.
#[derive(Debug)]
pub struct KnowledgeGraph {
    nodes: HashMap<String, GraphNode>,
    edges: HashMap<EdgeKey, GraphEdge>,
    storage_path: PathBuf,
}

impl KnowledgeGraph {
    /// Create an empty graph that persists to `storage_path`.
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            storage_path: storage_path.into(),
        }
    }

    /// Open the graph at `storage_path`, loading an existing snapshot.
    ///
    /// A missing snapshot yields an empty graph; a corrupt one is
    /// reported as a warning and likewise yields an empty graph. Startup
    /// never fails on snapshot problems.
    pub fn open(storage_path: impl Into<PathBuf>) -> Self {
        let mut graph = Self::new(storage_path);
        graph.load(None);
        graph
    }

    /// Add a node, or merge an observation into an existing one.
    ///
    /// Existing nodes keep their identity and label; importance is merged
    /// by running average and the occurrence count increments.
    pub fn add_node(
        &mut self,
        id: &str,
        label: &str,
        node_type: &str,
        importance: f64,
    ) -> GraphNode {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.observe(importance);
                node.clone()
            }
            None => {
                let node = GraphNode::new(id, label, node_type, importance);
                self.nodes.insert(id.to_string(), node.clone());
                node
            }
        }
    }

    /// Add an edge, or merge an observation into an existing one.
    ///
    /// Returns `None` when either endpoint node does not exist: a
    /// dangling edge is never created.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        relation: &str,
        strength: f64,
    ) -> Option<GraphEdge> {
        if !self.nodes.contains_key(source) || !self.nodes.contains_key(target) {
            return None;
        }
        let key = EdgeKey::new(source, target, relation);
        match self.edges.get_mut(&key) {
            Some(edge) => {
                edge.observe(strength);
                Some(edge.clone())
            }
            None => {
                let edge = GraphEdge::new(&key, strength);
                self.edges.insert(key, edge.clone());
                Some(edge)
            }
        }
    }

    pub fn get_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// All edges, or only those touching `node_id`.
    pub fn get_edges(&self, node_id: Option<&str>) -> Vec<&GraphEdge> {
        match node_id {
            None => self.edges.values().collect(),
            Some(id) => self.edges.values().filter(|e| e.touches(id)).collect(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Remove all nodes and edges.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    /// Snapshot the full graph state.
    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    /// Persist a complete snapshot.
    ///
    /// The write is staged and committed by rename, so a concurrent
    /// reader of the snapshot file never observes a partial graph.
    /// Failures propagate: the operator must know the snapshot is stale.
    pub fn save(&self, path: Option<&Path>) -> GraphResult<()> {
        let path = path.unwrap_or(&self.storage_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.to_snapshot())?;
        write_atomic(path, &json)?;
        debug!(path = %path.display(), nodes = self.nodes.len(), edges = self.edges.len(), "graph snapshot saved");
        Ok(())
    }

    /// Load a snapshot, replacing in-memory state.
    ///
    /// Missing file: empty graph, no complaint. Corrupt file: warning,
    /// empty graph. Neither is fatal.
    pub fn load(&mut self, path: Option<&Path>) {
        let path = path.unwrap_or(&self.storage_path).to_path_buf();
        self.nodes.clear();
        self.edges.clear();

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read graph snapshot, starting empty");
                return;
            }
        };

        let snapshot: GraphSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt graph snapshot, starting empty");
                return;
            }
        };

        for node in snapshot.nodes {
            self.nodes.insert(node.id.clone(), node);
        }
        for edge in snapshot.edges {
            self.edges.insert(edge.key(), edge);
        }
    }
}
