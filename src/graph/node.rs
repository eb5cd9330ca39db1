//! Node representation in the knowledge graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A node in the knowledge graph.
///
/// Keyed by document/concept identity (note stem or canonical term).
/// Created on first reference; never deleted except by an explicit clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Identity: note stem or canonical concept term
    pub id: String,
    /// Display label
    pub label: String,
    /// Node kind (e.g. "concept", "keyword")
    pub node_type: String,
    /// Running-average importance weight across occurrences
    pub importance: f64,
    /// When the node was first referenced
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    /// When the node was last updated
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// How many times the node has been referenced; only ever increases
    #[serde(default = "one")]
    pub occurrences: u64,
}

fn one() -> u64 {
    1
}

impl GraphNode {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        node_type: impl Into<String>,
        importance: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            label: label.into(),
            node_type: node_type.into(),
            importance,
            first_seen: Some(now),
            last_updated: Some(now),
            occurrences: 1,
        }
    }

    /// Fold one more observation into the running average.
    ///
    /// `importance' = (importance * (n-1) + new) / n` with n the
    /// post-increment occurrence count.
    pub fn observe(&mut self, importance: f64) {
        self.occurrences += 1;
        let n = self.occurrences as f64;
        self.importance = (self.importance * (n - 1.0) + importance) / n;
        self.last_updated = Some(Utc::now());
    }
}
