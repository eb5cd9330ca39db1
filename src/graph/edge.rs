//! Edge representation with incrementally merged strength

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique edge identity: (source, target, relation).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub relation: String,
}

impl EdgeKey {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
        }
    }
}

/// A directed, relation-labeled edge.
///
/// May only exist between nodes that already exist. Strength follows the
/// same running-average merge as node importance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    /// Relation label text (vocabulary member)
    pub relation: String,
    /// Running-average relation strength
    pub strength: f64,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Only ever increases
    #[serde(default = "one")]
    pub occurrences: u64,
}

fn one() -> u64 {
    1
}

impl GraphEdge {
    pub fn new(key: &EdgeKey, strength: f64) -> Self {
        let now = Utc::now();
        Self {
            source: key.source.clone(),
            target: key.target.clone(),
            relation: key.relation.clone(),
            strength,
            first_seen: Some(now),
            last_updated: Some(now),
            occurrences: 1,
        }
    }

    /// This edge's map key.
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(&self.source, &self.target, &self.relation)
    }

    /// Whether the edge touches the given node.
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }

    /// Fold one more observation into the running average.
    pub fn observe(&mut self, strength: f64) {
        self.occurrences += 1;
        let n = self.occurrences as f64;
        self.strength = (self.strength * (n - 1.0) + strength) / n;
        self.last_updated = Some(Utc::now());
    }
}
