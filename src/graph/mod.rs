//! Core graph data structures and the persistent store

mod edge;
mod node;
mod store;

pub use edge::{EdgeKey, GraphEdge};
pub use node::GraphNode;
pub use store::{GraphError, GraphResult, GraphSnapshot, KnowledgeGraph};
