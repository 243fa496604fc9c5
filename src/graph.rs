//! Property graph over an embedded ordered key/value store.
//!
//! Nodes and edges are JSON records in a single redb table, discriminated by
//! key prefix:
//!
//! | Key | Value |
//! |-----|-------|
//! | `node:<id>` | serialized [`Node`] |
//! | `edge:<from>:<type>:<to>` | serialized [`Edge`] |
//! | `out:<from>` | newline-delimited outgoing edge keys |
//! | `in:<to>` | newline-delimited incoming edge keys |
//!
//! [`GraphStore::add_edge`] writes the edge record and appends to both
//! adjacency lists inside one write transaction, so a reader never observes
//! an adjacency entry without its edge record. Re-adding an existing edge
//! rewrites the record and leaves the adjacency lists untouched.

use std::collections::HashSet;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const GRAPH: TableDefinition<&str, &[u8]> = TableDefinition::new("graph");

/// A typed graph node. `Document`, `Chunk`, and `Entity` are the types the
/// indexer produces; the store itself does not restrict the set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub props: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_ref: Option<String>,
    pub created_at: i64,
}

/// A directed typed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub props: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub weight: f32,
}

fn is_zero(w: &f32) -> bool {
    *w == 0.0
}

pub struct GraphStore {
    db: Database,
}

impl GraphStore {
    /// Open (creating if needed) the graph database under `<data_dir>/graph`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let base_dir = data_dir.join("graph");
        std::fs::create_dir_all(&base_dir)?;

        let db = Database::create(base_dir.join("graph.redb"))?;

        let txn = db.begin_write()?;
        txn.open_table(GRAPH)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Insert or replace a node.
    pub fn add_node(&self, node: &Node) -> Result<()> {
        let key = format!("node:{}", node.id);
        let value = serde_json::to_vec(node)?;

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(GRAPH)?;
            table.insert(key.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Fetch a node by id.
    pub fn get_node(&self, id: &str) -> Result<Node> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(GRAPH)?;

        let key = format!("node:{id}");
        let Some(guard) = table.get(key.as_str())? else {
            return Err(Error::NotFound {
                kind: "node",
                name: id.to_string(),
            });
        };

        Ok(serde_json::from_slice(guard.value())?)
    }

    /// Insert or replace an edge, maintaining both adjacency lists.
    ///
    /// The edge record and the two list appends happen in one transaction.
    /// If the edge record already exists, only the record is rewritten —
    /// the adjacency lists already reference it.
    pub fn add_edge(&self, edge: &Edge) -> Result<()> {
        let edge_key = format!("edge:{}:{}:{}", edge.from, edge.edge_type, edge.to);
        let value = serde_json::to_vec(edge)?;

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(GRAPH)?;

            let existed = table.get(edge_key.as_str())?.is_some();
            table.insert(edge_key.as_str(), value.as_slice())?;

            if !existed {
                for list_key in [format!("out:{}", edge.from), format!("in:{}", edge.to)] {
                    let mut list = match table.get(list_key.as_str())? {
                        Some(guard) => guard.value().to_vec(),
                        None => Vec::new(),
                    };
                    list.extend_from_slice(edge_key.as_bytes());
                    list.push(b'\n');
                    table.insert(list_key.as_str(), list.as_slice())?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// All outgoing edges of a node, in insertion order. A node with no
    /// adjacency entry yields an empty list.
    pub fn edges_from(&self, id: &str) -> Result<Vec<Edge>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(GRAPH)?;

        let list_key = format!("out:{id}");
        let Some(guard) = table.get(list_key.as_str())? else {
            return Ok(Vec::new());
        };

        let mut edges = Vec::new();
        for edge_key in guard.value().split(|b| *b == b'\n') {
            if edge_key.is_empty() {
                continue;
            }
            let key = String::from_utf8_lossy(edge_key);
            if let Some(record) = table.get(key.as_ref())? {
                if let Ok(edge) = serde_json::from_slice::<Edge>(record.value()) {
                    edges.push(edge);
                }
            }
        }
        Ok(edges)
    }

    /// Scan nodes, optionally filtered by exact type and by a
    /// case-insensitive substring match over id and label. Results follow
    /// key order, capped at `limit`.
    pub fn search_nodes(
        &self,
        node_type: Option<&str>,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Node>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(GRAPH)?;

        let needle = query.map(str::to_lowercase).filter(|q| !q.is_empty());

        let mut nodes = Vec::new();
        for entry in table.range("node:"..)? {
            if nodes.len() >= limit {
                break;
            }
            let (key, value) = entry?;
            if !key.value().starts_with("node:") {
                break;
            }

            let node: Node = match serde_json::from_slice(value.value()) {
                Ok(node) => node,
                Err(_) => continue,
            };

            if let Some(t) = node_type {
                if node.node_type != t {
                    continue;
                }
            }
            if let Some(ref q) = needle {
                if !node.id.to_lowercase().contains(q) && !node.label.to_lowercase().contains(q) {
                    continue;
                }
            }

            nodes.push(node);
        }
        Ok(nodes)
    }

    /// Bounded breadth-first traversal from `start` over outgoing edges.
    ///
    /// `edge_type` restricts which edges are followed (`None` follows all).
    /// The frontier advances one level per depth unit, so a node reachable
    /// only through a path longer than `depth` is never visited. Depth is
    /// clamped to `[1, 10]`; each node is emitted at most once, in FIFO
    /// discovery order, starting with `start` itself.
    pub fn traverse(&self, start: &str, edge_type: Option<&str>, depth: usize) -> Result<Vec<Node>> {
        let depth = depth.clamp(1, 10);

        let mut visited: HashSet<String> = HashSet::new();
        let mut result = Vec::new();
        let mut frontier = vec![start.to_string()];
        visited.insert(start.to_string());

        if let Ok(node) = self.get_node(start) {
            result.push(node);
        }

        for _ in 0..depth {
            let mut next = Vec::new();
            for id in &frontier {
                for edge in self.edges_from(id)? {
                    let followed = edge_type.is_none_or(|t| edge.edge_type == t);
                    if followed && visited.insert(edge.to.clone()) {
                        if let Ok(node) = self.get_node(&edge.to) {
                            result.push(node);
                        }
                        next.push(edge.to);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(result)
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, GraphStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = GraphStore::open(tmp.path()).unwrap();
        (tmp, store)
    }

    fn node(id: &str, node_type: &str, label: &str) -> Node {
        Node {
            id: id.to_string(),
            node_type: node_type.to_string(),
            label: label.to_string(),
            props: serde_json::Map::new(),
            blob_ref: None,
            created_at: 0,
        }
    }

    fn edge(from: &str, edge_type: &str, to: &str) -> Edge {
        Edge {
            from: from.to_string(),
            to: to.to_string(),
            edge_type: edge_type.to_string(),
            label: String::new(),
            props: serde_json::Map::new(),
            weight: 0.0,
        }
    }

    #[test]
    fn add_and_get_node() {
        let (_tmp, store) = test_store();
        store.add_node(&node("doc:1", "Document", "one.txt")).unwrap();

        let got = store.get_node("doc:1").unwrap();
        assert_eq!(got.node_type, "Document");
        assert_eq!(got.label, "one.txt");
    }

    #[test]
    fn get_missing_node_is_not_found() {
        let (_tmp, store) = test_store();
        let err = store.get_node("doc:missing").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "node", .. }));
    }

    #[test]
    fn add_node_upserts() {
        let (_tmp, store) = test_store();
        store.add_node(&node("doc:1", "Document", "old")).unwrap();
        store.add_node(&node("doc:1", "Document", "new")).unwrap();
        assert_eq!(store.get_node("doc:1").unwrap().label, "new");
    }

    #[test]
    fn edges_from_lists_outgoing() {
        let (_tmp, store) = test_store();
        store.add_node(&node("doc:1", "Document", "d")).unwrap();
        store.add_node(&node("chunk:1:0", "Chunk", "c0")).unwrap();
        store.add_node(&node("chunk:1:1", "Chunk", "c1")).unwrap();
        store.add_edge(&edge("doc:1", "HAS_CHUNK", "chunk:1:0")).unwrap();
        store.add_edge(&edge("doc:1", "HAS_CHUNK", "chunk:1:1")).unwrap();

        let edges = store.edges_from("doc:1").unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].to, "chunk:1:0");
        assert_eq!(edges[1].to, "chunk:1:1");
    }

    #[test]
    fn re_adding_edge_does_not_duplicate_adjacency() {
        let (_tmp, store) = test_store();
        store.add_node(&node("doc:1", "Document", "d")).unwrap();
        store.add_node(&node("chunk:1:0", "Chunk", "c")).unwrap();
        store.add_edge(&edge("doc:1", "HAS_CHUNK", "chunk:1:0")).unwrap();
        store.add_edge(&edge("doc:1", "HAS_CHUNK", "chunk:1:0")).unwrap();

        assert_eq!(store.edges_from("doc:1").unwrap().len(), 1);
    }

    #[test]
    fn search_nodes_filters_by_type_and_substring() {
        let (_tmp, store) = test_store();
        store.add_node(&node("doc:1", "Document", "report.txt")).unwrap();
        store.add_node(&node("entity:john", "Entity", "John")).unwrap();
        store.add_node(&node("entity:jane", "Entity", "Jane")).unwrap();

        let entities = store.search_nodes(Some("Entity"), None, 10).unwrap();
        assert_eq!(entities.len(), 2);

        let johns = store.search_nodes(Some("Entity"), Some("JOHN"), 10).unwrap();
        assert_eq!(johns.len(), 1);
        assert_eq!(johns[0].label, "John");

        let capped = store.search_nodes(None, None, 2).unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn traverse_respects_depth() {
        let (_tmp, store) = test_store();
        // a -> b -> c -> d, one hop per level
        for id in ["a", "b", "c", "d"] {
            store.add_node(&node(id, "Entity", id)).unwrap();
        }
        store.add_edge(&edge("a", "LINK", "b")).unwrap();
        store.add_edge(&edge("b", "LINK", "c")).unwrap();
        store.add_edge(&edge("c", "LINK", "d")).unwrap();

        let one = store.traverse("a", None, 1).unwrap();
        assert_eq!(
            one.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let two = store.traverse("a", None, 2).unwrap();
        assert_eq!(two.len(), 3);

        // Depth clamps to 10; far beyond the chain just returns everything.
        let all = store.traverse("a", None, 99).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn traverse_filters_edge_type() {
        let (_tmp, store) = test_store();
        for id in ["doc:1", "chunk:1:0", "entity:x"] {
            store.add_node(&node(id, "Node", id)).unwrap();
        }
        store.add_edge(&edge("doc:1", "HAS_CHUNK", "chunk:1:0")).unwrap();
        store.add_edge(&edge("doc:1", "HAS_ENTITY", "entity:x")).unwrap();

        let chunks = store.traverse("doc:1", Some("HAS_CHUNK"), 3).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().any(|n| n.id == "chunk:1:0"));
        assert!(!chunks.iter().any(|n| n.id == "entity:x"));
    }

    #[test]
    fn traverse_visits_each_node_once() {
        let (_tmp, store) = test_store();
        for id in ["a", "b"] {
            store.add_node(&node(id, "Entity", id)).unwrap();
        }
        // Cycle a <-> b
        store.add_edge(&edge("a", "LINK", "b")).unwrap();
        store.add_edge(&edge("b", "LINK", "a")).unwrap();

        let nodes = store.traverse("a", None, 10).unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = GraphStore::open(tmp.path()).unwrap();
            store.add_node(&node("doc:1", "Document", "kept")).unwrap();
        }
        let store = GraphStore::open(tmp.path()).unwrap();
        assert_eq!(store.get_node("doc:1").unwrap().label, "kept");
    }
}
