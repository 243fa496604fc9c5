//! Retrieval façade: query embedding, candidate filtering, paging.
//!
//! A search embeds the query (reader lock on the embedder), asks the vector
//! index for `k + offset` candidates, filters by substring matches on the
//! metadata JSON, and slices out the requested window. `total` reports the
//! unfiltered candidate count; `next_offset` is present iff more candidates
//! exist past the window.

use parking_lot::RwLock;
use serde::Serialize;

use crate::embedder::LexicalEmbedder;
use crate::error::Result;
use crate::vector::{VectorHit, VectorIndex};

/// Parameters of one search call, already validated by the caller.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Window size, `1..=100`.
    pub k: usize,
    pub offset: usize,
    /// Matches `"file_type":"<t>` or `"content_type":"<t>` in the metadata.
    pub type_filter: Option<String>,
    /// Substring match anywhere in the metadata (in practice, the path).
    pub path_filter: Option<String>,
}

/// One page of ranked results.
#[derive(Debug, Serialize)]
pub struct SearchPage {
    pub query: String,
    pub results: Vec<VectorHit>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

/// Run a search against the embedder + vector index pair.
pub fn search_chunks(
    embedder: &RwLock<LexicalEmbedder>,
    index: &RwLock<VectorIndex>,
    req: &SearchRequest,
) -> Result<SearchPage> {
    let k = req.k.max(1);
    let query_vec = embedder.read().embed(&req.query);

    // One past the window, so next_offset can report whether more exist.
    let candidates = index.read().search(&query_vec, k + req.offset + 1)?;
    let total = candidates.len();

    let filtered: Vec<VectorHit> = candidates
        .into_iter()
        .filter(|hit| matches_filters(hit, req))
        .collect();

    let results: Vec<VectorHit> = filtered.into_iter().skip(req.offset).take(k).collect();

    Ok(SearchPage {
        query: req.query.clone(),
        results,
        total,
        offset: req.offset,
        limit: k,
        page: req.offset / k + 1,
        next_offset: (total > req.offset + k).then_some(req.offset + k),
    })
}

fn matches_filters(hit: &VectorHit, req: &SearchRequest) -> bool {
    if let Some(ref t) = req.type_filter {
        let by_file = format!("\"file_type\":\"{t}");
        let by_content = format!("\"content_type\":\"{t}");
        if !hit.meta.contains(&by_file) && !hit.meta.contains(&by_content) {
            return false;
        }
    }

    if let Some(ref p) = req.path_filter {
        if !hit.meta.contains(p.as_str()) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(meta: &str) -> VectorHit {
        VectorHit {
            id: "chunk:x:0:h".to_string(),
            score: 0.5,
            meta: meta.to_string(),
        }
    }

    fn req(type_filter: Option<&str>, path_filter: Option<&str>) -> SearchRequest {
        SearchRequest {
            query: "q".to_string(),
            k: 10,
            offset: 0,
            type_filter: type_filter.map(String::from),
            path_filter: path_filter.map(String::from),
        }
    }

    #[test]
    fn type_filter_matches_file_type_prefix() {
        let h = hit(r#"{"doc_id":"doc:x","chunk":0,"path":"/t/a.md","file_type":"markdown","content_type":"text/markdown"}"#);
        assert!(matches_filters(&h, &req(Some("md"), None)));
        assert!(matches_filters(&h, &req(Some("markdown"), None)));
        assert!(!matches_filters(&h, &req(Some("pdf"), None)));
    }

    #[test]
    fn type_filter_also_matches_content_type() {
        let h = hit(r#"{"doc_id":"doc:x","chunk":0,"path":"/t/a.bin","file_type":"unknown","content_type":"application/json"}"#);
        assert!(matches_filters(&h, &req(Some("application/json"), None)));
    }

    #[test]
    fn path_filter_is_substring() {
        let h = hit(r#"{"doc_id":"doc:x","chunk":0,"path":"/home/me/notes/a.txt","file_type":"text","content_type":"text/plain"}"#);
        assert!(matches_filters(&h, &req(None, Some("notes"))));
        assert!(!matches_filters(&h, &req(None, Some("projects"))));
    }

    #[test]
    fn both_filters_must_match() {
        let h = hit(r#"{"doc_id":"doc:x","chunk":0,"path":"/t/a.md","file_type":"markdown","content_type":"text/markdown"}"#);
        assert!(matches_filters(&h, &req(Some("md"), Some("/t/"))));
        assert!(!matches_filters(&h, &req(Some("md"), Some("/other/"))));
    }
}
