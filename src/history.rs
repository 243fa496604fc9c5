//! Search history and saved searches.
//!
//! Both are small JSON files rewritten on every mutation. History is
//! most-recent-first and deduplicated by query text; saved searches are a
//! flat list with uuid identifiers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

const HISTORY_MAX: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub results: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchHistory {
    searches: Vec<HistoryEntry>,
    #[serde(skip)]
    path: PathBuf,
}

impl SearchHistory {
    /// Load from `<data_dir>/search_history.json`; absent file means empty.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("search_history.json");
        let searches = std::fs::read(&path)
            .ok()
            .and_then(|data| serde_json::from_slice::<SearchHistory>(&data).ok())
            .map(|h| h.searches)
            .unwrap_or_default();
        Self { searches, path }
    }

    /// Record a query at the front, dropping any older entry with the same
    /// text and trimming to the cap.
    pub fn add(&mut self, query: &str, results: usize) -> Result<()> {
        self.searches.retain(|e| e.query != query);
        self.searches.insert(
            0,
            HistoryEntry {
                query: query.to_string(),
                timestamp: Utc::now(),
                results,
            },
        );
        self.searches.truncate(HISTORY_MAX);
        self.save()
    }

    pub fn recent(&self, limit: usize) -> &[HistoryEntry] {
        let end = limit.min(self.searches.len());
        &self.searches[..end]
    }

    pub fn clear(&mut self) -> Result<()> {
        self.searches.clear();
        self.save()
    }

    fn save(&self) -> Result<()> {
        std::fs::write(&self.path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: String,
    pub name: String,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SavedSearches {
    saved: Vec<SavedSearch>,
    #[serde(skip)]
    path: PathBuf,
}

impl SavedSearches {
    /// Load from `<data_dir>/saved_searches.json`; absent file means empty.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("saved_searches.json");
        let saved = std::fs::read(&path)
            .ok()
            .and_then(|data| serde_json::from_slice::<SavedSearches>(&data).ok())
            .map(|s| s.saved)
            .unwrap_or_default();
        Self { saved, path }
    }

    pub fn add(&mut self, name: &str, query: &str) -> Result<SavedSearch> {
        let now = Utc::now();
        let search = SavedSearch {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            query: query.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.saved.push(search.clone());
        self.save()?;
        Ok(search)
    }

    /// Update by id. Returns `None` when the id is unknown.
    pub fn update(&mut self, id: &str, name: &str, query: &str) -> Result<Option<SavedSearch>> {
        let Some(entry) = self.saved.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        entry.name = name.to_string();
        entry.query = query.to_string();
        entry.updated_at = Utc::now();
        let updated = entry.clone();
        self.save()?;
        Ok(Some(updated))
    }

    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let before = self.saved.len();
        self.saved.retain(|s| s.id != id);
        let removed = self.saved.len() != before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn all(&self) -> &[SavedSearch] {
        &self.saved
    }

    fn save(&self) -> Result<()> {
        std::fs::write(&self.path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_most_recent_first() {
        let tmp = tempfile::tempdir().unwrap();
        let mut history = SearchHistory::load(tmp.path());
        history.add("first", 1).unwrap();
        history.add("second", 2).unwrap();

        let recent = history.recent(10);
        assert_eq!(recent[0].query, "second");
        assert_eq!(recent[1].query, "first");
    }

    #[test]
    fn repeated_query_moves_to_front() {
        let tmp = tempfile::tempdir().unwrap();
        let mut history = SearchHistory::load(tmp.path());
        history.add("alpha", 1).unwrap();
        history.add("beta", 1).unwrap();
        history.add("alpha", 3).unwrap();

        let recent = history.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].query, "alpha");
        assert_eq!(recent[0].results, 3);
    }

    #[test]
    fn history_is_capped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut history = SearchHistory::load(tmp.path());
        for i in 0..150 {
            history.add(&format!("query {i}"), 0).unwrap();
        }
        assert_eq!(history.recent(usize::MAX).len(), HISTORY_MAX);
    }

    #[test]
    fn history_persists() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut history = SearchHistory::load(tmp.path());
            history.add("kept", 1).unwrap();
        }
        let history = SearchHistory::load(tmp.path());
        assert_eq!(history.recent(10)[0].query, "kept");
    }

    #[test]
    fn saved_search_crud() {
        let tmp = tempfile::tempdir().unwrap();
        let mut saved = SavedSearches::load(tmp.path());

        let entry = saved.add("work notes", "standup OR retro").unwrap();
        assert_eq!(saved.all().len(), 1);

        let updated = saved.update(&entry.id, "work", "standup").unwrap().unwrap();
        assert_eq!(updated.name, "work");
        assert!(updated.updated_at >= updated.created_at);

        assert!(saved.update("no-such-id", "x", "y").unwrap().is_none());

        assert!(saved.delete(&entry.id).unwrap());
        assert!(!saved.delete(&entry.id).unwrap());
        assert!(saved.all().is_empty());
    }

    #[test]
    fn saved_searches_persist() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut saved = SavedSearches::load(tmp.path());
            saved.add("pinned", "graph traversal").unwrap();
        }
        let saved = SavedSearches::load(tmp.path());
        assert_eq!(saved.all().len(), 1);
        assert_eq!(saved.all()[0].name, "pinned");
    }
}
