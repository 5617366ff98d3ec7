//! Reference Retriever
//!
//! In-memory similarity index over the clinical reference documents.
//! The contract is deliberately narrow: text in, ranked passages out,
//! each truncated to a bounded length, no scores exposed.

use crate::config::ReferenceConfig;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// One indexed passage with its precomputed term frequencies
struct Passage {
    text: String,
    terms: HashMap<String, f64>,
    norm: f64,
}

pub struct ReferenceIndex {
    passages: Vec<Passage>,
    top_k: usize,
    passage_max_chars: usize,
}

impl ReferenceIndex {
    /// Build an index from raw documents, chunking each one
    pub fn from_documents(documents: &[String], config: &ReferenceConfig) -> Self {
        let mut passages = Vec::new();

        for doc in documents {
            for chunk in chunk_text(doc, config.chunk_size, config.chunk_overlap) {
                let terms = term_frequencies(&chunk);
                if terms.is_empty() {
                    continue;
                }
                let norm = terms.values().map(|v| v * v).sum::<f64>().sqrt();
                passages.push(Passage {
                    text: chunk,
                    terms,
                    norm,
                });
            }
        }

        info!(passage_count = passages.len(), "Reference index built");

        Self {
            passages,
            top_k: config.top_k,
            passage_max_chars: config.passage_max_chars,
        }
    }

    /// Build an index from every readable text file under a directory.
    /// A missing directory yields an empty (still queryable) index.
    pub fn load_dir(config: &ReferenceConfig) -> Self {
        let mut documents = Vec::new();
        let dir = Path::new(&config.docs_dir);

        match std::fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if !path.is_file() {
                        continue;
                    }
                    match std::fs::read_to_string(&path) {
                        Ok(text) => documents.push(text),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Skipping unreadable reference document");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(dir = %config.docs_dir, error = %e, "Reference docs directory unavailable, index will be empty");
            }
        }

        Self::from_documents(&documents, config)
    }

    /// Top-k most relevant passages for a query, truncated to the bounded
    /// passage length. Relevance scores are internal.
    pub fn search(&self, query: &str) -> Vec<String> {
        self.search_top_k(query, self.top_k)
    }

    pub fn search_top_k(&self, query: &str, top_k: usize) -> Vec<String> {
        let query_terms = term_frequencies(query);
        if query_terms.is_empty() {
            return Vec::new();
        }
        let query_norm = query_terms.values().map(|v| v * v).sum::<f64>().sqrt();

        let mut scored: Vec<(f64, &Passage)> = self
            .passages
            .iter()
            .filter_map(|p| {
                let dot: f64 = query_terms
                    .iter()
                    .filter_map(|(term, qf)| p.terms.get(term).map(|pf| qf * pf))
                    .sum();
                if dot > 0.0 {
                    Some((dot / (query_norm * p.norm), p))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .map(|(_, p)| truncate_chars(&p.text, self.passage_max_chars))
            .collect()
    }

    pub fn passage_count(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Split text into overlapping chunks on whitespace boundaries. Cut
/// points are always snapped to char boundaries; reference documents are
/// arbitrary external files and may be non-ASCII throughout.
fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let hard_end = floor_char_boundary(text, (start + chunk_size).min(text.len()));
        let mut end = hard_end;
        // Back off to a whitespace boundary so terms are never split
        if hard_end < text.len() {
            if let Some(pos) = text[start..hard_end].rfind(char::is_whitespace) {
                if pos > 0 {
                    end = start + pos;
                }
            }
        }
        if end <= start {
            end = hard_end;
        }

        let chunk = text[start..end].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= text.len() {
            break;
        }
        start = ceil_char_boundary(text, start + step);
    }

    chunks
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index.min(text.len())
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut terms: HashMap<String, f64> = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
    {
        *terms.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    terms
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ReferenceConfig {
        ReferenceConfig {
            docs_dir: String::new(),
            top_k: 3,
            chunk_size: 1000,
            chunk_overlap: 200,
            passage_max_chars: 500,
        }
    }

    #[test]
    fn test_search_ranks_relevant_passage_first() {
        let docs = vec![
            "Dietary sodium restriction is central to managing chronic kidney disease. \
             Patients should limit sodium intake and monitor fluid balance daily."
                .to_string(),
            "Post-operative wound care requires keeping the incision clean and dry, \
             changing dressings as instructed by the surgical team."
                .to_string(),
        ];
        let index = ReferenceIndex::from_documents(&docs, &test_config());

        let results = index.search("sodium restriction for kidney disease");
        assert!(!results.is_empty());
        assert!(results[0].contains("sodium"));
    }

    #[test]
    fn test_search_empty_query_returns_nothing() {
        let docs = vec!["Some clinical reference text about hydration.".to_string()];
        let index = ReferenceIndex::from_documents(&docs, &test_config());
        assert!(index.search("   ").is_empty());
    }

    #[test]
    fn test_passages_truncated_to_bound() {
        let mut config = test_config();
        config.passage_max_chars = 40;
        let long = "renal function ".repeat(100);
        let index = ReferenceIndex::from_documents(&[long], &config);
        let results = index.search("renal function");
        assert!(!results.is_empty());
        assert!(results[0].chars().count() <= 40);
    }

    #[test]
    fn test_chunking_overlaps() {
        let word = "hypertension ";
        let text = word.repeat(200); // well past one chunk
        let chunks = chunk_text(&text, 1000, 200);
        assert!(chunks.len() > 1);
        // every chunk stays within the configured size
        assert!(chunks.iter().all(|c| c.len() <= 1000));
    }

    #[test]
    fn test_chunking_multibyte_text_stays_on_char_boundaries() {
        // every char is 3 bytes and there is no whitespace to back off to
        let text = "€".repeat(400); // 1200 bytes, past one chunk
        let chunks = chunk_text(&text, 1000, 200);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chars().all(|ch| ch == '€')));

        // mixed multi-byte words split on whitespace, never mid-character
        let mixed = "κρεατίνη νεφρική λειτουργία ".repeat(60);
        let chunks = chunk_text(&mixed, 1000, 200);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 1000));
    }

    #[test]
    fn test_multibyte_documents_are_searchable() {
        let docs = vec!["διατροφή: περιορισμός νατρίου και καλίου ".repeat(50)];
        let index = ReferenceIndex::from_documents(&docs, &test_config());
        assert!(!index.is_empty());
        assert!(!index.search("νατρίου").is_empty());
    }

    #[test]
    fn test_missing_dir_builds_empty_index() {
        let mut config = test_config();
        config.docs_dir = "/nonexistent/reference_docs".to_string();
        let index = ReferenceIndex::load_dir(&config);
        assert!(index.is_empty());
        assert!(index.search("anything").is_empty());
    }
}
