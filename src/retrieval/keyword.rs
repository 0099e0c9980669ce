// src/retrieval/keyword.rs

use std::collections::HashMap;

use crate::retrieval::{Document, RetrievalStrategy, tokenize};

const K1: f64 = 1.5;
const B: f64 = 0.75;

/// Okapi BM25 over whitespace/punctuation tokens.
#[derive(Debug, Clone, Default)]
pub struct KeywordStrategy {
    /// Term frequencies per document.
    docs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    /// Number of documents containing each term.
    doc_freq: HashMap<String, usize>,
    avg_len: f64,
}

impl KeywordStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score(&self, doc: usize, query: &[String]) -> f64 {
        let tf = &self.docs[doc];
        let len = self.doc_lens[doc] as f64;
        let norm = if self.avg_len > 0.0 { len / self.avg_len } else { 0.0 };

        query
            .iter()
            .filter_map(|term| tf.get(term).map(|f| (term, *f as f64)))
            .map(|(term, f)| self.idf(term) * (f * (K1 + 1.0)) / (f + K1 * (1.0 - B + B * norm)))
            .sum()
    }
}

impl RetrievalStrategy for KeywordStrategy {
    fn name(&self) -> &str {
        "keyword"
    }

    fn index(&mut self, docs: &[Document]) {
        self.docs.clear();
        self.doc_lens.clear();
        self.doc_freq.clear();

        for doc in docs {
            let tokens = tokenize(&doc.text);
            let mut tf: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.clone()).or_default() += 1;
            }
            for term in tf.keys() {
                *self.doc_freq.entry(term.clone()).or_default() += 1;
            }
            self.doc_lens.push(tokens.len());
            self.docs.push(tf);
        }

        let total: usize = self.doc_lens.iter().sum();
        self.avg_len = if self.docs.is_empty() {
            0.0
        } else {
            total as f64 / self.docs.len() as f64
        };
    }

    fn search(&self, query: &str, top_k: usize) -> Vec<(usize, f64)> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        let mut hits: Vec<(usize, f64)> = (0..self.docs.len())
            .map(|i| (i, self.score(i, &terms)))
            .filter(|(_, s)| *s > 0.0)
            .collect();

        // Stable sort keeps index order among equal scores.
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(top_k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        Document::paragraphs(
            "notes",
            "build the project with make\n\nrun the tests with make test\n\nunrelated gardening tips",
        )
    }

    #[test]
    fn ranks_matching_documents_only() {
        let mut s = KeywordStrategy::new();
        s.index(&corpus());

        let hits = s.search("how to run tests", 5);
        assert_eq!(hits.first().map(|h| h.0), Some(1));
        assert!(hits.iter().all(|(i, _)| *i != 2));
    }

    #[test]
    fn empty_index_finds_nothing() {
        let s = KeywordStrategy::new();
        assert!(s.search("anything", 3).is_empty());
    }
}
