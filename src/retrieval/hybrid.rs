// src/retrieval/hybrid.rs

use std::collections::HashMap;

use tracing::debug;

use crate::retrieval::{ContextSnippet, Document, RetrievalStrategy, Retriever};

/// Weighted merge of several [`RetrievalStrategy`]s over one corpus.
///
/// Weights are normalised to sum to 1 whenever a strategy is added. Each
/// strategy is asked for `2 * top_k` hits; a document's final score is the
/// weighted sum of its per-strategy scores.
#[derive(Default)]
pub struct HybridRetriever {
    docs: Vec<Document>,
    strategies: Vec<(Box<dyn RetrievalStrategy>, f64)>,
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<(&str, f64)> = self
            .strategies
            .iter()
            .map(|(s, w)| (s.name(), *w))
            .collect();
        f.debug_struct("HybridRetriever")
            .field("docs", &self.docs.len())
            .field("strategies", &names)
            .finish()
    }
}

impl HybridRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a strategy with a relative weight; the current corpus is indexed
    /// into it immediately.
    pub fn with_strategy(mut self, mut strategy: Box<dyn RetrievalStrategy>, weight: f64) -> Self {
        strategy.index(&self.docs);
        self.strategies.push((strategy, weight.max(0.0)));
        self.normalise();
        self
    }

    pub fn index(&mut self, docs: Vec<Document>) {
        for (strategy, _) in &mut self.strategies {
            strategy.index(&docs);
        }
        self.docs = docs;
    }

    pub fn weights(&self) -> Vec<(&str, f64)> {
        self.strategies.iter().map(|(s, w)| (s.name(), *w)).collect()
    }

    fn normalise(&mut self) {
        let total: f64 = self.strategies.iter().map(|(_, w)| *w).sum();
        if total <= 0.0 {
            let even = 1.0 / self.strategies.len().max(1) as f64;
            for (_, w) in &mut self.strategies {
                *w = even;
            }
            return;
        }
        for (_, w) in &mut self.strategies {
            *w /= total;
        }
    }
}

impl Retriever for HybridRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Vec<ContextSnippet> {
        if top_k == 0 {
            return Vec::new();
        }

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for (strategy, weight) in &self.strategies {
            for (doc, score) in strategy.search(query, top_k * 2) {
                *scores.entry(doc).or_default() += weight * score;
            }
        }

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(top_k);

        debug!(query = %query, hits = ranked.len(), "hybrid retrieval");

        ranked
            .into_iter()
            .filter_map(|(i, score)| {
                self.docs.get(i).map(|doc| ContextSnippet {
                    text: doc.text.clone(),
                    score,
                    source: Some(doc.source.clone()),
                })
            })
            .collect()
    }
}
