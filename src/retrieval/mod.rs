// src/retrieval/mod.rs

//! Supporting-context retrieval.
//!
//! The orchestration core only consumes an ordered list of snippets from a
//! [`Retriever`]; ranking lives here. Results are sorted by descending
//! score with ties kept in document insertion order.
//!
//! - [`keyword`] is a BM25-style lexical strategy.
//! - [`hybrid`] merges several strategies by weight.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::fs::FileSystem;

pub mod hybrid;
pub mod keyword;

pub use hybrid::HybridRetriever;
pub use keyword::KeywordStrategy;

/// A retrieved piece of context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub text: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A searchable chunk of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub text: String,
}

impl Document {
    /// Split `text` into paragraph documents (separated by blank lines).
    pub fn paragraphs(source: &str, text: &str) -> Vec<Document> {
        text.split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| Document {
                source: source.to_string(),
                text: p.to_string(),
            })
            .collect()
    }
}

/// Supplies ranked context for a query.
pub trait Retriever: Send + Sync {
    /// At most `top_k` snippets, best first.
    fn retrieve(&self, query: &str, top_k: usize) -> Vec<ContextSnippet>;
}

/// One scoring approach inside a [`HybridRetriever`].
pub trait RetrievalStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Replace the indexed corpus.
    fn index(&mut self, docs: &[Document]);

    /// `(document index, score)` pairs with a positive score, at most `top_k`.
    fn search(&self, query: &str, top_k: usize) -> Vec<(usize, f64)>;
}

/// Read the given files and split them into paragraph documents.
///
/// Missing files are skipped with a warning.
pub fn load_documents<P: AsRef<Path>>(fs: &dyn FileSystem, paths: &[P]) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if !fs.exists(path) {
            tracing::warn!(path = %path.display(), "retrieval file not found; skipping");
            continue;
        }
        let text = fs.read_to_string(path)?;
        docs.extend(Document::paragraphs(&path.display().to_string(), &text));
    }
    Ok(docs)
}

/// Lowercased alphanumeric tokens.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn paragraphs_skip_blank_chunks() {
        let docs = Document::paragraphs("README.md", "intro\n\n\n\nusage: run it\n\n  ");
        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["intro", "usage: run it"]);
    }

    #[test]
    fn tokenizer_lowercases_and_splits() {
        assert_eq!(tokenize("Run `cargo-test` NOW"), vec!["run", "cargo", "test", "now"]);
    }

    #[test]
    fn load_documents_skips_missing_files() {
        let fs = MockFileSystem::new();
        fs.add_file("docs/a.md", "alpha\n\nbeta");
        let docs = load_documents(&fs, &["docs/a.md", "docs/missing.md"]).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source, "docs/a.md");
    }
}
