//! Static knowledge corpus with similarity-scored lookup.
//!
//! Articles are loaded once from a line-delimited JSON file and never mutated
//! at runtime. Scoring is plain token overlap in `[0, 1]`; an article's score
//! for a query is the better of its title score and its body score. Ties keep
//! first-seen corpus order, so retrieval is deterministic.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeArticle {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedArticle {
    pub article: KnowledgeArticle,
    pub score: f64,
}

impl RetrievedArticle {
    pub fn snippet(&self, max_chars: usize) -> String {
        if self.article.body.len() <= max_chars {
            return self.article.body.clone();
        }
        let cut = self
            .article
            .body
            .char_indices()
            .take_while(|(index, _)| *index < max_chars)
            .last()
            .map(|(index, character)| index + character.len_utf8())
            .unwrap_or(0);
        format!("{}...", &self.article.body[..cut])
    }
}

/// Result of scoring a query against the whole corpus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub results: Vec<RetrievedArticle>,
    pub best_score: f64,
    pub meets_threshold: bool,
}

impl RetrievalOutcome {
    pub fn best(&self) -> Option<&RetrievedArticle> {
        self.results.first()
    }
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("could not read corpus file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("malformed corpus line {line} in `{path}`: {source}")]
    Parse { path: PathBuf, line: usize, source: serde_json::Error },
}

#[derive(Clone, Debug, Default)]
pub struct KnowledgeCorpus {
    articles: Vec<KnowledgeArticle>,
}

impl KnowledgeCorpus {
    pub fn from_articles(articles: Vec<KnowledgeArticle>) -> Self {
        Self { articles }
    }

    /// Loads one JSON article per line. Blank lines are skipped; a malformed
    /// line fails the whole load rather than silently dropping an article.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|source| CorpusError::Read { path: path.to_path_buf(), source })?;

        let mut articles = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let article = serde_json::from_str::<KnowledgeArticle>(line).map_err(|source| {
                CorpusError::Parse { path: path.to_path_buf(), line: index + 1, source }
            })?;
            articles.push(article);
        }
        Ok(Self { articles })
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn articles(&self) -> &[KnowledgeArticle] {
        &self.articles
    }

    /// Scores every article against the query and keeps the `top_k` best.
    /// The sort is stable, so equal scores preserve corpus order.
    pub fn retrieve(&self, query: &str, top_k: usize, min_confidence: f64) -> RetrievalOutcome {
        let query_tokens = tokenize(query);
        let mut scored: Vec<RetrievedArticle> = self
            .articles
            .iter()
            .filter_map(|article| {
                let score = overlap_score(&tokenize(&article.title), &query_tokens)
                    .max(overlap_score(&tokenize(&article.body), &query_tokens));
                (score > 0.0)
                    .then(|| RetrievedArticle { article: article.clone(), score })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let best_score = scored.first().map(|hit| hit.score).unwrap_or(0.0);
        RetrievalOutcome {
            meets_threshold: best_score >= min_confidence,
            best_score,
            results: scored,
        }
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|character: char| !character.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
        .collect()
}

/// Fraction of query tokens present in the text, in `[0, 1]`.
fn overlap_score(text_tokens: &BTreeSet<String>, query_tokens: &BTreeSet<String>) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let overlap = query_tokens.intersection(text_tokens).count();
    overlap as f64 / query_tokens.len() as f64
}
