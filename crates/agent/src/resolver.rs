use std::fmt::Write as _;
use std::sync::Arc;

use concierge_core::knowledge::{KnowledgeCorpus, RetrievalOutcome};

use crate::llm::LlmClient;

const RESOLVER_SYSTEM: &str = "You are a support answerer. Given a user query and candidate \
    knowledge snippets, compose a concise, accurate answer. If confidence is low, say \
    'ESCALATE' only.";

const SNIPPET_CHARS: usize = 200;

/// Answers knowledge questions from the static corpus: similarity-scored
/// retrieval first, then an LLM pass to compose the reply from the snippets.
pub struct KnowledgeResolver {
    corpus: Arc<KnowledgeCorpus>,
    llm: Arc<dyn LlmClient>,
    min_confidence: f64,
    top_k: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResolveOutcome {
    Answered { answer: String, article_id: String, confidence: f64 },
    NoAnswer { best_score: f64, reason: NoAnswerReason },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoAnswerReason {
    LowConfidence,
    ModelDeclined,
}

impl KnowledgeResolver {
    pub fn new(
        corpus: Arc<KnowledgeCorpus>,
        llm: Arc<dyn LlmClient>,
        min_confidence: f64,
        top_k: usize,
    ) -> Self {
        Self { corpus, llm, min_confidence, top_k }
    }

    pub async fn resolve(&self, query: &str) -> ResolveOutcome {
        let retrieval = self.corpus.retrieve(query, self.top_k, self.min_confidence);
        let Some(best) = retrieval.best().filter(|_| retrieval.meets_threshold).cloned() else {
            return ResolveOutcome::NoAnswer {
                best_score: retrieval.best_score,
                reason: NoAnswerReason::LowConfidence,
            };
        };

        match self.llm.complete(RESOLVER_SYSTEM, &compose_prompt(query, &retrieval)).await {
            Ok(content) if content.trim().eq_ignore_ascii_case("escalate") => {
                ResolveOutcome::NoAnswer {
                    best_score: retrieval.best_score,
                    reason: NoAnswerReason::ModelDeclined,
                }
            }
            Ok(content) => ResolveOutcome::Answered {
                answer: content,
                article_id: best.article.id,
                confidence: retrieval.best_score,
            },
            Err(error) => {
                // A confident retrieval still answers when the composer is
                // down: fall back to the article body itself.
                tracing::warn!(
                    event_name = "resolver.compose_failed",
                    error = %error,
                    article_id = %best.article.id,
                    "answer composition failed; returning article body"
                );
                ResolveOutcome::Answered {
                    answer: best.article.body,
                    article_id: best.article.id,
                    confidence: retrieval.best_score,
                }
            }
        }
    }
}

fn compose_prompt(query: &str, retrieval: &RetrievalOutcome) -> String {
    let mut prompt = format!("Query: {query}\n\nSnippets:\n");
    for hit in &retrieval.results {
        let _ = writeln!(
            prompt,
            "- {}: {} (score={:.3})",
            hit.article.title,
            hit.snippet(SNIPPET_CHARS),
            hit.score
        );
    }
    let _ = write!(prompt, "\nBest score: {:.3}", retrieval.best_score);
    prompt
}
