//! Session pipeline: document lifecycle, state machine, and answer cache.
//!
//! A session owns at most one document, at most one vector index, and one
//! answer cache. Loading a document under a new name tears down the
//! previous index and cache before any processing begins; re-loading the
//! same name while an index exists is a no-op. Questions are answerable
//! only in [`SessionState::Ready`]; elsewhere they are ignored rather
//! than treated as errors.
//!
//! Nothing here is persisted — index and cache die with the session.

use std::collections::HashMap;

use anyhow::Result;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::answer::{build_context, build_prompt, AnswerModel, LlmError};
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::extract::{extract_text, DocumentFormat};
use crate::index::VectorIndex;

/// Lifecycle of the session's single document slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No document loaded yet.
    Empty,
    /// A document was received and its index build is in progress.
    Indexing,
    /// Index built; questions can be answered.
    Ready,
    /// The last load failed; terminal until a new document is loaded.
    Error,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Empty => "empty",
            SessionState::Indexing => "indexing",
            SessionState::Ready => "ready",
            SessionState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Result of a document load.
#[derive(Debug)]
pub enum LoadOutcome {
    /// A fresh index was built with this many chunks.
    Indexed { chunks: usize },
    /// Same document name while an index exists: nothing was rebuilt and
    /// the answer cache was kept.
    Unchanged,
    /// The document was rejected (unsupported type, unreadable bytes, or
    /// no extractable text). The session is in [`SessionState::Error`].
    Rejected { reason: String },
}

/// Result of a question.
#[derive(Debug)]
pub enum AskOutcome {
    Answered { text: String, cached: bool },
    /// No answerable document loaded; the question was ignored.
    NotReady,
    /// The LLM rate-limited the request. Back off and resubmit; the
    /// question was not retried.
    RateLimited,
    /// Any other LLM failure. Index and cache stay valid for the next
    /// question.
    Failed { message: String },
}

pub struct Session {
    config: Config,
    embedder: Box<dyn Embedder>,
    model: Box<dyn AnswerModel>,
    state: SessionState,
    document: Option<String>,
    index: Option<VectorIndex>,
    cache: HashMap<String, String>,
}

impl Session {
    pub fn new(config: Config, embedder: Box<dyn Embedder>, model: Box<dyn AnswerModel>) -> Self {
        Self {
            config,
            embedder,
            model,
            state: SessionState::Empty,
            document: None,
            index: None,
            cache: HashMap::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Name of the currently recorded document, if any.
    pub fn document_name(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// Chunk count of the live index, if one exists.
    pub fn index_chunks(&self) -> Option<usize> {
        self.index.as_ref().map(|i| i.len())
    }

    pub fn cached_answers(&self) -> usize {
        self.cache.len()
    }

    /// Load a document into the session's single slot.
    ///
    /// Re-loading the currently recorded name while an index exists keeps
    /// the index and cache untouched. Any other name discards both before
    /// processing starts. Document problems land in `ERROR` and are
    /// reported through [`LoadOutcome::Rejected`]; an embedding provider
    /// failure during the index build also lands in `ERROR` (no partial
    /// index survives) and is propagated as an error.
    pub async fn load_document(&mut self, name: &str, bytes: &[u8]) -> Result<LoadOutcome> {
        if self.document.as_deref() == Some(name) && self.index.is_some() {
            info!(document = name, "document already indexed, keeping session");
            return Ok(LoadOutcome::Unchanged);
        }

        // New identity: previous index and cache go away before any
        // processing of the replacement begins.
        self.document = Some(name.to_string());
        self.index = None;
        self.cache.clear();
        self.state = SessionState::Indexing;

        let Some(format) = DocumentFormat::from_file_name(name) else {
            self.state = SessionState::Error;
            return Ok(LoadOutcome::Rejected {
                reason: format!("unsupported file type: {}", name),
            });
        };

        let text = match extract_text(bytes, format) {
            Ok(text) => text,
            Err(e) => {
                warn!(document = name, error = %e, "extraction failed");
                self.state = SessionState::Error;
                return Ok(LoadOutcome::Rejected {
                    reason: e.to_string(),
                });
            }
        };

        if text.trim().is_empty() {
            self.state = SessionState::Error;
            return Ok(LoadOutcome::Rejected {
                reason: "no readable text found in the document".to_string(),
            });
        }

        let chunks = chunk_text(
            &text,
            self.config.chunking.max_chars,
            self.config.chunking.overlap_chars,
        );

        match VectorIndex::build(chunks, self.embedder.as_ref(), self.config.embedding.batch_size)
            .await
        {
            Ok(index) => {
                let chunk_count = index.len();
                info!(document = name, chunks = chunk_count, "document indexed");
                self.index = Some(index);
                self.state = SessionState::Ready;
                Ok(LoadOutcome::Indexed {
                    chunks: chunk_count,
                })
            }
            Err(e) => {
                self.state = SessionState::Error;
                Err(e)
            }
        }
    }

    /// Answer a question from the loaded document.
    ///
    /// Retrieves the top-k chunks, assembles the capped context, and
    /// consults the answer cache before invoking the LLM. A cache hit
    /// returns the identical string without a network call.
    pub async fn ask(&mut self, question: &str) -> AskOutcome {
        let index = match (self.state, &self.index) {
            (SessionState::Ready, Some(index)) => index,
            _ => return AskOutcome::NotReady,
        };

        let hits = match index
            .top_k(question, self.embedder.as_ref(), self.config.retrieval.top_k)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "question embedding failed");
                return AskOutcome::Failed {
                    message: format!("retrieval failed: {}", e),
                };
            }
        };

        let context = build_context(&hits, self.config.retrieval.context_chars_per_chunk);
        let key = cache_key(question, &context);

        if let Some(answer) = self.cache.get(&key) {
            return AskOutcome::Answered {
                text: answer.clone(),
                cached: true,
            };
        }

        let prompt = build_prompt(question, &context);
        match self.model.generate(&prompt).await {
            Ok(text) => {
                self.cache.insert(key, text.clone());
                AskOutcome::Answered {
                    text,
                    cached: false,
                }
            }
            Err(LlmError::RateLimited) => AskOutcome::RateLimited,
            Err(LlmError::Api(message)) => {
                warn!(%message, "llm call failed");
                AskOutcome::Failed { message }
            }
        }
    }
}

/// Cache key over the (question, retrieved context) pair. The context is
/// part of the key, so a changed index naturally misses; the unit
/// separator keeps (a, bc) and (ab, c) distinct.
fn cache_key(question: &str, context: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(question.as_bytes());
    hasher.update([0x1f]);
    hasher.update(context.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_deterministic() {
        assert_eq!(cache_key("q", "ctx"), cache_key("q", "ctx"));
    }

    #[test]
    fn cache_key_separates_question_from_context() {
        assert_ne!(cache_key("ab", "c"), cache_key("a", "bc"));
        assert_ne!(cache_key("q", "ctx1"), cache_key("q", "ctx2"));
    }
}
