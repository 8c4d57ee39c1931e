//! In-memory vector index over document chunks.
//!
//! Building embeds every chunk with the configured provider and blocks
//! until all vectors exist; no partial index is ever observable. Queries
//! are brute-force cosine similarity over all stored vectors, descending,
//! with ties resolved by original chunk order.

use anyhow::{bail, Result};
use tracing::debug;

use crate::chunk::Chunk;
use crate::embedding::{cosine_similarity, embed_query, Embedder};

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// One index exists per loaded document; it owns the chunks it was built
/// from and is discarded wholesale when the document changes.
pub struct VectorIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    model: String,
}

impl VectorIndex {
    /// Embed `chunks` in batches and build the index.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self> {
        if chunks.is_empty() {
            bail!("cannot build an index from zero chunks");
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder.embed(&texts).await?;
            if embedded.len() != batch.len() {
                bail!(
                    "embedding provider returned {} vectors for {} chunks",
                    embedded.len(),
                    batch.len()
                );
            }
            vectors.extend(embedded);
        }

        debug!(
            chunks = chunks.len(),
            model = embedder.model_name(),
            "vector index built"
        );

        Ok(Self {
            chunks,
            vectors,
            model: embedder.model_name().to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Retrieve the `k` chunks most similar to `question`, best first.
    /// Returns all chunks when the index holds fewer than `k`.
    pub async fn top_k(
        &self,
        question: &str,
        embedder: &dyn Embedder,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let query_vec = embed_query(embedder, question).await?;
        Ok(self.search(&query_vec, k))
    }

    fn search(&self, query_vec: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .zip(self.vectors.iter())
            .map(|(chunk, vec)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(query_vec, vec),
            })
            .collect();

        // Stable sort: equal scores keep original chunk order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}
