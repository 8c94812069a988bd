//! Cross-modal retrieval: candidate fetch per modality, keyword boost,
//! cross-modal reinforcement, forced image inclusion, adaptive second pass.

use crate::chunk::{Chunk, Modality};
use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingManager;
use crate::error::Result;
use crate::query_analysis::AnalyzedQuery;
use crate::store::{SearchFilter, VectorStore};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievalReason {
    Semantic,
    KeywordBoost,
    CrossModalBoost,
    PersonaHint,
}

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub relevance_score: f32,
    pub reasons: HashSet<RetrievalReason>,
}

pub struct CrossModalRetriever {
    store: Arc<dyn VectorStore>,
    embedding: Arc<EmbeddingManager>,
    config: RetrievalConfig,
}

impl CrossModalRetriever {
    pub fn new(store: Arc<dyn VectorStore>, embedding: Arc<EmbeddingManager>, config: RetrievalConfig) -> Self {
        Self {
            store,
            embedding,
            config,
        }
    }

    /// Exposes the embedding manager the retriever embeds queries with, so
    /// other pipeline stages (conflict detection) can project text into
    /// the same vector space without taking their own backend handle.
    pub fn embedding_manager(&self) -> &EmbeddingManager {
        &self.embedding
    }

    pub async fn retrieve(&self, analyzed: &AnalyzedQuery, top_k: Option<usize>) -> Result<Vec<RetrievedChunk>> {
        let top_k = top_k.unwrap_or(self.config.default_top_k);
        let query_embedding = self.embedding.embed_query(&analyzed.query).await?;

        let mut ranked = self.fetch_and_rank(analyzed, &query_embedding, top_k, top_k * 2).await?;

        let average_relevance = mean_relevance(&ranked, top_k);
        if average_relevance < self.config.second_pass_relevance_floor && self.config.max_retrieval_iterations > 1 {
            ranked = self.fetch_and_rank(analyzed, &query_embedding, top_k, top_k * 3).await?;
        }

        self.ensure_image_inclusion(analyzed, &query_embedding, top_k, &mut ranked).await?;

        Ok(ranked)
    }

    async fn fetch_and_rank(
        &self,
        analyzed: &AnalyzedQuery,
        query_embedding: &[f32],
        top_k: usize,
        per_modality_n: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let filters: Vec<SearchFilter> = analyzed
            .required_modalities
            .iter()
            .map(|modality| SearchFilter {
                modality: Some(*modality),
                source_file: None,
            })
            .collect();

        let fetches = filters
            .iter()
            .map(|filter| self.store.search(query_embedding, per_modality_n, filter));
        let results = join_all(fetches).await;

        let mut by_id: HashMap<String, (Chunk, f32)> = HashMap::new();
        for result in results {
            for scored in result? {
                by_id
                    .entry(scored.chunk.id.clone())
                    .or_insert((scored.chunk, scored.similarity));
            }
        }

        let files_per_modality = modality_counts_by_file(by_id.values().map(|(c, _)| c));

        let mut scored: Vec<RetrievedChunk> = by_id
            .into_values()
            .map(|(chunk, similarity)| score_chunk(chunk, similarity, analyzed, &files_per_modality))
            .collect();

        scored.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.chunk.confidence.partial_cmp(&a.chunk.confidence).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Always probes the store for the best image candidate, independent of
    /// `required_modalities` — the query text not containing a visual
    /// keyword doesn't mean an image can't be the best evidence for it.
    async fn ensure_image_inclusion(
        &self,
        _analyzed: &AnalyzedQuery,
        query_embedding: &[f32],
        top_k: usize,
        ranked: &mut Vec<RetrievedChunk>,
    ) -> Result<()> {
        if ranked.iter().any(|r| r.chunk.modality == Modality::Image) {
            return Ok(());
        }

        let filter = SearchFilter {
            modality: Some(Modality::Image),
            source_file: None,
        };
        let candidates = self.store.search(query_embedding, 1, &filter).await?;
        if let Some(top) = candidates.into_iter().next() {
            if top.similarity >= self.config.image_inclusion_floor {
                if ranked.len() >= top_k {
                    ranked.pop();
                }
                ranked.push(RetrievedChunk {
                    chunk: top.chunk,
                    relevance_score: top.similarity,
                    reasons: HashSet::from([RetrievalReason::Semantic]),
                });
            }
        }
        Ok(())
    }
}

fn modality_counts_by_file<'a>(chunks: impl Iterator<Item = &'a Chunk>) -> HashMap<String, HashSet<Modality>> {
    let mut map: HashMap<String, HashSet<Modality>> = HashMap::new();
    for chunk in chunks {
        map.entry(chunk.source_file.clone()).or_default().insert(chunk.modality);
    }
    map
}

fn score_chunk(
    chunk: Chunk,
    base_similarity: f32,
    analyzed: &AnalyzedQuery,
    files_per_modality: &HashMap<String, HashSet<Modality>>,
) -> RetrievedChunk {
    let mut reasons = HashSet::from([RetrievalReason::Semantic]);
    let mut score = base_similarity.clamp(0.0, 1.0);

    let matches = count_keyword_matches(&chunk.content, &analyzed.keywords);
    if matches > 0 {
        score *= 1.0 + (0.1 * matches as f32).min(0.5);
        reasons.insert(RetrievalReason::KeywordBoost);
    }

    if files_per_modality
        .get(&chunk.source_file)
        .map(|modalities| modalities.len() >= 2)
        .unwrap_or(false)
    {
        score *= 1.1;
        reasons.insert(RetrievalReason::CrossModalBoost);
    }

    RetrievedChunk {
        chunk,
        relevance_score: score.min(1.0),
        reasons,
    }
}

fn count_keyword_matches(content: &str, keywords: &[String]) -> usize {
    let lower = content.to_lowercase();
    keywords
        .iter()
        .filter(|kw| word_boundary_contains(&lower, kw))
        .count()
}

fn word_boundary_contains(haystack: &str, needle: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == needle)
}

fn mean_relevance(ranked: &[RetrievedChunk], top_k: usize) -> f32 {
    if ranked.is_empty() {
        return 0.0;
    }
    let take = ranked.len().min(top_k);
    ranked[..take].iter().map(|r| r.relevance_score).sum::<f32>() / take as f32
}
