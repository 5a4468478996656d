use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const CHUNK_ID_HEX_CHARS: usize = 16;
const MAX_DOCUMENT_NAME_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: DocumentChunk,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks_indexed: usize,
    pub chunks_skipped: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KnowledgeError {
    #[error("document name must not be empty")]
    MissingDocumentName,
    #[error("document name exceeds {MAX_DOCUMENT_NAME_CHARS} characters")]
    DocumentNameTooLong,
    #[error("document '{0}' has no text")]
    EmptyDocument(String),
}

/// Storage and similarity search over document chunks.
pub trait DocumentIndex: Send + Sync {
    fn ingest(
        &self,
        documents: &[SourceDocument],
        max_chunk_chars: usize,
    ) -> Result<IngestReport, KnowledgeError>;

    fn search(&self, query: &str, top_k: usize) -> Vec<RetrievedChunk>;

    fn chunk_count(&self) -> usize;
}

/// Splits text on sentence boundaries and packs consecutive sentences into
/// chunks of at most `max_chars` characters. A sentence longer than
/// `max_chars` becomes a chunk on its own.
pub fn split_into_sentence_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        let needed = if current.is_empty() {
            sentence.chars().count()
        } else {
            current.chars().count() + 1 + sentence.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for paragraph in text.split("\n\n") {
        let mut current = String::new();
        let mut chars = paragraph.chars().peekable();
        while let Some(ch) = chars.next() {
            current.push(ch);
            let at_boundary = matches!(ch, '.' | '!' | '?')
                && chars.peek().is_none_or(|next| next.is_whitespace());
            if at_boundary {
                push_sentence(&mut sentences, &current);
                current.clear();
            }
        }
        push_sentence(&mut sentences, &current);
    }
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let compact = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !compact.is_empty() {
        sentences.push(compact);
    }
}

pub fn chunk_id(document_name: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_name.as_bytes());
    hasher.update([0_u8]);
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>()
        .chars()
        .take(CHUNK_ID_HEX_CHARS)
        .collect()
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: DocumentChunk,
    term_counts: HashMap<String, f64>,
    norm: f64,
}

/// Bag-of-words cosine similarity index held in memory for one session.
#[derive(Debug, Default)]
pub struct InMemoryDocumentIndex {
    chunks: RwLock<BTreeMap<String, IndexedChunk>>,
}

impl InMemoryDocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_chunks(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, IndexedChunk>> {
        match self.chunks.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_chunks(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, IndexedChunk>> {
        match self.chunks.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl DocumentIndex for InMemoryDocumentIndex {
    fn ingest(
        &self,
        documents: &[SourceDocument],
        max_chunk_chars: usize,
    ) -> Result<IngestReport, KnowledgeError> {
        let mut prepared = Vec::new();
        for document in documents {
            let name = document.name.trim();
            if name.is_empty() {
                return Err(KnowledgeError::MissingDocumentName);
            }
            if name.chars().count() > MAX_DOCUMENT_NAME_CHARS {
                return Err(KnowledgeError::DocumentNameTooLong);
            }
            let chunks = split_into_sentence_chunks(&document.text, max_chunk_chars);
            if chunks.is_empty() {
                return Err(KnowledgeError::EmptyDocument(name.to_string()));
            }
            prepared.extend(chunks.into_iter().map(|text| DocumentChunk {
                chunk_id: chunk_id(name, &text),
                document_name: name.to_string(),
                text,
            }));
        }

        let mut report = IngestReport {
            documents: documents.len(),
            ..IngestReport::default()
        };
        let mut index = self.write_chunks();
        for chunk in prepared {
            if index.contains_key(&chunk.chunk_id) {
                report.chunks_skipped += 1;
                continue;
            }
            let term_counts = term_counts(&chunk.text);
            let norm = vector_norm(&term_counts);
            index.insert(
                chunk.chunk_id.clone(),
                IndexedChunk {
                    chunk,
                    term_counts,
                    norm,
                },
            );
            report.chunks_indexed += 1;
        }

        Ok(report)
    }

    fn search(&self, query: &str, top_k: usize) -> Vec<RetrievedChunk> {
        let query_terms = term_counts(query);
        let query_norm = vector_norm(&query_terms);
        if top_k == 0 || query_norm == 0.0 {
            return Vec::new();
        }

        let index = self.read_chunks();
        let mut scored = index
            .values()
            .filter(|indexed| indexed.norm > 0.0)
            .filter_map(|indexed| {
                let dot = query_terms
                    .iter()
                    .filter_map(|(term, weight)| {
                        indexed.term_counts.get(term).map(|other| weight * other)
                    })
                    .sum::<f64>();
                (dot > 0.0).then(|| RetrievedChunk {
                    chunk: indexed.chunk.clone(),
                    score: dot / (query_norm * indexed.norm),
                })
            })
            .collect::<Vec<_>>();

        // BTreeMap iteration is ordered by chunk id, and the sort is stable.
        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        scored
    }

    fn chunk_count(&self) -> usize {
        self.read_chunks().len()
    }
}

fn term_counts(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for token in text
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| token.chars().count() > 2 && !is_stop_word(token))
    {
        *counts.entry(token.to_string()).or_insert(0.0) += 1.0;
    }
    counts
}

fn vector_norm(counts: &HashMap<String, f64>) -> f64 {
    counts.values().map(|count| count * count).sum::<f64>().sqrt()
}

fn is_stop_word(token: &str) -> bool {
    matches!(
        token,
        "the" | "and" | "for" | "are" | "was" | "who" | "what" | "with" | "that" | "this"
            | "from" | "have" | "has" | "does" | "did" | "how" | "when" | "where" | "which"
            | "into" | "its" | "our" | "your" | "their"
    )
}
