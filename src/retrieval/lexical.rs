//! BM25 lexical ranking.

use std::collections::HashMap;

/// Terms too common to carry ranking signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from", "has",
    "have", "how", "in", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was",
    "were", "what", "when", "where", "which", "who", "why", "with",
];

/// Lowercased alphanumeric terms with stopwords removed.
pub(crate) fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Inverted statistics for Okapi BM25 over a fixed document set.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    k1: f64,
    b: f64,
    doc_terms: Vec<HashMap<String, usize>>,
    doc_lengths: Vec<usize>,
    avg_length: f64,
    document_frequency: HashMap<String, usize>,
}

impl Bm25Index {
    /// Build the index. `k1` controls term saturation, `b` length normalization.
    pub fn build(documents: &[String], k1: f64, b: f64) -> Self {
        let mut doc_terms = Vec::with_capacity(documents.len());
        let mut doc_lengths = Vec::with_capacity(documents.len());
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let tokens = terms(doc);
            doc_lengths.push(tokens.len());

            let mut counts: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *counts.entry(token).or_default() += 1;
            }
            for term in counts.keys() {
                *document_frequency.entry(term.clone()).or_default() += 1;
            }
            doc_terms.push(counts);
        }

        let total: usize = doc_lengths.iter().sum();
        let avg_length = if documents.is_empty() {
            0.0
        } else {
            total as f64 / documents.len() as f64
        };

        Self {
            k1,
            b,
            doc_terms,
            doc_lengths,
            avg_length,
            document_frequency,
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_terms.len()
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.doc_terms.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.len() as f64;
        let df = self.document_frequency.get(term).copied().unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 score of one document against the query terms.
    pub fn score(&self, doc: usize, query_terms: &[String]) -> f64 {
        let counts = &self.doc_terms[doc];
        let length = self.doc_lengths[doc] as f64;
        let norm = if self.avg_length > 0.0 {
            1.0 - self.b + self.b * length / self.avg_length
        } else {
            1.0
        };

        query_terms
            .iter()
            .filter_map(|term| counts.get(term).map(|tf| (term, *tf as f64)))
            .map(|(term, tf)| self.idf(term) * tf * (self.k1 + 1.0) / (tf + self.k1 * norm))
            .sum()
    }

    /// `(doc index, score)` pairs with a positive score, best first, at most `top_k`.
    pub fn rank(&self, query: &str, top_k: usize) -> Vec<(usize, f64)> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = (0..self.len())
            .map(|doc| (doc, self.score(doc, &query_terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}
