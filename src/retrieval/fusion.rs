//! Rank fusion of lexical and dense result lists.
//!
//! Raw BM25 scores and cosine similarities live on different scales, so both
//! strategies put the two rankings on common footing before the final sort.

use std::collections::{HashMap, HashSet};

use super::RetrievedDocument;

/// Drop documents whose `doc_id` was already seen, keeping the first occurrence.
pub fn dedup_by_doc_id(documents: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|doc| seen.insert(doc.doc_id.clone()))
        .collect()
}

/// Rescale scores into `[0, 1]`. A list whose scores are all equal maps to 1.0.
pub fn min_max_normalize(documents: &mut [RetrievedDocument]) {
    let (min, max) = documents.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
        (lo.min(d.score), hi.max(d.score))
    });
    let range = max - min;

    for doc in documents.iter_mut() {
        doc.score = if range > f64::EPSILON {
            (doc.score - min) / range
        } else {
            1.0
        };
    }
}

fn sort_descending(documents: &mut [RetrievedDocument]) {
    // Stable sort: equal scores keep merge order, so lexical wins ties.
    documents.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Normalize each list, concatenate lexical before dense, deduplicate, re-sort, truncate.
pub fn fuse_min_max(
    mut lexical: Vec<RetrievedDocument>,
    mut dense: Vec<RetrievedDocument>,
    top_k: usize,
) -> Vec<RetrievedDocument> {
    min_max_normalize(&mut lexical);
    min_max_normalize(&mut dense);

    lexical.extend(dense);
    let mut merged = dedup_by_doc_id(lexical);
    sort_descending(&mut merged);
    merged.truncate(top_k);
    merged
}

/// Reciprocal Rank Fusion: `score = Σ 1/(k + rank)`, ranks starting at 1.
///
/// The surviving record for a document is its first occurrence in merge order
/// (lexical before dense); its score is replaced by the fused score.
pub fn fuse_rrf(
    lexical: Vec<RetrievedDocument>,
    dense: Vec<RetrievedDocument>,
    k: u32,
    top_k: usize,
) -> Vec<RetrievedDocument> {
    let mut fused: HashMap<String, f64> = HashMap::new();
    for list in [&lexical, &dense] {
        for (i, doc) in list.iter().enumerate() {
            let rank = (i + 1) as f64;
            *fused.entry(doc.doc_id.clone()).or_default() += 1.0 / (f64::from(k) + rank);
        }
    }

    let mut merged = dedup_by_doc_id(lexical.into_iter().chain(dense).collect());
    for doc in merged.iter_mut() {
        doc.score = fused.get(&doc.doc_id).copied().unwrap_or(0.0);
    }
    sort_descending(&mut merged);
    merged.truncate(top_k);
    merged
}
