// Ranking engine - turns a query embedding plus a candidate set into a
// bounded, descending-similarity top-k.
//
// Subtract-mode negative queries are resolved by the caller (the query
// pipeline in `collection.rs`) before this module ever sees them: the
// caller rewrites `query <- normalize(query - negative)` and clears the
// negative. Only Filter-mode negatives reach `top_k` directly, as an
// exclusion threshold applied before selection.

use rayon::prelude::*;

use crate::document::Document;
use crate::error::Result;
use crate::vector::dot;

/// Default exclusion threshold for Filter-mode negative queries when the
/// caller passes `0.0`.
pub const DEFAULT_FILTER_THRESHOLD: f32 = 0.5;

/// A document paired with its similarity score, returned in descending
/// order of `score`.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<'a> {
    pub document: &'a Document,
    pub score: f32,
}

/// A still-active Filter-mode negative: candidates too similar to this
/// vector are excluded before selection.
#[derive(Debug, Clone, Copy)]
pub struct FilterNegative<'a> {
    pub embedding: &'a [f32],
    pub threshold: f32,
}

/// Scores every candidate against `query` (already normalized and, for
/// Subtract mode, already adjusted by the caller), drops any candidate
/// excluded by a Filter-mode negative, and returns the top `k` by
/// descending similarity. Ties keep the candidates' original relative
/// order (stable sort).
pub fn top_k<'a>(
    candidates: &[&'a Document],
    query: &[f32],
    negative: Option<FilterNegative<'_>>,
    k: usize,
) -> Result<Vec<Scored<'a>>> {
    let scored: Vec<Scored<'a>> = candidates
        .par_iter()
        .map(|doc| -> Result<Option<Scored<'a>>> {
            if let Some(neg) = negative {
                let threshold = if neg.threshold == 0.0 {
                    DEFAULT_FILTER_THRESHOLD
                } else {
                    neg.threshold
                };
                let neg_sim = dot(neg.embedding, &doc.embedding)?;
                if neg_sim > threshold {
                    return Ok(None);
                }
            }
            let score = dot(query, &doc.embedding)?;
            Ok(Some(Scored { document: doc, score }))
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();

    let mut scored = scored;
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    Ok(scored)
}
